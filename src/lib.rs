// Fieldsync - Maintenance Work-Order Reconciliation
// Reconciles a periodic work-order export against a persistent asset
// inventory: appends new labor records exactly once and advances per-asset
// "last performed" activity dates under a monotonic policy.

pub mod aggregate;
pub mod batch;
pub mod config;
pub mod dedup;
pub mod normalize;
pub mod pipeline;
pub mod reconcile;
pub mod record;
pub mod store;

// Re-export commonly used types
pub use aggregate::latest_by_group;
pub use batch::{sanitize_attributes, BatchSubmitError, UpdateBatcher, DEFAULT_BATCH_SIZE};
pub use config::{ActivityGroup, DateWindow, RunConfig, ScopeFilter};
pub use dedup::filter_new;
pub use normalize::{
    load_export_rows, normalize_rows, parse_datetime, NormalizeOutcome, RawRow, RowError,
};
pub use pipeline::{run_sync, ConsoleReporter, Reporter, RunReport};
pub use reconcile::{decide_updates, should_advance, DecisionSummary};
pub use record::{
    AssetFeature, CompositeKey, FeatureUpdate, LaborRecord, UpdateCandidate, DATETIME_FORMAT,
};
pub use store::{AppendError, InventoryStore, LedgerStore, SqliteStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
