// 🗄️ Store layer - ledger and inventory behind repository traits
// The engine holds no persistent handles; it receives per-run references to
// whatever implements these traits. The bundled implementation keeps both
// stores in one SQLite database.

use crate::config::ScopeFilter;
use crate::record::{AssetFeature, CompositeKey, FeatureUpdate, LaborRecord, DATETIME_FORMAT};
use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;

// ============================================================================
// APPEND ERROR
// ============================================================================

/// Ledger append failure carrying partial progress: `committed` rows were
/// durably written before the error. The engine does not retry; it reports
/// the partial count and aborts the run.
#[derive(Debug)]
pub struct AppendError {
    pub committed: usize,
    pub source: anyhow::Error,
}

impl fmt::Display for AppendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ledger append failed after {} rows: {}",
            self.committed, self.source
        )
    }
}

impl std::error::Error for AppendError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source.as_ref())
    }
}

// ============================================================================
// REPOSITORY TRAITS
// ============================================================================

/// Append-only store of individual maintenance work events.
pub trait LedgerStore {
    /// All composite keys currently present in the ledger.
    fn query_keys(&self) -> Result<HashSet<CompositeKey>>;

    /// The full ledger contents. The aggregator reads this after the append
    /// so newly written and pre-existing records are treated alike.
    fn query_records(&self) -> Result<Vec<LaborRecord>>;

    /// Append rows one at a time, in the given order. Not transactional:
    /// a failure leaves earlier rows in place and surfaces the count.
    fn append(&mut self, records: &[LaborRecord]) -> Result<usize, AppendError>;
}

/// Store of asset features with per-activity "last performed" attributes.
pub trait InventoryStore {
    /// Features satisfying the scope filter, in a stable order.
    fn query_features(&self, scope: &ScopeFilter) -> Result<Vec<AssetFeature>>;

    /// Submit one bounded batch of attribute updates keyed by feature
    /// identity. Each call is an independent operation; earlier batches
    /// are not rolled back if a later one fails.
    fn submit_batch(&mut self, updates: &[FeatureUpdate]) -> Result<()>;
}

// ============================================================================
// SQLITE IMPLEMENTATION
// ============================================================================

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database {}", path.display()))?;
        let store = SqliteStore { conn };
        store.setup()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = SqliteStore { conn };
        store.setup()?;
        Ok(store)
    }

    fn setup(&self) -> Result<()> {
        // WAL mode for crash recovery
        self.conn.pragma_update(None, "journal_mode", "WAL")?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS labor_records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                asset_id TEXT NOT NULL,
                work_order_number INTEGER NOT NULL,
                activity_code TEXT NOT NULL,
                booked_date TEXT NOT NULL,
                rate TEXT NOT NULL,
                extra TEXT,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                UNIQUE(asset_id, work_order_number)
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS asset_features (
                asset_id TEXT PRIMARY KEY,
                attributes TEXT NOT NULL
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_labor_asset ON labor_records(asset_id)",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_labor_booked ON labor_records(booked_date)",
            [],
        )?;

        Ok(())
    }

    /// Seed or replace one inventory feature. Used by deployment tooling and
    /// tests; the reconciliation engine itself never creates features.
    pub fn insert_feature(&self, feature: &AssetFeature) -> Result<()> {
        let attributes_json = serde_json::to_string(&feature.attributes)?;
        self.conn.execute(
            "INSERT OR REPLACE INTO asset_features (asset_id, attributes) VALUES (?1, ?2)",
            params![feature.asset_id, attributes_json],
        )?;
        Ok(())
    }

    /// Fetch one feature by id.
    pub fn feature(&self, asset_id: &str) -> Result<Option<AssetFeature>> {
        let mut stmt = self
            .conn
            .prepare("SELECT asset_id, attributes FROM asset_features WHERE asset_id = ?1")?;

        let mut rows = stmt.query_map(params![asset_id], decode_feature)?;
        match rows.next() {
            Some(feature) => Ok(Some(feature?)),
            None => Ok(None),
        }
    }

    pub fn record_count(&self) -> Result<i64> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM labor_records", [], |row| row.get(0))?;
        Ok(count)
    }
}

fn decode_feature(row: &rusqlite::Row<'_>) -> rusqlite::Result<AssetFeature> {
    let asset_id: String = row.get(0)?;
    let attributes_json: String = row.get(1)?;
    let attributes = serde_json::from_str(&attributes_json).unwrap_or_default();
    Ok(AssetFeature {
        asset_id,
        attributes,
    })
}

impl LedgerStore for SqliteStore {
    fn query_keys(&self) -> Result<HashSet<CompositeKey>> {
        let mut stmt = self
            .conn
            .prepare("SELECT asset_id, work_order_number FROM labor_records")?;

        let keys = stmt
            .query_map([], |row| {
                Ok(CompositeKey {
                    asset_id: row.get(0)?,
                    work_order_number: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<HashSet<_>>>()?;

        Ok(keys)
    }

    fn query_records(&self) -> Result<Vec<LaborRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT asset_id, work_order_number, activity_code, booked_date, rate, extra
             FROM labor_records
             ORDER BY booked_date, id",
        )?;

        let records = stmt
            .query_map([], |row| {
                let booked_raw: String = row.get(3)?;
                let booked_date = NaiveDateTime::parse_from_str(&booked_raw, DATETIME_FORMAT)
                    .map_err(|_| rusqlite::Error::InvalidQuery)?;

                let extra_json: Option<String> = row.get(5)?;
                let extra = extra_json
                    .and_then(|json| serde_json::from_str(&json).ok())
                    .unwrap_or_default();

                Ok(LaborRecord {
                    asset_id: row.get(0)?,
                    work_order_number: row.get(1)?,
                    activity_code: row.get(2)?,
                    booked_date,
                    rate: row.get(4)?,
                    extra,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(records)
    }

    fn append(&mut self, records: &[LaborRecord]) -> Result<usize, AppendError> {
        let mut inserted = 0;

        for record in records {
            let extra_json = match serde_json::to_string(&record.extra) {
                Ok(json) => json,
                Err(e) => {
                    return Err(AppendError {
                        committed: inserted,
                        source: e.into(),
                    })
                }
            };

            let result = self.conn.execute(
                "INSERT INTO labor_records (
                    asset_id, work_order_number, activity_code, booked_date, rate, extra
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    record.asset_id,
                    record.work_order_number,
                    record.activity_code,
                    record.booked_date.format(DATETIME_FORMAT).to_string(),
                    record.rate,
                    extra_json,
                ],
            );

            match result {
                Ok(_) => inserted += 1,
                Err(rusqlite::Error::SqliteFailure(err, _))
                    if err.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    // Composite key already in the ledger: set semantics, skip
                }
                Err(e) => {
                    return Err(AppendError {
                        committed: inserted,
                        source: e.into(),
                    })
                }
            }
        }

        Ok(inserted)
    }
}

impl InventoryStore for SqliteStore {
    fn query_features(&self, scope: &ScopeFilter) -> Result<Vec<AssetFeature>> {
        let mut stmt = self
            .conn
            .prepare("SELECT asset_id, attributes FROM asset_features ORDER BY asset_id")?;

        let features = stmt
            .query_map([], decode_feature)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(features
            .into_iter()
            .filter(|feature| scope.matches(feature))
            .collect())
    }

    fn submit_batch(&mut self, updates: &[FeatureUpdate]) -> Result<()> {
        for update in updates {
            let attributes_json = serde_json::to_string(&update.attributes)?;
            self.conn
                .execute(
                    "UPDATE asset_features SET attributes = ?1 WHERE asset_id = ?2",
                    params![attributes_json, update.asset_id],
                )
                .with_context(|| format!("failed to update feature {}", update.asset_id))?;
        }
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
