// 🔄 Run Pipeline - strict phase ordering over the reconciliation engine
// normalize -> dedup -> append -> aggregate -> decide -> sanitize/batch ->
// report. Later phases depend on the ledger growth produced by earlier ones,
// so there is no overlap and no retry; an I/O failure aborts the remainder
// of the run with the counts accumulated so far still delivered.

use crate::aggregate::latest_by_group;
use crate::batch::UpdateBatcher;
use crate::config::RunConfig;
use crate::dedup::filter_new;
use crate::normalize::{normalize_rows, RawRow};
use crate::reconcile::decide_updates;
use crate::record::LaborRecord;
use crate::store::{InventoryStore, LedgerStore};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

// ============================================================================
// RUN REPORT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,

    /// Raw rows received from the export.
    pub rows_received: usize,

    /// Rows dropped by type coercion failures.
    pub malformed_rows: usize,

    /// Rows dropped by the window/status/ownership filters.
    pub filtered_rows: usize,

    /// Rows whose asset id had no scoped inventory feature.
    pub unknown_asset_rows: usize,

    /// Rows whose composite key was already in the ledger.
    pub duplicate_rows: usize,

    /// New ledger rows accepted by the append.
    pub records_appended: usize,

    /// (asset, activity group) candidates produced by the aggregation.
    pub candidates: usize,

    /// Features with at least one accepted date mutation, confirmed by the
    /// inventory store.
    pub features_updated: usize,
}

impl RunReport {
    pub fn new() -> Self {
        RunReport {
            run_id: Uuid::new_v4(),
            rows_received: 0,
            malformed_rows: 0,
            filtered_rows: 0,
            unknown_asset_rows: 0,
            duplicate_rows: 0,
            records_appended: 0,
            candidates: 0,
            features_updated: 0,
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "{} rows in, {} appended, {} features updated ({} malformed, {} filtered, {} unknown asset, {} duplicate)",
            self.rows_received,
            self.records_appended,
            self.features_updated,
            self.malformed_rows,
            self.filtered_rows,
            self.unknown_asset_rows,
            self.duplicate_rows,
        )
    }
}

impl Default for RunReport {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// REPORTER
// ============================================================================

/// Receives the final counts. Downstream delivery (mail, chat, dashboards)
/// lives behind this boundary; the engine only computes the numbers.
pub trait Reporter {
    fn deliver(&self, report: &RunReport) -> Result<()>;
}

/// Prints the notification to stdout.
pub struct ConsoleReporter;

impl Reporter for ConsoleReporter {
    fn deliver(&self, report: &RunReport) -> Result<()> {
        println!("Asset inventory update complete");
        println!("New labor records: {}", report.records_appended);
        println!("New feature updates: {}", report.features_updated);
        Ok(())
    }
}

// ============================================================================
// RUN
// ============================================================================

/// Execute one full reconciliation run against a store that backs both the
/// ledger and the inventory.
///
/// On an append or batch-submission failure the partial counts are handed to
/// the reporter before the error propagates; data-shape problems never abort
/// the run, they are counted and the rows dropped.
pub fn run_sync<S>(
    config: &RunConfig,
    rows: &[RawRow],
    store: &mut S,
    reporter: &dyn Reporter,
) -> Result<RunReport>
where
    S: LedgerStore + InventoryStore,
{
    let mut report = RunReport::new();
    report.rows_received = rows.len();

    // Phase 1: scoped inventory features
    let features = store.query_features(&config.scope)?;

    // Phase 2: normalize the raw batch
    let outcome = normalize_rows(rows, config);
    report.malformed_rows = outcome.malformed;
    report.filtered_rows = outcome.filtered;

    // Phase 3: drop records for assets outside the scoped inventory
    let known: HashSet<&str> = features.iter().map(|f| f.asset_id.as_str()).collect();
    let normalized = outcome.records.len();
    let records: Vec<LaborRecord> = outcome
        .records
        .into_iter()
        .filter(|r| known.contains(r.asset_id.as_str()))
        .collect();
    report.unknown_asset_rows = normalized - records.len();

    // Phase 4: deduplicate against the existing ledger
    let existing_keys = store.query_keys()?;
    let before_dedup = records.len();
    let new_records = filter_new(records, &existing_keys);
    report.duplicate_rows = before_dedup - new_records.len();

    // Phase 5: append
    match store.append(&new_records) {
        Ok(appended) => report.records_appended = appended,
        Err(e) => {
            report.records_appended = e.committed;
            let _ = reporter.deliver(&report);
            return Err(anyhow::Error::new(e));
        }
    }

    // Phase 6: aggregate over the full post-append ledger
    let ledger_records = store.query_records()?;
    let asset_ids: Vec<String> = features.iter().map(|f| f.asset_id.clone()).collect();
    let candidates = latest_by_group(&ledger_records, &asset_ids, &config.groups);
    report.candidates = candidates.len();

    // Phase 7: decide under the monotonic policy
    let decision = decide_updates(&features, &candidates, &config.groups);

    // Phase 8: sanitize and submit in bounded batches
    let batcher = UpdateBatcher::with_batch_size(config.batch_size);
    match batcher.submit_all(store, decision.updates) {
        Ok(submitted) => report.features_updated = submitted,
        Err(e) => {
            report.features_updated = e.submitted;
            let _ = reporter.deliver(&report);
            return Err(anyhow::Error::new(e));
        }
    }

    // Phase 9: hand off the counts
    reporter.deliver(&report)?;

    Ok(report)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScopeFilter;
    use crate::normalize::{
        COL_ACTIVITY, COL_ASSET_ID, COL_BOOKED_DATE, COL_RATE, COL_STATUS, COL_WORK_ORDER,
    };
    use crate::record::{AssetFeature, CompositeKey, FeatureUpdate};
    use crate::store::{AppendError, SqliteStore};
    use anyhow::anyhow;
    use chrono::NaiveDate;
    use std::cell::RefCell;
    use std::collections::HashMap;

    struct NullReporter;

    impl Reporter for NullReporter {
        fn deliver(&self, _report: &RunReport) -> Result<()> {
            Ok(())
        }
    }

    /// Keeps the last delivered report for assertions.
    struct RecordingReporter {
        delivered: RefCell<Option<RunReport>>,
    }

    impl RecordingReporter {
        fn new() -> Self {
            RecordingReporter {
                delivered: RefCell::new(None),
            }
        }
    }

    impl Reporter for RecordingReporter {
        fn deliver(&self, report: &RunReport) -> Result<()> {
            *self.delivered.borrow_mut() = Some(report.clone());
            Ok(())
        }
    }

    fn test_config() -> RunConfig {
        let json = r#"{
            "export_paths": [],
            "database_path": ":memory:",
            "window": { "start": "2020-12-31", "end": "2021-12-31" },
            "batch_size": 2
        }"#;
        let config: RunConfig = serde_json::from_str(json).unwrap();
        config.finalize()
    }

    fn raw_row(asset: &str, wo: &str, activity: &str, booked: &str) -> RawRow {
        let mut row = RawRow::new();
        row.insert(COL_ASSET_ID.to_string(), asset.to_string());
        row.insert(COL_WORK_ORDER.to_string(), wo.to_string());
        row.insert(COL_ACTIVITY.to_string(), activity.to_string());
        row.insert(COL_BOOKED_DATE.to_string(), booked.to_string());
        row.insert(COL_STATUS.to_string(), "Completed".to_string());
        row.insert(COL_RATE.to_string(), "REGULAR".to_string());
        row
    }

    fn feature(asset_id: &str, mow_date: Option<&str>) -> AssetFeature {
        let mut feature = AssetFeature::new(asset_id);
        if let Some(date) = mow_date {
            feature
                .attributes
                .insert("MOW_DATE".to_string(), serde_json::json!(date));
        }
        feature
    }

    #[test]
    fn test_full_run_scenario() {
        let config = test_config();
        let mut store = SqliteStore::open_in_memory().unwrap();

        store
            .insert_feature(&feature("A1", Some("2021-01-01 00:00:00")))
            .unwrap();

        // (A1, 100) is already in the ledger with an older booked date
        let existing = crate::record::LaborRecord {
            asset_id: "A1".to_string(),
            work_order_number: 100,
            activity_code: "MOW".to_string(),
            booked_date: NaiveDate::from_ymd_opt(2021, 3, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            rate: "REGULAR".to_string(),
            extra: HashMap::new(),
        };
        store.append(std::slice::from_ref(&existing)).unwrap();

        let rows = vec![
            raw_row("A1", "100", "MOW", "2021-03-01 00:00:00"),
            raw_row("A1", "101", "MOW", "2021-06-01 00:00:00"),
        ];

        let report = run_sync(&config, &rows, &mut store, &NullReporter).unwrap();

        // One duplicate skipped, one append
        assert_eq!(report.duplicate_rows, 1);
        assert_eq!(report.records_appended, 1);
        assert_eq!(store.record_count().unwrap(), 2);

        // MOW candidate is the max across the full ledger, and it beats the
        // stored 2021-01-01
        assert_eq!(report.candidates, 1);
        assert_eq!(report.features_updated, 1);

        let updated = store.feature("A1").unwrap().unwrap();
        assert_eq!(
            updated.attributes.get("MOW_DATE"),
            Some(&serde_json::json!("2021-06-01 00:00:00"))
        );

        println!("✅ Scenario run: {}", report.summary());
    }

    #[test]
    fn test_second_run_is_idempotent() {
        let config = test_config();
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.insert_feature(&feature("A1", None)).unwrap();

        let rows = vec![
            raw_row("A1", "100", "MOW", "2021-03-01 07:00:00"),
            raw_row("A1", "101", "DRAG", "2021-04-01 07:00:00"),
        ];

        let first = run_sync(&config, &rows, &mut store, &NullReporter).unwrap();
        assert_eq!(first.records_appended, 2);
        assert_eq!(first.features_updated, 1);

        let second = run_sync(&config, &rows, &mut store, &NullReporter).unwrap();
        assert_eq!(second.records_appended, 0);
        assert_eq!(second.duplicate_rows, 2);
        assert_eq!(second.features_updated, 0);
        assert_eq!(store.record_count().unwrap(), 2);

        println!("✅ Idempotence: second run appended 0 rows, updated 0 features");
    }

    #[test]
    fn test_unknown_assets_dropped_silently() {
        let config = test_config();
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.insert_feature(&feature("A1", None)).unwrap();

        let rows = vec![
            raw_row("A1", "100", "MOW", "2021-03-01 00:00:00"),
            raw_row("GHOST", "200", "MOW", "2021-03-01 00:00:00"),
        ];

        let report = run_sync(&config, &rows, &mut store, &NullReporter).unwrap();

        assert_eq!(report.unknown_asset_rows, 1);
        assert_eq!(report.records_appended, 1);

        // The unknown asset never reaches the ledger
        let keys = store.query_keys().unwrap();
        assert!(!keys.contains(&CompositeKey::new("GHOST", 200)));
    }

    #[test]
    fn test_scope_filter_limits_updates() {
        let json = r#"{
            "export_paths": [],
            "database_path": ":memory:",
            "window": { "start": "2020-12-31", "end": "2021-12-31" },
            "scope": { "require": [["MGMT_REGION", "South"]] }
        }"#;
        let config: RunConfig = serde_json::from_str(json).unwrap();
        let config = config.finalize();

        let mut store = SqliteStore::open_in_memory().unwrap();

        let mut in_scope = feature("A1", None);
        in_scope
            .attributes
            .insert("MGMT_REGION".to_string(), serde_json::json!("South"));
        let mut out_of_scope = feature("A2", None);
        out_of_scope
            .attributes
            .insert("MGMT_REGION".to_string(), serde_json::json!("North"));

        store.insert_feature(&in_scope).unwrap();
        store.insert_feature(&out_of_scope).unwrap();

        let rows = vec![
            raw_row("A1", "100", "MOW", "2021-03-01 00:00:00"),
            raw_row("A2", "200", "MOW", "2021-03-01 00:00:00"),
        ];

        let report = run_sync(&config, &rows, &mut store, &NullReporter).unwrap();

        // A2 is treated like any unknown asset: no append, no update
        assert_eq!(report.unknown_asset_rows, 1);
        assert_eq!(report.records_appended, 1);
        assert_eq!(report.features_updated, 1);
        assert!(store.feature("A2").unwrap().unwrap().attributes.get("MOW_DATE").is_none());
    }

    #[test]
    fn test_monotonic_policy_no_update_for_stale_candidate() {
        let config = test_config();
        let mut store = SqliteStore::open_in_memory().unwrap();
        store
            .insert_feature(&feature("A1", Some("2021-09-01 00:00:00")))
            .unwrap();

        let rows = vec![raw_row("A1", "100", "MOW", "2021-03-01 00:00:00")];

        let report = run_sync(&config, &rows, &mut store, &NullReporter).unwrap();

        assert_eq!(report.records_appended, 1);
        assert_eq!(report.candidates, 1);
        assert_eq!(report.features_updated, 0);

        let untouched = store.feature("A1").unwrap().unwrap();
        assert_eq!(
            untouched.attributes.get("MOW_DATE"),
            Some(&serde_json::json!("2021-09-01 00:00:00"))
        );
    }

    // ------------------------------------------------------------------
    // Failure-path double: in-memory store whose batch submission fails
    // ------------------------------------------------------------------

    struct FlakyStore {
        ledger: Vec<crate::record::LaborRecord>,
        features: Vec<AssetFeature>,
        fail_append_after: Option<usize>,
        fail_batches: bool,
    }

    impl LedgerStore for FlakyStore {
        fn query_keys(&self) -> Result<std::collections::HashSet<CompositeKey>> {
            Ok(self.ledger.iter().map(|r| r.key()).collect())
        }

        fn query_records(&self) -> Result<Vec<crate::record::LaborRecord>> {
            Ok(self.ledger.clone())
        }

        fn append(
            &mut self,
            records: &[crate::record::LaborRecord],
        ) -> Result<usize, AppendError> {
            if let Some(limit) = self.fail_append_after {
                if records.len() > limit {
                    self.ledger.extend_from_slice(&records[..limit]);
                    return Err(AppendError {
                        committed: limit,
                        source: anyhow!("ledger store unavailable"),
                    });
                }
            }
            self.ledger.extend_from_slice(records);
            Ok(records.len())
        }
    }

    impl InventoryStore for FlakyStore {
        fn query_features(&self, _scope: &ScopeFilter) -> Result<Vec<AssetFeature>> {
            Ok(self.features.clone())
        }

        fn submit_batch(&mut self, _updates: &[FeatureUpdate]) -> Result<()> {
            if self.fail_batches {
                return Err(anyhow!("inventory store unavailable"));
            }
            Ok(())
        }
    }

    #[test]
    fn test_batch_failure_reports_partial_counts() {
        let config = test_config();
        let reporter = RecordingReporter::new();

        let mut store = FlakyStore {
            ledger: Vec::new(),
            features: vec![feature("A1", None)],
            fail_append_after: None,
            fail_batches: true,
        };

        let rows = vec![raw_row("A1", "100", "MOW", "2021-03-01 00:00:00")];
        let result = run_sync(&config, &rows, &mut store, &reporter);

        assert!(result.is_err());

        // The append succeeded and its count still reached the reporter
        let delivered = reporter.delivered.borrow().clone().unwrap();
        assert_eq!(delivered.records_appended, 1);
        assert_eq!(delivered.features_updated, 0);
    }

    #[test]
    fn test_append_failure_aborts_with_committed_count() {
        let config = test_config();
        let reporter = RecordingReporter::new();

        let mut store = FlakyStore {
            ledger: Vec::new(),
            features: vec![feature("A1", None)],
            fail_append_after: Some(1),
            fail_batches: false,
        };

        let rows = vec![
            raw_row("A1", "100", "MOW", "2021-03-01 00:00:00"),
            raw_row("A1", "101", "MOW", "2021-04-01 00:00:00"),
        ];
        let result = run_sync(&config, &rows, &mut store, &reporter);

        assert!(result.is_err());

        // One row landed before the failure; no feature updates were attempted
        let delivered = reporter.delivered.borrow().clone().unwrap();
        assert_eq!(delivered.records_appended, 1);
        assert_eq!(delivered.features_updated, 0);
        assert_eq!(store.ledger.len(), 1);
    }
}
