// 🔍 Ledger Deduplicator - composite-key filter against the existing ledger

use crate::record::{CompositeKey, LaborRecord};
use std::collections::HashSet;

/// Retain only records whose composite key is absent from the ledger.
///
/// Pure function of its two inputs: running it a second time over the same
/// ledger state yields an empty result. Presence is set membership, so
/// duplicate keys inside the ledger itself collapse silently. Input order
/// is preserved.
pub fn filter_new(
    records: Vec<LaborRecord>,
    existing_keys: &HashSet<CompositeKey>,
) -> Vec<LaborRecord> {
    records
        .into_iter()
        .filter(|record| !existing_keys.contains(&record.key()))
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================
