// 📅 Activity Aggregator - most recent occurrence per (asset, activity group)

use crate::config::ActivityGroup;
use crate::record::{LaborRecord, UpdateCandidate};

/// For each scoped asset and each configured group, reduce the matching
/// ledger records to the single most recent booked date.
///
/// `records` is the full post-append ledger: newly appended and pre-existing
/// rows are treated alike, so a record that was deduplicated out of this
/// run's append still counts toward the most recent occurrence. Ties keep
/// the later record in input order, which with the ledger's stable ascending
/// sort makes the reduction deterministic. An empty selection produces no
/// candidate.
pub fn latest_by_group(
    records: &[LaborRecord],
    asset_ids: &[String],
    groups: &[ActivityGroup],
) -> Vec<UpdateCandidate> {
    let mut candidates = Vec::new();

    for asset_id in asset_ids {
        for group in groups {
            let mut latest: Option<&LaborRecord> = None;

            for record in records {
                if record.asset_id != *asset_id || !group.matches(&record.activity_code) {
                    continue;
                }
                match latest {
                    Some(best) if record.booked_date < best.booked_date => {}
                    _ => latest = Some(record),
                }
            }

            if let Some(record) = latest {
                candidates.push(UpdateCandidate {
                    asset_id: asset_id.clone(),
                    group: group.name.clone(),
                    new_date: record.booked_date,
                });
            }
        }
    }

    candidates
}

// ============================================================================
// TESTS
// ============================================================================
