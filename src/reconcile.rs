// ⚖️ Reconciliation Decider - the monotonic update policy
// A stored activity date can only move forward in time. An unreadable stored
// value is treated as "never performed" and always loses to a candidate.

use crate::config::ActivityGroup;
use crate::record::{AssetFeature, FeatureUpdate, UpdateCandidate, DATETIME_FORMAT};
use crate::normalize::parse_datetime;
use chrono::NaiveDateTime;
use serde_json::Value;
use std::collections::HashMap;

// ============================================================================
// DECISION SUMMARY
// ============================================================================

#[derive(Debug, Default)]
pub struct DecisionSummary {
    /// Working copies of features with at least one accepted mutation.
    /// One entry per asset; originals are never touched.
    pub updates: Vec<FeatureUpdate>,

    /// Candidates accepted across all features.
    pub accepted: usize,

    /// Candidates rejected because the stored date was already as recent.
    pub skipped: usize,
}

// ============================================================================
// DECIDER
// ============================================================================

/// Compare each candidate against the stored date for its activity group and
/// stage accepted mutations on cloned features.
///
/// The comparison is date-granularity: a candidate later the same day does
/// not advance the stored value, though when an update is accepted the full
/// timestamp is written.
pub fn decide_updates(
    features: &[AssetFeature],
    candidates: &[UpdateCandidate],
    groups: &[ActivityGroup],
) -> DecisionSummary {
    let by_pair: HashMap<(&str, &str), NaiveDateTime> = candidates
        .iter()
        .map(|c| ((c.asset_id.as_str(), c.group.as_str()), c.new_date))
        .collect();

    let mut summary = DecisionSummary::default();

    for feature in features {
        let mut update = feature.working_copy();
        let mut accepted_here = 0;

        for group in groups {
            let candidate = match by_pair.get(&(feature.asset_id.as_str(), group.name.as_str())) {
                Some(date) => *date,
                None => continue,
            };

            let stored = feature.attributes.get(&group.date_attribute);
            if should_advance(stored, candidate) {
                update.attributes.insert(
                    group.date_attribute.clone(),
                    Value::String(candidate.format(DATETIME_FORMAT).to_string()),
                );
                accepted_here += 1;
            } else {
                summary.skipped += 1;
            }
        }

        if accepted_here > 0 {
            summary.accepted += accepted_here;
            summary.updates.push(update);
        }
    }

    summary
}

/// Monotonic check. A stored value that cannot be read as a date skips the
/// comparison entirely: unknown is always stale.
pub fn should_advance(stored: Option<&Value>, candidate: NaiveDateTime) -> bool {
    match stored.and_then(parse_stored_date) {
        Some(current) => candidate.date() > current.date(),
        None => true,
    }
}

/// Stored activity dates arrive in whatever shape the inventory accumulated
/// over the years: epoch-milliseconds numbers, numeric strings, or formatted
/// datetime text (the shape this system itself writes back).
fn parse_stored_date(value: &Value) -> Option<NaiveDateTime> {
    match value {
        Value::Number(n) => {
            let millis = n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))?;
            chrono::DateTime::from_timestamp_millis(millis).map(|dt| dt.naive_utc())
        }
        Value::String(s) => parse_datetime(s),
        _ => None,
    }
}

// ============================================================================
// TESTS
// ============================================================================
