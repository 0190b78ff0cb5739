// Core record and feature shapes shared across the pipeline

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Format used whenever a timestamp is written out as text: ledger rows and
/// updated feature attributes both carry this shape.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// ============================================================================
// LABOR RECORD
// ============================================================================

/// One maintenance work event, in canonical form.
///
/// Core fields are typed; everything else from the export rides along in
/// `extra` and is written to the ledger verbatim. Records are immutable once
/// constructed and are written to the ledger exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaborRecord {
    pub asset_id: String,

    pub work_order_number: i64,

    pub activity_code: String,

    /// Timezone-naive, as delivered by the upstream feed.
    pub booked_date: NaiveDateTime,

    /// Merged rate label ("OVERTIME" when the primary rate was absent).
    pub rate: String,

    /// Pass-through attributes preserved into the ledger schema.
    /// Keys are normalized (no embedded whitespace).
    #[serde(default)]
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub extra: HashMap<String, serde_json::Value>,
}

impl LaborRecord {
    /// The natural dedup key: unique across the ledger.
    pub fn key(&self) -> CompositeKey {
        CompositeKey::new(&self.asset_id, self.work_order_number)
    }
}

// ============================================================================
// COMPOSITE KEY
// ============================================================================

/// `(asset_id, work_order_number)` pair used to detect already-ingested
/// records. Membership checks are on the typed pair, not the rendered string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompositeKey {
    pub asset_id: String,
    pub work_order_number: i64,
}

impl CompositeKey {
    pub fn new(asset_id: &str, work_order_number: i64) -> Self {
        CompositeKey {
            asset_id: asset_id.to_string(),
            work_order_number,
        }
    }
}

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}", self.asset_id, self.work_order_number)
    }
}

// ============================================================================
// ASSET FEATURE
// ============================================================================

/// One inventoried physical asset.
///
/// Stored "last performed" dates live in `attributes` under each activity
/// group's date attribute and may be an epoch-milliseconds number, a numeric
/// string, a formatted datetime string, null, or absent entirely. Features
/// are never created or deleted here; mutation happens only on a working
/// copy staged through the batch submission path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetFeature {
    pub asset_id: String,

    #[serde(default)]
    pub attributes: HashMap<String, serde_json::Value>,
}

impl AssetFeature {
    pub fn new(asset_id: &str) -> Self {
        AssetFeature {
            asset_id: asset_id.to_string(),
            attributes: HashMap::new(),
        }
    }

    /// Clone this feature into a staging copy; the original stays untouched
    /// until the store confirms the write.
    pub fn working_copy(&self) -> FeatureUpdate {
        FeatureUpdate {
            asset_id: self.asset_id.clone(),
            attributes: self.attributes.clone(),
        }
    }
}

/// A mutated working copy of an AssetFeature, staged for submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureUpdate {
    pub asset_id: String,
    pub attributes: HashMap<String, serde_json::Value>,
}

// ============================================================================
// UPDATE CANDIDATE
// ============================================================================

/// A proposed mutation: the most recent occurrence date for one
/// (asset, activity group) pair. Transient; at most one per pair per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateCandidate {
    pub asset_id: String,

    /// Activity group name (not a raw activity code).
    pub group: String,

    pub new_date: NaiveDateTime,
}

// ============================================================================
// TESTS
// ============================================================================
