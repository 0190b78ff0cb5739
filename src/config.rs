// Run configuration - scope, date window, activity groups, batch sizing
// Loaded once per run from a JSON file; the engine itself holds no state
// between runs.

use crate::record::AssetFeature;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ============================================================================
// ACTIVITY GROUP
// ============================================================================

/// A named category aggregating one or more raw activity codes to a single
/// tracked date attribute on the asset feature (e.g. MOW -> MOW_DATE).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityGroup {
    pub name: String,

    /// Raw activity codes belonging to this group.
    pub codes: Vec<String>,

    /// Stored "last performed" attribute on the feature. Defaults to
    /// `<NAME>_DATE` when omitted from the config file.
    #[serde(default)]
    pub date_attribute: String,
}

impl ActivityGroup {
    pub fn new(name: &str, codes: &[&str]) -> Self {
        ActivityGroup {
            name: name.to_string(),
            codes: codes.iter().map(|c| c.to_string()).collect(),
            date_attribute: format!("{}_DATE", name),
        }
    }

    /// Exact-match membership check against the group's code set.
    pub fn matches(&self, activity_code: &str) -> bool {
        self.codes.iter().any(|c| c == activity_code)
    }
}

// ============================================================================
// DATE WINDOW
// ============================================================================

/// Booked-date filter: strictly after `start`, through `end` inclusive.
/// This matches the upstream report filter, where the start date belongs to
/// the previous review period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        DateWindow { start, end }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date > self.start && date <= self.end
    }
}

// ============================================================================
// SCOPE FILTER
// ============================================================================

/// Attribute-equality predicate applied when querying inventory features.
/// Empty means no scoping: every feature is in scope.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScopeFilter {
    /// Pairs of (attribute name, required value); a feature must satisfy
    /// all of them.
    #[serde(default)]
    pub require: Vec<(String, String)>,
}

impl ScopeFilter {
    pub fn matches(&self, feature: &AssetFeature) -> bool {
        self.require.iter().all(|(name, expected)| {
            feature
                .attributes
                .get(name)
                .and_then(|v| v.as_str())
                .map_or(false, |v| v == expected)
        })
    }
}

// ============================================================================
// RUN CONFIG
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Exported report files, concatenated in order. The upstream export
    /// splits one report across multiple files.
    pub export_paths: Vec<PathBuf>,

    /// SQLite store holding the ledger and the asset inventory.
    pub database_path: PathBuf,

    pub window: DateWindow,

    /// Work-order statuses accepted as completed. Compared after trimming:
    /// the export carries trailing whitespace on some labels.
    #[serde(default = "default_completed_statuses")]
    pub completed_statuses: Vec<String>,

    /// Records whose asset id contains this marker belong to a different
    /// ownership domain and are dropped.
    #[serde(default = "default_excluded_asset_marker")]
    pub excluded_asset_marker: Option<String>,

    #[serde(default)]
    pub scope: ScopeFilter,

    #[serde(default = "default_groups")]
    pub groups: Vec<ActivityGroup>,

    /// Export bookkeeping columns that must not reach the ledger.
    #[serde(default = "default_discard_columns")]
    pub discard_columns: Vec<String>,

    /// Maximum features per inventory submission request.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl RunConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: RunConfig = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        Ok(config.finalize())
    }

    /// Fill derived defaults that serde cannot express: a group with no
    /// explicit date attribute tracks `<NAME>_DATE`.
    pub fn finalize(mut self) -> Self {
        for group in &mut self.groups {
            if group.date_attribute.is_empty() {
                group.date_attribute = format!("{}_DATE", group.name);
            }
        }
        self
    }

    pub fn status_accepted(&self, status: &str) -> bool {
        let status = status.trim();
        self.completed_statuses.iter().any(|s| s.trim() == status)
    }

    pub fn asset_excluded(&self, asset_id: &str) -> bool {
        self.excluded_asset_marker
            .as_deref()
            .map_or(false, |marker| asset_id.contains(marker))
    }
}

fn default_completed_statuses() -> Vec<String> {
    vec![
        "Completed - Field Completed".to_string(),
        "Completed".to_string(),
    ]
}

fn default_excluded_asset_marker() -> Option<String> {
    Some("MCPS".to_string())
}

fn default_groups() -> Vec<ActivityGroup> {
    vec![
        ActivityGroup::new("MOW", &["MOW"]),
        ActivityGroup::new("DRAGLINE", &["DRAG", "CHALK LINE", "CHALK/LINE"]),
        ActivityGroup::new("PAINT", &["PAINT"]),
    ]
}

fn default_discard_columns() -> Vec<String> {
    vec![
        "GIS Object Reference ID".to_string(),
        "Booked Employee Name".to_string(),
        "OVERTIME Rate".to_string(),
        "WO Status".to_string(),
        "WO Type".to_string(),
    ]
}

fn default_batch_size() -> usize {
    crate::batch::DEFAULT_BATCH_SIZE
}

// ============================================================================
// TESTS
// ============================================================================
