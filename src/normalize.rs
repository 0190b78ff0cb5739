// 🧹 Record Normalizer - raw export rows to canonical LaborRecords
// Handles vendor column names, mixed date encodings, the split rate column,
// and the window/status/ownership filters.

use crate::config::RunConfig;
use crate::record::LaborRecord;
use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

// ============================================================================
// VENDOR COLUMNS
// ============================================================================

// Column names as they appear in the exported report.
pub const COL_ASSET_ID: &str = "WO Asset ID";
pub const COL_WORK_ORDER: &str = "WO Number";
pub const COL_ACTIVITY: &str = "WO Activity";
pub const COL_BOOKED_DATE: &str = "Booked Dates";
pub const COL_STATUS: &str = "WO Status";
pub const COL_RATE: &str = "NORMAL Rate";
pub const COL_OVERTIME_RATE: &str = "OVERTIME Rate";

/// Sentinel rate label assigned when the primary rate column is empty.
pub const OVERTIME_RATE_LABEL: &str = "OVERTIME";

/// Columns consumed into typed LaborRecord fields; never passed through.
const CORE_COLUMNS: [&str; 7] = [
    COL_ASSET_ID,
    COL_WORK_ORDER,
    COL_ACTIVITY,
    COL_BOOKED_DATE,
    COL_STATUS,
    COL_RATE,
    COL_OVERTIME_RATE,
];

/// One raw export row: vendor column name -> cell text.
pub type RawRow = HashMap<String, String>;

// ============================================================================
// ROW ERRORS
// ============================================================================

/// A raw row that fails type coercion. Such rows are dropped and counted;
/// they never abort the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowError {
    MissingField(&'static str),
    BadWorkOrderNumber(String),
    BadBookedDate(String),
}

impl fmt::Display for RowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowError::MissingField(column) => write!(f, "missing required column {:?}", column),
            RowError::BadWorkOrderNumber(raw) => {
                write!(f, "work order number is not numeric: {:?}", raw)
            }
            RowError::BadBookedDate(raw) => write!(f, "unparseable booked date: {:?}", raw),
        }
    }
}

impl std::error::Error for RowError {}

// ============================================================================
// NORMALIZER
// ============================================================================

#[derive(Debug, Default)]
pub struct NormalizeOutcome {
    /// Canonical records, sorted by booked date ascending. The stable order
    /// makes downstream keep-last reductions deterministic.
    pub records: Vec<LaborRecord>,

    /// Rows dropped because a field failed type coercion.
    pub malformed: usize,

    /// Rows dropped by the window, status, or ownership filters.
    pub filtered: usize,
}

/// Normalize a raw export batch. Pure: no side effects, counts everything
/// it drops.
pub fn normalize_rows(rows: &[RawRow], config: &RunConfig) -> NormalizeOutcome {
    let mut outcome = NormalizeOutcome::default();

    for row in rows {
        match normalize_row(row, config) {
            Ok(Some(record)) => outcome.records.push(record),
            Ok(None) => outcome.filtered += 1,
            Err(_) => outcome.malformed += 1,
        }
    }

    // sort_by_key is stable: equal dates keep their input order
    outcome.records.sort_by_key(|r| r.booked_date);
    outcome
}

fn normalize_row(row: &RawRow, config: &RunConfig) -> Result<Option<LaborRecord>, RowError> {
    // Status filter first: anything not completed never entered the report
    // period under review.
    let status = row.get(COL_STATUS).map(|s| s.trim()).unwrap_or("");
    if !config.status_accepted(status) {
        return Ok(None);
    }

    let asset_id = match row.get(COL_ASSET_ID).map(|s| s.trim()) {
        Some(id) if !id.is_empty() => id,
        _ => return Err(RowError::MissingField(COL_ASSET_ID)),
    };
    if config.asset_excluded(asset_id) {
        return Ok(None);
    }

    let raw_date = match row.get(COL_BOOKED_DATE).map(|s| s.trim()) {
        Some(d) if !d.is_empty() => d,
        _ => return Err(RowError::MissingField(COL_BOOKED_DATE)),
    };
    let booked_date =
        parse_datetime(raw_date).ok_or_else(|| RowError::BadBookedDate(raw_date.to_string()))?;
    if !config.window.contains(booked_date.date()) {
        return Ok(None);
    }

    let raw_wo = match row.get(COL_WORK_ORDER).map(|s| s.trim()) {
        Some(w) if !w.is_empty() => w,
        _ => return Err(RowError::MissingField(COL_WORK_ORDER)),
    };
    let work_order_number =
        parse_work_order(raw_wo).ok_or_else(|| RowError::BadWorkOrderNumber(raw_wo.to_string()))?;

    let activity_code = row
        .get(COL_ACTIVITY)
        .map(|s| s.trim().to_string())
        .unwrap_or_default();

    // Merge the split rate columns: primary value wins, the overtime
    // variant is reduced to a sentinel label.
    let rate = match row.get(COL_RATE).map(|s| s.trim()) {
        Some(r) if !r.is_empty() => r.to_string(),
        _ => OVERTIME_RATE_LABEL.to_string(),
    };

    let mut extra = HashMap::new();
    for (name, value) in row {
        if CORE_COLUMNS.contains(&name.as_str()) {
            continue;
        }
        if config.discard_columns.iter().any(|c| c == name) {
            continue;
        }
        extra.insert(
            name.replace(' ', "_"),
            serde_json::Value::String(value.clone()),
        );
    }

    Ok(Some(LaborRecord {
        asset_id: asset_id.to_string(),
        work_order_number,
        activity_code,
        booked_date,
        rate,
        extra,
    }))
}

// ============================================================================
// FIELD PARSERS
// ============================================================================

/// Parse a booked or stored date in any of the encodings the feed produces:
/// integer epoch milliseconds, or a handful of formatted shapes.
pub fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    // Integer cells are epoch milliseconds.
    if let Ok(ms) = raw.parse::<i64>() {
        return chrono::DateTime::from_timestamp_millis(ms).map(|dt| dt.naive_utc());
    }

    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%m/%d/%Y %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt);
        }
    }

    for format in ["%Y-%m-%d", "%m/%d/%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return date.and_hms_opt(0, 0, 0);
        }
    }

    None
}

fn parse_work_order(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if let Ok(n) = raw.parse::<i64>() {
        return Some(n);
    }
    // Spreadsheet exports sometimes render integer columns as floats ("100.0")
    if let Ok(f) = raw.parse::<f64>() {
        if f.is_finite() && f.fract() == 0.0 {
            return Some(f as i64);
        }
    }
    None
}

// ============================================================================
// EXPORT INGESTION
// ============================================================================

/// Read raw rows from the configured export files, concatenated in order.
/// Header names are trimmed; everything else is left untouched for the
/// normalizer to interpret.
pub fn load_export_rows(paths: &[PathBuf]) -> Result<Vec<RawRow>> {
    let mut rows = Vec::new();

    for path in paths {
        let mut reader = csv::Reader::from_path(path)
            .with_context(|| format!("failed to open export file {}", path.display()))?;

        let headers: Vec<String> = reader
            .headers()
            .with_context(|| format!("failed to read headers from {}", path.display()))?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        for result in reader.records() {
            let record = result
                .with_context(|| format!("failed to read row from {}", path.display()))?;

            let mut row = RawRow::new();
            for (i, field) in record.iter().enumerate() {
                if let Some(name) = headers.get(i) {
                    row.insert(name.clone(), field.to_string());
                }
            }
            rows.push(row);
        }
    }

    Ok(rows)
}

// ============================================================================
// TESTS
// ============================================================================
