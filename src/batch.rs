// 📦 Update Sanitizer & Batcher - bounded submissions to the inventory store

use crate::record::FeatureUpdate;
use crate::store::InventoryStore;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// Default maximum features per submission request.
pub const DEFAULT_BATCH_SIZE: usize = 250;

// ============================================================================
// BATCH SUBMIT ERROR
// ============================================================================

/// A batch submission failure. `submitted` features were confirmed in
/// earlier batches; those are not rolled back.
#[derive(Debug)]
pub struct BatchSubmitError {
    pub submitted: usize,
    pub source: anyhow::Error,
}

impl fmt::Display for BatchSubmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "batch submission failed after {} features: {}",
            self.submitted, self.source
        )
    }
}

impl std::error::Error for BatchSubmitError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source.as_ref())
    }
}

// ============================================================================
// BATCHER
// ============================================================================

pub struct UpdateBatcher {
    pub batch_size: usize,
}

impl UpdateBatcher {
    pub fn new() -> Self {
        UpdateBatcher {
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(batch_size: usize) -> Self {
        UpdateBatcher {
            batch_size: batch_size.max(1),
        }
    }

    /// Sanitize every staged update, then submit them in batches of at most
    /// `batch_size`. The final partial batch is always flushed: flushing is
    /// driven by end-of-input, not count alone. Returns the number of
    /// features submitted.
    pub fn submit_all<S>(
        &self,
        store: &mut S,
        mut updates: Vec<FeatureUpdate>,
    ) -> Result<usize, BatchSubmitError>
    where
        S: InventoryStore + ?Sized,
    {
        for update in &mut updates {
            sanitize_attributes(&mut update.attributes);
        }

        let mut submitted = 0;
        for chunk in updates.chunks(self.batch_size) {
            if let Err(source) = store.submit_batch(chunk) {
                return Err(BatchSubmitError { submitted, source });
            }
            submitted += chunk.len();
        }

        Ok(submitted)
    }
}

impl Default for UpdateBatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// The external store rejects markup in attribute values: any string
/// containing an angle bracket is replaced with null before submission.
pub fn sanitize_attributes(attributes: &mut HashMap<String, Value>) {
    for value in attributes.values_mut() {
        let has_markup = value
            .as_str()
            .map_or(false, |s| s.contains('<') || s.contains('>'));
        if has_markup {
            *value = Value::Null;
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
