//! Processing duration estimation for a bundle of requested items.
//!
//! Sizes come from a [`SizeLookup`] collaborator; the estimate is the summed
//! size divided by a fixed processing rate, rounded up to whole seconds and
//! clamped to [`MAX_ESTIMATE_SECS`].

use std::collections::HashMap;

use crate::error::CoreError;
use crate::types::ItemId;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Size assumed for an item the lookup does not know (MB).
pub const PLACEHOLDER_SIZE_MB: f64 = 10.0;

/// Sustained processing rate (MB per second).
pub const PROCESSING_RATE_MB_PER_SEC: u64 = 5;

/// Upper bound on any estimate (seconds).
pub const MAX_ESTIMATE_SECS: u32 = 300;

/// Maximum number of items accepted in a single request.
pub const MAX_ITEMS_PER_JOB: usize = 500;

/// Sizes are summed in kilobytes so one-decimal MB values add up exactly.
const KB_PER_MB: f64 = 1000.0;

// ---------------------------------------------------------------------------
// Size lookup
// ---------------------------------------------------------------------------

/// Resolves an item identifier to its size in megabytes.
pub trait SizeLookup: Send + Sync {
    /// `None` means the item is unknown; the estimator substitutes
    /// [`PLACEHOLDER_SIZE_MB`].
    fn size_mb(&self, item: ItemId) -> Option<f64>;
}

/// Fixed in-memory size table.
#[derive(Debug, Clone, Default)]
pub struct StaticSizeTable {
    sizes: HashMap<ItemId, f64>,
}

impl StaticSizeTable {
    pub fn new(sizes: impl IntoIterator<Item = (ItemId, f64)>) -> Self {
        Self {
            sizes: sizes.into_iter().collect(),
        }
    }

    /// The catalogue shipped with the server.
    pub fn builtin() -> Self {
        Self::new([
            (1001, 2.3),
            (1002, 15.7),
            (1003, 48.2),
            (1004, 125.8),
            (1005, 8.9),
            (1006, 95.4),
        ])
    }
}

impl SizeLookup for StaticSizeTable {
    fn size_mb(&self, item: ItemId) -> Option<f64> {
        self.sizes.get(&item).copied()
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate a caller-supplied identifier list: non-empty, bounded, all positive.
pub fn validate_item_ids(items: &[ItemId]) -> Result<(), CoreError> {
    if items.is_empty() {
        return Err(CoreError::Validation(
            "At least one file id is required".to_string(),
        ));
    }
    if items.len() > MAX_ITEMS_PER_JOB {
        return Err(CoreError::Validation(format!(
            "Too many file ids: {} (max {MAX_ITEMS_PER_JOB})",
            items.len()
        )));
    }
    if let Some(bad) = items.iter().find(|&&id| id <= 0) {
        return Err(CoreError::Validation(format!(
            "File ids must be positive integers, got {bad}"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Estimation
// ---------------------------------------------------------------------------

/// Estimate the processing duration, in whole seconds, for `items`.
///
/// Deterministic for a given lookup. The result is always in
/// `1..=MAX_ESTIMATE_SECS`. Only an empty input is rejected.
pub fn estimate_duration(items: &[ItemId], sizes: &dyn SizeLookup) -> Result<u32, CoreError> {
    if items.is_empty() {
        return Err(CoreError::Validation(
            "Cannot estimate an empty item list".to_string(),
        ));
    }

    // Saturates; the clamp below bounds the result anyway.
    let total_kb = items
        .iter()
        .map(|&id| mb_to_kb(sizes.size_mb(id).unwrap_or(PLACEHOLDER_SIZE_MB)))
        .fold(0u64, u64::saturating_add);

    let rate_kb = PROCESSING_RATE_MB_PER_SEC * KB_PER_MB as u64;
    let secs = total_kb.div_ceil(rate_kb);

    Ok(secs.clamp(1, u64::from(MAX_ESTIMATE_SECS)) as u32)
}

fn mb_to_kb(mb: f64) -> u64 {
    (mb.max(0.0) * KB_PER_MB).round() as u64
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
