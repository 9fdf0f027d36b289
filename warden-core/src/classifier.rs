//! Danger classification
//!
//! Pure mapping from a detection set plus the active taxonomy to a single
//! danger tier. Re-run whenever a category validation changes; a category
//! rejected anywhere in a record is excluded everywhere in that record.

use crate::taxonomy::Taxonomy;
use crate::types::{CategoryValidation, DangerLevel, Detection};
use std::collections::HashSet;

/// Lower-cased set of category names a reviewer has rejected for a record.
/// Rejection is frame-insensitive: one rejected occurrence removes the
/// category from danger consideration across the whole record.
#[derive(Debug, Clone, Default)]
pub struct RejectedCategories {
    names: HashSet<String>,
}

impl RejectedCategories {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect the rejected names (`is_valid == false`) from stored
    /// validations, ignoring frame indices.
    pub fn from_validations<'a>(
        validations: impl IntoIterator<Item = &'a CategoryValidation>,
    ) -> Self {
        let names = validations
            .into_iter()
            .filter(|v| !v.is_valid)
            .map(|v| v.category_name.trim().to_lowercase())
            .collect();
        Self { names }
    }

    pub fn insert(&mut self, name: impl AsRef<str>) {
        self.names.insert(name.as_ref().trim().to_lowercase());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(&name.trim().to_lowercase())
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Map detections to a danger tier.
///
/// Rejected categories are skipped; the remaining categories are matched
/// case-insensitively against the active taxonomy. Hyperdangerous wins
/// outright and short-circuits; Dangerous is remembered while the scan
/// continues. Categories with no taxonomy match neither raise nor lower
/// the result. `None` means no danger was found, whether because nothing
/// matched or because every match was rejected.
pub fn classify(
    detections: &[Detection],
    taxonomy: &Taxonomy,
    rejected: &RejectedCategories,
) -> Option<DangerLevel> {
    let mut level = None;

    for det in detections {
        if det.category.is_empty() || rejected.contains(&det.category) {
            continue;
        }
        match taxonomy.tier_of(&det.category) {
            Some(DangerLevel::Hyperdangerous) => return Some(DangerLevel::Hyperdangerous),
            Some(DangerLevel::Dangerous) => level = Some(DangerLevel::Dangerous),
            None => {}
        }
    }

    level
}
