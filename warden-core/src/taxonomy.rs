//! The dangerous-category taxonomy

use crate::error::Result;
use crate::types::DangerLevel;
use serde::{Deserialize, Serialize};

/// A named category tagged with a danger tier. Only active entries
/// participate in classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DangerousCategory {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub tier: DangerLevel,
    pub is_active: bool,
}

impl DangerousCategory {
    pub fn new(name: impl Into<String>, tier: DangerLevel) -> Self {
        Self {
            name: name.into(),
            description: None,
            tier,
            is_active: true,
        }
    }
}

/// An immutable snapshot of the active taxonomy, taken fresh per
/// pipeline run or classification. Entries are ordered by name; lookups
/// are case-insensitive exact matches.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Taxonomy {
    entries: Vec<DangerousCategory>,
}

impl Taxonomy {
    /// Build a snapshot from arbitrary entries. Inactive entries are
    /// filtered out and the rest sorted by name.
    pub fn from_entries(entries: impl IntoIterator<Item = DangerousCategory>) -> Self {
        let mut entries: Vec<DangerousCategory> =
            entries.into_iter().filter(|c| c.is_active).collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Self { entries }
    }

    /// Danger tier of a category name, or `None` when the name matches no
    /// active entry.
    pub fn tier_of(&self, name: &str) -> Option<DangerLevel> {
        self.entries
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
            .map(|c| c.tier)
    }

    pub fn entries(&self) -> &[DangerousCategory] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Source of taxonomy snapshots. Implemented by the storage layer so the
/// pipeline reads the live category set on every run instead of holding a
/// stale copy.
pub trait TaxonomyProvider: Send + Sync {
    fn taxonomy(&self) -> Result<Taxonomy>;
}

/// Fixed snapshot provider for tests and embedded use
pub struct StaticTaxonomy(pub Taxonomy);

impl TaxonomyProvider for StaticTaxonomy {
    fn taxonomy(&self) -> Result<Taxonomy> {
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Taxonomy {
        Taxonomy::from_entries(vec![
            DangerousCategory::new("shotgun", DangerLevel::Hyperdangerous),
            DangerousCategory::new("Knife", DangerLevel::Dangerous),
            DangerousCategory {
                name: "grenade".to_string(),
                description: None,
                tier: DangerLevel::Hyperdangerous,
                is_active: false,
            },
        ])
    }

    #[test]
    fn test_inactive_entries_filtered() {
        let tax = sample();
        assert_eq!(tax.len(), 2);
        assert_eq!(tax.tier_of("grenade"), None);
    }

    #[test]
    fn test_lookup_case_insensitive() {
        let tax = sample();
        assert_eq!(tax.tier_of("knife"), Some(DangerLevel::Dangerous));
        assert_eq!(tax.tier_of("KNIFE"), Some(DangerLevel::Dangerous));
        assert_eq!(tax.tier_of("Shotgun"), Some(DangerLevel::Hyperdangerous));
        assert_eq!(tax.tier_of("spoon"), None);
    }

    #[test]
    fn test_entries_sorted_by_name() {
        let tax = sample();
        let names: Vec<&str> = tax.entries().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Knife", "shotgun"]);
    }

    #[test]
    fn test_static_provider() {
        let provider = StaticTaxonomy(sample());
        let snap = provider.taxonomy().unwrap();
        assert_eq!(snap.len(), 2);
    }
}
