// src/registry/mod.rs
//
// Brand Registry: an immutable snapshot of canonical brands with name and
// tag-value indexes. Loaded once per batch run and shared via Arc; registry
// mutations (approved candidates) only land between runs, so matching stays
// consistent within one batch.

pub mod db;

use std::collections::BTreeMap;
use std::collections::HashMap;

use thiserror::Error;

use crate::matching::{normalize_name, BRAND_TAG_KEYS};
use crate::models::Brand;

/// Registry corruption is a blocking validation error, never auto-resolved:
/// silent resolution would change matching behavior between runs.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("duplicate canonical name '{0}'")]
    DuplicateCanonicalName(String),

    #[error("synonym '{synonym}' is claimed by both '{first}' and '{second}'")]
    ConflictingSynonym {
        synonym: String,
        first: String,
        second: String,
    },
}

/// Read-mostly brand snapshot with normalized-name and tag-value indexes.
#[derive(Debug, Clone)]
pub struct BrandRegistry {
    brands: Vec<Brand>,
    /// normalized canonical name or synonym -> index into `brands`
    name_index: HashMap<String, usize>,
    /// normalized brand/operator tag value -> index into `brands`
    tag_index: HashMap<String, usize>,
}

impl BrandRegistry {
    /// Builds the snapshot, validating that no canonical name is duplicated
    /// and no synonym is claimed by two brands.
    pub fn build(brands: Vec<Brand>) -> Result<Self, RegistryError> {
        let mut name_index: HashMap<String, usize> = HashMap::new();
        let mut tag_index: HashMap<String, usize> = HashMap::new();

        for (idx, brand) in brands.iter().enumerate() {
            let canonical = normalize_name(&brand.canonical_name);
            if name_index.contains_key(&canonical) {
                return Err(RegistryError::DuplicateCanonicalName(
                    brand.canonical_name.clone(),
                ));
            }
            name_index.insert(canonical, idx);
        }

        for (idx, brand) in brands.iter().enumerate() {
            for synonym in &brand.synonyms {
                let normalized = normalize_name(synonym);
                if normalized.is_empty() {
                    continue;
                }
                if let Some(&existing) = name_index.get(&normalized) {
                    if existing != idx {
                        return Err(RegistryError::ConflictingSynonym {
                            synonym: synonym.clone(),
                            first: brands[existing].canonical_name.clone(),
                            second: brand.canonical_name.clone(),
                        });
                    }
                    continue;
                }
                name_index.insert(normalized, idx);
            }
        }

        for (idx, brand) in brands.iter().enumerate() {
            if let Some(signature) = &brand.tag_signature {
                for value in signature.values() {
                    let normalized = normalize_name(value);
                    if !normalized.is_empty() {
                        // First brand to claim a tag value keeps it
                        tag_index.entry(normalized).or_insert(idx);
                    }
                }
            }
        }

        Ok(Self {
            brands,
            name_index,
            tag_index,
        })
    }

    pub fn len(&self) -> usize {
        self.brands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.brands.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Brand> {
        self.brands.iter()
    }

    /// Exact lookup by an already-normalized name (canonical or synonym).
    pub fn find_by_normalized_name(&self, normalized: &str) -> Option<&Brand> {
        self.name_index.get(normalized).map(|&idx| &self.brands[idx])
    }

    /// Lookup by free-text name, normalizing first.
    pub fn find_by_name(&self, name: &str) -> Option<&Brand> {
        self.find_by_normalized_name(&normalize_name(name))
    }

    /// Resolves a brand straight from brand/operator tag values, skipping
    /// free-text matching entirely.
    pub fn find_by_tag_signature(&self, tags: &BTreeMap<String, String>) -> Option<&Brand> {
        for key in BRAND_TAG_KEYS {
            if let Some(value) = tags.get(key) {
                let normalized = normalize_name(value);
                if let Some(&idx) = self.tag_index.get(&normalized) {
                    return Some(&self.brands[idx]);
                }
                // A brand tag value that is also a known name counts too
                if let Some(&idx) = self.name_index.get(&normalized) {
                    return Some(&self.brands[idx]);
                }
            }
        }
        None
    }

    /// Every (normalized name, brand) pair, canonical names and synonyms
    /// alike. The fuzzy strategy scans this.
    pub fn normalized_names(&self) -> impl Iterator<Item = (&str, &Brand)> {
        self.name_index
            .iter()
            .map(move |(name, &idx)| (name.as_str(), &self.brands[idx]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BrandId, FunctionalGroup};

    fn brand(id: &str, canonical: &str, synonyms: &[&str]) -> Brand {
        Brand {
            id: BrandId(id.to_string()),
            canonical_name: canonical.to_string(),
            synonyms: synonyms.iter().map(|s| s.to_string()).collect(),
            functional_group: FunctionalGroup::Competitor,
            influence_weight: -0.8,
            tag_signature: None,
            format: Some("supermarket".to_string()),
        }
    }

    #[test]
    fn test_lookup_by_canonical_and_synonym() {
        let registry =
            BrandRegistry::build(vec![brand("b1", "АТБ", &["ATB", "АТБ-маркет"])]).unwrap();
        assert!(registry.find_by_name("атб").is_some());
        assert!(registry.find_by_name("ATB").is_some());
        assert!(registry.find_by_name("АТБ-Маркет").is_some());
        assert!(registry.find_by_name("Сільпо").is_none());
    }

    #[test]
    fn test_duplicate_canonical_is_blocking() {
        let result = BrandRegistry::build(vec![
            brand("b1", "АТБ", &[]),
            brand("b2", "атб", &[]),
        ]);
        assert!(matches!(
            result,
            Err(RegistryError::DuplicateCanonicalName(_))
        ));
    }

    #[test]
    fn test_conflicting_synonym_is_blocking() {
        let result = BrandRegistry::build(vec![
            brand("b1", "АТБ", &["маркет плюс"]),
            brand("b2", "Сільпо", &["Маркет Плюс"]),
        ]);
        assert!(matches!(
            result,
            Err(RegistryError::ConflictingSynonym { .. })
        ));
    }

    #[test]
    fn test_synonym_repeated_within_one_brand_is_fine() {
        let registry =
            BrandRegistry::build(vec![brand("b1", "АТБ", &["ATB", "atb"])]).unwrap();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_tag_signature_lookup() {
        let mut b = brand("b1", "АТБ", &[]);
        let mut signature = BTreeMap::new();
        signature.insert("brand".to_string(), "АТБ-маркет".to_string());
        b.tag_signature = Some(signature);

        let registry = BrandRegistry::build(vec![b]).unwrap();

        let mut tags = BTreeMap::new();
        tags.insert("brand".to_string(), "АТБ-Маркет".to_string());
        tags.insert("shop".to_string(), "supermarket".to_string());
        let hit = registry.find_by_tag_signature(&tags).unwrap();
        assert_eq!(hit.canonical_name, "АТБ");

        let mut other = BTreeMap::new();
        other.insert("brand".to_string(), "Фора".to_string());
        assert!(registry.find_by_tag_signature(&other).is_none());
    }
}
