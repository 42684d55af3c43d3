// src/matching/exact.rs

use crate::models::{BrandMatch, MatchType};
use crate::registry::BrandRegistry;

/// Exact lookup of an already-normalized name against canonical names and
/// synonyms. A hit is always confidence 1.0.
pub fn match_exact(normalized_name: &str, registry: &BrandRegistry) -> Option<BrandMatch> {
    if normalized_name.is_empty() {
        return None;
    }
    registry
        .find_by_normalized_name(normalized_name)
        .map(|brand| BrandMatch {
            canonical_name: brand.canonical_name.clone(),
            confidence: 1.0,
            match_type: MatchType::Exact,
            functional_group: brand.functional_group,
            influence_weight: brand.influence_weight,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::normalize_name;
    use crate::models::{Brand, BrandId, FunctionalGroup};

    fn registry() -> BrandRegistry {
        BrandRegistry::build(vec![Brand {
            id: BrandId("b1".to_string()),
            canonical_name: "АТБ".to_string(),
            synonyms: vec!["ATB".to_string(), "АТБ-маркет".to_string()],
            functional_group: FunctionalGroup::Competitor,
            influence_weight: -0.8,
            tag_signature: None,
            format: Some("supermarket".to_string()),
        }])
        .unwrap()
    }

    #[test]
    fn test_exact_match_has_confidence_one() {
        let registry = registry();
        let result = match_exact(&normalize_name("ATB"), &registry).unwrap();
        assert_eq!(result.confidence, 1.0);
        assert_eq!(result.match_type, MatchType::Exact);
        assert_eq!(result.canonical_name, "АТБ");
        assert!(result.influence_weight < 0.0);
    }

    #[test]
    fn test_synonym_resolves_to_canonical() {
        let registry = registry();
        let result = match_exact(&normalize_name("АТБ-Маркет"), &registry).unwrap();
        assert_eq!(result.canonical_name, "АТБ");
    }

    #[test]
    fn test_miss_and_empty() {
        let registry = registry();
        assert!(match_exact("сільпо", &registry).is_none());
        assert!(match_exact("", &registry).is_none());
    }
}
