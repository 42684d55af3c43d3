// src/matching/tag.rs

use std::collections::BTreeMap;

use crate::models::{BrandMatch, MatchType};
use crate::registry::BrandRegistry;

/// Resolves a brand straight from brand/operator tag values. No fuzziness:
/// the confidence is the fixed registry-trust value from config.
pub fn match_tags(
    tags: &BTreeMap<String, String>,
    registry: &BrandRegistry,
    tag_confidence: f64,
) -> Option<BrandMatch> {
    registry.find_by_tag_signature(tags).map(|brand| BrandMatch {
        canonical_name: brand.canonical_name.clone(),
        confidence: tag_confidence,
        match_type: MatchType::Tag,
        functional_group: brand.functional_group,
        influence_weight: brand.influence_weight,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Brand, BrandId, FunctionalGroup};

    fn registry_with_tag_signature() -> BrandRegistry {
        let mut signature = BTreeMap::new();
        signature.insert("brand".to_string(), "Сільпо".to_string());
        BrandRegistry::build(vec![Brand {
            id: BrandId("b1".to_string()),
            canonical_name: "Сільпо".to_string(),
            synonyms: vec![],
            functional_group: FunctionalGroup::Competitor,
            influence_weight: -0.7,
            tag_signature: Some(signature),
            format: None,
        }])
        .unwrap()
    }

    #[test]
    fn test_brand_tag_resolves_with_fixed_confidence() {
        let registry = registry_with_tag_signature();
        let mut tags = BTreeMap::new();
        tags.insert("brand".to_string(), "сільпо".to_string());
        tags.insert("shop".to_string(), "supermarket".to_string());

        let result = match_tags(&tags, &registry, 0.95).unwrap();
        assert_eq!(result.confidence, 0.95);
        assert_eq!(result.match_type, MatchType::Tag);
        assert_eq!(result.canonical_name, "Сільпо");
    }

    #[test]
    fn test_operator_tag_also_resolves() {
        let registry = registry_with_tag_signature();
        let mut tags = BTreeMap::new();
        tags.insert("operator".to_string(), "Сільпо".to_string());
        assert!(match_tags(&tags, &registry, 0.95).is_some());
    }

    #[test]
    fn test_no_brand_tags_no_match() {
        let registry = registry_with_tag_signature();
        let mut tags = BTreeMap::new();
        tags.insert("shop".to_string(), "supermarket".to_string());
        assert!(match_tags(&tags, &registry, 0.95).is_none());
    }
}
