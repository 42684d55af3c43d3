// src/matching/keyword.rs

use crate::config::KeywordRule;
use crate::models::{BrandMatch, MatchType};
use crate::registry::BrandRegistry;

/// Last-resort matching against curated keyword lists, scoped to the
/// entity's primary category. The rule's canonical name must resolve
/// through the registry; rules pointing at unregistered brands are inert.
pub fn match_keywords(
    normalized_name: &str,
    category: &str,
    rules: &[KeywordRule],
    registry: &BrandRegistry,
    keyword_confidence: f64,
) -> Option<BrandMatch> {
    if normalized_name.is_empty() {
        return None;
    }

    for rule in rules.iter().filter(|r| r.category == category) {
        let hit = rule
            .keywords
            .iter()
            .any(|keyword| normalized_name.contains(keyword.as_str()));
        if !hit {
            continue;
        }
        if let Some(brand) = registry.find_by_name(&rule.canonical) {
            return Some(BrandMatch {
                canonical_name: brand.canonical_name.clone(),
                confidence: keyword_confidence,
                match_type: MatchType::Keyword,
                functional_group: brand.functional_group,
                influence_weight: brand.influence_weight,
            });
        }
    }
    None
}
