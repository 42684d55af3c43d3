// src/matching/fuzzy.rs
//
// Token-aware fuzzy matching: jaro-winkler blended with token Jaccard.
// Character similarity alone over-scores names sharing a long common stem
// («маркет один» / «маркет сім»), so the token overlap term pulls those
// back down.

use std::collections::HashSet;

use strsim::jaro_winkler;

use crate::models::{BrandMatch, MatchType};
use crate::registry::BrandRegistry;

const CHAR_WEIGHT: f64 = 0.6;
const TOKEN_WEIGHT: f64 = 0.4;

/// Blended similarity of two already-normalized names, in [0, 1].
pub fn blended_similarity(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let char_score = jaro_winkler(a, b);
    let token_score = token_jaccard(a, b);
    CHAR_WEIGHT * char_score + TOKEN_WEIGHT * token_score
}

fn token_jaccard(a: &str, b: &str) -> f64 {
    let tokens_a: HashSet<&str> = a.split_whitespace().collect();
    let tokens_b: HashSet<&str> = b.split_whitespace().collect();
    let union = tokens_a.union(&tokens_b).count();
    if union == 0 {
        return 0.0;
    }
    let intersection = tokens_a.intersection(&tokens_b).count();
    intersection as f64 / union as f64
}

/// Best-scoring registry name at or above the threshold. Confidence is the
/// blended similarity itself. Score ties break on canonical name so repeated
/// runs pick the same winner.
pub fn match_fuzzy(
    normalized_name: &str,
    registry: &BrandRegistry,
    threshold: f64,
) -> Option<BrandMatch> {
    if normalized_name.is_empty() {
        return None;
    }

    let mut best: Option<(f64, &crate::models::Brand)> = None;
    for (candidate, brand) in registry.normalized_names() {
        let score = blended_similarity(normalized_name, candidate);
        if score < threshold {
            continue;
        }
        let better = match &best {
            None => true,
            Some((best_score, best_brand)) => {
                score > *best_score
                    || (score == *best_score
                        && brand.canonical_name < best_brand.canonical_name)
            }
        };
        if better {
            best = Some((score, brand));
        }
    }

    best.map(|(score, brand)| BrandMatch {
        canonical_name: brand.canonical_name.clone(),
        confidence: score,
        match_type: MatchType::Fuzzy,
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
        let brand = |id: &str, name: &str, weight: f64| Brand {
            id: BrandId(id.to_string()),
            canonical_name: name.to_string(),
            synonyms: vec![],
            functional_group: FunctionalGroup::Competitor,
            influence_weight: weight,
            tag_signature: None,
            format: None,
        };
        BrandRegistry::build(vec![
            brand("b1", "Нова Пошта", -0.3),
            brand("b2", "Сільпо", -0.7),
        ])
        .unwrap()
    }

    #[test]
    fn test_similarity_bounds() {
        assert_eq!(blended_similarity("атб", "атб"), 1.0);
        assert_eq!(blended_similarity("", "атб"), 0.0);
        let s = blended_similarity("нова пошта", "нова пошта 12");
        assert!(s > 0.0 && s < 1.0);
    }

    #[test]
    fn test_near_variant_matches_above_threshold() {
        let registry = registry();
        let result = match_fuzzy(&normalize_name("Нова Пошта №12"), &registry, 0.75).unwrap();
        assert_eq!(result.canonical_name, "Нова Пошта");
        assert_eq!(result.match_type, MatchType::Fuzzy);
        assert!(result.confidence >= 0.75 && result.confidence <= 1.0);
    }

    #[test]
    fn test_unrelated_name_stays_below_threshold() {
        let registry = registry();
        assert!(match_fuzzy("перукарня вікторія", &registry, 0.85).is_none());
    }

    #[test]
    fn test_raising_threshold_trades_recall() {
        let registry = registry();
        let name = normalize_name("Нова Пошта №12");
        let loose = match_fuzzy(&name, &registry, 0.75);
        let strict = match_fuzzy(&name, &registry, 0.99);
        assert!(loose.is_some());
        assert!(strict.is_none());
    }

    #[test]
    fn test_token_overlap_discriminates_shared_stems() {
        // Same leading word, different store: token term keeps these apart
        let close = blended_similarity("сільпо маркет", "сільпо");
        let far = blended_similarity("маркет один", "маркет сім випічка");
        assert!(close > far);
    }
}
