// src/matching/manager.rs
//
// Strategy orchestration and the bounded result cache. The cache is keyed
// by (normalized name, brand-tag signature): repeated names inside a batch
// are common (chain stores), and fuzzy scans are the expensive path worth
// skipping.

use std::collections::BTreeMap;
use std::num::NonZero;
use std::sync::Arc;

use log::{debug, info};
use lru::LruCache;
use tokio::sync::Mutex;

use super::{exact, fuzzy, keyword, normalize_name, tag, tag_signature};
use crate::config::MatcherConfig;
use crate::models::BrandMatch;
use crate::registry::BrandRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Strategy {
    Exact,
    Tag,
    Fuzzy,
    Keyword,
}

pub struct BrandMatcher {
    registry: Arc<BrandRegistry>,
    config: MatcherConfig,
    /// Enabled strategies with their floors, sorted by priority
    order: Vec<(Strategy, f64)>,
    cache: LruCache<(String, String), Option<BrandMatch>>,
    hits: usize,
    misses: usize,
}

/// Matcher shared across batch workers; lock per lookup.
pub type SharedMatcher = Arc<Mutex<BrandMatcher>>;

pub fn create_shared_matcher(
    registry: Arc<BrandRegistry>,
    config: MatcherConfig,
) -> SharedMatcher {
    Arc::new(Mutex::new(BrandMatcher::new(registry, config)))
}

impl BrandMatcher {
    pub fn new(registry: Arc<BrandRegistry>, config: MatcherConfig) -> Self {
        let mut order = Vec::new();
        if config.exact.enabled {
            order.push((config.exact.priority, Strategy::Exact, config.exact.floor));
        }
        if config.tag.enabled {
            order.push((config.tag.priority, Strategy::Tag, config.tag.floor));
        }
        if config.fuzzy.enabled {
            order.push((config.fuzzy.priority, Strategy::Fuzzy, config.fuzzy.floor));
        }
        if config.keyword.enabled {
            order.push((config.keyword.priority, Strategy::Keyword, config.keyword.floor));
        }
        order.sort_by_key(|(priority, _, _)| *priority);

        let cache_size = NonZero::new(config.cache_size.max(1)).unwrap();
        Self {
            registry,
            config,
            order: order
                .into_iter()
                .map(|(_, strategy, floor)| (strategy, floor))
                .collect(),
            cache: LruCache::new(cache_size),
            hits: 0,
            misses: 0,
        }
    }

    /// Resolves a free-text name (plus tags) to a canonical brand, or None
    /// when no strategy clears its floor and the global minimum confidence.
    pub fn match_name(
        &mut self,
        name: &str,
        tags: &BTreeMap<String, String>,
        category: &str,
    ) -> Option<BrandMatch> {
        let normalized = normalize_name(name);
        let key = (normalized.clone(), tag_signature(tags));

        if let Some(cached) = self.cache.get(&key) {
            self.hits += 1;
            return cached.clone();
        }
        self.misses += 1;

        let result = self.run_strategies(&normalized, tags, category);
        self.cache.put(key, result.clone());
        result
    }

    fn run_strategies(
        &self,
        normalized: &str,
        tags: &BTreeMap<String, String>,
        category: &str,
    ) -> Option<BrandMatch> {
        for (strategy, floor) in &self.order {
            let candidate = match strategy {
                Strategy::Exact => exact::match_exact(normalized, &self.registry),
                Strategy::Tag => {
                    tag::match_tags(tags, &self.registry, self.config.tag_confidence)
                }
                Strategy::Fuzzy => {
                    fuzzy::match_fuzzy(normalized, &self.registry, self.config.fuzzy_threshold)
                }
                Strategy::Keyword => keyword::match_keywords(
                    normalized,
                    category,
                    &self.config.keyword_rules,
                    &self.registry,
                    self.config.keyword_confidence,
                ),
            };

            if let Some(result) = candidate {
                if result.confidence >= *floor {
                    if result.confidence < self.config.min_confidence {
                        debug!(
                            "Discarding weak {:?} match '{}' at {:.2} (< min_confidence {:.2})",
                            strategy, result.canonical_name, result.confidence,
                            self.config.min_confidence
                        );
                        return None;
                    }
                    return Some(result);
                }
                // Below this strategy's own floor: keep trying
            }
        }
        None
    }

    pub fn cache_stats(&self) -> (usize, usize) {
        (self.hits, self.misses)
    }

    pub fn log_cache_stats(&self) {
        let total = self.hits + self.misses;
        let hit_rate = if total > 0 {
            self.hits as f64 / total as f64 * 100.0
        } else {
            0.0
        };
        info!(
            "🧠 Matcher cache: {} hits / {} misses ({:.1}% hit rate)",
            self.hits, self.misses, hit_rate
        );
    }
}
