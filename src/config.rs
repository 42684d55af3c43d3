// src/config.rs
//
// Tunable parameters for every pipeline stage. Each struct carries the
// observed defaults and can be overridden from the environment; none of
// these numbers is a validated business truth, so they must never be
// buried in control flow.

use log::info;

use crate::hexgrid::SUPPORTED_RESOLUTIONS;
use crate::utils::env::parse_env;

/// Per-strategy matcher knobs
#[derive(Debug, Clone, Copy)]
pub struct StrategyConfig {
    pub enabled: bool,
    /// Lower runs earlier; strategies are tried strictly in this order
    pub priority: u8,
    /// Results below this floor are ignored for this strategy
    pub floor: f64,
}

/// A curated keyword rule: if a name contains one of the keywords and the
/// entity sits in the category, it resolves to the canonical brand name.
#[derive(Debug, Clone)]
pub struct KeywordRule {
    pub category: String,
    pub keywords: Vec<String>,
    pub canonical: String,
}

#[derive(Debug, Clone)]
pub struct MatcherConfig {
    pub exact: StrategyConfig,
    pub tag: StrategyConfig,
    pub fuzzy: StrategyConfig,
    pub keyword: StrategyConfig,

    /// Similarity floor for the fuzzy strategy; raising it toward 0.95
    /// trades recall for precision
    pub fuzzy_threshold: f64,
    /// Fixed confidence for tag-derived matches
    pub tag_confidence: f64,
    /// Fixed confidence for keyword matches (lowest trust)
    pub keyword_confidence: f64,
    /// Winners below this global floor are discarded entirely
    pub min_confidence: f64,

    /// Bounded LRU result cache entries
    pub cache_size: usize,

    pub keyword_rules: Vec<KeywordRule>,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            exact: StrategyConfig { enabled: true, priority: 1, floor: 1.0 },
            tag: StrategyConfig { enabled: true, priority: 2, floor: 0.9 },
            fuzzy: StrategyConfig { enabled: true, priority: 3, floor: 0.85 },
            keyword: StrategyConfig { enabled: true, priority: 4, floor: 0.5 },
            fuzzy_threshold: 0.85,
            tag_confidence: 0.95,
            keyword_confidence: 0.5,
            min_confidence: 0.5,
            cache_size: 10_000,
            keyword_rules: default_keyword_rules(),
        }
    }
}

impl MatcherConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.fuzzy_threshold = parse_env("MATCHER_FUZZY_THRESHOLD", config.fuzzy_threshold);
        config.fuzzy.floor = config.fuzzy_threshold;
        config.tag_confidence = parse_env("MATCHER_TAG_CONFIDENCE", config.tag_confidence);
        config.keyword_confidence =
            parse_env("MATCHER_KEYWORD_CONFIDENCE", config.keyword_confidence);
        config.min_confidence = parse_env("MATCHER_MIN_CONFIDENCE", config.min_confidence);
        config.cache_size = parse_env("MATCHER_CACHE_SIZE", config.cache_size);
        config.keyword.enabled = parse_env("MATCHER_KEYWORD_ENABLED", config.keyword.enabled);
        config.fuzzy.enabled = parse_env("MATCHER_FUZZY_ENABLED", config.fuzzy.enabled);
        config
    }

    pub fn log_config(&self) {
        info!(
            "🔍 Matcher: fuzzy_threshold={:.2}, min_confidence={:.2}, cache_size={}",
            self.fuzzy_threshold, self.min_confidence, self.cache_size
        );
        info!(
            "   Strategies: exact={}, tag={}, fuzzy={}, keyword={}",
            self.exact.enabled, self.tag.enabled, self.fuzzy.enabled, self.keyword.enabled
        );
    }
}

fn default_keyword_rules() -> Vec<KeywordRule> {
    fn rule(category: &str, keywords: &[&str], canonical: &str) -> KeywordRule {
        KeywordRule {
            category: category.to_string(),
            keywords: keywords.iter().map(|s| s.to_string()).collect(),
            canonical: canonical.to_string(),
        }
    }
    vec![
        rule("retail", &["атб", "atb"], "АТБ"),
        rule("retail", &["сільпо", "silpo"], "Сільпо"),
        rule("retail", &["фора", "fora"], "Фора"),
        rule("fuel", &["okko", "окко"], "OKKO"),
        rule("fuel", &["wog", "вог"], "WOG"),
        rule("food_service", &["mcdonald", "макдональдз"], "McDonald's"),
    ]
}

/// Aggregation-index knobs
#[derive(Debug, Clone)]
pub struct AggregationConfig {
    /// Resolutions to aggregate at
    pub resolutions: Vec<u8>,

    /// Competitor-ratio knee of the two-segment intensity curve
    pub intensity_knee: f64,
    /// Intensity value reached at the knee
    pub intensity_mid: f64,

    /// Accessibility blend: transport is weighted above road by default
    pub transport_weight: f64,
    pub road_weight: f64,

    /// Density considered "fully saturated" for market saturation, per km²
    pub reference_density: f64,
    pub saturation_density_weight: f64,
    pub saturation_competitor_weight: f64,

    /// Multiplier on competition intensity inside the retail-potential
    /// penalty term `1 - intensity * penalty`
    pub competition_penalty: f64,

    /// Risk flags: trip thresholds and the value each contributes
    pub risk_competition_threshold: f64,
    pub risk_competition_value: f64,
    pub low_density_threshold: f64,
    pub risk_low_density_value: f64,
    pub risk_income_threshold: f64,
    pub risk_low_income_value: f64,
    pub risk_access_threshold: f64,
    pub risk_poor_access_value: f64,
    /// Residual risk when no flag trips; never zero
    pub baseline_risk: f64,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            resolutions: SUPPORTED_RESOLUTIONS.to_vec(),
            intensity_knee: 0.3,
            intensity_mid: 0.5,
            transport_weight: 0.6,
            road_weight: 0.4,
            reference_density: 100.0,
            saturation_density_weight: 0.5,
            saturation_competitor_weight: 0.5,
            competition_penalty: 0.5,
            risk_competition_threshold: 0.7,
            risk_competition_value: 0.8,
            low_density_threshold: 5.0,
            risk_low_density_value: 0.6,
            risk_income_threshold: 0.3,
            risk_low_income_value: 0.7,
            risk_access_threshold: 0.2,
            risk_poor_access_value: 0.6,
            baseline_risk: 0.2,
        }
    }
}

impl AggregationConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.intensity_knee = parse_env("AGGREGATION_INTENSITY_KNEE", config.intensity_knee);
        config.intensity_mid = parse_env("AGGREGATION_INTENSITY_MID", config.intensity_mid);
        config.transport_weight =
            parse_env("AGGREGATION_TRANSPORT_WEIGHT", config.transport_weight);
        config.road_weight = parse_env("AGGREGATION_ROAD_WEIGHT", config.road_weight);
        config.reference_density =
            parse_env("AGGREGATION_REFERENCE_DENSITY", config.reference_density);
        config.competition_penalty =
            parse_env("AGGREGATION_COMPETITION_PENALTY", config.competition_penalty);
        config.baseline_risk = parse_env("AGGREGATION_BASELINE_RISK", config.baseline_risk);
        if let Ok(raw) = std::env::var("AGGREGATION_RESOLUTIONS") {
            let parsed: Vec<u8> = raw
                .split(',')
                .filter_map(|s| s.trim().parse::<u8>().ok())
                .collect();
            if !parsed.is_empty() {
                config.resolutions = parsed;
            }
        }
        config
    }

    pub fn log_config(&self) {
        info!(
            "📊 Aggregation: resolutions={:?}, knee={:.2}, reference_density={:.0}/km²",
            self.resolutions, self.intensity_knee, self.reference_density
        );
    }
}

/// Quantile binning knobs
#[derive(Debug, Clone)]
pub struct BinningConfig {
    /// Bins per metric (terciles by default); bin 0 stays reserved for nulls
    pub n_bins: usize,
    /// HexMetrics fields to bin, by name
    pub metrics: Vec<String>,
    /// Metric pairs combined into bivariate codes
    pub bivariate_pairs: Vec<(String, String)>,
}

impl Default for BinningConfig {
    fn default() -> Self {
        Self {
            n_bins: 3,
            metrics: vec![
                "poi_density".to_string(),
                "entity_density".to_string(),
                "competition_intensity".to_string(),
                "accessibility".to_string(),
                "market_saturation".to_string(),
                "retail_potential".to_string(),
                "risk_score".to_string(),
                "avg_quality".to_string(),
            ],
            bivariate_pairs: vec![
                ("poi_density".to_string(), "competition_intensity".to_string()),
                ("retail_potential".to_string(), "risk_score".to_string()),
            ],
        }
    }
}

impl BinningConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.n_bins = parse_env("BINNING_N_BINS", config.n_bins);
        config
    }

    pub fn log_config(&self) {
        info!(
            "📐 Binning: n_bins={}, metrics={}, bivariate_pairs={}",
            self.n_bins,
            self.metrics.len(),
            self.bivariate_pairs.len()
        );
    }
}

/// Candidate discovery and recommendation knobs
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Observations required before a name becomes a candidate at all
    pub min_frequency: i64,

    /// Network-score blend weights
    pub frequency_weight: f64,
    pub region_weight: f64,
    pub name_shape_weight: f64,
    pub category_weight: f64,

    /// Frequency and region counts at which those components saturate
    pub frequency_norm: f64,
    pub region_norm: f64,

    /// Auto-approve above this confidence, given enough observations
    pub approve_threshold: f64,
    pub approve_min_frequency: i64,
    /// Send to human review above this confidence
    pub review_threshold: f64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            min_frequency: 3,
            frequency_weight: 0.35,
            region_weight: 0.25,
            name_shape_weight: 0.2,
            category_weight: 0.2,
            frequency_norm: 20.0,
            region_norm: 5.0,
            approve_threshold: 0.8,
            approve_min_frequency: 10,
            review_threshold: 0.5,
        }
    }
}

impl DiscoveryConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.min_frequency = parse_env("DISCOVERY_MIN_FREQUENCY", config.min_frequency);
        config.approve_threshold =
            parse_env("DISCOVERY_APPROVE_THRESHOLD", config.approve_threshold);
        config.approve_min_frequency = parse_env(
            "DISCOVERY_APPROVE_MIN_FREQUENCY",
            config.approve_min_frequency,
        );
        config.review_threshold = parse_env("DISCOVERY_REVIEW_THRESHOLD", config.review_threshold);
        config
    }

    pub fn log_config(&self) {
        info!(
            "🔎 Discovery: min_frequency={}, approve≥{:.2} (freq≥{}), review≥{:.2}",
            self.min_frequency,
            self.approve_threshold,
            self.approve_min_frequency,
            self.review_threshold
        );
    }
}

/// Batch execution knobs shared by the pipeline binaries
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Raw entities fetched and processed per batch
    pub batch_size: usize,
    /// Concurrent classification batches in flight
    pub max_concurrent_batches: usize,
    /// Abort a run when the failure rate of a phase crosses this
    pub abort_failure_rate: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            max_concurrent_batches: num_cpus::get().min(8),
            abort_failure_rate: 0.5,
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.batch_size = parse_env("PIPELINE_BATCH_SIZE", config.batch_size);
        config.max_concurrent_batches = parse_env(
            "PIPELINE_MAX_CONCURRENT_BATCHES",
            config.max_concurrent_batches,
        );
        config.abort_failure_rate =
            parse_env("PIPELINE_ABORT_FAILURE_RATE", config.abort_failure_rate);
        config
    }

    pub fn log_config(&self) {
        info!(
            "⚙️ Pipeline: batch_size={}, max_concurrent_batches={}, abort_failure_rate={:.2}",
            self.batch_size, self.max_concurrent_batches, self.abort_failure_rate
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    // Serializes the tests that mutate process-wide environment variables
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_matcher_defaults() {
        let config = MatcherConfig::default();
        assert_eq!(config.fuzzy_threshold, 0.85);
        assert_eq!(config.min_confidence, 0.5);
        assert!(config.exact.priority < config.tag.priority);
        assert!(config.tag.priority < config.fuzzy.priority);
        assert!(config.fuzzy.priority < config.keyword.priority);
        assert!(!config.keyword_rules.is_empty());
    }

    #[test]
    fn test_matcher_env_override() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("MATCHER_FUZZY_THRESHOLD", "0.92");
        let config = MatcherConfig::from_env();
        assert_eq!(config.fuzzy_threshold, 0.92);
        assert_eq!(config.fuzzy.floor, 0.92);
        std::env::remove_var("MATCHER_FUZZY_THRESHOLD");
    }

    #[test]
    fn test_aggregation_defaults_in_unit_range() {
        let config = AggregationConfig::default();
        assert!(config.intensity_knee > 0.0 && config.intensity_knee < 1.0);
        assert!(config.intensity_mid > 0.0 && config.intensity_mid < 1.0);
        assert!((config.transport_weight + config.road_weight - 1.0).abs() < 1e-9);
        assert!(config.baseline_risk > 0.0);
    }

    #[test]
    fn test_discovery_weights_sum_to_one() {
        let config = DiscoveryConfig::default();
        let sum = config.frequency_weight
            + config.region_weight
            + config.name_shape_weight
            + config.category_weight;
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_binning_defaults() {
        let config = BinningConfig::default();
        assert_eq!(config.n_bins, 3);
        assert!(config
            .metrics
            .iter()
            .any(|m| m == "competition_intensity"));
        for (x, y) in &config.bivariate_pairs {
            assert!(config.metrics.contains(x));
            assert!(config.metrics.contains(y));
        }
    }

    #[test]
    fn test_aggregation_resolutions_env_override() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("AGGREGATION_RESOLUTIONS", "8, 9");
        let config = AggregationConfig::from_env();
        assert_eq!(config.resolutions, vec![8, 9]);
        std::env::remove_var("AGGREGATION_RESOLUTIONS");
    }
}
