// src/discovery/mod.rs
//
// Brand candidate discovery: unmatched POI names grouped by case-folded
// name within region, filtered for generic phrasing, scored for how much
// they look like a retail network and stamped with an automatic
// recommendation. The review lifecycle itself lives in the store layer.

pub mod db;

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDateTime;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use uuid::Uuid;

use crate::config::DiscoveryConfig;
use crate::models::{BrandCandidate, CandidateId, CandidateStatus, CellId, FunctionalGroup};

// Names that describe what a place is rather than who runs it. A numbered
// shop or a village council is never a brand network.
static GENERIC_NAME_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    let patterns = [
        r"(?i)^(магазин|крамниця|кіоск|аптека|їдальня|shop|store|kiosk|market)\s*(№|#|n)?\s*\d*$",
        r"(?i)(сільрада|міськрада|райрада|держадміністрація|адміністрація|administration|council)",
        r"^[\d\s№#/-]+$",
    ];
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("static pattern"))
        .collect()
});

/// True for names too generic to ever become a brand candidate.
pub fn is_generic_name(name: &str) -> bool {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return true;
    }
    GENERIC_NAME_PATTERNS.iter().any(|p| p.is_match(trimmed))
}

/// One unmatched POI observation, the discovery input unit.
#[derive(Debug, Clone)]
pub struct Observation {
    pub name: String,
    pub region: String,
    pub category: String,
    /// Cell at the finest resolution, for geographic spread
    pub cell: Option<CellId>,
}

/// Grouping key: trimmed and case-folded, nothing else. Punctuation is
/// kept so "Nova Poshta" and "Nova-Poshta" stay distinct observations.
fn fold_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// How much a name is shaped like a brand: short, digit-free names score
/// high, long descriptive ones low.
fn name_shape_score(name: &str) -> f64 {
    let mut score = 0.0;
    if !name.chars().any(|c| c.is_ascii_digit()) {
        score += 0.4;
    }
    if name.split_whitespace().count() <= 3 {
        score += 0.3;
    }
    if name.chars().count() <= 20 {
        score += 0.3;
    }
    score
}

struct NameGroup {
    /// Original spellings and how often each was seen
    spellings: BTreeMap<String, i64>,
    total_frequency: i64,
    regions: BTreeSet<String>,
    categories: BTreeMap<String, i64>,
    cells: BTreeSet<CellId>,
}

impl NameGroup {
    fn new() -> Self {
        Self {
            spellings: BTreeMap::new(),
            total_frequency: 0,
            regions: BTreeSet::new(),
            categories: BTreeMap::new(),
            cells: BTreeSet::new(),
        }
    }

    /// Most frequent original spelling, ties broken toward the
    /// lexicographically smaller one.
    fn display_name(&self) -> String {
        self.spellings
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(name, _)| name.clone())
            .unwrap_or_default()
    }

    fn dominant_category(&self) -> Option<(&str, i64)> {
        self.categories
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(category, count)| (category.as_str(), *count))
    }

    fn category_consistency(&self) -> f64 {
        match self.dominant_category() {
            Some((_, count)) if self.total_frequency > 0 => {
                count as f64 / self.total_frequency as f64
            }
            _ => 0.0,
        }
    }
}

/// Blended network score in [0, 1].
fn network_score(group: &NameGroup, shape: f64, config: &DiscoveryConfig) -> f64 {
    let frequency_component = if config.frequency_norm > 0.0 {
        (group.total_frequency as f64 / config.frequency_norm).min(1.0)
    } else {
        1.0
    };
    let region_component = if config.region_norm > 0.0 {
        (group.regions.len() as f64 / config.region_norm).min(1.0)
    } else {
        1.0
    };

    (config.frequency_weight * frequency_component
        + config.region_weight * region_component
        + config.name_shape_weight * shape
        + config.category_weight * group.category_consistency())
    .clamp(0.0, 1.0)
}

/// Automatic recommendation for a scored candidate: the target status and
/// a reason a reviewer can read without re-deriving the numbers.
pub fn recommend(
    score: f64,
    frequency: i64,
    region_count: usize,
    config: &DiscoveryConfig,
) -> (CandidateStatus, String) {
    if score >= config.approve_threshold && frequency >= config.approve_min_frequency {
        (
            CandidateStatus::Approved,
            format!(
                "network score {:.2} with {} observations across {} region(s)",
                score, frequency, region_count
            ),
        )
    } else if score >= config.review_threshold {
        (
            CandidateStatus::Reviewing,
            format!(
                "network score {:.2} warrants review ({} observations, {} region(s))",
                score, frequency, region_count
            ),
        )
    } else {
        (
            CandidateStatus::Rejected,
            format!(
                "network score {:.2} below review threshold {:.2}",
                score, config.review_threshold
            ),
        )
    }
}

/// Categories whose candidates most plausibly compete for the same
/// customers; used only to prefill review suggestions.
const COMPETITOR_CATEGORIES: [&str; 4] = ["retail", "food_service", "fuel", "finance"];

/// Groups, filters and scores observations into brand candidates, sorted
/// by normalized name. Names seen fewer than `min_frequency` times and
/// generic names never surface.
pub fn discover_candidates(
    observations: &[Observation],
    config: &DiscoveryConfig,
    now: NaiveDateTime,
) -> Vec<BrandCandidate> {
    let mut groups: BTreeMap<String, NameGroup> = BTreeMap::new();

    for obs in observations {
        let folded = fold_name(&obs.name);
        if folded.is_empty() || is_generic_name(&obs.name) {
            continue;
        }
        let group = groups.entry(folded).or_insert_with(NameGroup::new);
        *group
            .spellings
            .entry(obs.name.trim().to_string())
            .or_insert(0) += 1;
        group.total_frequency += 1;
        group.regions.insert(obs.region.clone());
        *group.categories.entry(obs.category.clone()).or_insert(0) += 1;
        if let Some(cell) = &obs.cell {
            group.cells.insert(cell.clone());
        }
    }

    let mut candidates = Vec::new();
    for (normalized_name, group) in groups {
        if group.total_frequency < config.min_frequency {
            continue;
        }

        let display_name = group.display_name();
        let shape = name_shape_score(&display_name);
        let score = network_score(&group, shape, config);
        let region_count = group.regions.len();
        let (status, reason) = recommend(score, group.total_frequency, region_count, config);

        let dominant = group.dominant_category().map(|(c, _)| c.to_string());
        let suggests_competitor = dominant
            .as_deref()
            .map(|c| COMPETITOR_CATEGORIES.contains(&c))
            .unwrap_or(false);

        candidates.push(BrandCandidate {
            id: CandidateId(Uuid::new_v4().to_string()),
            name: display_name.clone(),
            normalized_name,
            total_frequency: group.total_frequency,
            regions: group.regions.iter().cloned().collect(),
            categories: group.categories.keys().cloned().collect(),
            distinct_cells: group.cells.len() as i64,
            status,
            confidence_score: score,
            is_network_candidate: region_count >= 2,
            recommendation_reason: Some(reason),
            suggested_canonical_name: Some(display_name),
            suggested_functional_group: suggests_competitor.then_some(FunctionalGroup::Competitor),
            suggested_influence_weight: suggests_competitor.then_some(-0.4),
            suggested_format: dominant,
            first_seen: now,
            last_seen: now,
        });
    }

    candidates
}

/// Which candidates a batch review touches; all conditions AND-combined.
#[derive(Debug, Default, Clone, Serialize)]
pub struct CandidateFilter {
    pub status: Option<CandidateStatus>,
    pub min_confidence: Option<f64>,
    pub max_confidence: Option<f64>,
    pub min_frequency: Option<i64>,
    pub max_frequency: Option<i64>,
    pub category: Option<String>,
    pub network_only: bool,
}

/// Action applied by one batch review operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchAction {
    Approve,
    Reject,
}

impl BatchAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
        }
    }

    pub fn target_status(&self) -> CandidateStatus {
        match self {
            Self::Approve => CandidateStatus::Approved,
            Self::Reject => CandidateStatus::Rejected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn obs(name: &str, region: &str, category: &str, cell: &str) -> Observation {
        Observation {
            name: name.to_string(),
            region: region.to_string(),
            category: category.to_string(),
            cell: Some(CellId(cell.to_string())),
        }
    }

    fn repeat(n: usize, name: &str, region: &str, category: &str) -> Vec<Observation> {
        (0..n)
            .map(|i| obs(name, region, category, &format!("8a{:013x}", i)))
            .collect()
    }

    #[test]
    fn test_generic_names_filtered() {
        assert!(is_generic_name("Магазин №7"));
        assert!(is_generic_name("магазин № 12"));
        assert!(is_generic_name("shop #3"));
        assert!(is_generic_name("Петрівська сільрада"));
        assert!(is_generic_name("  "));
        assert!(is_generic_name("№ 5"));

        assert!(!is_generic_name("АТБ"));
        assert!(!is_generic_name("Нова Пошта"));
        assert!(!is_generic_name("Копійочка"));
    }

    #[test]
    fn test_grouping_is_case_folded_and_trimmed() {
        let mut observations = repeat(2, "Копійочка", "kyiv", "retail");
        observations.extend(repeat(1, "  копійочка ", "kyiv", "retail"));

        let candidates = discover_candidates(&observations, &DiscoveryConfig::default(), now());
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].total_frequency, 3);
        // the most frequent original spelling wins
        assert_eq!(candidates[0].name, "Копійочка");
    }

    #[test]
    fn test_min_frequency_gate() {
        let config = DiscoveryConfig::default();

        let rare = repeat(2, "Рідкісна Кава", "kyiv", "food_service");
        assert!(discover_candidates(&rare, &config, now()).is_empty());

        let at_threshold = repeat(3, "Рідкісна Кава", "kyiv", "food_service");
        assert_eq!(discover_candidates(&at_threshold, &config, now()).len(), 1);
    }

    #[test]
    fn test_single_region_is_never_a_network() {
        let config = DiscoveryConfig::default();
        let observations = repeat(8, "Локальний Хліб", "kyiv", "retail");
        let candidates = discover_candidates(&observations, &config, now());
        assert_eq!(candidates.len(), 1);
        assert!(!candidates[0].is_network_candidate);
        assert_eq!(candidates[0].regions, vec!["kyiv"]);
    }

    #[test]
    fn test_multi_region_network_and_score_growth() {
        let config = DiscoveryConfig::default();

        let mut one_region = repeat(6, "Смачна Їжа", "kyiv", "food_service");
        let single = discover_candidates(&one_region, &config, now());

        one_region.extend(repeat(3, "Смачна Їжа", "lviv", "food_service"));
        one_region.extend(repeat(3, "Смачна Їжа", "odesa", "food_service"));
        let spread = discover_candidates(&one_region, &config, now());

        assert!(!single[0].is_network_candidate);
        assert!(spread[0].is_network_candidate);
        assert!(spread[0].confidence_score > single[0].confidence_score);
        assert_eq!(spread[0].regions.len(), 3);
    }

    #[test]
    fn test_distinct_cells_counted() {
        let mut observations = repeat(4, "Кавова Хата", "kyiv", "food_service");
        // two observations share a cell
        observations[1].cell = observations[0].cell.clone();
        let candidates = discover_candidates(&observations, &DiscoveryConfig::default(), now());
        assert_eq!(candidates[0].distinct_cells, 3);
    }

    #[test]
    fn test_recommendation_thresholds() {
        let config = DiscoveryConfig::default();

        // 20 observations in 5 regions, clean short name, one category:
        // every component saturates
        let mut wide = Vec::new();
        for region in ["kyiv", "lviv", "odesa", "dnipro", "kharkiv"] {
            wide.extend(repeat(4, "Нова Пошта", region, "services"));
        }
        let approved = discover_candidates(&wide, &config, now());
        assert_eq!(approved[0].status, CandidateStatus::Approved);
        assert!((approved[0].confidence_score - 1.0).abs() < 1e-9);
        assert!(approved[0]
            .recommendation_reason
            .as_deref()
            .unwrap()
            .contains("region"));

        // mid-strength name lands in review
        let mut mid = repeat(6, "Смачна Їжа", "kyiv", "food_service");
        mid.extend(repeat(2, "Смачна Їжа", "lviv", "food_service"));
        let reviewing = discover_candidates(&mid, &config, now());
        assert_eq!(reviewing[0].status, CandidateStatus::Reviewing);

        // weak digit-laden name in one region rejects
        let weak = repeat(3, "Точка 24/7 №2 біля вокзалу", "kyiv", "retail");
        let rejected = discover_candidates(&weak, &config, now());
        assert_eq!(rejected[0].status, CandidateStatus::Rejected);
        assert!(rejected[0]
            .recommendation_reason
            .as_deref()
            .unwrap()
            .contains("below review threshold"));
    }

    #[test]
    fn test_competitor_suggestion_from_category() {
        let retail = repeat(5, "Копійочка", "kyiv", "retail");
        let candidates = discover_candidates(&retail, &DiscoveryConfig::default(), now());
        assert_eq!(
            candidates[0].suggested_functional_group,
            Some(FunctionalGroup::Competitor)
        );
        assert_eq!(candidates[0].suggested_influence_weight, Some(-0.4));

        let services = repeat(5, "Затишна Перукарня", "kyiv", "services");
        let candidates = discover_candidates(&services, &DiscoveryConfig::default(), now());
        assert_eq!(candidates[0].suggested_functional_group, None);
    }

    #[test]
    fn test_output_sorted_by_normalized_name() {
        let mut observations = repeat(3, "Зоря", "kyiv", "retail");
        observations.extend(repeat(3, "Аврора", "kyiv", "retail"));
        let candidates = discover_candidates(&observations, &DiscoveryConfig::default(), now());
        assert_eq!(candidates.len(), 2);
        assert!(candidates[0].normalized_name < candidates[1].normalized_name);
    }
}
