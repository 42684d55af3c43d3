// src/scoring.rs
//
// Influence & Quality Scorer. All weights live in lookup tables on
// `ScoringTables`, keyed by entity subtype, so they can be inspected and
// tuned without touching control flow. The quality score is a transparent
// additive heuristic: business users reviewing a location must be able to
// see exactly which signals raised or lowered it.

use std::collections::BTreeMap;

use crate::models::{BrandMatch, Classification, EntityType, FunctionalGroup};

const QUALITY_BASE: f64 = 0.3;
const QUALITY_NAME_BONUS: f64 = 0.2;
const QUALITY_GEOMETRY_BONUS: f64 = 0.1;
const QUALITY_SIGNAL_BONUS: f64 = 0.1;

/// Completeness signal groups per entity type; each group with at least one
/// present key adds one `QUALITY_SIGNAL_BONUS`.
const POI_QUALITY_SIGNALS: [&[&str]; 4] = [
    &["opening_hours"],
    &["phone", "website", "contact:phone", "contact:website"],
    &["addr:street", "addr:housenumber"],
    &["brand", "operator"],
];
const TRANSPORT_QUALITY_SIGNALS: [&[&str]; 3] = [
    &["shelter"],
    &["bench"],
    &["operator", "network"],
];
const ROAD_QUALITY_SIGNALS: [&[&str]; 4] = [
    &["surface"],
    &["lanes"],
    &["maxspeed"],
    &["ref"],
];

/// What the scorer decided for one classified entity
#[derive(Debug, Clone, PartialEq)]
pub struct EntityScores {
    pub functional_group: FunctionalGroup,
    pub influence_weight: f64,
    /// Subtype accessibility weight; None for POIs
    pub accessibility_score: Option<f64>,
    pub quality_score: f64,
}

/// Inputs the scorer needs for one entity
#[derive(Debug, Clone, Copy)]
pub struct ScoreInputs<'a> {
    pub classification: &'a Classification,
    pub tags: &'a BTreeMap<String, String>,
    pub brand: Option<&'a BrandMatch>,
    pub has_name: bool,
    /// Whether the entity resolved to at least one grid cell
    pub has_cells: bool,
}

/// Influence weight tables keyed by subtype/category.
#[derive(Debug, Clone)]
pub struct ScoringTables {
    /// Retail POI subtypes, negative (competitors)
    pub retail_weights: Vec<(String, f64)>,
    pub retail_default: f64,

    /// Traffic-generator weights by primary category, with subtype overrides
    pub traffic_category_weights: Vec<(String, f64)>,
    pub traffic_subtype_overrides: Vec<(String, f64)>,
    pub traffic_default: f64,

    /// Transport-node subtypes, positive (accessibility)
    pub transport_weights: Vec<(String, f64)>,
    pub transport_default: f64,

    /// Road classes, positive (accessibility)
    pub road_weights: Vec<(String, f64)>,
    pub road_default: f64,
}

impl Default for ScoringTables {
    fn default() -> Self {
        fn table(entries: &[(&str, f64)]) -> Vec<(String, f64)> {
            entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
        }

        Self {
            retail_weights: table(&[
                ("mall", -0.9),
                ("supermarket", -0.8),
                ("department_store", -0.7),
                ("convenience", -0.5),
                ("bakery", -0.4),
                ("butcher", -0.4),
                ("greengrocer", -0.4),
                ("beverages", -0.35),
                ("kiosk", -0.3),
            ]),
            retail_default: -0.4,

            traffic_category_weights: table(&[
                ("food_service", 0.5),
                ("education", 0.5),
                ("tourism", 0.5),
                ("health", 0.45),
                ("fuel", 0.45),
                ("finance", 0.4),
                ("leisure", 0.4),
                ("services", 0.35),
                ("office", 0.3),
            ]),
            traffic_subtype_overrides: table(&[
                ("hospital", 0.6),
                ("university", 0.6),
                ("marketplace", 0.55),
            ]),
            traffic_default: 0.3,

            transport_weights: table(&[
                ("metro_station", 0.9),
                ("train_station", 0.8),
                ("bus_station", 0.6),
                ("train_halt", 0.6),
                ("ferry_terminal", 0.55),
                ("tram_stop", 0.5),
                ("bus_stop", 0.4),
                ("platform", 0.35),
                ("stop_position", 0.3),
            ]),
            transport_default: 0.3,

            road_weights: table(&[
                ("motorway", 0.9),
                ("trunk", 0.8),
                ("motorway_link", 0.75),
                ("primary", 0.7),
                ("trunk_link", 0.65),
                ("secondary", 0.6),
                ("primary_link", 0.55),
                ("tertiary", 0.5),
                ("secondary_link", 0.45),
                ("residential", 0.4),
                ("living_street", 0.35),
                ("service", 0.3),
                ("unclassified", 0.25),
            ]),
            road_default: 0.25,
        }
    }
}

impl ScoringTables {
    /// Computes functional group, influence weight, accessibility and quality
    /// for one entity. A confident brand match carries the registry's group
    /// and weight, which override the table values.
    pub fn score_entity(&self, inputs: ScoreInputs<'_>) -> EntityScores {
        let classification = inputs.classification;
        let (functional_group, influence_weight, accessibility_score) =
            match classification.entity_type {
                EntityType::Poi => {
                    let (group, weight) = self.poi_influence(classification, inputs.brand);
                    (group, weight, None)
                }
                EntityType::TransportNode => {
                    let weight =
                        lookup(&self.transport_weights, &classification.secondary_category)
                            .unwrap_or(self.transport_default);
                    (FunctionalGroup::Accessibility, weight, Some(weight))
                }
                EntityType::RoadSegment => {
                    let weight = lookup(&self.road_weights, &classification.secondary_category)
                        .unwrap_or(self.road_default);
                    (FunctionalGroup::Accessibility, weight, Some(weight))
                }
            };

        EntityScores {
            functional_group,
            influence_weight,
            accessibility_score,
            quality_score: self.quality_score(inputs),
        }
    }

    fn poi_influence(
        &self,
        classification: &Classification,
        brand: Option<&BrandMatch>,
    ) -> (FunctionalGroup, f64) {
        if let Some(brand) = brand {
            return (brand.functional_group, brand.influence_weight);
        }
        if classification.primary_category == "retail" {
            let weight = lookup(&self.retail_weights, &classification.secondary_category)
                .unwrap_or(self.retail_default);
            return (FunctionalGroup::Competitor, weight);
        }
        let weight = lookup(
            &self.traffic_subtype_overrides,
            &classification.secondary_category,
        )
        .or_else(|| lookup(&self.traffic_category_weights, &classification.primary_category))
        .unwrap_or(self.traffic_default);
        (FunctionalGroup::TrafficGenerator, weight)
    }

    fn quality_score(&self, inputs: ScoreInputs<'_>) -> f64 {
        let mut score = QUALITY_BASE;
        if inputs.has_name {
            score += QUALITY_NAME_BONUS;
        }
        if inputs.has_cells {
            score += QUALITY_GEOMETRY_BONUS;
        }

        let signals: &[&[&str]] = match inputs.classification.entity_type {
            EntityType::Poi => &POI_QUALITY_SIGNALS,
            EntityType::TransportNode => &TRANSPORT_QUALITY_SIGNALS,
            EntityType::RoadSegment => &ROAD_QUALITY_SIGNALS,
        };
        for group in signals {
            if group.iter().any(|key| inputs.tags.contains_key(*key)) {
                score += QUALITY_SIGNAL_BONUS;
            }
        }

        // Components are exact tenths; round away accumulated float error
        ((score * 10.0).round() / 10.0).min(1.0)
    }
}

fn lookup(table: &[(String, f64)], key: &str) -> Option<f64> {
    table
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, weight)| *weight)
}

/// Parses a maxspeed tag value: plain numbers and "<n> km/h" forms yield the
/// numeric part; zone codes and "none" yield None.
pub fn parse_max_speed(tags: &BTreeMap<String, String>) -> Option<f64> {
    let raw = tags.get("maxspeed")?.trim();
    let numeric: String = raw
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    if numeric.is_empty() {
        return None;
    }
    numeric.parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MatchType;

    fn tags(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn classification(entity_type: EntityType, primary: &str, secondary: &str) -> Classification {
        Classification {
            entity_type,
            primary_category: primary.to_string(),
            secondary_category: secondary.to_string(),
        }
    }

    fn inputs<'a>(
        classification: &'a Classification,
        tags: &'a BTreeMap<String, String>,
    ) -> ScoreInputs<'a> {
        ScoreInputs {
            classification,
            tags,
            brand: None,
            has_name: true,
            has_cells: true,
        }
    }

    #[test]
    fn test_retail_is_negative_competitor() {
        let tables = ScoringTables::default();
        let c = classification(EntityType::Poi, "retail", "supermarket");
        let t = tags(&[]);
        let scores = tables.score_entity(inputs(&c, &t));
        assert_eq!(scores.functional_group, FunctionalGroup::Competitor);
        assert!(scores.influence_weight < 0.0);
        assert_eq!(scores.accessibility_score, None);
    }

    #[test]
    fn test_unknown_retail_subtype_uses_default() {
        let tables = ScoringTables::default();
        let c = classification(EntityType::Poi, "retail", "car_parts");
        let t = tags(&[]);
        let scores = tables.score_entity(inputs(&c, &t));
        assert_eq!(scores.influence_weight, tables.retail_default);
    }

    #[test]
    fn test_brand_match_overrides_table_weight() {
        let tables = ScoringTables::default();
        let c = classification(EntityType::Poi, "retail", "supermarket");
        let t = tags(&[]);
        let brand = BrandMatch {
            canonical_name: "АТБ".to_string(),
            confidence: 1.0,
            match_type: MatchType::Exact,
            functional_group: FunctionalGroup::Competitor,
            influence_weight: -0.85,
        };
        let mut i = inputs(&c, &t);
        i.brand = Some(&brand);
        let scores = tables.score_entity(i);
        assert_eq!(scores.influence_weight, -0.85);
    }

    #[test]
    fn test_traffic_generator_is_positive() {
        let tables = ScoringTables::default();
        let c = classification(EntityType::Poi, "food_service", "cafe");
        let t = tags(&[]);
        let scores = tables.score_entity(inputs(&c, &t));
        assert_eq!(scores.functional_group, FunctionalGroup::TrafficGenerator);
        assert!(scores.influence_weight > 0.0);
    }

    #[test]
    fn test_transport_ordering() {
        let tables = ScoringTables::default();
        let weight = |subtype: &str| {
            let c = classification(EntityType::TransportNode, "transport", subtype);
            let t = tags(&[]);
            tables.score_entity(inputs(&c, &t)).influence_weight
        };
        let metro = weight("metro_station");
        let train = weight("train_station");
        let bus_station = weight("bus_station");
        let bus_stop = weight("bus_stop");
        let generic = weight("unknown_subtype");
        assert!(metro > train);
        assert!(train > bus_station);
        assert!(bus_station > bus_stop);
        assert!(bus_stop > generic);
        assert!(generic > 0.0);
    }

    #[test]
    fn test_bus_stop_scores_accessibility() {
        let tables = ScoringTables::default();
        let c = classification(EntityType::TransportNode, "transport", "bus_stop");
        let t = tags(&[("highway", "bus_stop"), ("name", "Central")]);
        let scores = tables.score_entity(inputs(&c, &t));
        assert_eq!(scores.functional_group, FunctionalGroup::Accessibility);
        assert!(scores.influence_weight > 0.0);
        assert_eq!(scores.accessibility_score, Some(scores.influence_weight));
    }

    #[test]
    fn test_road_class_ordering() {
        let tables = ScoringTables::default();
        let weight = |class: &str| {
            let c = classification(EntityType::RoadSegment, "road", class);
            let t = tags(&[]);
            tables.score_entity(inputs(&c, &t)).influence_weight
        };
        assert!(weight("motorway") > weight("trunk"));
        assert!(weight("trunk") > weight("primary"));
        assert!(weight("primary") > weight("secondary"));
        assert!(weight("secondary") > weight("tertiary"));
        assert!(weight("tertiary") > weight("unclassified"));
    }

    #[test]
    fn test_quality_score_bounds_and_cap() {
        let tables = ScoringTables::default();
        let c = classification(EntityType::Poi, "retail", "supermarket");

        // Kitchen-sink tags must cap at 1.0, not exceed it
        let full = tags(&[
            ("opening_hours", "24/7"),
            ("phone", "+380501234567"),
            ("website", "https://example.ua"),
            ("addr:street", "Khreshchatyk"),
            ("addr:housenumber", "1"),
            ("brand", "АТБ"),
        ]);
        let score = tables.score_entity(inputs(&c, &full)).quality_score;
        assert_eq!(score, 1.0);

        // Bare minimum still has the base
        let empty = tags(&[]);
        let mut bare = inputs(&c, &empty);
        bare.has_name = false;
        bare.has_cells = false;
        let score = tables.score_entity(bare).quality_score;
        assert!((score - QUALITY_BASE).abs() < 1e-9);
    }

    #[test]
    fn test_transport_quality_signals() {
        let tables = ScoringTables::default();
        let c = classification(EntityType::TransportNode, "transport", "bus_stop");

        let sheltered = tags(&[("shelter", "yes"), ("bench", "yes"), ("operator", "КП")]);
        let plain = tags(&[]);
        let with_signals = tables.score_entity(inputs(&c, &sheltered)).quality_score;
        let without = tables.score_entity(inputs(&c, &plain)).quality_score;
        assert!(with_signals > without);
        assert!((with_signals - without - 3.0 * QUALITY_SIGNAL_BONUS).abs() < 1e-9);
    }

    #[test]
    fn test_parse_max_speed() {
        assert_eq!(parse_max_speed(&tags(&[("maxspeed", "50")])), Some(50.0));
        assert_eq!(parse_max_speed(&tags(&[("maxspeed", "60 km/h")])), Some(60.0));
        assert_eq!(parse_max_speed(&tags(&[("maxspeed", "UA:urban")])), None);
        assert_eq!(parse_max_speed(&tags(&[("maxspeed", "none")])), None);
        assert_eq!(parse_max_speed(&tags(&[])), None);
    }
}
