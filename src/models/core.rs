// src/models/core.rs

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use geo_types::Geometry;
use serde::{Deserialize, Serialize};

use crate::tags::RawTagPayload;

//------------------------------------------------------------------------------
// IDENTIFIER TYPES
//------------------------------------------------------------------------------
// Newtype pattern for type safety to prevent mixing different ID types

/// Strongly typed identifier for raw / classified entity records
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub String);

/// Strongly typed identifier for canonical Brand records
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BrandId(pub String);

/// Strongly typed identifier for BrandCandidate records
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CandidateId(pub String);

/// A discrete-grid cell index in its 15-character string form
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellId(pub String);

impl std::fmt::Display for CellId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

//------------------------------------------------------------------------------
// CORE DOMAIN MODELS
//------------------------------------------------------------------------------

/// One ingested geographic feature, exactly as the source store holds it.
///
/// Immutable once ingested; the pipeline never writes back to raw entities.
#[derive(Debug, Clone)]
pub struct RawEntity {
    /// Stable identifier shared with the classified record derived from it
    pub id: EntityId,

    /// Raw tag payload; may be flat, nested or garbage (see `tags::RawTagPayload`)
    pub tags: RawTagPayload,

    /// Point, line or polygon in geographic (lat/lon) coordinates
    pub geometry: Geometry<f64>,

    /// Free-text name, when the source carried a dedicated name field
    pub name: Option<String>,

    /// Region label used for batch partitioning and candidate discovery
    pub region: String,
}

/// Semantic type assigned by the Entity Classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityType {
    /// Point of interest (shop, amenity, office, tourism, leisure)
    Poi,

    /// Public transport stop, station or platform
    TransportNode,

    /// A road way with a recognized highway class
    RoadSegment,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Poi => "poi",
            Self::TransportNode => "transport_node",
            Self::RoadSegment => "road_segment",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "poi" => Some(Self::Poi),
            "transport_node" => Some(Self::TransportNode),
            "road_segment" => Some(Self::RoadSegment),
            _ => None,
        }
    }
}

/// Coarse role classification driving the sign and magnitude of influence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FunctionalGroup {
    /// Competes for the same customers (negative influence)
    Competitor,

    /// Pulls foot traffic toward the location (positive influence)
    TrafficGenerator,

    /// Improves how easily the location is reached (positive influence)
    Accessibility,

    /// No modeled effect either way
    Neutral,
}

impl FunctionalGroup {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Competitor => "competitor",
            Self::TrafficGenerator => "traffic_generator",
            Self::Accessibility => "accessibility",
            Self::Neutral => "neutral",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "competitor" => Some(Self::Competitor),
            "traffic_generator" => Some(Self::TrafficGenerator),
            "accessibility" => Some(Self::Accessibility),
            "neutral" => Some(Self::Neutral),
            _ => None,
        }
    }
}

/// Which matching strategy produced a brand resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchType {
    /// Normalized name equals a canonical name or synonym
    Exact,

    /// brand/operator tag value resolved through the registry
    Tag,

    /// Token-aware string similarity above the configured threshold
    Fuzzy,

    /// Curated keyword list hit (last resort, lowest trust)
    Keyword,

    /// No strategy produced a result above the confidence floor
    None,
}

impl MatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Tag => "tag",
            Self::Fuzzy => "fuzzy",
            Self::Keyword => "keyword",
            Self::None => "none",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "exact" => Self::Exact,
            "tag" => Self::Tag,
            "fuzzy" => Self::Fuzzy,
            "keyword" => Self::Keyword,
            _ => Self::None,
        }
    }
}

/// What the Entity Classifier decided for one tag set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub entity_type: EntityType,
    pub primary_category: String,
    pub secondary_category: String,
}

/// Result of one brand matching attempt
#[derive(Debug, Clone, PartialEq)]
pub struct BrandMatch {
    pub canonical_name: String,
    pub confidence: f64,
    pub match_type: MatchType,
    pub functional_group: FunctionalGroup,
    pub influence_weight: f64,
}

/// Derived record produced by one classification pass over a RawEntity.
///
/// Never mutated in place; reprocessing produces a new record that upserts
/// over the old one, keyed by the stable entity id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifiedEntity {
    pub id: EntityId,
    pub region: String,
    pub entity_type: EntityType,
    pub primary_category: String,
    pub secondary_category: String,

    /// Name after trimming/whitespace collapse, if any name was present
    pub standardized_name: Option<String>,

    /// Canonical brand name; non-null iff confidence > 0 and match type != none
    pub brand_normalized: Option<String>,
    pub brand_confidence: f64,
    pub brand_match_type: MatchType,

    pub functional_group: FunctionalGroup,
    pub influence_weight: f64,

    /// One grid cell per supported resolution, from the representative point.
    /// Empty when the geometry has no resolvable centroid.
    pub hex_cells: BTreeMap<u8, CellId>,

    /// Subtype accessibility weight for transport nodes and road segments
    pub accessibility_score: Option<f64>,
    pub highway_type: Option<String>,
    pub max_speed: Option<f64>,

    pub quality_score: f64,
}

/// Canonical retail/service identity held by the Brand Registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Brand {
    pub id: BrandId,
    pub canonical_name: String,
    pub synonyms: Vec<String>,
    pub functional_group: FunctionalGroup,
    pub influence_weight: f64,

    /// brand/operator tag values that identify this brand without free-text
    /// matching, e.g. {"brand": "АТБ", "operator": "АТБ-маркет"}
    pub tag_signature: Option<BTreeMap<String, String>>,

    /// Store format label, e.g. "supermarket" or "convenience"
    pub format: Option<String>,
}

/// Review lifecycle of a brand candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CandidateStatus {
    New,
    Reviewing,
    Approved,
    Rejected,
}

impl CandidateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Reviewing => "reviewing",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "new" => Some(Self::New),
            "reviewing" => Some(Self::Reviewing),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    /// Approved and Rejected are terminal; re-observation only refreshes
    /// frequency and last_seen on terminal rows.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }

    /// Allowed transitions: new -> {approved, reviewing, rejected},
    /// reviewing -> {approved, rejected}. Everything else requires an
    /// explicit operator reset.
    pub fn can_transition(&self, to: CandidateStatus) -> bool {
        match self {
            Self::New => matches!(
                to,
                Self::Approved | Self::Reviewing | Self::Rejected
            ),
            Self::Reviewing => matches!(to, Self::Approved | Self::Rejected),
            Self::Approved | Self::Rejected => false,
        }
    }
}

/// A name observed without a confident brand match, awaiting review
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrandCandidate {
    pub id: CandidateId,
    pub name: String,
    pub normalized_name: String,

    pub total_frequency: i64,
    pub regions: Vec<String>,
    pub categories: Vec<String>,

    /// Distinct grid cells the name was observed in (geographic spread)
    pub distinct_cells: i64,

    pub status: CandidateStatus,
    pub confidence_score: f64,
    pub is_network_candidate: bool,

    /// Human-readable explanation of the automatic recommendation
    pub recommendation_reason: Option<String>,

    pub suggested_canonical_name: Option<String>,
    pub suggested_functional_group: Option<FunctionalGroup>,
    pub suggested_influence_weight: Option<f64>,
    pub suggested_format: Option<String>,

    pub first_seen: NaiveDateTime,
    pub last_seen: NaiveDateTime,
}

/// Aggregated metrics for one (cell, resolution) pair.
///
/// Counts are never null: a cell with no entities of a category reports 0.
/// Only whole-metric-undefined fields (no samples at all, or enrichment data
/// the store does not carry) are None, and binning maps those to bin 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HexMetrics {
    pub cell_id: CellId,
    pub resolution: u8,

    pub total_entities: i64,
    pub poi_count: i64,
    pub transport_count: i64,
    pub road_count: i64,

    pub competitor_count: i64,
    pub traffic_count: i64,
    pub accessibility_count: i64,
    pub neutral_count: i64,

    /// Entity counts keyed by primary category
    pub category_counts: BTreeMap<String, i64>,

    pub entity_density: f64,
    pub poi_density: f64,
    pub competitor_density: f64,

    pub influence_positive: f64,
    pub influence_negative: f64,
    pub influence_net: f64,

    pub competition_intensity: f64,
    pub accessibility: f64,
    pub market_saturation: f64,
    pub retail_potential: f64,
    pub risk_score: f64,

    pub avg_quality: Option<f64>,

    /// External enrichment factors; None unless an enrichment source set them
    pub population_index: Option<f64>,
    pub income_index: Option<f64>,

    /// Per-metric bin ids, written by the Binning component (0 = missing)
    pub bins: BTreeMap<String, i16>,

    /// Bivariate codes "{bin_x}-{bin_y}" per configured metric pair
    pub bivariate: BTreeMap<String, String>,
}

/// Administrative unit, consumed read-only as a binning scope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminUnit {
    pub id: String,
    pub level: i32,
    pub name: String,
    pub parent_id: Option<String>,
}

/// Compact per-cell record handed to the visualization/API consumer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CellValue {
    pub cell_id: CellId,
    pub value: f64,
    pub bivar_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_type_round_trip() {
        for ty in [EntityType::Poi, EntityType::TransportNode, EntityType::RoadSegment] {
            assert_eq!(EntityType::parse(ty.as_str()), Some(ty));
        }
        assert_eq!(EntityType::parse("building"), None);
    }

    #[test]
    fn test_match_type_parse_defaults_to_none() {
        assert_eq!(MatchType::parse("exact"), MatchType::Exact);
        assert_eq!(MatchType::parse("garbage"), MatchType::None);
    }

    #[test]
    fn test_candidate_status_transitions() {
        use CandidateStatus::*;

        assert!(New.can_transition(Approved));
        assert!(New.can_transition(Reviewing));
        assert!(New.can_transition(Rejected));
        assert!(Reviewing.can_transition(Approved));
        assert!(Reviewing.can_transition(Rejected));

        // Terminal states never transition without an operator reset
        assert!(!Approved.can_transition(Rejected));
        assert!(!Approved.can_transition(Reviewing));
        assert!(!Rejected.can_transition(Approved));
        assert!(!Reviewing.can_transition(New));
    }

    #[test]
    fn test_terminal_states() {
        assert!(CandidateStatus::Approved.is_terminal());
        assert!(CandidateStatus::Rejected.is_terminal());
        assert!(!CandidateStatus::New.is_terminal());
        assert!(!CandidateStatus::Reviewing.is_terminal());
    }
}
