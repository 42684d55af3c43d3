// src/classify/mod.rs
//
// Entity Classifier: decides whether a tag set describes a transport node,
// a road segment or a POI. Rule order is load-bearing: transport predicates
// run first so a bus stop that also carries a highway tag keeps its
// transport semantics, roads run second, POI allow-lists last. No rule hit
// means the entity is dropped from the pipeline (counted as skipped).

pub mod db;

use std::collections::BTreeMap;

use crate::models::{Classification, EntityType};

/// Transport subtype predicates, checked in order; first hit wins.
/// Metro precedes plain rail so `railway=station` + `station=subway`
/// resolves to a metro station.
const TRANSPORT_RULES: [(&str, &str, &str); 9] = [
    ("station", "subway", "metro_station"),
    ("railway", "station", "train_station"),
    ("railway", "halt", "train_halt"),
    ("railway", "tram_stop", "tram_stop"),
    ("amenity", "bus_station", "bus_station"),
    ("highway", "bus_stop", "bus_stop"),
    ("amenity", "ferry_terminal", "ferry_terminal"),
    ("public_transport", "platform", "platform"),
    ("public_transport", "stop_position", "stop_position"),
];

/// Recognized road classes for `highway=*` ways
const ROAD_CLASSES: [&str; 13] = [
    "motorway",
    "motorway_link",
    "trunk",
    "trunk_link",
    "primary",
    "primary_link",
    "secondary",
    "secondary_link",
    "tertiary",
    "unclassified",
    "residential",
    "living_street",
    "service",
];

/// amenity values in scope, mapped to a primary category
const AMENITY_CATEGORIES: [(&str, &str); 22] = [
    ("restaurant", "food_service"),
    ("cafe", "food_service"),
    ("fast_food", "food_service"),
    ("bar", "food_service"),
    ("pub", "food_service"),
    ("food_court", "food_service"),
    ("bank", "finance"),
    ("atm", "finance"),
    ("bureau_de_change", "finance"),
    ("pharmacy", "health"),
    ("clinic", "health"),
    ("hospital", "health"),
    ("dentist", "health"),
    ("veterinary", "health"),
    ("school", "education"),
    ("kindergarten", "education"),
    ("university", "education"),
    ("library", "education"),
    ("fuel", "fuel"),
    ("charging_station", "fuel"),
    ("post_office", "services"),
    ("marketplace", "services"),
];

const OFFICE_VALUES: [&str; 8] = [
    "company",
    "government",
    "insurance",
    "estate_agent",
    "lawyer",
    "it",
    "telecommunication",
    "financial",
];

const TOURISM_VALUES: [&str; 8] = [
    "hotel",
    "hostel",
    "guest_house",
    "motel",
    "museum",
    "attraction",
    "gallery",
    "zoo",
];

const LEISURE_VALUES: [&str; 7] = [
    "fitness_centre",
    "sports_centre",
    "swimming_pool",
    "playground",
    "park",
    "stadium",
    "sauna",
];

/// Classifies one flat tag set. Pure and deterministic: the same tags always
/// yield the same result. Returns None when no rule matches; callers drop
/// the entity and count it as skipped.
pub fn classify(tags: &BTreeMap<String, String>) -> Option<Classification> {
    classify_transport(tags)
        .or_else(|| classify_road(tags))
        .or_else(|| classify_poi(tags))
}

fn classify_transport(tags: &BTreeMap<String, String>) -> Option<Classification> {
    for (key, value, subtype) in &TRANSPORT_RULES {
        if tags.get(*key).map(String::as_str) == Some(*value) {
            return Some(Classification {
                entity_type: EntityType::TransportNode,
                primary_category: "transport".to_string(),
                secondary_category: (*subtype).to_string(),
            });
        }
    }
    None
}

fn classify_road(tags: &BTreeMap<String, String>) -> Option<Classification> {
    let class = tags.get("highway")?;
    if ROAD_CLASSES.contains(&class.as_str()) {
        return Some(Classification {
            entity_type: EntityType::RoadSegment,
            primary_category: "road".to_string(),
            secondary_category: class.clone(),
        });
    }
    None
}

fn classify_poi(tags: &BTreeMap<String, String>) -> Option<Classification> {
    if let Some(shop) = tags.get("shop") {
        return Some(poi("retail", shop));
    }
    if let Some(amenity) = tags.get("amenity") {
        if let Some((_, category)) = AMENITY_CATEGORIES
            .iter()
            .find(|(value, _)| value == amenity)
        {
            return Some(poi(category, amenity));
        }
    }
    if let Some(office) = tags.get("office") {
        if OFFICE_VALUES.contains(&office.as_str()) {
            return Some(poi("office", office));
        }
    }
    if let Some(tourism) = tags.get("tourism") {
        if TOURISM_VALUES.contains(&tourism.as_str()) {
            return Some(poi("tourism", tourism));
        }
    }
    if let Some(leisure) = tags.get("leisure") {
        if LEISURE_VALUES.contains(&leisure.as_str()) {
            return Some(poi("leisure", leisure));
        }
    }
    None
}

fn poi(primary: &str, secondary: &str) -> Classification {
    Classification {
        entity_type: EntityType::Poi,
        primary_category: primary.to_string(),
        secondary_category: secondary.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_classification_is_deterministic() {
        let t = tags(&[("shop", "supermarket"), ("name", "ATB")]);
        let first = classify(&t);
        let second = classify(&t);
        assert_eq!(first, second);
        assert!(first.is_some());
    }

    #[test]
    fn test_transport_wins_over_road() {
        // A tram stop on a primary road keeps its transport semantics
        let t = tags(&[("railway", "tram_stop"), ("highway", "primary")]);
        let c = classify(&t).unwrap();
        assert_eq!(c.entity_type, EntityType::TransportNode);
        assert_eq!(c.secondary_category, "tram_stop");
    }

    #[test]
    fn test_bus_stop_is_transport_not_road() {
        let t = tags(&[("highway", "bus_stop"), ("name", "Central")]);
        let c = classify(&t).unwrap();
        assert_eq!(c.entity_type, EntityType::TransportNode);
        assert_eq!(c.primary_category, "transport");
        assert_eq!(c.secondary_category, "bus_stop");
    }

    #[test]
    fn test_metro_beats_plain_rail_station() {
        let t = tags(&[("railway", "station"), ("station", "subway")]);
        let c = classify(&t).unwrap();
        assert_eq!(c.secondary_category, "metro_station");

        let t = tags(&[("railway", "station")]);
        let c = classify(&t).unwrap();
        assert_eq!(c.secondary_category, "train_station");
    }

    #[test]
    fn test_road_classes() {
        for class in ["motorway", "trunk_link", "residential", "service"] {
            let c = classify(&tags(&[("highway", class)])).unwrap();
            assert_eq!(c.entity_type, EntityType::RoadSegment);
            assert_eq!(c.primary_category, "road");
            assert_eq!(c.secondary_category, class);
        }
        // footways and tracks are out of scope
        assert!(classify(&tags(&[("highway", "footway")])).is_none());
        assert!(classify(&tags(&[("highway", "track")])).is_none());
    }

    #[test]
    fn test_shop_maps_to_retail() {
        let c = classify(&tags(&[("shop", "supermarket")])).unwrap();
        assert_eq!(c.entity_type, EntityType::Poi);
        assert_eq!(c.primary_category, "retail");
        assert_eq!(c.secondary_category, "supermarket");
    }

    #[test]
    fn test_amenity_allow_list() {
        let c = classify(&tags(&[("amenity", "cafe")])).unwrap();
        assert_eq!(c.primary_category, "food_service");

        let c = classify(&tags(&[("amenity", "pharmacy")])).unwrap();
        assert_eq!(c.primary_category, "health");

        // amenity values outside the allow-list are not POIs
        assert!(classify(&tags(&[("amenity", "waste_basket")])).is_none());
    }

    #[test]
    fn test_office_tourism_leisure() {
        assert_eq!(
            classify(&tags(&[("office", "it")])).unwrap().primary_category,
            "office"
        );
        assert_eq!(
            classify(&tags(&[("tourism", "hotel")])).unwrap().primary_category,
            "tourism"
        );
        assert_eq!(
            classify(&tags(&[("leisure", "fitness_centre")]))
                .unwrap()
                .primary_category,
            "leisure"
        );
        assert!(classify(&tags(&[("tourism", "information")])).is_none());
    }

    #[test]
    fn test_unmatched_tags_yield_none() {
        assert!(classify(&BTreeMap::new()).is_none());
        assert!(classify(&tags(&[("building", "yes")])).is_none());
        assert!(classify(&tags(&[("natural", "tree")])).is_none());
    }
}
