// src/tags.rs
//
// Normalizes raw heterogeneous tag payloads into a flat string-to-string
// mapping. Source payloads arrive in three shapes: an already-flat object,
// an envelope whose `tags` member holds the real mapping (sometimes as a
// JSON-encoded string), or garbage. Unparseable input yields an empty map,
// never an error — "no tags" is a valid, non-fatal outcome for callers.

use std::collections::BTreeMap;

use serde_json::Value;

/// Shape of a raw tag payload at the ingestion boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum RawTagPayload {
    /// Flat object of scalar values
    Flat(BTreeMap<String, String>),
    /// Envelope or partially-structured object; normalized on demand
    Nested(Value),
    /// Anything that is not a JSON object (after at most one decode)
    Unparseable,
}

impl RawTagPayload {
    /// Classifies a JSON value into one of the three payload shapes.
    /// A string value gets one decode attempt before classification.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(ref map) => {
                let all_scalar = map.values().all(is_scalar);
                if all_scalar && !map.contains_key("tags") {
                    Self::Flat(scalar_entries(map))
                } else {
                    Self::Nested(value)
                }
            }
            Value::String(s) => match serde_json::from_str::<Value>(&s) {
                Ok(inner @ Value::Object(_)) => Self::from_value(inner),
                _ => Self::Unparseable,
            },
            _ => Self::Unparseable,
        }
    }

    /// Flattens the payload into one canonical string-to-string mapping.
    ///
    /// For envelopes, outer scalar fields are kept and the inner `tags`
    /// mapping is overlaid on top (inner wins on key conflict). Values that
    /// are neither scalars nor the `tags` envelope member are dropped.
    pub fn normalize(&self) -> BTreeMap<String, String> {
        match self {
            Self::Flat(map) => map.clone(),
            Self::Nested(value) => {
                let mut flat = BTreeMap::new();
                if let Value::Object(map) = value {
                    for (key, val) in map {
                        if key == "tags" {
                            continue;
                        }
                        if let Some(s) = scalar_to_string(val) {
                            flat.insert(key.clone(), s);
                        }
                    }
                    if let Some(inner) = map.get("tags") {
                        for (key, val) in decode_inner_tags(inner) {
                            flat.insert(key, val);
                        }
                    }
                }
                flat
            }
            Self::Unparseable => BTreeMap::new(),
        }
    }
}

/// Decodes the `tags` member of an envelope: either an object, or a
/// JSON-encoded string of an object (the double-encoded case).
fn decode_inner_tags(inner: &Value) -> BTreeMap<String, String> {
    match inner {
        Value::Object(map) => scalar_entries(map),
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(Value::Object(map)) => scalar_entries(&map),
            _ => BTreeMap::new(),
        },
        _ => BTreeMap::new(),
    }
}

fn scalar_entries(map: &serde_json::Map<String, Value>) -> BTreeMap<String, String> {
    map.iter()
        .filter_map(|(k, v)| scalar_to_string(v).map(|s| (k.clone(), s)))
        .collect()
}

fn is_scalar(value: &Value) -> bool {
    matches!(value, Value::String(_) | Value::Number(_) | Value::Bool(_))
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Extracts the entity name: the dedicated name field wins, the `name` tag
/// is the fallback. Empty and whitespace-only values count as absent.
pub fn extract_name(
    name_field: Option<&str>,
    tags: &BTreeMap<String, String>,
) -> Option<String> {
    name_field
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .or_else(|| {
            tags.get("name")
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        })
}

/// Trims and collapses internal whitespace; the standardized form stored on
/// classified entities (matching applies its own, stronger normalization).
pub fn standardize_name(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flat_payload_passes_through() {
        let payload = RawTagPayload::from_value(json!({
            "shop": "supermarket",
            "name": "ATB",
            "levels": 2,
        }));
        let tags = payload.normalize();
        assert_eq!(tags.get("shop").map(String::as_str), Some("supermarket"));
        assert_eq!(tags.get("name").map(String::as_str), Some("ATB"));
        assert_eq!(tags.get("levels").map(String::as_str), Some("2"));
    }

    #[test]
    fn test_envelope_with_inner_object() {
        let payload = RawTagPayload::from_value(json!({
            "osm_id": 42,
            "tags": {"highway": "bus_stop", "shelter": "yes"},
        }));
        assert!(matches!(payload, RawTagPayload::Nested(_)));
        let tags = payload.normalize();
        assert_eq!(tags.get("highway").map(String::as_str), Some("bus_stop"));
        assert_eq!(tags.get("shelter").map(String::as_str), Some("yes"));
        assert_eq!(tags.get("osm_id").map(String::as_str), Some("42"));
    }

    #[test]
    fn test_double_encoded_inner_tags() {
        let payload = RawTagPayload::from_value(json!({
            "tags": "{\"amenity\": \"cafe\", \"name\": \"Корица\"}",
        }));
        let tags = payload.normalize();
        assert_eq!(tags.get("amenity").map(String::as_str), Some("cafe"));
        assert_eq!(tags.get("name").map(String::as_str), Some("Корица"));
    }

    #[test]
    fn test_double_encoded_whole_payload() {
        let encoded = serde_json::to_string(&json!({"shop": "bakery"})).unwrap();
        let payload = RawTagPayload::from_value(Value::String(encoded));
        let tags = payload.normalize();
        assert_eq!(tags.get("shop").map(String::as_str), Some("bakery"));
    }

    #[test]
    fn test_inner_wins_on_key_conflict() {
        let payload = RawTagPayload::from_value(json!({
            "name": "outer",
            "tags": {"name": "inner"},
        }));
        let tags = payload.normalize();
        assert_eq!(tags.get("name").map(String::as_str), Some("inner"));
    }

    #[test]
    fn test_garbage_yields_empty_mapping() {
        for garbage in [json!(null), json!([1, 2, 3]), json!(7), json!("not json at all")] {
            let payload = RawTagPayload::from_value(garbage);
            assert_eq!(payload, RawTagPayload::Unparseable);
            assert!(payload.normalize().is_empty());
        }
    }

    #[test]
    fn test_nested_non_envelope_values_dropped() {
        let payload = RawTagPayload::from_value(json!({
            "shop": "kiosk",
            "geometry": {"type": "Point"},
        }));
        let tags = payload.normalize();
        assert_eq!(tags.get("shop").map(String::as_str), Some("kiosk"));
        assert!(!tags.contains_key("geometry"));
    }

    #[test]
    fn test_extract_name_prefers_dedicated_field() {
        let mut tags = BTreeMap::new();
        tags.insert("name".to_string(), "Tag Name".to_string());
        assert_eq!(
            extract_name(Some("Field Name"), &tags),
            Some("Field Name".to_string())
        );
        assert_eq!(extract_name(None, &tags), Some("Tag Name".to_string()));
        assert_eq!(extract_name(Some("   "), &tags), Some("Tag Name".to_string()));
        assert_eq!(extract_name(None, &BTreeMap::new()), None);
    }

    #[test]
    fn test_standardize_name_collapses_whitespace() {
        assert_eq!(standardize_name("  АТБ   маркет \t№7 "), "АТБ маркет №7");
    }
}
