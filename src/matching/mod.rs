// src/matching/mod.rs
//
// Brand Matcher: four ranked strategies tried strictly in priority order.
// The first strategy producing a result at or above its own floor wins;
// nothing is blended across strategies.

pub mod exact;
pub mod fuzzy;
pub mod keyword;
pub mod manager;
pub mod tag;

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

/// Tag keys that can carry a brand identity directly
pub const BRAND_TAG_KEYS: [&str; 4] = ["brand", "brand:en", "brand:uk", "operator"];

/// Normalizes a name for matching: lowercase, apostrophes removed,
/// punctuation to spaces, whitespace collapsed. Keeps all alphanumerics, so
/// Cyrillic names survive intact.
pub fn normalize_name(name: &str) -> String {
    let lowered = name.to_lowercase().replace(['\'', '’', '`'], "");
    let spaced: String = lowered
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    spaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Digest of the brand-relevant tag values, used in the matcher cache key so
/// identical names with different brand/operator tags cache separately.
pub fn tag_signature(tags: &BTreeMap<String, String>) -> String {
    let mut hasher = Sha256::new();
    for key in BRAND_TAG_KEYS {
        if let Some(value) = tags.get(key) {
            hasher.update(format!("{}:{}", key, value).as_bytes());
        }
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("  АТБ-Маркет №7 "), "атб маркет 7");
        assert_eq!(normalize_name("McDonald's"), "mcdonalds");
        assert_eq!(normalize_name("SILPO/Фора"), "silpo фора");
        assert_eq!(normalize_name(""), "");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let once = normalize_name("Нова Пошта №12");
        assert_eq!(normalize_name(&once), once);
    }

    #[test]
    fn test_tag_signature_depends_only_on_brand_keys() {
        let mut a = BTreeMap::new();
        a.insert("brand".to_string(), "АТБ".to_string());
        a.insert("shop".to_string(), "supermarket".to_string());

        let mut b = BTreeMap::new();
        b.insert("brand".to_string(), "АТБ".to_string());
        b.insert("shop".to_string(), "convenience".to_string());

        // Non-brand keys do not affect the signature
        assert_eq!(tag_signature(&a), tag_signature(&b));

        b.insert("operator".to_string(), "Сільпо".to_string());
        assert_ne!(tag_signature(&a), tag_signature(&b));
    }
}
