//! Item-name normalization and the substring match used for lookups.
//!
//! Users type the same item with different casing and spacing ("Milk ",
//! "milk", " MILK"). Every lookup key goes through [`normalize`] so those
//! collapse onto one entry.

/// Trim, lowercase and collapse every whitespace run to a single space.
///
/// No stemming, transliteration or punctuation stripping.
pub fn normalize(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Substring relationship in either direction between two normalized names.
///
/// Cheap and imprecise: `"apple"` matches `"pineapple"`. Empty names never
/// match.
pub fn is_similar(key: &str, query: &str) -> bool {
    if key.is_empty() || query.is_empty() {
        return false;
    }
    key.contains(query) || query.contains(key)
}
