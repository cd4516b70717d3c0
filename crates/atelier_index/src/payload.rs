//! Reference-only point payloads.
//!
//! The index never stores catalog data. A payload carries exactly the keys
//! needed to fetch the authoritative row: `{type, source_table, source_id,
//! search_text, indexed_at}` plus an optional `display_name`. `search_text`
//! is the embedded string kept for debugging - consumers must re-fetch from
//! the catalog by `(source_table, source_id)` instead of reading it.

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};

/// Maximum length of the embedded search string.
pub const SEARCH_TEXT_CAP: usize = 500;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RefPayload {
    #[serde(rename = "type")]
    pub entry_type: String,
    pub source_table: String,
    pub source_id: String,
    pub search_text: String,
    pub indexed_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl RefPayload {
    pub fn new(
        entry_type: impl Into<String>,
        source_table: impl Into<String>,
        source_id: impl Into<String>,
        search_text: impl Into<String>,
    ) -> Self {
        let mut search_text: String = search_text.into();
        if search_text.len() > SEARCH_TEXT_CAP {
            search_text.truncate(truncation_boundary(&search_text, SEARCH_TEXT_CAP));
        }
        Self {
            entry_type: entry_type.into(),
            source_table: source_table.into(),
            source_id: source_id.into(),
            search_text,
            indexed_at: chrono::Utc::now().to_rfc3339(),
            display_name: None,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }
}

fn truncation_boundary(s: &str, cap: usize) -> usize {
    let mut boundary = cap;
    while boundary > 0 && !s.is_char_boundary(boundary) {
        boundary -= 1;
    }
    boundary
}

/// Deterministic point id from table + row id, so a rebuild with the same
/// catalog contents upserts over the same points: the first 12 hex chars of
/// `md5("{table}:{row_id}")` interpreted as an integer.
pub fn point_id(table: &str, row_id: &str) -> u64 {
    let digest = Md5::digest(format!("{table}:{row_id}").as_bytes());
    let hex = format!("{:x}", digest);
    u64::from_str_radix(&hex[..12], 16).expect("12 hex chars always fit u64")
}

/// One point ready for upsert.
#[derive(Debug, Clone, Serialize)]
pub struct IndexPoint {
    pub id: u64,
    pub vector: Vec<f32>,
    pub payload: RefPayload,
}

/// One search hit: a reference back into the catalog, never data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceHit {
    pub source_table: String,
    pub source_id: String,
    #[serde(rename = "type")]
    pub entry_type: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub score: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_id_is_stable() {
        let a = point_id("characters", "42");
        let b = point_id("characters", "42");
        assert_eq!(a, b);
        assert_ne!(a, point_id("characters", "43"));
        assert_ne!(a, point_id("scenes", "42"));
    }

    #[test]
    fn test_search_text_capped() {
        let payload = RefPayload::new("scene", "scenes", "s1", "x".repeat(800));
        assert_eq!(payload.search_text.len(), SEARCH_TEXT_CAP);
    }

    #[test]
    fn test_payload_has_only_reference_keys() {
        let payload = RefPayload::new("character", "characters", "c1", "Kai anime character")
            .with_display_name("Kai");
        let value = serde_json::to_value(&payload).unwrap();
        let keys: Vec<&str> = value.as_object().unwrap().keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            vec![
                "display_name",
                "indexed_at",
                "search_text",
                "source_id",
                "source_table",
                "type",
            ]
        );
    }
}
