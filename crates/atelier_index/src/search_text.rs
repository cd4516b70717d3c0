//! Curated search-text builders.
//!
//! What gets embedded is a compact search string, not the full record.
//! Known tables get hand-tuned builders; anything else falls back to
//! concatenating whatever text fields the row exposes.

use atelier_protocol::{Character, Episode, GenerationStyle, Scene};

fn push_trimmed(parts: &mut Vec<String>, value: Option<&str>, cap: usize) {
    if let Some(value) = value {
        let value = value.trim();
        if !value.is_empty() {
            let mut text = value.to_string();
            if text.len() > cap {
                let mut boundary = cap;
                while boundary > 0 && !text.is_char_boundary(boundary) {
                    boundary -= 1;
                }
                text.truncate(boundary);
            }
            parts.push(text);
        }
    }
}

/// Character rows get an "anime character" prefix for better matching.
pub fn character_search_text(character: &Character) -> String {
    let mut parts = vec![format!("{} anime character", character.name)];
    push_trimmed(&mut parts, character.description.as_deref(), 200);
    push_trimmed(&mut parts, character.design_prompt.as_deref(), 200);
    push_trimmed(&mut parts, character.personality.as_deref(), 200);
    push_trimmed(&mut parts, character.role.as_deref(), 200);
    push_trimmed(&mut parts, character.appearance.hair.as_deref(), 100);
    push_trimmed(&mut parts, character.appearance.clothing.as_deref(), 100);
    parts.join(" ")
}

pub fn scene_search_text(scene: &Scene) -> String {
    let mut parts = Vec::new();
    match scene.title.as_deref() {
        Some(title) if !title.trim().is_empty() => {
            parts.push(format!("anime scene {}", title.trim()))
        }
        _ => parts.push(format!("anime scene {}", scene.scene_number)),
    }
    push_trimmed(&mut parts, scene.description.as_deref(), 200);
    push_trimmed(&mut parts, scene.location.as_deref(), 100);
    push_trimmed(&mut parts, scene.mood.as_deref(), 100);
    push_trimmed(&mut parts, scene.narrative_text.as_deref(), 200);
    parts.join(" ")
}

pub fn style_search_text(style: &GenerationStyle) -> String {
    let mut parts = vec![format!("generation style {}", style.name)];
    push_trimmed(&mut parts, Some(&style.checkpoint), 100);
    push_trimmed(&mut parts, Some(&style.positive_prompt), 200);
    parts.join(" ")
}

pub fn episode_search_text(episode: &Episode) -> String {
    let mut parts = vec![format!("anime episode {}", episode.title)];
    push_trimmed(&mut parts, episode.description.as_deref(), 300);
    parts.join(" ")
}

/// Fallback for tables without a curated builder: join every discoverable
/// string value of the row.
pub fn auto_search_text(table: &str, row: &serde_json::Value) -> String {
    let mut parts = vec![format!("{table}:")];
    if let Some(object) = row.as_object() {
        for (key, value) in object {
            if let Some(text) = value.as_str() {
                if !text.trim().is_empty() && key != "id" {
                    push_trimmed(&mut parts, Some(text), 300);
                }
            }
        }
    }
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_character_text_leads_with_name() {
        let character = Character {
            id: "c1".to_string(),
            project_id: "p1".to_string(),
            name: "Kai".to_string(),
            slug: "kai".to_string(),
            description: Some("wandering swordsman".to_string()),
            design_prompt: None,
            appearance: Default::default(),
            personality: None,
            personality_tags: vec![],
            background: None,
            role: None,
            relationships: Default::default(),
            voice_profile: Default::default(),
            lora_path: None,
            lora_trigger: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let text = character_search_text(&character);
        assert!(text.starts_with("Kai anime character"));
        assert!(text.contains("wandering swordsman"));
    }

    #[test]
    fn test_auto_text_skips_id() {
        let row = serde_json::json!({"id": "x9", "note": "rainy rooftop", "count": 3});
        let text = auto_search_text("props", &row);
        assert!(text.starts_with("props:"));
        assert!(text.contains("rainy rooftop"));
        assert!(!text.contains("x9"));
    }
}
