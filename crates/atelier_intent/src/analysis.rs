//! Contextual analysis - a deeper, structured look at one request.

use crate::patterns::PatternMatcher;
use atelier_echo::{extract_json, EchoClient, EchoQuery};
use atelier_protocol::intent::{CharacterEntity, ContextualAnalysis};
use std::time::Duration;
use tracing::warn;

const ANALYSIS_TIMEOUT: Duration = Duration::from_secs(60);

/// Ask the LLM for a structured analysis of the prompt; degrade to pattern
/// heuristics when it is unavailable or answers with prose.
pub async fn perform_contextual_analysis(
    echo: Option<&EchoClient>,
    patterns: &PatternMatcher,
    user_prompt: &str,
) -> ContextualAnalysis {
    if let Some(echo) = echo {
        let query = EchoQuery::new(
            format!(
                "Analyze this generation request. Answer with JSON containing \
                 intent_confidence (0-1), semantic_categories (array), \
                 character_entities (array of {{name, physical_description, \
                 personality_traits, role, relationships, confidence, \
                 context_clues}}), scene_elements, artistic_style_indicators, \
                 temporal_indicators, quality_indicators, complexity_markers, \
                 ambiguity_points, suggested_clarifications.\n\n\
                 Request: {user_prompt}"
            ),
            "contextual-analysis",
        );
        match echo.query(&query, ANALYSIS_TIMEOUT).await {
            Ok(response) => {
                if let Some(value) = extract_json(&response.response) {
                    if let Ok(analysis) = serde_json::from_value::<ContextualAnalysis>(value) {
                        return analysis;
                    }
                }
                warn!("Contextual analysis answer did not match the schema");
            }
            Err(e) => warn!("Contextual analysis LLM call failed: {}", e),
        }
    }

    heuristic_analysis(patterns, user_prompt)
}

/// Pattern-only analysis used when the collaborator is down.
pub fn heuristic_analysis(patterns: &PatternMatcher, user_prompt: &str) -> ContextualAnalysis {
    let semantic_categories: Vec<String> = patterns
        .content_types(user_prompt)
        .iter()
        .map(|ct| ct.as_str().to_string())
        .collect();
    let artistic_style_indicators: Vec<String> = patterns
        .styles(user_prompt)
        .iter()
        .map(|s| s.as_str().to_string())
        .collect();
    let character_entities: Vec<CharacterEntity> = patterns
        .character_names(user_prompt)
        .into_iter()
        .map(|name| CharacterEntity {
            name,
            confidence: 0.5,
            context_clues: vec!["capitalized word heuristic".to_string()],
            ..Default::default()
        })
        .collect();
    let temporal_indicators = patterns
        .duration_seconds(user_prompt)
        .map(|d| vec![format!("{d}s")])
        .unwrap_or_default();

    let word_count = user_prompt.split_whitespace().count();
    let mut ambiguity_points = Vec::new();
    let mut suggested_clarifications = Vec::new();
    if word_count < 4 {
        ambiguity_points.push("very short prompt".to_string());
        suggested_clarifications
            .push("Describe the subject, setting, and style you want".to_string());
    }

    ContextualAnalysis {
        intent_confidence: if semantic_categories.is_empty() { 0.3 } else { 0.6 },
        semantic_categories,
        character_entities,
        scene_elements: Vec::new(),
        artistic_style_indicators,
        temporal_indicators,
        quality_indicators: Vec::new(),
        complexity_markers: Vec::new(),
        ambiguity_points,
        suggested_clarifications,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_heuristic_analysis_without_llm() {
        let patterns = PatternMatcher::new();
        let analysis =
            perform_contextual_analysis(None, &patterns, "a 12 second video of Mira dancing")
                .await;
        assert!(analysis.semantic_categories.contains(&"video".to_string()));
        assert_eq!(analysis.character_entities.len(), 1);
        assert_eq!(analysis.character_entities[0].name, "Mira");
        assert_eq!(analysis.temporal_indicators, vec!["12s"]);
    }

    #[test]
    fn test_short_prompt_flagged() {
        let patterns = PatternMatcher::new();
        let analysis = heuristic_analysis(&patterns, "draw something");
        assert!(!analysis.ambiguity_points.is_empty());
    }
}
