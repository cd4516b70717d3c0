//! Deterministic regex pass over a request.
//!
//! This runs before and independently of the LLM; when the collaborator is
//! down, these matches are all the classifier has.

use atelier_protocol::intent::{ContentType, GenerationScope, StylePreference, UrgencyLevel};
use regex::Regex;

/// Compiled pattern library.
pub struct PatternMatcher {
    content_type: Vec<(ContentType, Vec<Regex>)>,
    scope: Vec<(GenerationScope, Vec<Regex>)>,
    style: Vec<(StylePreference, Vec<Regex>)>,
    urgency: Vec<(UrgencyLevel, Vec<Regex>)>,
    name_patterns: Vec<Regex>,
    duration_secs: Regex,
    duration_mins: Regex,
    duration_clock: Regex,
}

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("pattern library regexes are static"))
        .collect()
}

impl PatternMatcher {
    pub fn new() -> Self {
        Self {
            content_type: vec![
                (
                    ContentType::Image,
                    compile(&[
                        r"\b(image|picture|photo|portrait|artwork|design|concept art)\b",
                        r"\b(character design|reference sheet|profile)\b",
                        r"\b(still|static|frame)\b",
                    ]),
                ),
                (
                    ContentType::Video,
                    compile(&[
                        r"\b(video|animation|animated|sequence|episode)\b",
                        r"\b(movie|clip|trailer)\b",
                        r"\b(\d+\s*(second|minute|sec|min))\b",
                        r"\b(movement|walking|fighting|dancing)\b",
                    ]),
                ),
                (
                    ContentType::Audio,
                    compile(&[
                        r"\b(voice|audio|sound|music)\b",
                        r"\b(speak|say|talking|singing)\b",
                    ]),
                ),
            ],
            scope: vec![
                (
                    GenerationScope::CharacterProfile,
                    compile(&[
                        r"\b(character|profile|design|reference|bio)\b",
                        r"\bnamed?\s+\w+\b",
                        r"\b(appearance|looks like|description)\b",
                    ]),
                ),
                (
                    GenerationScope::CharacterScene,
                    compile(&[r"\b\w+\s+(in|at|during|while)\b"]),
                ),
                (
                    GenerationScope::Environment,
                    compile(&[
                        r"\b(background|environment|location|setting|place)\b",
                        r"\b(cityscape|landscape|room|building|forest)\b",
                    ]),
                ),
                (
                    GenerationScope::ActionSequence,
                    compile(&[
                        r"\b(action|fight|battle|chase|combat)\b",
                        r"\b(fighting|running|jumping|attacking)\b",
                    ]),
                ),
                (
                    GenerationScope::DialogueScene,
                    compile(&[
                        r"\b(dialogue|conversation|talking|speaking)\b",
                        r"\b(says?|speaks?|tells?)\b",
                    ]),
                ),
                (
                    GenerationScope::FullEpisode,
                    compile(&[
                        r"\b(episode|full|complete|story)\b",
                        r"\b(\d+\s*minute|long|series)\b",
                    ]),
                ),
                (
                    GenerationScope::BatchGeneration,
                    compile(&[r"\b(batch|multiple|collection|set of)\b"]),
                ),
            ],
            style: vec![
                (
                    StylePreference::PhotorealisticAnime,
                    compile(&[
                        r"\b(photorealistic|realistic|lifelike)\b",
                        r"\b(3d|rendered)\b",
                    ]),
                ),
                (
                    StylePreference::TraditionalAnime,
                    compile(&[
                        r"\b(anime|manga|japanese)\b",
                        r"\b(2d|cel.?shaded)\b",
                    ]),
                ),
                (
                    StylePreference::Cartoon,
                    compile(&[r"\b(cartoon|western|disney|pixar)\b"]),
                ),
                (
                    StylePreference::Artistic,
                    compile(&[r"\b(artistic|experimental|abstract)\b"]),
                ),
                (
                    StylePreference::Chibi,
                    compile(&[r"\b(chibi|kawaii)\b"]),
                ),
                (
                    StylePreference::Cinematic,
                    compile(&[r"\b(cinematic|film|dramatic)\b"]),
                ),
                (
                    StylePreference::Sketch,
                    compile(&[r"\b(sketch|hand.?drawn|lineart)\b"]),
                ),
            ],
            urgency: vec![
                (
                    UrgencyLevel::Immediate,
                    compile(&[r"\b(now|immediately|asap|right away)\b"]),
                ),
                (
                    UrgencyLevel::Urgent,
                    compile(&[r"\b(urgent|soon|quickly|within.*hour)\b"]),
                ),
                (
                    UrgencyLevel::Scheduled,
                    compile(&[r"\b(schedule|later|tomorrow|tonight)\b"]),
                ),
                (
                    UrgencyLevel::BatchProcessing,
                    compile(&[r"\b(batch|overnight|whenever)\b"]),
                ),
            ],
            name_patterns: compile(&[
                r"\b(?:character|person)\s+named\s+([A-Z]\w+)",
                r"\b([A-Z][a-z]{2,}(?:\s+[A-Z][a-z]+)?)\s+(?:with|having|in|standing|sitting|fighting)\b",
                r"\bof\s+([A-Z][a-z]{2,})\b",
            ]),
            duration_secs: Regex::new(r"(\d+)\s*(?:second|sec)s?\b").unwrap(),
            duration_mins: Regex::new(r"(\d+)\s*(?:minute|min)s?\b").unwrap(),
            duration_clock: Regex::new(r"\b(\d+):(\d{2})\b").unwrap(),
        }
    }

    fn matched<T: Copy>(table: &[(T, Vec<Regex>)], text: &str) -> Vec<T> {
        let mut hits = Vec::new();
        for (value, patterns) in table {
            if patterns.iter().any(|p| p.is_match(text)) {
                hits.push(*value);
            }
        }
        hits
    }

    pub fn content_types(&self, text: &str) -> Vec<ContentType> {
        Self::matched(&self.content_type, &text.to_lowercase())
    }

    pub fn scopes(&self, text: &str) -> Vec<GenerationScope> {
        Self::matched(&self.scope, &text.to_lowercase())
    }

    pub fn styles(&self, text: &str) -> Vec<StylePreference> {
        Self::matched(&self.style, &text.to_lowercase())
    }

    pub fn urgencies(&self, text: &str) -> Vec<UrgencyLevel> {
        Self::matched(&self.urgency, &text.to_lowercase())
    }

    /// Capitalized-word heuristics for character names. Case matters here,
    /// so this runs on the raw text.
    pub fn character_names(&self, text: &str) -> Vec<String> {
        const STOPWORDS: &[&str] = &[
            "The", "This", "That", "Create", "Generate", "Make", "Draw", "Render", "Show",
            "Give", "Please", "With", "And", "For", "Video", "Image", "Scene", "Character",
        ];
        let mut names = Vec::new();
        for pattern in &self.name_patterns {
            for captures in pattern.captures_iter(text) {
                if let Some(name) = captures.get(1) {
                    let name = name.as_str().trim().to_string();
                    if name.len() > 2
                        && !STOPWORDS.contains(&name.as_str())
                        && !names.contains(&name)
                    {
                        names.push(name);
                    }
                }
            }
        }
        names
    }

    /// Duration in seconds, from "15 seconds", "2 minutes", or "1:30".
    pub fn duration_seconds(&self, text: &str) -> Option<u32> {
        let text = text.to_lowercase();
        if let Some(captures) = self.duration_clock.captures(&text) {
            let minutes: u32 = captures[1].parse().ok()?;
            let seconds: u32 = captures[2].parse().ok()?;
            return Some(minutes * 60 + seconds);
        }
        if let Some(captures) = self.duration_mins.captures(&text) {
            let minutes: u32 = captures[1].parse().ok()?;
            return Some(minutes * 60);
        }
        if let Some(captures) = self.duration_secs.captures(&text) {
            return captures[1].parse().ok();
        }
        None
    }
}

impl Default for PatternMatcher {
    fn default() -> Self {
        Self::new()
    }
}
