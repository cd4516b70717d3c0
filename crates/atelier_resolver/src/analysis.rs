//! Lightweight content analysis of a generation prompt.

use serde::Serialize;

/// Scene-type keyword table, first match wins.
const SCENE_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "action",
        &[
            "fight", "battle", "combat", "attack", "slash", "punch", "explosion", "chase",
            "duel", "clash",
        ],
    ),
    (
        "romantic",
        &[
            "romantic", "love", "kiss", "embrace", "tender", "intimate", "date", "confession",
            "blush",
        ],
    ),
    (
        "dialogue",
        &[
            "talking", "conversation", "discuss", "argue", "meeting", "negotiate", "confront",
        ],
    ),
    (
        "establishing",
        &[
            "city", "landscape", "skyline", "overview", "panorama", "environment", "setting",
        ],
    ),
];

const STYLE_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "cyberpunk",
        &[
            "cyberpunk", "neon", "cyber", "futuristic", "dystopian", "hologram", "augmented",
            "cybernetic",
        ],
    ),
    (
        "photorealistic",
        &["photorealistic", "realistic", "photo", "lifelike"],
    ),
    ("anime", &["anime", "manga", "cel-shaded", "2d", "hand-drawn"]),
];

const LOCATION_KEYWORDS: &[&str] = &[
    "rooftop", "alley", "street", "forest", "beach", "classroom", "dojo", "bridge", "harbor",
    "temple",
];

const STOPWORDS: &[&str] = &[
    "generate", "create", "make", "show", "draw", "render", "scene", "with", "from", "the",
    "and", "video", "image", "standing",
];

/// What the keyword pass extracted from a prompt.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ContentAnalysis {
    pub raw_prompt: String,
    pub keywords: Vec<String>,
    /// Capitalized words that look like character names.
    pub character_names: Vec<String>,
    pub scene_type: String,
    pub style: String,
    pub location: Option<String>,
}

/// Parse a request into structured generation requirements.
pub fn analyze(prompt: &str) -> ContentAnalysis {
    let lower = prompt.to_lowercase();

    let scene_type = SCENE_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(name, _)| name.to_string())
        .unwrap_or_else(|| "general".to_string());

    let style = STYLE_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(name, _)| name.to_string())
        .unwrap_or_else(|| "anime".to_string());

    let location = LOCATION_KEYWORDS
        .iter()
        .find(|k| lower.contains(*k))
        .map(|k| k.to_string());

    let mut character_names = Vec::new();
    let mut keywords = Vec::new();
    for word in prompt.split_whitespace() {
        let cleaned = word.trim_matches(|c: char| !c.is_alphanumeric());
        if cleaned.len() <= 2 {
            continue;
        }
        let cleaned_lower = cleaned.to_lowercase();
        if STOPWORDS.contains(&cleaned_lower.as_str()) {
            continue;
        }
        if cleaned.chars().next().is_some_and(|c| c.is_uppercase())
            && !character_names.contains(&cleaned.to_string())
        {
            character_names.push(cleaned.to_string());
        }
        if cleaned.len() > 3 && !keywords.contains(&cleaned_lower) {
            keywords.push(cleaned_lower);
        }
    }

    ContentAnalysis {
        raw_prompt: prompt.to_string(),
        keywords,
        character_names,
        scene_type,
        style,
        location,
    }
}
