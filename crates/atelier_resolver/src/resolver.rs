//! Resource resolver - turns a prompt into a concrete generation plan.
//!
//! The SSOT contract in practice: characters come from the catalog store
//! directly (name lookup is not something the vector index can be trusted
//! with); the index contributes scene context only, and every reference it
//! returns is re-fetched from the catalog before use.

use crate::analysis::{analyze, ContentAnalysis};
use atelier_catalog::CatalogStore;
use atelier_index::{ReferenceHit, ReferenceIndex};
use atelier_protocol::{Character, CoreError, CoreResult, LoraSpec, Scene, DEFAULT_LORA_STRENGTH};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Scene-context hits requested from the reference index.
const SCENE_SEARCH_LIMIT: usize = 5;
/// Character-description fields folded into the prompt, per character.
const MAX_CHAR_FIELDS: usize = 4;
/// Per-field character-description cap.
const CHAR_FIELD_CAP: usize = 150;

const QUALITY_TOKENS: &str = "masterpiece, best quality, high resolution, detailed";
const NEGATIVE_BASE: &str = "lowres, bad anatomy, bad hands, text, error, missing fingers, \
     extra digit, fewer digits, cropped, worst quality, low quality, jpeg artifacts, \
     signature, watermark";

/// Workflow files preferred per scene type, most specific first.
const SCENE_WORKFLOWS: &[(&str, &[&str])] = &[
    (
        "action",
        &[
            "anime_30sec_rife_workflow_with_lora.json",
            "action_combat_workflow.json",
        ],
    ),
    (
        "romantic",
        &[
            "anime_30sec_rife_workflow_with_lora.json",
            "anime_30sec_working_workflow.json",
        ],
    ),
    (
        "dialogue",
        &[
            "anime_30sec_working_workflow.json",
            "anime_30sec_fixed_workflow.json",
        ],
    ),
    (
        "general",
        &[
            "anime_30sec_rife_workflow_with_lora.json",
            "anime_30sec_working_workflow.json",
        ],
    ),
];

/// Checkpoint candidates per style, first existing file wins.
const STYLE_MODELS: &[(&str, &[&str])] = &[
    (
        "cyberpunk",
        &["cyberpunk_anime_v2.safetensors", "counterfeit_v3.safetensors"],
    ),
    (
        "photorealistic",
        &["realisticvision_v51.safetensors", "counterfeit_v3.safetensors"],
    ),
    (
        "anime",
        &[
            "counterfeit_v3.safetensors",
            "anything_v5.safetensors",
            "AOM3A1B.safetensors",
        ],
    ),
];

/// Style LoRAs appended after character LoRAs.
const STYLE_LORAS: &[(&str, &[(&str, f64)])] =
    &[("cyberpunk", &[("cyberpunk_style_proper.safetensors", 0.6)])];

/// Fresh rows re-fetched from the catalog for this plan.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FreshData {
    pub characters: Vec<Character>,
    pub scenes: Vec<Scene>,
}

/// The concrete resource selection.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResourceSelection {
    pub workflow_file: Option<String>,
    pub checkpoint: Option<String>,
    pub loras: Vec<LoraSpec>,
    pub positive_prompt: String,
    pub negative_prompt: String,
    pub width: u32,
    pub height: u32,
    pub steps: u32,
    pub cfg_scale: f64,
    /// One human-readable line per decision.
    pub reasoning: Vec<String>,
}

/// Everything the job pipeline needs to run a generation.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationPlan {
    pub analysis: ContentAnalysis,
    pub references: Vec<ReferenceHit>,
    pub fresh_data: FreshData,
    pub resources: ResourceSelection,
    pub warnings: Vec<String>,
}

/// Filesystem roots consulted for workflows, checkpoints, and LoRAs.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    pub workflow_dir: PathBuf,
    pub checkpoint_dir: PathBuf,
    pub lora_dirs: Vec<PathBuf>,
}

pub struct ResourceResolver {
    catalog: CatalogStore,
    index: Option<ReferenceIndex>,
    config: ResolverConfig,
}

impl ResourceResolver {
    pub fn new(catalog: CatalogStore, index: Option<ReferenceIndex>, config: ResolverConfig) -> Self {
        Self {
            catalog,
            index,
            config,
        }
    }

    /// Build a complete generation plan for a prompt.
    pub async fn plan(&self, user_prompt: &str) -> CoreResult<GenerationPlan> {
        let analysis = analyze(user_prompt);
        let mut warnings = Vec::new();

        // Characters: catalog only, case-insensitive, exact match boosted.
        let mut characters: Vec<Character> = Vec::new();
        for name in &analysis.character_names {
            let hits = self
                .catalog
                .characters()
                .search_by_name(name, 3)
                .await
                .map_err(CoreError::from)?;
            if let Some(hit) = hits.into_iter().next() {
                if !characters.iter().any(|c| c.id == hit.id) {
                    info!("Direct character match: {} (slug {})", hit.name, hit.slug);
                    characters.push(hit);
                }
            }
        }
        if characters.is_empty() && !analysis.character_names.is_empty() {
            warnings.push(format!(
                "no catalog characters matched {:?}",
                analysis.character_names
            ));
        }

        // Scene context: the index contributes references only.
        let references = match &self.index {
            Some(index) => match index
                .search(user_prompt, SCENE_SEARCH_LIMIT, Some("scene"))
                .await
            {
                Ok(hits) => hits,
                Err(e) => {
                    warn!("Reference index unavailable: {}", e);
                    warnings.push("reference index unavailable; planning without scene context".to_string());
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        // Re-fetch every reference from the catalog, one pass per table.
        let mut scenes = Vec::new();
        for hit in references.iter().filter(|h| h.source_table == "scenes") {
            match self.catalog.scenes().get_scene(&hit.source_id).await {
                Ok(Some(scene)) => scenes.push(scene),
                Ok(None) => warnings.push(format!("stale index reference: scenes/{}", hit.source_id)),
                Err(e) => return Err(e.into()),
            }
        }

        let fresh_data = FreshData { characters, scenes };
        let resources = self.select_resources(&analysis, &fresh_data, &mut warnings);

        Ok(GenerationPlan {
            analysis,
            references,
            fresh_data,
            resources,
            warnings,
        })
    }

    fn select_resources(
        &self,
        analysis: &ContentAnalysis,
        fresh: &FreshData,
        warnings: &mut Vec<String>,
    ) -> ResourceSelection {
        let mut sel = ResourceSelection {
            width: 512,
            height: 768,
            steps: 20,
            cfg_scale: 7.0,
            ..Default::default()
        };

        // --- Workflow file ---
        let candidates = SCENE_WORKFLOWS
            .iter()
            .find(|(scene, _)| *scene == analysis.scene_type)
            .or_else(|| SCENE_WORKFLOWS.iter().find(|(scene, _)| *scene == "general"))
            .map(|(_, files)| *files)
            .unwrap_or(&[]);
        for file in candidates {
            if self.config.workflow_dir.join(file).is_file() {
                sel.workflow_file = Some(file.to_string());
                sel.reasoning
                    .push(format!("Workflow: {file} (best for {} scenes)", analysis.scene_type));
                break;
            }
        }
        if sel.workflow_file.is_none() {
            if let Some(file) = first_json_file(&self.config.workflow_dir) {
                sel.reasoning.push(format!("Workflow: {file} (fallback)"));
                sel.workflow_file = Some(file);
            } else {
                warnings.push("no workflow file found on disk".to_string());
            }
        }

        // --- Checkpoint ---
        let candidates = STYLE_MODELS
            .iter()
            .find(|(style, _)| *style == analysis.style)
            .or_else(|| STYLE_MODELS.iter().find(|(style, _)| *style == "anime"))
            .map(|(_, models)| *models)
            .unwrap_or(&[]);
        for model in candidates {
            if self.config.checkpoint_dir.join(model).is_file() {
                sel.checkpoint = Some(model.to_string());
                sel.reasoning
                    .push(format!("Model: {model} (optimized for {} style)", analysis.style));
                break;
            }
        }
        if sel.checkpoint.is_none() {
            warnings.push("no checkpoint found for requested style".to_string());
        }

        // --- LoRAs: character rows are the only source of character LoRAs ---
        for character in &fresh.characters {
            let Some(lora_path) = character.lora_path.as_deref() else {
                continue;
            };
            if sel.loras.iter().any(|l| l.name == lora_path) {
                sel.reasoning
                    .push(format!("LoRA {lora_path} already added ({})", character.name));
                continue;
            }
            if self.lora_exists(lora_path) {
                let mut lora = LoraSpec::new(lora_path);
                if let Some(trigger) = character.lora_trigger.as_deref() {
                    lora = lora.with_trigger(trigger);
                }
                sel.reasoning.push(format!(
                    "LoRA: {lora_path} @ {DEFAULT_LORA_STRENGTH} (character: {}, trigger: {:?})",
                    character.name, character.lora_trigger
                ));
                sel.loras.push(lora);
            } else {
                warnings.push(format!(
                    "{} has LoRA {lora_path} in the catalog but the file is missing",
                    character.name
                ));
            }
        }

        if let Some((_, style_loras)) = STYLE_LORAS
            .iter()
            .find(|(style, _)| *style == analysis.style)
        {
            for (file, strength) in *style_loras {
                if self.lora_exists(file) && !sel.loras.iter().any(|l| l.name == *file) {
                    sel.loras.push(LoraSpec {
                        name: file.to_string(),
                        strength: *strength,
                        trigger: None,
                    });
                    sel.reasoning
                        .push(format!("LoRA: {file} @ {strength} (style: {})", analysis.style));
                }
            }
        }

        if sel.loras.is_empty() && !fresh.characters.is_empty() {
            warnings.push("no LoRA selected for matched characters".to_string());
        }

        self.build_prompts(analysis, fresh, &mut sel);
        sel
    }

    fn build_prompts(
        &self,
        analysis: &ContentAnalysis,
        fresh: &FreshData,
        sel: &mut ResourceSelection,
    ) {
        let mut parts: Vec<String> = vec![QUALITY_TOKENS.to_string()];
        let mut negative: Vec<String> = vec![NEGATIVE_BASE.to_string()];

        // LoRA triggers come right after the quality tokens - the adapters
        // never activate without them.
        let triggers: Vec<String> = sel
            .loras
            .iter()
            .filter_map(|l| l.trigger.clone())
            .collect();
        if !triggers.is_empty() {
            sel.reasoning
                .push(format!("Added LoRA triggers: {}", triggers.join(", ")));
            parts.extend(triggers);
        }

        // One phrase per character, from fresh catalog fields.
        for character in &fresh.characters {
            let mut fields: Vec<String> = Vec::new();
            let mut push_field = |value: Option<String>| {
                if fields.len() >= MAX_CHAR_FIELDS {
                    return;
                }
                if let Some(value) = value {
                    let trimmed = value.trim();
                    if !trimmed.is_empty() {
                        fields.push(cap(trimmed, CHAR_FIELD_CAP));
                    }
                }
            };
            push_field(character.design_prompt.clone());
            push_field(character.description.clone());
            push_field(appearance_summary(character));
            push_field(character.personality.clone());

            if !fields.is_empty() {
                parts.push(fields.join(", "));
                sel.reasoning.push(format!(
                    "Prompt includes fresh catalog data for {}",
                    character.name
                ));
            }
        }

        // One phrase per selected scene.
        for scene in &fresh.scenes {
            let phrase = scene
                .description
                .as_deref()
                .or(scene.narrative_text.as_deref())
                .or(scene.location.as_deref());
            if let Some(phrase) = phrase {
                let trimmed = phrase.trim();
                if !trimmed.is_empty() {
                    parts.push(cap(trimmed, 200));
                    sel.reasoning
                        .push(format!("Prompt includes scene context (scene {})", scene.id));
                }
            }
        }

        // Style-conditional tokens.
        match analysis.style.as_str() {
            "cyberpunk" => parts.extend(
                ["cyberpunk aesthetic", "neon lights", "dark atmosphere", "futuristic technology"]
                    .map(String::from),
            ),
            "photorealistic" => {
                parts.extend(["photorealistic", "8k uhd", "studio lighting"].map(String::from))
            }
            _ => {}
        }

        // Scene-conditional tokens.
        match analysis.scene_type.as_str() {
            "action" => {
                parts.extend(["dynamic pose", "motion blur", "intense action"].map(String::from));
                negative.push("static pose, standing still, calm expression".to_string());
            }
            "romantic" => {
                parts.extend(["warm lighting", "soft focus", "emotional"].map(String::from));
                negative.push("cold, harsh, violent, aggressive".to_string());
            }
            _ => {}
        }

        if let Some(location) = &analysis.location {
            parts.push(location.clone());
        }

        sel.positive_prompt = parts.join(", ");
        sel.negative_prompt = negative.join(", ");
    }

    fn lora_exists(&self, file: &str) -> bool {
        self.config
            .lora_dirs
            .iter()
            .any(|dir| dir.join(file).is_file())
    }
}

fn cap(text: &str, limit: usize) -> String {
    let mut boundary = limit.min(text.len());
    while boundary > 0 && !text.is_char_boundary(boundary) {
        boundary -= 1;
    }
    text[..boundary].to_string()
}

fn appearance_summary(character: &Character) -> Option<String> {
    let a = &character.appearance;
    let mut parts = Vec::new();
    if let Some(hair) = &a.hair {
        parts.push(format!("{hair} hair"));
    }
    if let Some(eyes) = &a.eyes {
        parts.push(format!("{eyes} eyes"));
    }
    if let Some(clothing) = &a.clothing {
        parts.push(clothing.clone());
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(", "))
    }
}

fn first_json_file(dir: &Path) -> Option<String> {
    let entries = std::fs::read_dir(dir).ok()?;
    let mut files: Vec<String> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .filter(|name| name.ends_with(".json"))
        .collect();
    files.sort();
    files.into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use atelier_catalog::{CatalogStore, CharacterUpsert, ProjectUpsert};
    use std::fs;

    async fn fixture() -> (ResourceResolver, tempfile::TempDir) {
        let tmp = tempfile::tempdir().unwrap();
        let workflow_dir = tmp.path().join("workflows");
        let checkpoint_dir = tmp.path().join("checkpoints");
        let lora_dir = tmp.path().join("loras");
        for dir in [&workflow_dir, &checkpoint_dir, &lora_dir] {
            fs::create_dir_all(dir).unwrap();
        }
        fs::write(
            workflow_dir.join("anime_30sec_rife_workflow_with_lora.json"),
            "{}",
        )
        .unwrap();
        fs::write(checkpoint_dir.join("counterfeit_v3.safetensors"), "x").unwrap();
        fs::write(lora_dir.join("kai.safetensors"), "x").unwrap();

        let catalog = CatalogStore::memory().await.unwrap();
        catalog
            .projects()
            .upsert(ProjectUpsert {
                id: Some("p1".to_string()),
                name: "P1".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        catalog
            .characters()
            .upsert(CharacterUpsert {
                project_id: "p1".to_string(),
                name: "Kai".to_string(),
                design_prompt: Some("young swordsman, silver hair, violet eyes".to_string()),
                lora_path: Some("kai.safetensors".to_string()),
                lora_trigger: Some("kai_character".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();

        let resolver = ResourceResolver::new(
            catalog,
            None,
            ResolverConfig {
                workflow_dir,
                checkpoint_dir,
                lora_dirs: vec![lora_dir],
            },
        );
        (resolver, tmp)
    }

    #[tokio::test]
    async fn test_lora_trigger_lands_in_prompt() {
        let (resolver, _tmp) = fixture().await;
        let plan = resolver.plan("Generate Kai standing").await.unwrap();

        assert_eq!(plan.resources.loras.len(), 1);
        let lora = &plan.resources.loras[0];
        assert_eq!(lora.name, "kai.safetensors");
        assert!((lora.strength - 0.85).abs() < 1e-9);
        // The trigger token must be a literal substring of the positive
        // prompt or the adapter stays inert.
        assert!(plan.resources.positive_prompt.contains("kai_character"));
        assert!(plan
            .resources
            .positive_prompt
            .starts_with("masterpiece, best quality, high resolution, detailed"));
    }

    #[tokio::test]
    async fn test_missing_lora_file_warns() {
        let (resolver, tmp) = fixture().await;
        fs::remove_file(tmp.path().join("loras/kai.safetensors")).unwrap();
        let plan = resolver.plan("Generate Kai standing").await.unwrap();
        assert!(plan.resources.loras.is_empty());
        assert!(plan
            .warnings
            .iter()
            .any(|w| w.contains("kai.safetensors")));
    }

    #[tokio::test]
    async fn test_action_scene_tokens() {
        let (resolver, _tmp) = fixture().await;
        let plan = resolver.plan("Kai battle on the rooftop").await.unwrap();
        assert_eq!(plan.analysis.scene_type, "action");
        assert!(plan.resources.positive_prompt.contains("dynamic pose"));
        assert!(plan
            .resources
            .negative_prompt
            .contains("static pose, standing still, calm expression"));
        assert!(plan.resources.negative_prompt.starts_with("lowres, bad anatomy"));
    }

    #[tokio::test]
    async fn test_unknown_character_warns() {
        let (resolver, _tmp) = fixture().await;
        let plan = resolver.plan("Generate Zorblax standing").await.unwrap();
        assert!(plan.fresh_data.characters.is_empty());
        assert!(plan.warnings.iter().any(|w| w.contains("Zorblax")));
    }

    #[tokio::test]
    async fn test_workflow_and_checkpoint_selected() {
        let (resolver, _tmp) = fixture().await;
        let plan = resolver.plan("Kai fight scene").await.unwrap();
        assert_eq!(
            plan.resources.workflow_file.as_deref(),
            Some("anime_30sec_rife_workflow_with_lora.json")
        );
        assert_eq!(
            plan.resources.checkpoint.as_deref(),
            Some("counterfeit_v3.safetensors")
        );
        assert!(!plan.resources.reasoning.is_empty());
    }
}
