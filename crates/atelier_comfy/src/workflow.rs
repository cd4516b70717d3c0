//! Workflow composer - node-graph documents for the backend.
//!
//! A graph is a map of string node ids to `{class_type, inputs}` where
//! inputs reference other nodes as `["<node_id>", <output_index>]`.

use atelier_protocol::http::round_down_64;
use atelier_protocol::LoraSpec;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::info;

/// Frames below this lose temporal coherence in the motion module. The
/// composer never goes under it, and never lowers a caller's batch size.
pub const MIN_VIDEO_BATCH: u32 = 16;

pub const DEFAULT_MODEL: &str = "counterfeit_v3.safetensors";
pub const DEFAULT_SAMPLER: &str = "euler";
pub const DEFAULT_SCHEDULER: &str = "normal";
const MOTION_MODULE: &str = "mm_sd_v15_v2.ckpt";

/// One node in the graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowNode {
    pub class_type: String,
    pub inputs: serde_json::Map<String, Value>,
}

/// The full node-graph document, keyed by node id.
pub type WorkflowGraph = BTreeMap<String, WorkflowNode>;

fn node(class_type: &str, inputs: Value) -> WorkflowNode {
    let Value::Object(inputs) = inputs else {
        panic!("node inputs must be a JSON object");
    };
    WorkflowNode {
        class_type: class_type.to_string(),
        inputs,
    }
}

fn random_seed() -> u32 {
    rand::random::<u32>()
}

/// Parameters for an image workflow.
#[derive(Debug, Clone)]
pub struct ImageParams {
    pub prompt: String,
    pub negative_prompt: String,
    pub width: u32,
    pub height: u32,
    pub steps: u32,
    pub cfg: f64,
    pub seed: Option<u32>,
    pub model: Option<String>,
    pub loras: Vec<LoraSpec>,
}

impl Default for ImageParams {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            negative_prompt: String::new(),
            width: 512,
            height: 512,
            steps: 20,
            cfg: 7.0,
            seed: None,
            model: None,
            loras: Vec::new(),
        }
    }
}

/// Parameters for a video workflow.
#[derive(Debug, Clone)]
pub struct VideoParams {
    pub prompt: String,
    pub duration_secs: u32,
    pub fps: u32,
    pub width: u32,
    pub height: u32,
    pub steps: u32,
    pub model: Option<String>,
    /// Sampler/scheduler inherited from the project style when set.
    pub sampler: Option<String>,
    pub scheduler: Option<String>,
    pub loras: Vec<LoraSpec>,
}

impl Default for VideoParams {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            duration_secs: 2,
            fps: 12,
            width: 512,
            height: 512,
            steps: 20,
            model: None,
            sampler: None,
            scheduler: None,
            loras: Vec::new(),
        }
    }
}

/// Chain LoraLoader nodes after the checkpoint loader. Returns the node
/// references the rest of the graph should use for (model, clip).
fn chain_loras(
    graph: &mut WorkflowGraph,
    loras: &[LoraSpec],
    next_id: &mut u32,
    mut model_ref: Value,
    mut clip_ref: Value,
) -> (Value, Value) {
    for lora in loras {
        let id = next_id.to_string();
        *next_id += 1;
        graph.insert(
            id.clone(),
            node(
                "LoraLoader",
                json!({
                    "lora_name": lora.name,
                    "strength_model": lora.strength,
                    "strength_clip": lora.strength,
                    "model": model_ref,
                    "clip": clip_ref,
                }),
            ),
        );
        model_ref = json!([id, 0]);
        clip_ref = json!([id, 1]);
    }
    (model_ref, clip_ref)
}

/// Build a single-image workflow.
pub fn build_image_workflow(params: &ImageParams) -> WorkflowGraph {
    let width = round_down_64(params.width);
    let height = round_down_64(params.height);
    let seed = params.seed.unwrap_or_else(random_seed);
    let model = params.model.as_deref().unwrap_or(DEFAULT_MODEL);
    let negative = if params.negative_prompt.is_empty() {
        "low quality, blurry, ugly"
    } else {
        &params.negative_prompt
    };

    let mut graph = WorkflowGraph::new();
    graph.insert(
        "1".to_string(),
        node("CheckpointLoaderSimple", json!({ "ckpt_name": model })),
    );

    let mut next_id = 10;
    let (model_ref, clip_ref) = chain_loras(
        &mut graph,
        &params.loras,
        &mut next_id,
        json!(["1", 0]),
        json!(["1", 1]),
    );

    graph.insert(
        "2".to_string(),
        node(
            "CLIPTextEncode",
            json!({ "text": params.prompt, "clip": clip_ref }),
        ),
    );
    graph.insert(
        "3".to_string(),
        node(
            "CLIPTextEncode",
            json!({ "text": negative, "clip": clip_ref }),
        ),
    );
    graph.insert(
        "4".to_string(),
        node(
            "EmptyLatentImage",
            json!({ "width": width, "height": height, "batch_size": 1 }),
        ),
    );
    graph.insert(
        "5".to_string(),
        node(
            "KSampler",
            json!({
                "seed": seed,
                "steps": params.steps,
                "cfg": params.cfg,
                "sampler_name": DEFAULT_SAMPLER,
                "scheduler": DEFAULT_SCHEDULER,
                "denoise": 1.0,
                "model": model_ref,
                "positive": ["2", 0],
                "negative": ["3", 0],
                "latent_image": ["4", 0],
            }),
        ),
    );
    graph.insert(
        "6".to_string(),
        node("VAEDecode", json!({ "samples": ["5", 0], "vae": ["1", 2] })),
    );
    graph.insert(
        "7".to_string(),
        node(
            "SaveImage",
            json!({ "filename_prefix": "atelier_gen", "images": ["6", 0] }),
        ),
    );

    info!(
        "Composed image workflow: {}x{}, {} steps, {} loras",
        width,
        height,
        params.steps,
        params.loras.len()
    );
    graph
}

/// Build an animated-sequence workflow. `batch_size = duration * fps`, with
/// a hard floor of [`MIN_VIDEO_BATCH`] frames.
pub fn build_video_workflow(params: &VideoParams) -> WorkflowGraph {
    let width = round_down_64(params.width);
    let height = round_down_64(params.height);
    let frame_count = (params.duration_secs * params.fps).max(MIN_VIDEO_BATCH);
    let model = params.model.as_deref().unwrap_or(DEFAULT_MODEL);
    let sampler = params.sampler.as_deref().unwrap_or(DEFAULT_SAMPLER);
    let scheduler = params.scheduler.as_deref().unwrap_or(DEFAULT_SCHEDULER);

    let mut graph = WorkflowGraph::new();
    graph.insert(
        "1".to_string(),
        node("CheckpointLoaderSimple", json!({ "ckpt_name": model })),
    );

    let mut next_id = 10;
    let (model_ref, clip_ref) = chain_loras(
        &mut graph,
        &params.loras,
        &mut next_id,
        json!(["1", 0]),
        json!(["1", 1]),
    );

    graph.insert(
        "2".to_string(),
        node(
            "CLIPTextEncode",
            json!({
                "text": format!("{}, animated, smooth motion", params.prompt),
                "clip": clip_ref,
            }),
        ),
    );
    graph.insert(
        "3".to_string(),
        node(
            "CLIPTextEncode",
            json!({ "text": "static, still, no motion", "clip": clip_ref }),
        ),
    );
    graph.insert(
        "4".to_string(),
        node(
            "EmptyLatentImage",
            json!({ "width": width, "height": height, "batch_size": frame_count }),
        ),
    );
    graph.insert(
        "5".to_string(),
        node(
            "ADE_AnimateDiffLoaderGen1",
            json!({
                "model_name": MOTION_MODULE,
                "beta_schedule": "default",
                "model": model_ref,
            }),
        ),
    );
    graph.insert(
        "6".to_string(),
        node(
            "KSampler",
            json!({
                "seed": random_seed(),
                "steps": params.steps,
                "cfg": 7.0,
                "sampler_name": sampler,
                "scheduler": scheduler,
                "denoise": 1.0,
                "model": ["5", 0],
                "positive": ["2", 0],
                "negative": ["3", 0],
                "latent_image": ["4", 0],
            }),
        ),
    );
    graph.insert(
        "7".to_string(),
        node("VAEDecode", json!({ "samples": ["6", 0], "vae": ["1", 2] })),
    );
    graph.insert(
        "8".to_string(),
        node(
            "ADE_AnimateDiffCombine",
            json!({
                "images": ["7", 0],
                "frame_rate": params.fps,
                "loop_count": 0,
                "filename_prefix": "atelier_video",
                "format": "video/mp4",
                "save_image": true,
            }),
        ),
    );

    info!(
        "Composed video workflow: {}s @ {}fps ({} frames)",
        params.duration_secs, params.fps, frame_count
    );
    graph
}

/// Build a batch workflow: prompts joined with ` BREAK `, one latent per
/// prompt.
pub fn build_batch_workflow(
    prompts: &[String],
    width: u32,
    height: u32,
    steps: u32,
) -> WorkflowGraph {
    let combined = prompts.join(" BREAK ");
    let mut graph = build_image_workflow(&ImageParams {
        prompt: combined,
        width,
        height,
        steps,
        ..Default::default()
    });
    if let Some(latent) = graph.get_mut("4") {
        latent
            .inputs
            .insert("batch_size".to_string(), json!(prompts.len().max(1)));
    }
    graph
}

/// A graph is submittable when the mandatory node classes are present:
/// model loader, positive and negative text encoders, sampler, decoder,
/// and a save node.
pub fn validate(graph: &WorkflowGraph) -> bool {
    let count = |class: &str| {
        graph
            .values()
            .filter(|node| node.class_type == class)
            .count()
    };
    let has_save =
        count("SaveImage") > 0 || count("ADE_AnimateDiffCombine") > 0;
    count("CheckpointLoaderSimple") > 0
        && count("CLIPTextEncode") >= 2
        && count("KSampler") > 0
        && count("VAEDecode") > 0
        && has_save
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_workflow_valid() {
        let graph = build_image_workflow(&ImageParams {
            prompt: "portrait of a woman".to_string(),
            width: 512,
            height: 768,
            ..Default::default()
        });
        assert!(validate(&graph));
        assert_eq!(graph["4"].inputs["width"], 512);
        assert_eq!(graph["4"].inputs["height"], 768);
    }

    #[test]
    fn test_resolution_rounds_down() {
        let graph = build_image_workflow(&ImageParams {
            width: 1000,
            height: 700,
            ..Default::default()
        });
        assert_eq!(graph["4"].inputs["width"], 960);
        assert_eq!(graph["4"].inputs["height"], 640);
    }

    #[test]
    fn test_video_batch_floor() {
        // 1s @ 12fps would be 12 frames - below the coherence floor.
        let graph = build_video_workflow(&VideoParams {
            duration_secs: 1,
            fps: 12,
            ..Default::default()
        });
        assert_eq!(graph["4"].inputs["batch_size"], 16);

        let graph = build_video_workflow(&VideoParams {
            duration_secs: 3,
            fps: 12,
            ..Default::default()
        });
        assert_eq!(graph["4"].inputs["batch_size"], 36);
    }

    #[test]
    fn test_lora_chain_wiring() {
        let graph = build_image_workflow(&ImageParams {
            prompt: "kai_character, Kai standing".to_string(),
            loras: vec![LoraSpec::new("kai.safetensors").with_trigger("kai_character")],
            ..Default::default()
        });
        let lora = graph
            .values()
            .find(|n| n.class_type == "LoraLoader")
            .expect("LoraLoader node present");
        assert_eq!(lora.inputs["lora_name"], "kai.safetensors");
        assert_eq!(lora.inputs["strength_model"], 0.85);
        assert_eq!(lora.inputs["strength_clip"], 0.85);
        // Sampler and encoders hang off the lora outputs, not the raw
        // checkpoint.
        assert_eq!(graph["5"].inputs["model"], serde_json::json!(["10", 0]));
        assert_eq!(graph["2"].inputs["clip"], serde_json::json!(["10", 1]));
        assert!(validate(&graph));
    }

    #[test]
    fn test_video_sampler_inherited() {
        let graph = build_video_workflow(&VideoParams {
            sampler: Some("dpmpp_2m".to_string()),
            scheduler: Some("karras".to_string()),
            ..Default::default()
        });
        assert_eq!(graph["6"].inputs["sampler_name"], "dpmpp_2m");
        assert_eq!(graph["6"].inputs["scheduler"], "karras");

        let graph = build_video_workflow(&VideoParams::default());
        assert_eq!(graph["6"].inputs["sampler_name"], "euler");
    }

    #[test]
    fn test_batch_workflow_joins_prompts() {
        let prompts = vec!["a knight".to_string(), "a mage".to_string()];
        let graph = build_batch_workflow(&prompts, 512, 512, 20);
        assert!(validate(&graph));
        assert_eq!(graph["4"].inputs["batch_size"], 2);
        let prompt_text = graph["2"].inputs["text"].as_str().unwrap();
        assert!(prompt_text.contains(" BREAK "));
    }

    #[test]
    fn test_validate_rejects_partial_graph() {
        let mut graph = build_image_workflow(&ImageParams::default());
        graph.remove("5");
        assert!(!validate(&graph));
    }
}
