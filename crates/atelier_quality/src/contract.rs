//! Gate assembly - the quality contract.

use crate::metrics;
use crate::probe::{self, MediaInfo};
use atelier_protocol::{ContractResult, CoreResult, GateResult};
use image::GrayImage;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

pub const MIN_FILE_SIZE_VIDEO: u64 = 50_000;
pub const MIN_FILE_SIZE_IMAGE: u64 = 20_000;
pub const MAX_FILE_SIZE: u64 = 100_000_000;
pub const MIN_VIDEO_FRAMES: u32 = 12;
pub const MIN_FRAMEPACK_FRAMES: u32 = 60;
pub const DURATION_TOLERANCE: f64 = 0.10;
pub const DIMENSION_TOLERANCE: f64 = 0.05;
pub const MIN_SSIM_VARIANCE: f64 = 0.01;
pub const MIN_OPTICAL_FLOW: f64 = 0.5;
pub const MAX_BLANK_RATIO: f64 = 0.90;
pub const MIN_SHARPNESS: f64 = 100.0;
pub const MIN_COLOR_VARIANCE: f64 = 10.0;
const FRAME_SAMPLES: usize = 4;

/// What the caller believes the artifact is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedType {
    Auto,
    Image,
    Video,
}

pub struct QualityGate;

impl QualityGate {
    pub fn new() -> Self {
        Self
    }

    /// Validate one produced artifact against the contract.
    pub async fn validate(
        &self,
        file_path: &Path,
        generation_params: &Value,
        expected_type: ExpectedType,
    ) -> CoreResult<ContractResult> {
        let mut structural = BTreeMap::new();
        let mut motion = BTreeMap::new();
        let mut quality = BTreeMap::new();
        let mut recommendations = Vec::new();
        let mut frame_samples = Vec::new();

        // --- file_exists ---
        let exists = file_path.is_file();
        structural.insert(
            "file_exists".to_string(),
            gate(exists, exists, "true", file_path.display().to_string()),
        );
        if !exists {
            return Ok(finish(
                structural,
                motion,
                quality,
                frame_samples,
                vec!["Output file was never produced - check the backend logs".to_string()],
                generation_params.clone(),
                Some("file missing".to_string()),
            ));
        }

        let is_video = match expected_type {
            ExpectedType::Video => true,
            ExpectedType::Image => false,
            ExpectedType::Auto => matches!(
                file_path
                    .extension()
                    .map(|e| e.to_string_lossy().to_lowercase())
                    .as_deref(),
                Some("mp4") | Some("avi") | Some("mov") | Some("webm") | Some("gif")
            ),
        };

        // --- file_size ---
        let size = tokio::fs::metadata(file_path)
            .await
            .map(|m| m.len())
            .unwrap_or(0);
        let min_size = if is_video {
            MIN_FILE_SIZE_VIDEO
        } else {
            MIN_FILE_SIZE_IMAGE
        };
        let size_ok = (min_size..=MAX_FILE_SIZE).contains(&size);
        structural.insert(
            "file_size".to_string(),
            gate(
                size_ok,
                size,
                format!("{min_size}-{MAX_FILE_SIZE}"),
                format!("{size} bytes"),
            ),
        );
        if !size_ok {
            recommendations.push(if size < min_size {
                format!("File is only {size} bytes - generation likely failed early")
            } else {
                "File is unexpectedly large - lower resolution or duration".to_string()
            });
        }

        if is_video {
            self.validate_video(
                file_path,
                generation_params,
                &mut structural,
                &mut motion,
                &mut quality,
                &mut recommendations,
                &mut frame_samples,
            )
            .await?;
        } else {
            self.validate_image(
                file_path,
                generation_params,
                &mut structural,
                &mut quality,
                &mut recommendations,
            );
        }

        Ok(finish(
            structural,
            motion,
            quality,
            frame_samples,
            recommendations,
            generation_params.clone(),
            None,
        ))
    }

    #[allow(clippy::too_many_arguments)]
    async fn validate_video(
        &self,
        file_path: &Path,
        params: &Value,
        structural: &mut BTreeMap<String, GateResult>,
        motion: &mut BTreeMap<String, GateResult>,
        quality: &mut BTreeMap<String, GateResult>,
        recommendations: &mut Vec<String>,
        frame_samples: &mut Vec<String>,
    ) -> CoreResult<()> {
        let info = probe::probe(file_path).await?;
        structural.insert(
            "valid_container".to_string(),
            gate(
                info.container_ok,
                info.container_ok,
                "decodable",
                "ffprobe".to_string(),
            ),
        );
        if !info.container_ok {
            recommendations
                .push("Container is not decodable - the encode step failed".to_string());
            return Ok(());
        }

        // --- frame_count ---
        let is_framepack = params
            .get("generator")
            .and_then(|g| g.as_str())
            .is_some_and(|g| g.contains("framepack"));
        let min_frames = if is_framepack {
            MIN_FRAMEPACK_FRAMES
        } else {
            MIN_VIDEO_FRAMES
        };
        let frames_ok = info.frame_count >= min_frames;
        structural.insert(
            "frame_count".to_string(),
            gate(
                frames_ok,
                info.frame_count,
                format!(">={min_frames}"),
                format!("{} frames", info.frame_count),
            ),
        );
        if !frames_ok {
            recommendations.push(format!(
                "Only {} frames - need {min_frames}+ for proper video. Increase batch_size.",
                info.frame_count
            ));
        }

        // --- duration within ±10% of expected (frame_count / fps) ---
        if let Some(expected) = expected_duration(params, &info) {
            let ok = within(info.duration_secs, expected, DURATION_TOLERANCE);
            structural.insert(
                "duration".to_string(),
                gate(
                    ok,
                    info.duration_secs,
                    format!("{expected:.2}±10%"),
                    format!("{:.2}s", info.duration_secs),
                ),
            );
            if !ok {
                recommendations.push(format!(
                    "Duration {:.2}s is off target {expected:.2}s - check fps and batch_size",
                    info.duration_secs
                ));
            }
        }

        // --- resolution within ±5% ---
        if let (Some(width), Some(height)) = (
            params.get("width").and_then(Value::as_u64),
            params.get("height").and_then(Value::as_u64),
        ) {
            let ok = within(info.width as f64, width as f64, DIMENSION_TOLERANCE)
                && within(info.height as f64, height as f64, DIMENSION_TOLERANCE);
            structural.insert(
                "resolution".to_string(),
                gate(
                    ok,
                    format!("{}x{}", info.width, info.height),
                    format!("{width}x{height}±5%"),
                    String::new(),
                ),
            );
        }

        // --- motion + visual gates over sampled frames ---
        let tmp = tempfile::tempdir()
            .map_err(|e| atelier_protocol::CoreError::internal(e.to_string()))?;
        let frames =
            probe::extract_frames(file_path, info.duration_secs, FRAME_SAMPLES, tmp.path())
                .await?;
        for frame in &frames {
            frame_samples.push(frame.display().to_string());
        }

        let grays: Vec<GrayImage> = frames
            .iter()
            .filter_map(|p| image::open(p).ok())
            .map(|img| img.to_luma8())
            .collect();

        if grays.len() < 2 {
            motion.insert(
                "unique_frames".to_string(),
                gate(false, grays.len(), ">1", "not enough frames decoded"),
            );
            recommendations
                .push("Could not sample frames for motion analysis".to_string());
            return Ok(());
        }

        let hashes: std::collections::HashSet<String> =
            grays.iter().map(metrics::frame_hash).collect();
        let unique = hashes.len();
        motion.insert(
            "unique_frames".to_string(),
            gate(
                unique > 1,
                unique,
                ">1",
                format!("{unique}/{} unique frames", grays.len()),
            ),
        );

        let ssim_scores: Vec<f64> = grays
            .windows(2)
            .map(|pair| metrics::ssim(&pair[0], &pair[1]))
            .collect();
        let ssim_variance =
            1.0 - ssim_scores.iter().sum::<f64>() / ssim_scores.len().max(1) as f64;
        motion.insert(
            "ssim_variance".to_string(),
            gate(
                ssim_variance > MIN_SSIM_VARIANCE,
                ssim_variance,
                format!(">{MIN_SSIM_VARIANCE}"),
                format!("frame difference {ssim_variance:.3}"),
            ),
        );

        let flow = metrics::motion_magnitude(&grays[0], &grays[1]);
        motion.insert(
            "optical_flow".to_string(),
            gate(
                flow > MIN_OPTICAL_FLOW,
                flow,
                format!(">{MIN_OPTICAL_FLOW}"),
                format!("mean magnitude {flow:.2}px"),
            ),
        );
        if motion.values().any(|g| !g.passed) {
            recommendations.push(
                "Video shows little or no motion - raise batch_size or revise the motion prompt"
                    .to_string(),
            );
        }

        let rgbs: Vec<image::RgbImage> = frames
            .iter()
            .filter_map(|p| image::open(p).ok())
            .map(|img| img.to_rgb8())
            .collect();
        visual_gates(&grays, &rgbs, quality, recommendations);
        Ok(())
    }

    fn validate_image(
        &self,
        file_path: &Path,
        params: &Value,
        structural: &mut BTreeMap<String, GateResult>,
        quality: &mut BTreeMap<String, GateResult>,
        recommendations: &mut Vec<String>,
    ) {
        let decoded = image::open(file_path).ok();
        structural.insert(
            "valid_container".to_string(),
            gate(
                decoded.is_some(),
                decoded.is_some(),
                "decodable",
                "image decoder".to_string(),
            ),
        );
        let Some(decoded) = decoded else {
            recommendations.push("Image did not decode - the save step failed".to_string());
            return;
        };

        if let (Some(width), Some(height)) = (
            params.get("width").and_then(Value::as_u64),
            params.get("height").and_then(Value::as_u64),
        ) {
            let ok = within(decoded.width() as f64, width as f64, DIMENSION_TOLERANCE)
                && within(decoded.height() as f64, height as f64, DIMENSION_TOLERANCE);
            structural.insert(
                "resolution".to_string(),
                gate(
                    ok,
                    format!("{}x{}", decoded.width(), decoded.height()),
                    format!("{width}x{height}±5%"),
                    String::new(),
                ),
            );
        }

        let gray = decoded.to_luma8();
        let rgb = decoded.to_rgb8();
        visual_gates(
            std::slice::from_ref(&gray),
            std::slice::from_ref(&rgb),
            quality,
            recommendations,
        );
    }
}

impl Default for QualityGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Visual gates shared by the image and video paths.
fn visual_gates(
    grays: &[GrayImage],
    rgbs: &[image::RgbImage],
    quality: &mut BTreeMap<String, GateResult>,
    recommendations: &mut Vec<String>,
) {
    if grays.is_empty() {
        return;
    }

    let blanks: Vec<f64> = grays.iter().map(metrics::blank_ratio).collect();
    let sharpnesses: Vec<f64> = grays.iter().map(metrics::laplacian_variance).collect();
    let colors: Vec<f64> = rgbs.iter().map(metrics::color_distribution).collect();

    let mean = |v: &[f64]| v.iter().sum::<f64>() / v.len().max(1) as f64;
    let blank = mean(&blanks);
    let sharpness = mean(&sharpnesses);
    let color = mean(&colors);

    quality.insert(
        "blank_detection".to_string(),
        gate(
            blank < MAX_BLANK_RATIO,
            blank,
            format!("<{MAX_BLANK_RATIO}"),
            format!("blank ratio {blank:.2}"),
        ),
    );
    quality.insert(
        "sharpness".to_string(),
        gate(
            sharpness > MIN_SHARPNESS,
            sharpness,
            format!(">{MIN_SHARPNESS}"),
            format!("laplacian variance {sharpness:.1}"),
        ),
    );
    quality.insert(
        "color_distribution".to_string(),
        gate(
            color > MIN_COLOR_VARIANCE,
            color,
            format!(">{MIN_COLOR_VARIANCE}"),
            format!("channel spread {color:.1}"),
        ),
    );

    // Per-frame composite: 0.4 not-blank + 0.3 sharp + 0.3 colorful.
    let mut frame_scores = Vec::with_capacity(grays.len());
    for i in 0..grays.len() {
        let mut score = 0.0;
        if blanks[i] <= MAX_BLANK_RATIO {
            score += 0.4;
        }
        if sharpnesses[i] > MIN_SHARPNESS {
            score += 0.3;
        }
        if colors.get(i).copied().unwrap_or(0.0) > MIN_COLOR_VARIANCE {
            score += 0.3;
        }
        frame_scores.push(score);
    }
    let overall = mean(&frame_scores);
    quality.insert(
        "overall_visual".to_string(),
        gate(
            overall > 0.5,
            overall,
            ">0.5",
            format!("mean frame score {overall:.2}"),
        ),
    );

    if blank >= MAX_BLANK_RATIO {
        recommendations
            .push("Frames are mostly blank - revise the prompt or switch checkpoint".to_string());
    }
    if sharpness <= MIN_SHARPNESS {
        recommendations
            .push("Output is soft - increase steps or use a sharper model".to_string());
    }
}

/// Weighted mean of the visual gates, numeric gates scaled linearly against
/// their threshold and capped at 1.
fn quality_score(quality: &BTreeMap<String, GateResult>) -> f64 {
    const WEIGHTS: &[(&str, f64)] = &[
        ("blank_detection", 0.3),
        ("sharpness", 0.2),
        ("color_distribution", 0.2),
        ("overall_visual", 0.3),
    ];

    let mut sum = 0.0;
    let mut weight_sum = 0.0;
    for (name, weight) in WEIGHTS {
        let Some(gate) = quality.get(*name) else {
            continue;
        };
        let score = component_score(name, gate);
        sum += score * weight;
        weight_sum += weight;
    }
    if weight_sum == 0.0 {
        0.0
    } else {
        sum / weight_sum
    }
}

fn component_score(name: &str, gate: &GateResult) -> f64 {
    let Some(value) = gate.value.as_f64() else {
        return if gate.passed { 1.0 } else { 0.0 };
    };
    match name {
        // Lower is better; 0 blank = full marks.
        "blank_detection" => (1.0 - value / MAX_BLANK_RATIO).clamp(0.0, 1.0),
        "sharpness" => (value / MIN_SHARPNESS).clamp(0.0, 1.0),
        "color_distribution" => (value / MIN_COLOR_VARIANCE).clamp(0.0, 1.0),
        "overall_visual" => (value / 0.5).clamp(0.0, 1.0),
        _ => {
            if gate.passed {
                1.0
            } else {
                0.0
            }
        }
    }
}

fn finish(
    structural: BTreeMap<String, GateResult>,
    motion: BTreeMap<String, GateResult>,
    quality: BTreeMap<String, GateResult>,
    frame_samples: Vec<String>,
    mut recommendations: Vec<String>,
    generation_params: Value,
    error: Option<String>,
) -> ContractResult {
    let score = quality_score(&quality);
    let structural_ok = structural.values().all(|g| g.passed);
    let motion_ok = motion.values().all(|g| g.passed);
    let passed = structural_ok && motion_ok && score > 0.5;

    if passed {
        info!("Quality contract passed (score {:.2})", score);
    } else if score <= 0.5 && structural_ok && motion_ok {
        recommendations.push(format!(
            "Quality score {score:.2} is below threshold (0.5). Revise prompt or model."
        ));
    }

    ContractResult {
        passed,
        quality_score: score,
        structural_gates: structural,
        motion_gates: motion,
        quality_gates: quality,
        frame_samples,
        recommendations,
        generation_params,
        error,
    }
}

fn gate(
    passed: bool,
    value: impl Into<Value>,
    threshold: impl Into<String>,
    details: impl Into<String>,
) -> GateResult {
    let details = details.into();
    let mut result = if passed {
        GateResult::pass(value.into(), threshold.into())
    } else {
        GateResult::fail(value.into(), threshold.into())
    };
    if !details.is_empty() {
        result = result.with_details(details);
    }
    result
}

fn within(actual: f64, expected: f64, tolerance: f64) -> bool {
    if expected == 0.0 {
        return actual == 0.0;
    }
    (actual - expected).abs() / expected <= tolerance
}

/// Expected duration: explicit `duration`, else `batch_size / fps`.
fn expected_duration(params: &Value, info: &MediaInfo) -> Option<f64> {
    if let Some(duration) = params.get("duration").and_then(Value::as_f64) {
        return Some(duration);
    }
    let batch = params.get("batch_size").and_then(Value::as_f64)?;
    let fps = params
        .get("fps")
        .and_then(Value::as_f64)
        .or(Some(info.fps).filter(|f| *f > 0.0))?;
    Some(batch / fps)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_within_tolerance() {
        assert!(within(10.5, 10.0, 0.10));
        assert!(!within(11.5, 10.0, 0.10));
        assert!(within(512.0, 512.0, 0.05));
        assert!(!within(480.0, 512.0, 0.05));
    }

    #[test]
    fn test_expected_duration_from_batch() {
        let params = serde_json::json!({"batch_size": 48, "fps": 12});
        let info = MediaInfo::default();
        assert_eq!(expected_duration(&params, &info), Some(4.0));
    }

    #[tokio::test]
    async fn test_missing_file_fails_structurally() {
        let gate = QualityGate::new();
        let result = gate
            .validate(
                Path::new("/nonexistent/output.png"),
                &serde_json::json!({}),
                ExpectedType::Image,
            )
            .await
            .unwrap();
        assert!(!result.passed);
        assert!(!result.structural_gates["file_exists"].passed);
        assert!(!result.recommendations.is_empty());
    }

    #[tokio::test]
    async fn test_passed_requires_all_gate_families() {
        // Build a result by hand: all structural/motion pass but the score
        // is too low.
        let mut quality = BTreeMap::new();
        quality.insert(
            "blank_detection".to_string(),
            GateResult::fail(0.95, "<0.9"),
        );
        quality.insert("sharpness".to_string(), GateResult::fail(5.0, ">100"));
        quality.insert(
            "color_distribution".to_string(),
            GateResult::fail(1.0, ">10"),
        );
        quality.insert("overall_visual".to_string(), GateResult::fail(0.1, ">0.5"));
        let result = finish(
            BTreeMap::new(),
            BTreeMap::new(),
            quality,
            vec![],
            vec![],
            serde_json::json!({}),
            None,
        );
        assert!(!result.passed);
        assert!(result.quality_score < 0.5);
    }

    #[test]
    fn test_quality_score_weighting() {
        let mut quality = BTreeMap::new();
        quality.insert("blank_detection".to_string(), GateResult::pass(0.0, "<0.9"));
        quality.insert("sharpness".to_string(), GateResult::pass(250.0, ">100"));
        quality.insert(
            "color_distribution".to_string(),
            GateResult::pass(40.0, ">10"),
        );
        quality.insert("overall_visual".to_string(), GateResult::pass(1.0, ">0.5"));
        let score = quality_score(&quality);
        assert!((score - 1.0).abs() < 1e-9);
    }
}
