//! The generation pipeline: worker execution and completion handling.
//!
//! Workers: resolve → compose → submit → hand off to the monitor. The
//! completion loop (fed by the monitor) organizes outputs, runs the quality
//! gate, records feedback, and finalizes the job. A job either produces at
//! least one validated artifact or it ends terminal-failed.

use crate::state::SharedState;
use atelier_comfy::workflow::{self, ImageParams, VideoParams};
use atelier_jobs::{CompletionEvent, JobUpdate};
use atelier_protocol::{Job, JobId, JobStatus, JobType, QualityFeedback};
use atelier_quality::ExpectedType;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Worker handler: drive one queued job to the point where the monitor
/// owns it.
pub async fn execute_job(state: SharedState, job_id: JobId) {
    let Some(job) = state.manager.get_job(&job_id).await else {
        warn!("Worker popped unknown job {}", job_id);
        return;
    };
    // Cancelled while still queued.
    if job.status != JobStatus::Queued {
        return;
    }

    if let Err(reason) = run_submission(&state, &job).await {
        fail_job(&state, &job_id, reason).await;
    }
}

async fn run_submission(state: &SharedState, job: &Job) -> Result<(), String> {
    let plan = state
        .resolver
        .plan(&job.prompt)
        .await
        .map_err(|e| format!("resource resolution failed: {e}"))?;
    for warning in &plan.warnings {
        warn!("Job {} plan warning: {}", job.id, warning);
    }

    let width = param_u32(&job.parameters_value("width"), plan.resources.width);
    let height = param_u32(&job.parameters_value("height"), plan.resources.height);
    let negative_prompt = match job.parameters_value("negative_prompt").as_str() {
        Some(user_negative) if !user_negative.is_empty() => {
            format!("{}, {}", plan.resources.negative_prompt, user_negative)
        }
        _ => plan.resources.negative_prompt.clone(),
    };

    let graph = match job.job_type {
        JobType::Batch => {
            // BREAK-separated prompts; /generate batches carry one.
            let prompts: Vec<String> = job
                .parameters_value("prompts")
                .as_array()
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|v| v.as_str().map(String::from))
                        .collect()
                })
                .unwrap_or_else(|| vec![plan.resources.positive_prompt.clone()]);
            workflow::build_batch_workflow(&prompts, width, height, plan.resources.steps)
        }
        JobType::Image => workflow::build_image_workflow(&ImageParams {
            prompt: plan.resources.positive_prompt.clone(),
            negative_prompt,
            width,
            height,
            steps: plan.resources.steps,
            cfg: plan.resources.cfg_scale,
            seed: None,
            model: plan.resources.checkpoint.clone(),
            loras: plan.resources.loras.clone(),
        }),
        JobType::Video => {
            let duration = param_u32(&job.parameters_value("duration"), 15);
            let fps = param_u32(&job.parameters_value("fps"), 12);
            // Sampler follows the project style when one is configured.
            let style = match &job.project_id {
                Some(project_id) => state
                    .catalog
                    .projects()
                    .get_project_style(project_id)
                    .await
                    .ok()
                    .flatten(),
                None => None,
            };
            workflow::build_video_workflow(&VideoParams {
                prompt: plan.resources.positive_prompt.clone(),
                duration_secs: duration,
                fps,
                width,
                height,
                steps: plan.resources.steps,
                model: plan.resources.checkpoint.clone(),
                sampler: style.as_ref().map(|s| s.sampler.clone()),
                scheduler: style.as_ref().map(|s| s.scheduler.clone()),
                loras: plan.resources.loras.clone(),
            })
        }
    };

    if !workflow::validate(&graph) {
        return Err("composed workflow failed validation".to_string());
    }

    let client_id = format!("atelier_{}", job.id);
    let prompt_id = state
        .comfy
        .submit_workflow(&graph, &client_id)
        .await
        .map_err(|e| format!("backend submit failed: {e}"))?
        .ok_or_else(|| "backend rejected the workflow".to_string())?;

    state
        .manager
        .update_job_status(
            &job.id,
            JobStatus::Processing,
            JobUpdate {
                backend_id: Some(prompt_id.clone()),
                ..Default::default()
            },
        )
        .await
        .map_err(|e| format!("status update failed: {e}"))?;

    state
        .monitor
        .register(job.id.clone(), prompt_id, job.job_type)
        .await;
    info!("Job {} submitted to the backend", job.id);
    Ok(())
}

/// Consume monitor completion events until the channel closes.
pub async fn completion_loop(state: SharedState, mut rx: mpsc::UnboundedReceiver<CompletionEvent>) {
    while let Some(event) = rx.recv().await {
        match event {
            CompletionEvent::Finished { job_id, files } => {
                finish_job(&state, job_id, files).await;
            }
            CompletionEvent::Failed { job_id, reason } => {
                fail_job(&state, &job_id, reason).await;
            }
            CompletionEvent::TimedOut { job_id } => {
                let update = JobUpdate {
                    error_message: Some("generation exceeded its wall-clock bound".to_string()),
                    ..Default::default()
                };
                if let Err(e) = state
                    .manager
                    .update_job_status(&job_id, JobStatus::Timeout, update)
                    .await
                {
                    warn!("Timeout transition for job {} failed: {}", job_id, e);
                }
            }
        }
    }
}

async fn finish_job(state: &SharedState, job_id: JobId, files: Vec<String>) {
    let Some(job) = state.manager.get_job(&job_id).await else {
        return;
    };
    if files.is_empty() {
        fail_job(state, &job_id, "backend finished without outputs".to_string()).await;
        return;
    }

    let gate_params = gate_params(&job);
    let organized = match state
        .organizer
        .organize_output(&job_id, job.project_id.as_deref(), &files, &gate_params)
        .await
    {
        Ok(paths) => paths,
        Err(e) => {
            fail_job(state, &job_id, format!("output organization failed: {e}")).await;
            return;
        }
    };
    let Some(primary) = organized.first() else {
        fail_job(state, &job_id, "no recognizable output files".to_string()).await;
        return;
    };

    let contract = match state
        .quality
        .validate(primary, &gate_params, ExpectedType::Auto)
        .await
    {
        Ok(contract) => contract,
        Err(e) => {
            fail_job(state, &job_id, format!("quality gate errored: {e}")).await;
            return;
        }
    };

    // Record the review regardless of outcome; duplicate prompt ids mean a
    // replayed completion event and are ignored.
    if let Some(prompt_id) = &job.backend_id {
        let feedback = QualityFeedback {
            generation_id: job_id.as_str().to_string(),
            prompt_id: prompt_id.clone(),
            project_id: job.project_id.clone(),
            generation_params: gate_params.clone(),
            contract_passed: contract.passed,
            quality_score: contract.quality_score,
            structural_gates: serde_json::to_value(&contract.structural_gates)
                .unwrap_or_default(),
            motion_gates: serde_json::to_value(&contract.motion_gates).unwrap_or_default(),
            quality_gates: serde_json::to_value(&contract.quality_gates).unwrap_or_default(),
            frame_samples: contract.frame_samples.clone(),
            recommendations: contract.recommendations.clone(),
            successful_elements: Vec::new(),
            failed_elements: Vec::new(),
            analysis_notes: None,
            output_path: Some(primary.display().to_string()),
            file_size_bytes: std::fs::metadata(primary).map(|m| m.len() as i64).ok(),
            duration_secs: None,
            frame_count: None,
            human_score: None,
            human_notes: None,
            created_at: Utc::now(),
        };
        if let Err(e) = state.catalog.quality().insert(&feedback).await {
            warn!("Quality feedback for job {} not recorded: {}", job_id, e);
        }
    }

    if contract.passed {
        let update = JobUpdate {
            output_path: files.first().cloned(),
            organized_path: Some(primary.display().to_string()),
            ..Default::default()
        };
        if let Err(e) = state
            .manager
            .update_job_status(&job_id, JobStatus::Completed, update)
            .await
        {
            warn!("Completion transition for job {} failed: {}", job_id, e);
        }
    } else {
        let reason = contract
            .recommendations
            .first()
            .cloned()
            .unwrap_or_else(|| "quality contract failed".to_string());
        fail_job(state, &job_id, format!("quality contract failed: {reason}")).await;
    }
}

async fn fail_job(state: &SharedState, job_id: &JobId, reason: String) {
    warn!("Job {} failed: {}", job_id, reason);
    let update = JobUpdate {
        error_message: Some(reason),
        ..Default::default()
    };
    if let Err(e) = state
        .manager
        .update_job_status(job_id, JobStatus::Failed, update)
        .await
    {
        // Already terminal (e.g. cancelled) - nothing left to do.
        warn!("Failure transition for job {} not applied: {}", job_id, e);
    }
}

fn gate_params(job: &Job) -> Value {
    let mut params = serde_json::Map::new();
    for key in ["width", "height", "duration", "fps", "batch_size", "generator"] {
        let value = job.parameters_value(key);
        if !value.is_null() {
            params.insert(key.to_string(), value);
        }
    }
    Value::Object(params)
}

fn param_u32(value: &Value, default: u32) -> u32 {
    value.as_u64().map(|v| v as u32).unwrap_or(default)
}

/// Small accessor so the pipeline reads job parameters uniformly.
trait ParametersExt {
    fn parameters_value(&self, key: &str) -> Value;
}

impl ParametersExt for Job {
    fn parameters_value(&self, key: &str) -> Value {
        self.parameters.get(key).cloned().unwrap_or(Value::Null)
    }
}
