//! `/generate` - request intake, clarification gating, job creation.

use crate::error::{ApiError, ApiResult};
use crate::state::SharedState;
use atelier_protocol::http::{
    validate_dimension, validate_duration, validate_prompt, ClarificationResponse,
    GenerateRequest, GenerateResponse,
};
use atelier_protocol::intent::{AmbiguityType, ContentType, GenerationScope, ResolvedValue};
use atelier_protocol::{CoreError, JobType, ResourceId};
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::collections::HashMap;
use tracing::info;

pub async fn generate(
    State(state): State<SharedState>,
    Json(request): Json<GenerateRequest>,
) -> ApiResult<Response> {
    let prompt = validate_prompt(&request.prompt)?;
    let width = validate_dimension(request.width, "width")?;
    let height = validate_dimension(request.height, "height")?;
    if let Some(project_id) = &request.project_id {
        ResourceId::parse(project_id)?;
    }
    if let Some(character_id) = &request.character_id {
        ResourceId::parse(character_id)?;
    }

    let classification = state.intent.classify(&prompt, "default").await;
    let report = state.intent.process(&prompt, &classification);

    // A blocking ambiguity stops here: the caller gets the questions and no
    // job is created.
    if !report.blocking_issues.is_empty() {
        info!(
            "Request blocked on {:?}, returning clarification payload",
            report.blocking_issues
        );
        let questions = report
            .resolutions
            .iter()
            .filter_map(|r| match &r.resolved_value {
                ResolvedValue::Question { question } => Some(question.clone()),
                _ => None,
            })
            .collect();
        return Ok(Json(ClarificationResponse::new(questions, report.ambiguities))
            .into_response());
    }

    let job_type = if classification.generation_scope == GenerationScope::BatchGeneration {
        JobType::Batch
    } else {
        match classification.content_type {
            ContentType::Video | ContentType::MixedMedia => JobType::Video,
            ContentType::Image => JobType::Image,
            ContentType::Audio => {
                return Err(ApiError(CoreError::bad_input(
                    "audio generation is handled by the voice pipeline, not /generate",
                )))
            }
        }
    };

    let mut parameters: HashMap<String, serde_json::Value> = HashMap::new();
    parameters.insert("width".to_string(), width.into());
    parameters.insert("height".to_string(), height.into());
    if let Some(negative) = &request.negative_prompt {
        parameters.insert("negative_prompt".to_string(), negative.clone().into());
    }
    if let Some(style) = &request.style_preset {
        parameters.insert("style_preset".to_string(), style.clone().into());
    }

    if job_type == JobType::Video {
        // Explicit duration, else the resolver's intelligent default.
        let duration = classification
            .duration_seconds
            .or_else(|| resolved_duration(&report.resolutions))
            .unwrap_or(15);
        let duration = validate_duration(duration)?;
        parameters.insert("duration".to_string(), duration.into());
        parameters.insert("fps".to_string(), 12.into());
        parameters.insert(
            "batch_size".to_string(),
            (duration * 12).max(16).into(),
        );
    }

    let job = state
        .manager
        .create_job(
            job_type,
            prompt,
            parameters,
            request.project_id.clone(),
            request.character_id.clone(),
        )
        .await;

    let queue_position = state.queue().depth() + 1;
    state
        .queue()
        .enqueue(job.id.clone())
        .await
        .map_err(|_| ApiError(CoreError::upstream("generation queue is full")))?;

    Ok(Json(GenerateResponse {
        job_id: job.id.clone(),
        status: job.status,
        queue_position,
        estimated_time: classification.estimated_time_minutes * 60.0,
        websocket_url: format!("/ws/{}", job.id),
    })
    .into_response())
}

fn resolved_duration(
    resolutions: &[atelier_protocol::intent::ResolutionResult],
) -> Option<u32> {
    resolutions
        .iter()
        .find(|r| r.ambiguity_type == AmbiguityType::DurationMissing)
        .and_then(|r| match &r.resolved_value {
            ResolvedValue::Literal { value } => value.as_u64().map(|v| v as u32),
            _ => None,
        })
}
