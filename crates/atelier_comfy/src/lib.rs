//! ComfyUI connector and workflow composer.

pub mod client;
pub mod workflow;

pub use client::{ComfyClient, HistoryEntry, NodeOutput, OutputImage, QueueStatus};
pub use workflow::{
    build_batch_workflow, build_image_workflow, build_video_workflow, validate, ImageParams,
    VideoParams, WorkflowGraph, WorkflowNode, DEFAULT_MODEL, MIN_VIDEO_BATCH,
};

use atelier_protocol::CoreError;
use std::time::Duration;
use thiserror::Error;

/// Connector errors. Parse failures never surface here - they yield `None`
/// at the call site.
#[derive(Debug, Error)]
pub enum ComfyError {
    #[error("ComfyUI request failed: {0}")]
    Http(reqwest::Error),

    #[error("ComfyUI request timed out after {0:?}")]
    Timeout(Duration),

    #[error("ComfyUI unreachable: {0}")]
    Unavailable(String),
}

impl ComfyError {
    pub(crate) fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ComfyError::Timeout(Duration::from_secs(5))
        } else {
            ComfyError::Http(e)
        }
    }
}

impl From<ComfyError> for CoreError {
    fn from(e: ComfyError) -> Self {
        match e {
            ComfyError::Timeout(d) => CoreError::Timeout(format!("comfyui call after {d:?}")),
            other => CoreError::Upstream(other.to_string()),
        }
    }
}
