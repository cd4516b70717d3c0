//! Server configuration from environment variables.

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Everything the server needs to start. Missing critical values fail at
/// startup; everything else has a documented default.
#[derive(Debug, Clone)]
pub struct AtelierConfig {
    /// `ATELIER_COMFYUI_URL` - the generation backend.
    pub comfyui_url: String,
    /// `ATELIER_OUTPUT_DIR` - where the backend writes raw outputs.
    pub output_dir: PathBuf,
    /// `ATELIER_ORGANIZED_DIR` - root of the organized project tree.
    pub organized_dir: PathBuf,
    /// `ATELIER_API_PORT` - HTTP listen port.
    pub api_port: u16,
    /// `ATELIER_DATABASE_URL` - sqlx DSN for the catalog store.
    pub database_url: String,
    /// `ATELIER_ECHO_URL` - LLM collaborator; empty disables it.
    pub echo_url: Option<String>,
    /// `ATELIER_QDRANT_URL` - vector index; empty disables it.
    pub qdrant_url: Option<String>,
    /// `ATELIER_OLLAMA_URL` - embedding endpoint for the index.
    pub ollama_url: String,
    /// `ATELIER_WORKFLOW_DIR` / `ATELIER_CHECKPOINT_DIR` /
    /// `ATELIER_LORA_DIR` - model asset roots.
    pub workflow_dir: PathBuf,
    pub checkpoint_dir: PathBuf,
    pub lora_dir: PathBuf,
    /// `ATELIER_MAX_WORKERS` - generation worker count.
    pub max_workers: usize,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl AtelierConfig {
    pub fn from_env() -> Result<Self> {
        let api_port: u16 = env_or("ATELIER_API_PORT", "8328")
            .parse()
            .context("ATELIER_API_PORT is not a valid port")?;
        let max_workers: usize = env_or("ATELIER_MAX_WORKERS", "3")
            .parse()
            .context("ATELIER_MAX_WORKERS is not a number")?;

        let database_url = env_or("ATELIER_DATABASE_URL", "sqlite:atelier.db?mode=rwc");
        if database_url.trim().is_empty() {
            anyhow::bail!("ATELIER_DATABASE_URL must not be empty");
        }

        Ok(Self {
            comfyui_url: env_or("ATELIER_COMFYUI_URL", "http://127.0.0.1:8188"),
            output_dir: PathBuf::from(env_or("ATELIER_OUTPUT_DIR", "/tmp/comfyui/output")),
            organized_dir: PathBuf::from(env_or("ATELIER_ORGANIZED_DIR", "./organized_outputs")),
            api_port,
            database_url,
            echo_url: env_opt("ATELIER_ECHO_URL")
                .or_else(|| Some("http://127.0.0.1:8309".to_string())),
            qdrant_url: env_opt("ATELIER_QDRANT_URL")
                .or_else(|| Some("http://127.0.0.1:6333".to_string())),
            ollama_url: env_or("ATELIER_OLLAMA_URL", "http://127.0.0.1:11434"),
            workflow_dir: PathBuf::from(env_or("ATELIER_WORKFLOW_DIR", "./workflows")),
            checkpoint_dir: PathBuf::from(env_or("ATELIER_CHECKPOINT_DIR", "./models/checkpoints")),
            lora_dir: PathBuf::from(env_or("ATELIER_LORA_DIR", "./models/loras")),
            max_workers,
        })
    }
}
