//! Embedding client (Ollama-compatible `/api/embed`).

use crate::error::{IndexError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Vector dimensionality of the collection.
pub const VECTOR_DIM: usize = 768;
/// Embedding model served by the endpoint.
pub const EMBEDDING_MODEL: &str = "nomic-embed-text";

const EMBED_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Client for the embedding endpoint.
#[derive(Clone)]
pub struct EmbedClient {
    client: reqwest::Client,
    base_url: String,
}

impl EmbedClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Embed one text into a 768-dim vector. A wrong dimensionality from
    /// the endpoint is an error, not something to pad over.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/api/embed", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&EmbedRequest {
                model: EMBEDDING_MODEL,
                input: vec![text],
            })
            .timeout(EMBED_TIMEOUT)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(IndexError::Upstream(format!(
                "embedding endpoint returned {status}"
            )));
        }

        let body: EmbedResponse = response.json().await?;
        let vector = body
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| IndexError::Upstream("embedding response was empty".to_string()))?;

        if vector.len() != VECTOR_DIM {
            return Err(IndexError::Upstream(format!(
                "wrong vector dim: got {}, expected {VECTOR_DIM}",
                vector.len()
            )));
        }

        debug!("Embedded {} chars", text.len());
        Ok(vector)
    }
}
