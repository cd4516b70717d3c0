//! Qdrant REST client - collection lifecycle, upserts, filtered search.

use crate::error::{IndexError, Result};
use crate::payload::{IndexPoint, ReferenceHit, RefPayload};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};

/// Collection holding the reference index.
pub const COLLECTION: &str = "story_bible";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Thin REST wrapper; the vector index stays a black box with
/// upsert/search semantics.
#[derive(Clone)]
pub struct QdrantClient {
    client: reqwest::Client,
    base_url: String,
}

impl QdrantClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn check_health(&self) -> bool {
        self.client
            .get(self.url("/collections"))
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    /// Create the collection with cosine distance.
    pub async fn create_collection(&self, dim: usize) -> Result<()> {
        let response = self
            .client
            .put(self.url(&format!("/collections/{COLLECTION}")))
            .json(&json!({
                "vectors": { "size": dim, "distance": "Cosine" }
            }))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(IndexError::Upstream(format!(
                "create collection returned {}",
                response.status()
            )));
        }
        info!("Created collection {COLLECTION} (dim {dim})");
        Ok(())
    }

    pub async fn drop_collection(&self) -> Result<()> {
        let response = self
            .client
            .delete(self.url(&format!("/collections/{COLLECTION}")))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        // 404 means there was nothing to drop; that is fine for a rebuild.
        if !response.status().is_success() && response.status().as_u16() != 404 {
            return Err(IndexError::Upstream(format!(
                "drop collection returned {}",
                response.status()
            )));
        }
        info!("Dropped collection {COLLECTION}");
        Ok(())
    }

    pub async fn collection_exists(&self) -> Result<bool> {
        let response = self
            .client
            .get(self.url(&format!("/collections/{COLLECTION}")))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        Ok(response.status().is_success())
    }

    /// Upsert a batch of points. Same ids overwrite in place, which is what
    /// makes incremental rebuilds idempotent.
    pub async fn upsert(&self, points: &[IndexPoint]) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }
        let body = json!({
            "points": points
                .iter()
                .map(|p| json!({
                    "id": p.id,
                    "vector": p.vector,
                    "payload": p.payload,
                }))
                .collect::<Vec<_>>()
        });
        let response = self
            .client
            .put(self.url(&format!("/collections/{COLLECTION}/points?wait=true")))
            .json(&body)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(IndexError::Upstream(format!(
                "upsert returned {}",
                response.status()
            )));
        }
        debug!("Upserted {} points", points.len());
        Ok(())
    }

    /// Vector search, optionally filtered by payload `type`. Returns
    /// references only.
    pub async fn search(
        &self,
        vector: &[f32],
        limit: usize,
        type_filter: Option<&str>,
    ) -> Result<Vec<ReferenceHit>> {
        let mut body = json!({
            "vector": vector,
            "limit": limit,
            "with_payload": true,
        });
        if let Some(entry_type) = type_filter {
            body["filter"] = json!({
                "must": [{ "key": "type", "match": { "value": entry_type } }]
            });
        }

        let response = self
            .client
            .post(self.url(&format!("/collections/{COLLECTION}/points/search")))
            .json(&body)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(IndexError::Upstream(format!(
                "search returned {}",
                response.status()
            )));
        }

        #[derive(serde::Deserialize)]
        struct SearchResponse {
            result: Vec<ScoredPoint>,
        }
        #[derive(serde::Deserialize)]
        struct ScoredPoint {
            score: f64,
            payload: RefPayload,
        }

        let body: SearchResponse = response.json().await?;
        Ok(body
            .result
            .into_iter()
            .map(|point| ReferenceHit {
                source_table: point.payload.source_table,
                source_id: point.payload.source_id,
                entry_type: point.payload.entry_type,
                display_name: point.payload.display_name,
                score: point.score,
            })
            .collect())
    }
}
