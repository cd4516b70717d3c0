//! Index rebuild - embed every catalog row into a reference-only point.

use crate::embed::{EmbedClient, VECTOR_DIM};
use crate::error::Result;
use crate::payload::{point_id, IndexPoint, RefPayload};
use crate::qdrant::QdrantClient;
use crate::search_text::{
    character_search_text, episode_search_text, scene_search_text, style_search_text,
};
use atelier_catalog::CatalogStore;
use serde::Serialize;
use tracing::{info, warn};

/// Points per upsert batch.
const UPSERT_BATCH: usize = 64;
/// Rows whose search text ends up shorter than this carry too little signal
/// to embed.
const MIN_SEARCH_TEXT: usize = 10;

/// Outcome of one rebuild run.
#[derive(Debug, Default, Clone, Serialize)]
pub struct RebuildReport {
    pub points_indexed: usize,
    pub rows_skipped: usize,
    pub embed_failures: usize,
    pub dropped_collection: bool,
}

/// Rebuilds the reference index from the catalog.
pub struct IndexRebuilder {
    catalog: CatalogStore,
    qdrant: QdrantClient,
    embedder: EmbedClient,
}

impl IndexRebuilder {
    pub fn new(catalog: CatalogStore, qdrant: QdrantClient, embedder: EmbedClient) -> Self {
        Self {
            catalog,
            qdrant,
            embedder,
        }
    }

    /// Full rebuild drops and recreates the collection; incremental mode
    /// upserts over existing points (same ids, so re-running is idempotent).
    pub async fn rebuild(&self, incremental: bool) -> Result<RebuildReport> {
        let mut report = RebuildReport::default();

        if !incremental {
            self.qdrant.drop_collection().await?;
            self.qdrant.create_collection(VECTOR_DIM).await?;
            report.dropped_collection = true;
        } else if !self.qdrant.collection_exists().await? {
            self.qdrant.create_collection(VECTOR_DIM).await?;
        }

        let mut batch: Vec<IndexPoint> = Vec::with_capacity(UPSERT_BATCH);

        for project in self.catalog.projects().list().await? {
            for character in self.catalog.characters().list(&project.id).await? {
                let text = character_search_text(&character);
                let payload = RefPayload::new("character", "characters", &character.id, text)
                    .with_display_name(&character.name);
                self.push_point(&mut batch, &mut report, payload).await?;
            }

            for scene in self.catalog.scenes().list_scenes(&project.id).await? {
                let text = scene_search_text(&scene);
                let display = scene
                    .title
                    .clone()
                    .unwrap_or_else(|| format!("scene {}", scene.scene_number));
                let payload = RefPayload::new("scene", "scenes", &scene.id, text)
                    .with_display_name(display);
                self.push_point(&mut batch, &mut report, payload).await?;
            }

            if let Some(style) = self
                .catalog
                .projects()
                .get_project_style(&project.id)
                .await?
            {
                let text = style_search_text(&style);
                let payload =
                    RefPayload::new("style", "generation_styles", &style.name, text)
                        .with_display_name(&style.name);
                self.push_point(&mut batch, &mut report, payload).await?;
            }

            for episode in self.catalog.scenes().list_episodes(&project.id).await? {
                let text = episode_search_text(&episode);
                let payload = RefPayload::new("episode", "episodes", &episode.id, text)
                    .with_display_name(&episode.title);
                self.push_point(&mut batch, &mut report, payload).await?;
            }
        }

        self.flush(&mut batch).await?;
        info!(
            "Index rebuild complete: {} points, {} skipped, {} embed failures",
            report.points_indexed, report.rows_skipped, report.embed_failures
        );
        Ok(report)
    }

    async fn push_point(
        &self,
        batch: &mut Vec<IndexPoint>,
        report: &mut RebuildReport,
        payload: RefPayload,
    ) -> Result<()> {
        if payload.search_text.len() < MIN_SEARCH_TEXT {
            report.rows_skipped += 1;
            return Ok(());
        }
        match self.embedder.embed(&payload.search_text).await {
            Ok(vector) => {
                let id = point_id(&payload.source_table, &payload.source_id);
                batch.push(IndexPoint {
                    id,
                    vector,
                    payload,
                });
                report.points_indexed += 1;
                if batch.len() >= UPSERT_BATCH {
                    self.flush(batch).await?;
                }
            }
            Err(e) => {
                warn!(
                    "Embedding failed for {}:{}: {}",
                    payload.source_table, payload.source_id, e
                );
                report.embed_failures += 1;
            }
        }
        Ok(())
    }

    async fn flush(&self, batch: &mut Vec<IndexPoint>) -> Result<()> {
        if !batch.is_empty() {
            self.qdrant.upsert(batch).await?;
            batch.clear();
        }
        Ok(())
    }
}
