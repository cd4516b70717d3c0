//! Reference index - semantic search returning only `(table, id)` pointers.
//!
//! The catalog store is the single source of truth. This crate embeds
//! catalog-derived search strings into a Qdrant collection and answers
//! queries with references; consumers fetch the authoritative rows from the
//! catalog by the returned keys. Payload text is never read back as data.

mod embed;
mod error;
mod payload;
mod qdrant;
mod rebuild;
mod search_text;

pub use embed::{EmbedClient, EMBEDDING_MODEL, VECTOR_DIM};
pub use error::{IndexError, Result};
pub use payload::{point_id, IndexPoint, ReferenceHit, RefPayload, SEARCH_TEXT_CAP};
pub use qdrant::{QdrantClient, COLLECTION};
pub use rebuild::{IndexRebuilder, RebuildReport};
pub use search_text::{
    auto_search_text, character_search_text, episode_search_text, scene_search_text,
    style_search_text,
};

/// Search facade: embeds the query text, then searches the collection.
#[derive(Clone)]
pub struct ReferenceIndex {
    qdrant: QdrantClient,
    embedder: EmbedClient,
}

impl ReferenceIndex {
    pub fn new(qdrant: QdrantClient, embedder: EmbedClient) -> Self {
        Self { qdrant, embedder }
    }

    /// Semantic search. `type_filter` restricts hits to one entry type
    /// (e.g. `"scene"`).
    pub async fn search(
        &self,
        query_text: &str,
        limit: usize,
        type_filter: Option<&str>,
    ) -> Result<Vec<ReferenceHit>> {
        let vector = self.embedder.embed(query_text).await?;
        self.qdrant.search(&vector, limit, type_filter).await
    }

    pub async fn check_health(&self) -> bool {
        self.qdrant.check_health().await
    }

    pub fn qdrant(&self) -> &QdrantClient {
        &self.qdrant
    }

    pub fn embedder(&self) -> &EmbedClient {
        &self.embedder
    }
}
