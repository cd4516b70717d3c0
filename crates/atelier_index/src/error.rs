//! Error types for the reference index.

use atelier_protocol::CoreError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, IndexError>;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Index request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Index upstream error: {0}")]
    Upstream(String),

    #[error("Catalog error during rebuild: {0}")]
    Catalog(#[from] atelier_catalog::CatalogError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<IndexError> for CoreError {
    fn from(e: IndexError) -> Self {
        match e {
            IndexError::Catalog(inner) => inner.into(),
            other => CoreError::Upstream(other.to_string()),
        }
    }
}
