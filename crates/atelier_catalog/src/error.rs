//! Error types for the catalog store.

use atelier_protocol::CoreError;
use thiserror::Error;

/// Catalog operation result type.
pub type Result<T> = std::result::Result<T, CatalogError>;

/// Catalog store errors.
#[derive(Error, Debug)]
pub enum CatalogError {
    /// SQLx error (connection, query, etc.)
    #[error("Database error: {0}")]
    Sqlx(sqlx::Error),

    /// Connection could not be established within the retry budget.
    #[error("Database unavailable: {0}")]
    Unavailable(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Unique or foreign-key violation
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Caller handed us something unusable
    #[error("Bad input: {0}")]
    BadInput(String),

    /// JSON column (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CatalogError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn bad_input(msg: impl Into<String>) -> Self {
        Self::BadInput(msg.into())
    }
}

impl From<sqlx::Error> for CatalogError {
    fn from(e: sqlx::Error) -> Self {
        // Integrity violations surface as Conflict so the HTTP layer can map
        // them to 409 instead of 500.
        if let sqlx::Error::Database(db) = &e {
            if db.is_unique_violation() || db.is_foreign_key_violation() {
                return CatalogError::Conflict(db.message().to_string());
            }
        }
        if let sqlx::Error::RowNotFound = &e {
            return CatalogError::NotFound("row not found".to_string());
        }
        CatalogError::Sqlx(e)
    }
}

impl From<CatalogError> for CoreError {
    fn from(e: CatalogError) -> Self {
        match e {
            CatalogError::NotFound(msg) => CoreError::NotFound(msg),
            CatalogError::Conflict(msg) => CoreError::Conflict(msg),
            CatalogError::BadInput(msg) => CoreError::BadInput(msg),
            CatalogError::Unavailable(msg) => CoreError::Upstream(msg),
            CatalogError::Sqlx(e) => CoreError::Upstream(e.to_string()),
            CatalogError::Serialization(e) => CoreError::Internal(e.to_string()),
        }
    }
}
