use thiserror::Error;
use uuid::Uuid;

use crate::models::EmbedField;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("Record not found: {0}")]
    RecordNotFound(Uuid),

    #[error("Record {id} has no stored {field} embedding")]
    MissingEmbedding { id: Uuid, field: EmbedField },

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Embedding provider error: {0}")]
    Provider(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type EmbeddingResult<T> = Result<T, EmbeddingError>;

impl From<reqwest::Error> for EmbeddingError {
    fn from(err: reqwest::Error) -> Self {
        EmbeddingError::Provider(err.to_string())
    }
}

impl From<serde_json::Error> for EmbeddingError {
    fn from(err: serde_json::Error) -> Self {
        EmbeddingError::Internal(format!("JSON error: {}", err))
    }
}
