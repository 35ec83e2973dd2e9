//! Error types for the retrieval core.

use thiserror::Error;

/// Result type alias for retrieval operations.
pub type Result<T> = std::result::Result<T, RetrievalError>;

/// Errors that can occur in the retrieval core.
#[derive(Error, Debug)]
pub enum RetrievalError {
    /// Embedding error that was not recovered by falling back.
    #[error("embedding error: {0}")]
    Embedding(#[from] shopsearch_embeddings::EmbeddingError),

    /// The catalog could not be turned into an index.
    #[error("catalog load error: {0}")]
    Load(String),

    /// A caller passed an argument that can never be valid.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Configuration file could not be parsed.
    #[error("configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
