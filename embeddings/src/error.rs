//! Error types for the embeddings system.

use thiserror::Error;

/// Result type alias for embedding operations.
pub type Result<T> = std::result::Result<T, EmbeddingError>;

/// Errors that can occur in the embeddings system.
#[derive(Error, Debug)]
pub enum EmbeddingError {
    /// Provider not configured.
    #[error("embedding provider not configured")]
    ProviderNotConfigured,

    /// Vector norm is zero or not finite.
    #[error("degenerate vector: norm is {norm}")]
    DegenerateVector { norm: f32 },

    /// Dimension mismatch.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The provider reported rate or quota exhaustion.
    #[error("embedding quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Any other provider failure (transport, status, parse).
    #[error("provider error: {0}")]
    Provider(String),

    /// The provider call did not finish within the request timeout.
    #[error("embedding request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

impl EmbeddingError {
    /// Whether the failure is environmental and the caller should degrade
    /// to keyword search instead of surfacing it.
    pub fn is_fallback_trigger(&self) -> bool {
        matches!(
            self,
            Self::ProviderNotConfigured
                | Self::QuotaExceeded(_)
                | Self::Provider(_)
                | Self::Timeout { .. }
                | Self::Http(_)
                | Self::Serialization(_)
                | Self::DegenerateVector { .. }
        )
    }
}
