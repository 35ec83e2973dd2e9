//! Configuration for the retrieval core.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RetrievalError};
use crate::index::ProductType;

/// Configuration for the retrieval core.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Embedding provider configuration.
    pub embedding: EmbeddingConfig,

    /// Search configuration.
    pub search: SearchConfig,

    /// Session memory configuration.
    pub session: SessionConfig,

    /// Storefront configuration.
    pub store: StoreConfig,
}

impl RetrievalConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        Self::from_toml_str(&content)
    }

    /// Set the embedding configuration.
    pub fn with_embedding(mut self, config: EmbeddingConfig) -> Self {
        self.embedding = config;
        self
    }

    /// Set the search configuration.
    pub fn with_search(mut self, config: SearchConfig) -> Self {
        self.search = config;
        self
    }

    /// Set the session configuration.
    pub fn with_session(mut self, config: SessionConfig) -> Self {
        self.session = config;
        self
    }

    /// Set the store base URL used for product links.
    pub fn with_store_url(mut self, base_url: impl Into<String>) -> Self {
        self.store.base_url = base_url.into();
        self
    }

    /// Reject values that would make the service unusable.
    pub fn validate(&self) -> Result<()> {
        if self.embedding.cache_max_entries == 0 {
            return Err(RetrievalError::Config(
                "embedding.cache_max_entries must be positive".to_string(),
            ));
        }
        if self.embedding.request_timeout_ms == 0 {
            return Err(RetrievalError::Config(
                "embedding.request_timeout_ms must be positive".to_string(),
            ));
        }
        if self.embedding.dimension == Some(0) {
            return Err(RetrievalError::Config(
                "embedding.dimension must be positive".to_string(),
            ));
        }
        if self.search.default_k == 0 {
            return Err(RetrievalError::Config(
                "search.default_k must be positive".to_string(),
            ));
        }
        if self.session.max_sessions == 0 {
            return Err(RetrievalError::Config(
                "session.max_sessions must be positive".to_string(),
            ));
        }
        if let Some(empty) = self
            .search
            .product_types
            .iter()
            .find(|t| t.label.trim().is_empty() || t.synonyms.is_empty())
        {
            return Err(RetrievalError::Config(format!(
                "product type {:?} needs a label and at least one synonym",
                empty.label
            )));
        }
        Ok(())
    }
}

/// Configuration for the embedding provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Model to use for embeddings.
    pub model: String,

    /// Base URL of the OpenAI-compatible API.
    pub base_url: String,

    /// Environment variable holding the API key.
    pub api_key_env: String,

    /// Maximum cache size.
    pub cache_max_entries: usize,

    /// Minimum spacing between provider calls, in milliseconds.
    pub min_request_interval_ms: u64,

    /// Upper bound on one provider call, in milliseconds.
    pub request_timeout_ms: u64,

    /// Vector length every catalog entry must have. When unset, the first
    /// indexed entry decides.
    pub dimension: Option<usize>,
}

impl EmbeddingConfig {
    pub fn min_request_interval(&self) -> Duration {
        Duration::from_millis(self.min_request_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "text-embedding-3-small".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            cache_max_entries: shopsearch_embeddings::cache::DEFAULT_MAX_ENTRIES,
            min_request_interval_ms: 1000,
            request_timeout_ms: 5000,
            dimension: None,
        }
    }
}

/// Configuration for query processing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Number of results returned when the caller does not ask for a count.
    pub default_k: usize,

    /// Ordered product types used to narrow the candidate set.
    pub product_types: Vec<ProductType>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_k: 3,
            product_types: ProductType::defaults(),
        }
    }
}

/// Configuration for conversation memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Maximum number of live sessions; the least recently used is evicted.
    pub max_sessions: usize,

    /// Sessions idle longer than this are dropped (`None` or 0 disables).
    pub idle_timeout_secs: Option<u64>,

    /// System persona placed at the head of every history.
    pub persona: String,

    /// Turns returned by `recent_history` after the persona.
    pub history_window: usize,
}

impl SessionConfig {
    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_sessions: 10_000,
            idle_timeout_secs: Some(3600),
            persona: DEFAULT_PERSONA.to_string(),
            history_window: 5,
        }
    }
}

const DEFAULT_PERSONA: &str = "You are the store's shopping assistant. Only recommend products \
the store carries and never mention other retailers. Keep replies warm, brief and \
conversational, mention product titles rather than links, and when the user refers to \
something you mentioned earlier, use the products from your previous message.";

/// Storefront settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Base URL that product handles are appended to.
    pub base_url: String,
}

impl StoreConfig {
    /// Public link for a product handle.
    pub fn product_link(&self, handle: &str) -> String {
        format!("{}/products/{handle}", self.base_url.trim_end_matches('/'))
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_url: "https://example.com".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = RetrievalConfig::default();
        assert_eq!(config.embedding.cache_max_entries, 500);
        assert_eq!(config.embedding.min_request_interval(), Duration::from_secs(1));
        assert_eq!(config.search.default_k, 3);
        assert_eq!(config.search.product_types[0].label, "bar soap");
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = RetrievalConfig::from_toml_str(
            r#"
            [embedding]
            cache_max_entries = 50
            dimension = 1536

            [session]
            idle_timeout_secs = 60

            [store]
            base_url = "https://shop.example/"
            "#,
        )
        .unwrap();

        assert_eq!(config.embedding.cache_max_entries, 50);
        assert_eq!(config.embedding.request_timeout_ms, 5000);
        assert_eq!(config.embedding.dimension, Some(1536));
        assert_eq!(config.session.idle_timeout(), Some(Duration::from_secs(60)));
        assert_eq!(config.session.max_sessions, 10_000);
        assert_eq!(
            config.store.product_link("shea-bar-soap"),
            "https://shop.example/products/shea-bar-soap"
        );
    }

    #[test]
    fn test_custom_product_types() {
        let config = RetrievalConfig::from_toml_str(
            r#"
            [[search.product_types]]
            label = "toner"
            synonyms = ["toner", "tonic"]
            "#,
        )
        .unwrap();

        assert_eq!(config.search.product_types.len(), 1);
        assert_eq!(config.search.product_types[0].synonyms, vec!["toner", "tonic"]);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = RetrievalConfig::from_toml_str("[search]\ndefault_k = 0\n").unwrap_err();
        assert!(matches!(err, RetrievalError::Config(_)));

        let err = RetrievalConfig::from_toml_str("[embedding]\ncache_max_entries = 0\n").unwrap_err();
        assert!(matches!(err, RetrievalError::Config(_)));

        let err =
            RetrievalConfig::from_toml_str("[embedding]\nrequest_timeout_ms = 0\n").unwrap_err();
        assert!(matches!(err, RetrievalError::Config(_)));

        let err = RetrievalConfig::from_toml_str("[search\n").unwrap_err();
        assert!(matches!(err, RetrievalError::ConfigParse(_)));
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("shopsearch.toml");
        tokio::fs::write(&path, "[search]\ndefault_k = 7\n").await.unwrap();

        let config = RetrievalConfig::load(&path).await.unwrap();
        assert_eq!(config.search.default_k, 7);
    }
}
