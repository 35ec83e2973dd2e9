//! # Embeddings
//!
//! Query embeddings for catalog search: vector math, the provider seam,
//! global rate limiting and a bounded LRU cache.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Embeddings System                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  CachedProvider ──► RateLimitedProvider ──► OpenAIProvider      │
//! │       │                                                         │
//! │       ▼                                                         │
//! │  EmbeddingCache (LRU)          similarity::{normalize, cosine}  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod cache;
pub mod error;
pub mod provider;
pub mod rate_limit;
pub mod similarity;

pub use cache::{CacheStats, CachedProvider, EmbeddingCache, cache_key};
pub use error::{EmbeddingError, Result};
pub use provider::{EmbeddingProvider, EmbeddingRequest, EmbeddingResponse, OpenAIProvider};
pub use rate_limit::RateLimitedProvider;
pub use similarity::{SimilarityResult, cosine_similarity, find_top_k, normalize};

/// A dense vector embedding.
pub type Embedding = Vec<f32>;
