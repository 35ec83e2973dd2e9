//! # Retrieval
//!
//! Retrieval core for a conversational product-search assistant. Given a
//! free-text query it returns a small, relevant set of catalog products,
//! ranked by embedding similarity when the embedding provider is reachable
//! and by title matching when it is not.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        SearchService                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐           │
//! │  │  Embedding   │  │ ProductIndex │  │   Keyword    │           │
//! │  │ cache + rate │  │ + type views │  │   fallback   │           │
//! │  └──────────────┘  └──────────────┘  └──────────────┘           │
//! │         │                │                  │                   │
//! │         └────────────────┼──────────────────┘                   │
//! │                          ▼                                      │
//! │                  ┌──────────────┐      ┌──────────────┐         │
//! │                  │SearchOutcome │ ───► │SessionMemory │         │
//! │                  └──────────────┘      └──────────────┘         │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use shopsearch_retrieval::{ProductIndex, RetrievalConfig, SearchService, TypeFilter};
//!
//! let config = RetrievalConfig::load("shopsearch.toml").await?;
//! let entries = load_catalog_file("product_embeddings.json").await?;
//! let index = ProductIndex::load(entries, config.search.product_types.clone())?;
//! let service = SearchService::from_config(Arc::new(index), &config);
//!
//! let outcome = service.search("best bar soap", 3, TypeFilter::Auto).await?;
//! ```

pub mod config;
pub mod error;
pub mod index;
pub mod intent;
pub mod keyword;
pub mod product;
pub mod ranker;
pub mod session;

pub use config::RetrievalConfig;
pub use error::{Result, RetrievalError};
pub use index::{ProductIndex, ProductType, TypeFilteredView};
pub use intent::{QueryIntent, classify, correct_typos};
pub use keyword::keyword_search;
pub use product::{CatalogEntry, ProductRecord, load_catalog_file};
pub use ranker::{SearchHit, SearchMethod, SearchOutcome, SearchService, TypeFilter};
pub use session::{ChatRole, ChatTurn, ResultLink, SessionMemory};

// Re-export from dependencies for convenience
pub use shopsearch_embeddings::{EmbeddingError, EmbeddingProvider, RateLimitedProvider};
