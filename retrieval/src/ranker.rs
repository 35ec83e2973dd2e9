//! Query ranking: cache lookup, embedding, type filtering and top-k.
//!
//! ```text
//! query ──► EmbeddingCache ──hit──────────────┐
//!               │ miss                        ▼
//!               └──► provider ──ok──► type filter ──► cosine top-k
//!                        │ fail
//!                        └──► keyword fallback
//! ```

use std::sync::Arc;

use serde::Serialize;
use shopsearch_embeddings::{
    CachedProvider, EmbeddingCache, EmbeddingProvider, OpenAIProvider,
    RateLimitedProvider, find_top_k,
};
use tracing::{debug, info, warn};

use crate::config::{RetrievalConfig, StoreConfig};
use crate::error::{Result, RetrievalError};
use crate::index::ProductIndex;
use crate::keyword::keyword_search;
use crate::product::ProductRecord;
use crate::session::{ResultLink, SessionMemory};

/// How the candidate set is narrowed before ranking.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TypeFilter {
    /// Use the first product type mentioned in the query.
    #[default]
    Auto,
    /// Rank against the whole index.
    Disabled,
    /// Use a configured product type by label.
    Label(String),
}

/// Which path produced the results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMethod {
    Semantic,
    Keyword,
}

/// A ranked product.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub product: Arc<ProductRecord>,
    /// Cosine similarity; `None` for keyword matches.
    pub score: Option<f32>,
}

/// Result of one query.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    /// Hits in rank order.
    pub hits: Vec<SearchHit>,
    pub method: SearchMethod,
    /// Product type that narrowed the candidates, if any.
    pub type_label: Option<String>,
}

impl SearchOutcome {
    fn keyword(products: Vec<Arc<ProductRecord>>) -> Self {
        Self {
            hits: products
                .into_iter()
                .map(|product| SearchHit {
                    product,
                    score: None,
                })
                .collect(),
            method: SearchMethod::Keyword,
            type_label: None,
        }
    }

    /// Ranked products.
    pub fn products(&self) -> impl Iterator<Item = &ProductRecord> {
        self.hits.iter().map(|h| h.product.as_ref())
    }

    /// Ranked titles.
    pub fn titles(&self) -> Vec<&str> {
        self.products().map(|p| p.title.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }
}

/// Owns everything a query needs: the index, the embedding cache and the
/// rate-limited provider. Build one at startup and share it by reference.
pub struct SearchService<P = RateLimitedProvider<OpenAIProvider>> {
    index: Arc<ProductIndex>,
    embedder: CachedProvider<P>,
    store: StoreConfig,
    default_k: usize,
}

impl SearchService {
    /// Wire the OpenAI provider, rate limiter and cache from configuration.
    pub fn from_config(index: Arc<ProductIndex>, config: &RetrievalConfig) -> Self {
        let embedding = &config.embedding;
        let mut provider = OpenAIProvider::new()
            .with_base_url(embedding.base_url.clone())
            .with_model(embedding.model.clone())
            .with_timeout(embedding.request_timeout());
        if let Ok(key) = std::env::var(&embedding.api_key_env) {
            provider = provider.with_api_key(key);
        } else {
            warn!(
                "{} not set; searches will use keyword matching",
                embedding.api_key_env
            );
        }

        let limited = RateLimitedProvider::new(provider)
            .with_min_interval(embedding.min_request_interval())
            .with_request_timeout(embedding.request_timeout());

        Self::new(index, limited, config)
    }
}

impl<P: EmbeddingProvider> SearchService<P> {
    /// Create a service around any provider. The provider is expected to do
    /// its own rate limiting (see [`RateLimitedProvider`]).
    pub fn new(index: Arc<ProductIndex>, provider: P, config: &RetrievalConfig) -> Self {
        let cache = EmbeddingCache::new(config.embedding.cache_max_entries);
        let embedder = CachedProvider::new(provider, cache).with_dimension(index.dimension());
        Self {
            index,
            embedder,
            store: config.store.clone(),
            default_k: config.search.default_k,
        }
    }

    /// Rank the catalog for `query` and return at most `k` products.
    ///
    /// Provider failures never surface: the query falls back to keyword
    /// matching. Only caller mistakes (`k == 0`, an unknown type label) and
    /// a query vector of the wrong dimension are errors.
    pub async fn search(
        &self,
        query: &str,
        k: usize,
        type_filter: TypeFilter,
    ) -> Result<SearchOutcome> {
        if k == 0 {
            return Err(RetrievalError::InvalidArgument(
                "k must be a positive integer".to_string(),
            ));
        }
        if let TypeFilter::Label(label) = &type_filter {
            if self.index.filter_by_label(label).is_none() {
                return Err(RetrievalError::InvalidArgument(format!(
                    "unknown product type {label:?}"
                )));
            }
        }
        if query.trim().is_empty() {
            return Ok(SearchOutcome::keyword(Vec::new()));
        }

        let query_vector = match self.embedder.embed(query).await {
            Ok(vector) => vector,
            Err(err) if err.is_fallback_trigger() => {
                warn!("Embedding failed for query {query:?} ({err}), falling back to keyword search");
                return Ok(SearchOutcome::keyword(keyword_search(&self.index, query, k)));
            }
            Err(err) => return Err(err.into()),
        };

        let view = match &type_filter {
            TypeFilter::Auto => self.index.filter_by_type(query),
            TypeFilter::Disabled => self.index.all(),
            TypeFilter::Label(label) => self
                .index
                .filter_by_label(label)
                .unwrap_or_else(|| self.index.all()),
        };

        let candidates: Vec<&Arc<ProductRecord>> = view.iter().collect();
        let ranked = find_top_k(
            &query_vector,
            candidates.iter().map(|r| r.embedding.as_slice()),
            k,
        )?;

        let hits: Vec<SearchHit> = ranked
            .into_iter()
            .map(|r| SearchHit {
                product: Arc::clone(candidates[r.position]),
                score: Some(r.score),
            })
            .collect();

        debug!(
            "Ranked {} of {} candidates for {query:?}",
            hits.len(),
            candidates.len()
        );

        Ok(SearchOutcome {
            hits,
            method: SearchMethod::Semantic,
            type_label: view.label().map(str::to_string),
        })
    }

    /// Run a search and remember its results as the session's last result
    /// set, for follow-ups like "the link?".
    pub async fn search_for_session(
        &self,
        sessions: &SessionMemory,
        session_id: &str,
        query: &str,
        k: usize,
        type_filter: TypeFilter,
    ) -> Result<SearchOutcome> {
        let outcome = self.search(query, k, type_filter).await?;
        info!(
            "Session {session_id}: {} results via {:?}",
            outcome.len(),
            outcome.method
        );
        sessions
            .set_last_results(session_id, self.result_links(&outcome))
            .await;
        Ok(outcome)
    }

    /// Up to `k` products whose title or tags mention `brand`, in catalog
    /// order. No embedding is involved.
    pub fn brand_search(&self, brand: &str, k: usize) -> Result<SearchOutcome> {
        if k == 0 {
            return Err(RetrievalError::InvalidArgument(
                "k must be a positive integer".to_string(),
            ));
        }
        let products = self
            .index
            .find_by_brand(brand)
            .into_iter()
            .take(k)
            .map(Arc::clone)
            .collect();
        Ok(SearchOutcome::keyword(products))
    }

    /// Title and storefront link for each hit.
    pub fn result_links(&self, outcome: &SearchOutcome) -> Vec<ResultLink> {
        outcome
            .products()
            .map(|p| ResultLink {
                title: p.title.clone(),
                link: self.store.product_link(&p.handle),
            })
            .collect()
    }

    /// Result count used when the caller does not ask for one.
    pub fn default_k(&self) -> usize {
        self.default_k
    }

    pub fn index(&self) -> &ProductIndex {
        &self.index
    }

    /// The cached embedder, for cache statistics.
    pub fn embedder(&self) -> &CachedProvider<P> {
        &self.embedder
    }
}
