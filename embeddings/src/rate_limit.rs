//! Global spacing of provider calls.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::{EmbeddingError, Result};
use crate::provider::{EmbeddingProvider, EmbeddingRequest, EmbeddingResponse};

/// Default minimum spacing between two provider calls.
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Wraps a provider so that at most one request is in flight and no two
/// requests are issued closer together than `min_interval`.
///
/// Callers that arrive early block (sleep) for the remainder of the interval
/// instead of being rejected. The issue time is recorded before the inner
/// call starts, so a caller that abandons its request still pushes back the
/// next one.
pub struct RateLimitedProvider<P> {
    inner: P,
    last_call: Mutex<Option<Instant>>,
    min_interval: Duration,
    request_timeout: Duration,
}

impl<P: EmbeddingProvider> RateLimitedProvider<P> {
    /// Wrap `inner` with the default interval and timeout.
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            last_call: Mutex::new(None),
            min_interval: DEFAULT_MIN_INTERVAL,
            request_timeout: crate::provider::DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Set the minimum interval between calls.
    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }

    /// Set the upper bound on a single inner call.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// The minimum interval between calls.
    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// When the last call was issued, if any.
    pub async fn last_call(&self) -> Option<Instant> {
        *self.last_call.lock().await
    }

    /// The wrapped provider.
    pub fn inner(&self) -> &P {
        &self.inner
    }
}

#[async_trait]
impl<P: EmbeddingProvider> EmbeddingProvider for RateLimitedProvider<P> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn default_model(&self) -> &str {
        self.inner.default_model()
    }

    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse> {
        // Held across the call: one request in flight at a time.
        let mut last_call = self.last_call.lock().await;

        if let Some(previous) = *last_call {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                let wait = self.min_interval - elapsed;
                info!("Rate limiting: sleeping for {:.2}s", wait.as_secs_f64());
                tokio::time::sleep(wait).await;
            }
        }

        *last_call = Some(Instant::now());
        debug!("Issuing embedding request via {}", self.inner.name());

        match tokio::time::timeout(self.request_timeout, self.inner.embed(request)).await {
            Ok(result) => result,
            Err(_) => Err(EmbeddingError::Timeout {
                timeout_ms: self.request_timeout.as_millis() as u64,
            }),
        }
    }

    fn is_available(&self) -> bool {
        self.inner.is_available()
    }
}
