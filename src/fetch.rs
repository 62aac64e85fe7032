//! # Fetch Engine
//!
//! Wraps each per-reference fetch in a retry policy with capped
//! exponential backoff and a last-known-good fallback cache.
//!
//! Every error is treated as retryable; no error-type discrimination is
//! performed. The cache is purely process-resident: an entry exists for a
//! reference iff at least one fetch succeeded in this process lifetime,
//! and entries older than the TTL are invisible to lookups.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::RetryConfig;
use crate::error::{AgentError, Result};

/// Last successful payload for one reference.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub payload: Vec<u8>,
    pub fetched_at: Instant,
}

#[derive(Debug)]
pub struct FetchEngine {
    retry: RetryConfig,
    ttl: Duration,
    cache: RwLock<HashMap<String, CacheEntry>>,
    cancel: CancellationToken,
}

impl FetchEngine {
    pub fn new(retry: RetryConfig, ttl: Duration, cancel: CancellationToken) -> Self {
        Self {
            retry,
            ttl,
            cache: RwLock::new(HashMap::new()),
            cancel,
        }
    }

    /// Backoff delay after the zero-based `attempt`: `min(base * 2^k, max)`.
    pub fn delay_for(retry: &RetryConfig, attempt: u32) -> Duration {
        retry
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(retry.max_delay)
    }

    /// Run `op` under the retry policy. No delay follows the last attempt;
    /// cancellation aborts both sleeps and in-flight attempts.
    pub async fn run_with_retry<T, F, Fut>(&self, name: &str, op: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = self.retry.max_attempts.max(1);
        let mut last_error = AgentError::Upstream(format!("{name}: no fetch attempt ran"));

        for attempt in 0..attempts {
            if self.cancel.is_cancelled() {
                return Err(AgentError::Cancelled);
            }
            let result = tokio::select! {
                result = op() => result,
                () = self.cancel.cancelled() => return Err(AgentError::Cancelled),
            };

            match result {
                Ok(value) => return Ok(value),
                Err(error) => {
                    warn!(
                        "fetch {name} attempt {}/{attempts} failed: {error}",
                        attempt + 1
                    );
                    last_error = error;
                }
            }

            if attempt + 1 < attempts {
                let delay = Self::delay_for(&self.retry, attempt);
                tokio::select! {
                    () = tokio::time::sleep(delay) => {}
                    () = self.cancel.cancelled() => return Err(AgentError::Cancelled),
                }
            }
        }

        Err(last_error)
    }

    /// Overwrite the cache entry for `name`, regardless of whether the
    /// payload changed.
    pub async fn store(&self, name: &str, payload: Vec<u8>) {
        let mut cache = self.cache.write().await;
        cache.insert(
            name.to_string(),
            CacheEntry {
                payload,
                fetched_at: Instant::now(),
            },
        );
    }

    /// Last successful payload and its age, if one exists within the TTL.
    pub async fn lookup(&self, name: &str) -> Option<(Vec<u8>, Duration)> {
        let cache = self.cache.read().await;
        let entry = cache.get(name)?;
        let age = entry.fetched_at.elapsed();
        if age <= self.ttl {
            Some((entry.payload.clone(), age))
        } else {
            None
        }
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }
}
