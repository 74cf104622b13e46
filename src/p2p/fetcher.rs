//! Page fetching with bounded retries
//!
//! Transient failures (429, 408, 5xx, timeouts, transport and decode
//! errors) are retried with exponential backoff plus jitter. Rate limiting
//! uses its own, longer base. Anything else fails immediately.

use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

use super::types::RawOffer;
use super::PageSource;
use crate::config::{RetryConfig, SearchVariant};
use crate::error::FetchError;
use crate::telemetry::{EventSink, PipelineEvent};
use crate::types::Side;

/// Backoff before retry number `attempt + 1` (attempt counts from 0)
pub fn backoff_delay(policy: &RetryConfig, error: &FetchError, attempt: u32) -> Duration {
    let base = if error.is_rate_limited() {
        policy.rate_limit_delay_ms
    } else {
        policy.base_delay_ms
    };
    let capped_attempt = attempt.min(16);
    let bounded = base
        .saturating_mul(1u64 << capped_attempt)
        .min(policy.max_delay_ms.max(base));

    if bounded == 0 || policy.jitter_ratio <= 0.0 {
        return Duration::from_millis(bounded);
    }

    let unit: f64 = rand::thread_rng().gen_range(-1.0..=1.0);
    let jitter = 1.0 + unit * policy.jitter_ratio;
    Duration::from_millis(((bounded as f64) * jitter).round().max(0.0) as u64)
}

/// Retrying wrapper around a [`PageSource`]
pub struct PageFetcher {
    source: Arc<dyn PageSource>,
    policy: RetryConfig,
    sink: Arc<dyn EventSink>,
}

impl PageFetcher {
    pub fn new(source: Arc<dyn PageSource>, policy: RetryConfig, sink: Arc<dyn EventSink>) -> Self {
        Self {
            source,
            policy,
            sink,
        }
    }

    pub fn policy(&self) -> &RetryConfig {
        &self.policy
    }

    /// Fetch one page, retrying at most `max_retries` times.
    ///
    /// Returns the number of requests issued alongside the outcome. An
    /// empty page is a success.
    pub async fn fetch_page(
        &self,
        side: Side,
        page: u32,
        page_size: u32,
        variant: &SearchVariant,
    ) -> (u32, Result<Vec<RawOffer>, FetchError>) {
        let mut attempt = 0u32;
        loop {
            match self.source.fetch_page(side, page, page_size, variant).await {
                Ok(offers) => return (attempt + 1, Ok(offers)),
                Err(e) if e.is_retryable() && attempt < self.policy.max_retries => {
                    let delay = backoff_delay(&self.policy, &e, attempt);
                    attempt += 1;
                    self.sink.emit(PipelineEvent::RetryScheduled {
                        side,
                        page,
                        attempt,
                        delay_ms: delay.as_millis() as u64,
                        error: e,
                    });
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
                Err(e) => return (attempt + 1, Err(e)),
            }
        }
    }
}
