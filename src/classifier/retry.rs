//! Retry configuration, delay calculation, and the classifier decorator.
//!
//! [`RetryingClassifier`] wraps any [`Classifier`] and retries transient
//! errors with exponential backoff. The cache's own timeout still bounds the
//! whole call, retries included.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use super::{Classifier, ClassifierResponse, ClassifyRequest};
use crate::telemetry;
use crate::{AisleError, Result};

/// How often a [`RetryingClassifier`] asks again after a transient failure.
///
/// Backoff doubles per attempt up to `max_delay`. Keep the total well under
/// the cache's classify timeout or the later attempts never get a chance.
///
/// ```rust
/// # use aisle::RetryConfig;
/// # use std::time::Duration;
/// let config = RetryConfig::new()
///     .max_attempts(5)
///     .initial_delay(Duration::from_millis(200));
/// ```
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Classifier calls per lookup, first one included. 1 means no retry.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    /// Ceiling for a single wait.
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    /// Three calls, 250ms then 500ms apart.
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// One classifier call per lookup.
    pub fn disabled() -> Self {
        Self::default().max_attempts(1)
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Wait after failed attempt `attempt` (0 = the first call).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.initial_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// A rate-limit `retry_after` from the provider overrides the backoff.
    pub fn effective_delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        match retry_after {
            Some(hint) => hint,
            None => self.delay_for_attempt(attempt),
        }
    }
}

/// Run `f`, retrying [`AisleError::is_transient()`] failures while attempts
/// remain.
pub(crate) async fn with_retry<F, Fut, T>(config: &RetryConfig, classifier: &str, f: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_err = None;
    for attempt in 0..config.max_attempts.max(1) {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) if e.is_transient() => {
                if attempt + 1 < config.max_attempts {
                    metrics::counter!(telemetry::RETRIES_TOTAL, "classifier" => classifier.to_owned())
                        .increment(1);
                    let delay = config.effective_delay(attempt, e.retry_after());
                    warn!(
                        classifier,
                        attempt = attempt + 1,
                        max_attempts = config.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "retrying classifier after transient error"
                    );
                    tokio::time::sleep(delay).await;
                }
                last_err = Some(e);
            }
            Err(e) => return Err(e),
        }
    }
    Err(last_err.unwrap_or(AisleError::EmptyResponse))
}

/// [`Classifier`] that retries the transient failures of the one it wraps.
pub struct RetryingClassifier {
    inner: Arc<dyn Classifier>,
    config: RetryConfig,
}

impl RetryingClassifier {
    pub fn new(inner: Arc<dyn Classifier>, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl Classifier for RetryingClassifier {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn classify(&self, request: &ClassifyRequest) -> Result<ClassifierResponse> {
        with_retry(&self.config, self.inner.name(), || {
            self.inner.classify(request)
        })
        .await
    }
}
