//! Bounded retry for transient provider overload.

use super::ProviderError;
use crate::config::Config;
use crate::metrics::ServiceMetrics;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Attempt ceiling and backoff schedule for overloaded calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts allowed after the first one.
    pub max_retries: u32,
    /// Delay before the first retry; doubled after each further overload.
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Policy configured through `PROVIDER_MAX_RETRIES` and `PROVIDER_RETRY_DELAY_MS`.
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_retries: config.provider_max_retries,
            initial_delay: config.provider_retry_delay,
        }
    }

    /// Delay slept before retry number `retry` (zero-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.initial_delay
            .saturating_mul(2u32.saturating_pow(retry))
    }
}

/// Outcome of a call that did not succeed.
#[derive(Debug, Error)]
pub enum InvokeError {
    /// Every attempt failed with overload.
    #[error("provider still overloaded after {attempts} attempts: {last}")]
    Overloaded {
        /// Total attempts made, including the first.
        attempts: u32,
        /// Failure returned by the final attempt.
        #[source]
        last: ProviderError,
    },
    /// A non-retryable failure, surfaced on the attempt that produced it.
    #[error(transparent)]
    Provider(ProviderError),
}

/// Runs provider calls under a [`RetryPolicy`], sleeping on the tokio timer between attempts.
#[derive(Clone)]
pub struct ResilientInvoker {
    policy: RetryPolicy,
    metrics: Option<Arc<ServiceMetrics>>,
}

impl ResilientInvoker {
    /// Invoker applying `policy`.
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            metrics: None,
        }
    }

    /// Record retries and failures into `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<ServiceMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Execute `call`, retrying only while it fails with overload.
    pub async fn run<T, F, Fut>(&self, operation: &'static str, mut call: F) -> Result<T, InvokeError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut attempt: u32 = 1;
        loop {
            match call().await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!(operation, attempt, "Provider call recovered after overload");
                    }
                    return Ok(value);
                }
                Err(error) if error.is_overloaded() && attempt <= self.policy.max_retries => {
                    let delay = self.policy.delay_for(attempt - 1);
                    tracing::warn!(
                        operation,
                        attempt,
                        max_attempts = self.policy.max_retries.saturating_add(1),
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Provider overloaded; backing off"
                    );
                    if let Some(metrics) = &self.metrics {
                        metrics.record_retry();
                    }
                    tokio::time::sleep(delay).await;
                    attempt = attempt.saturating_add(1);
                }
                Err(error) if error.is_overloaded() => {
                    tracing::error!(operation, attempts = attempt, error = %error, "Provider overloaded on every attempt");
                    if let Some(metrics) = &self.metrics {
                        metrics.record_overload_exhausted();
                    }
                    return Err(InvokeError::Overloaded {
                        attempts: attempt,
                        last: error,
                    });
                }
                Err(error) => {
                    tracing::warn!(operation, attempt, error = %error, "Provider call failed");
                    if let Some(metrics) = &self.metrics {
                        metrics.record_provider_failure();
                    }
                    return Err(InvokeError::Provider(error));
                }
            }
        }
    }
}
