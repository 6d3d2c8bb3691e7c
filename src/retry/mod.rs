//! Capped exponential retry for upstream HTTP attempts.
//!
//! The executor runs a request-producing closure in a loop. A completed
//! response with a fatal status (4xx other than 429) returns immediately
//! for classification; 429, 5xx, network errors, and per-call timeouts are
//! retried with exponential backoff until the attempt budget runs out. A
//! logical request therefore issues at most `retry_count + 1` attempts.
//!
//! The executor holds no shared state; concurrent executions are fully
//! independent. Telemetry goes through the [`TelemetrySink`] the pipeline
//! was constructed with, not a process-wide singleton.

use std::future::Future;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Counter/histogram seam consumed by the executor.
///
/// The retry counter increments when a retry attempt *starts*, so a fatal
/// failure on the first attempt emits zero retry events. The duration
/// histogram records one sample per completed HTTP call.
pub trait TelemetrySink: Send + Sync {
    fn increment_retry(&self, operation: &'static str);
    fn observe_call_duration(&self, operation: &'static str, seconds: f64);
}

/// Routes telemetry to the `metrics` facade; the embedding service owns
/// the recorder/exporter.
pub struct MetricsSink;

impl TelemetrySink for MetricsSink {
    fn increment_retry(&self, operation: &'static str) {
        metrics::counter!("wisdom_retries_total", "operation" => operation).increment(1);
    }

    fn observe_call_duration(&self, operation: &'static str, seconds: f64) {
        metrics::histogram!("wisdom_call_duration_seconds", "operation" => operation).record(seconds);
    }
}

/// Discards all telemetry.
pub struct NoopSink;

impl TelemetrySink for NoopSink {
    fn increment_retry(&self, _operation: &'static str) {}
    fn observe_call_duration(&self, _operation: &'static str, _seconds: f64) {}
}

/// Retry budget and backoff schedule.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Additional attempts after the first. Zero means exactly one attempt.
    pub retry_count: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Backoff ceiling.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retry_count: 4,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn with_retry_count(retry_count: u32) -> Self {
        Self {
            retry_count,
            ..Self::default()
        }
    }

    /// Delay before retry attempt `n` (1-based): `base * 2^(n-1)`, capped.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay.as_millis() as u64;
        let cap = self.max_delay.as_millis() as u64;
        let exp = attempt.saturating_sub(1).min(63);
        let delay = base.saturating_mul(1u64 << exp).min(cap);
        Duration::from_millis(delay)
    }
}

/// Terminal outcome of an execution that never produced a response.
#[derive(Debug, Error)]
pub enum CallError {
    /// Per-call timeout elapsed on the final attempt, or the caller's
    /// deadline expired between attempts.
    #[error("upstream call timed out")]
    Timeout,
    /// The caller cancelled the request.
    #[error("upstream call cancelled")]
    Cancelled,
    /// Network-level failure on the final attempt.
    #[error("network error: {0}")]
    Network(String),
}

fn needs_retry(status: reqwest::StatusCode) -> bool {
    status.as_u16() == 429 || status.is_server_error()
}

/// Run `attempt_fn` with retry and backoff.
///
/// Returns the final [`reqwest::Response`] for classification, whatever its
/// status, or a [`CallError`] when no response was obtained. Cancellation is
/// checked before every sleep and attempt and aborts any in-flight call.
pub async fn execute<F, Fut>(
    policy: &RetryPolicy,
    sink: &dyn TelemetrySink,
    operation: &'static str,
    cancellation: &CancellationToken,
    deadline: Option<Instant>,
    mut attempt_fn: F,
) -> Result<reqwest::Response, CallError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<reqwest::Response, reqwest::Error>>,
{
    let mut attempt: u32 = 0;
    loop {
        if attempt > 0 {
            let delay = policy.backoff_delay(attempt);
            if deadline.is_some_and(|d| Instant::now() + delay >= d) {
                return Err(CallError::Timeout);
            }
            sink.increment_retry(operation);
            tokio::select! {
                _ = cancellation.cancelled() => return Err(CallError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }

        if cancellation.is_cancelled() {
            return Err(CallError::Cancelled);
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(CallError::Timeout);
        }

        let started = Instant::now();
        let outcome = tokio::select! {
            _ = cancellation.cancelled() => return Err(CallError::Cancelled),
            outcome = attempt_fn() => outcome,
        };

        let exhausted = attempt >= policy.retry_count;
        match outcome {
            Ok(response) => {
                sink.observe_call_duration(operation, started.elapsed().as_secs_f64());
                if !needs_retry(response.status()) || exhausted {
                    return Ok(response);
                }
                tracing::debug!(
                    operation,
                    status = response.status().as_u16(),
                    attempt,
                    "retryable upstream status"
                );
            }
            Err(err) if err.is_timeout() => {
                if exhausted {
                    return Err(CallError::Timeout);
                }
                tracing::debug!(operation, attempt, "attempt timed out, retrying");
            }
            Err(err) => {
                if exhausted {
                    return Err(CallError::Network(err.to_string()));
                }
                tracing::debug!(operation, attempt, error = %err, "attempt failed, retrying");
            }
        }
        attempt += 1;
    }
}
