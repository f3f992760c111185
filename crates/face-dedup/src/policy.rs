//! Deadlines and retry for collaborator calls.
//!
//! Every call to the recognition backend or the persistence sink is bounded
//! by `call_timeout`. Rate-limited backend calls and failed persistence
//! writes are retried with exponential backoff; everything else fails the
//! call immediately and is left to the frame-level retry.

use crate::error::{GatewayError, SinkError};
use backoff::{future::retry_notify, ExponentialBackoff};
use std::future::Future;
use std::time::{Duration, Instant};
use telemetry::metrics::{BACKEND_CALLS, BACKEND_LATENCY};
use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub struct BackendPolicy {
    /// Deadline for a single attempt
    pub call_timeout: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Total time budget for retrying one call
    pub max_retry_elapsed: Duration,
}

impl Default for BackendPolicy {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(5),
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(2),
            max_retry_elapsed: Duration::from_secs(10),
        }
    }
}

impl BackendPolicy {
    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.initial_backoff,
            current_interval: self.initial_backoff,
            max_interval: self.max_backoff,
            max_elapsed_time: Some(self.max_retry_elapsed),
            ..Default::default()
        }
    }

    fn timeout_ms(&self) -> u64 {
        self.call_timeout.as_millis() as u64
    }

    /// Run a recognition backend call under the deadline and retry policy
    pub async fn call_gateway<T, F, Fut>(
        &self,
        operation: &'static str,
        mut call: F,
    ) -> Result<T, GatewayError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        let call_timeout = self.call_timeout;
        let timeout_ms = self.timeout_ms();
        let start = Instant::now();

        let result = retry_notify(
            self.backoff(),
            || {
                let attempt = call();
                async move {
                    match tokio::time::timeout(call_timeout, attempt).await {
                        Ok(Ok(value)) => Ok(value),
                        Ok(Err(err)) if err.is_transient() => Err(backoff::Error::transient(err)),
                        Ok(Err(err)) => Err(backoff::Error::permanent(err)),
                        Err(_) => Err(backoff::Error::permanent(GatewayError::Timeout {
                            operation,
                            timeout_ms,
                        })),
                    }
                }
            },
            |err: GatewayError, retry_after: Duration| {
                warn!(
                    operation,
                    error = %err,
                    retry_after_ms = retry_after.as_millis() as u64,
                    "backend call throttled, retry scheduled"
                );
            },
        )
        .await;

        record_call(operation, start, result.as_ref().err().map(gateway_status));
        result
    }

    /// Run a persistence call under the deadline, retrying every failure
    pub async fn call_sink<F, Fut>(&self, operation: &'static str, mut call: F) -> Result<(), SinkError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(), SinkError>>,
    {
        let call_timeout = self.call_timeout;
        let timeout_ms = self.timeout_ms();
        let start = Instant::now();

        let result = retry_notify(
            self.backoff(),
            || {
                let attempt = call();
                async move {
                    match tokio::time::timeout(call_timeout, attempt).await {
                        Ok(Ok(())) => Ok(()),
                        Ok(Err(err)) => Err(backoff::Error::transient(err)),
                        Err(_) => Err(backoff::Error::transient(SinkError::Timeout {
                            operation,
                            timeout_ms,
                        })),
                    }
                }
            },
            |err: SinkError, retry_after: Duration| {
                warn!(
                    operation,
                    error = %err,
                    retry_after_ms = retry_after.as_millis() as u64,
                    "persistence call failed, retry scheduled"
                );
            },
        )
        .await;

        record_call(operation, start, result.as_ref().err().map(|_| "error"));
        result
    }
}

fn gateway_status(err: &GatewayError) -> &'static str {
    match err {
        GatewayError::NotFound(_) => "not_found",
        GatewayError::RateLimited(_) => "rate_limited",
        GatewayError::Unavailable(_) => "unavailable",
        GatewayError::Timeout { .. } => "timeout",
        GatewayError::InvalidImage(_) => "invalid_image",
    }
}

fn record_call(operation: &str, start: Instant, failure: Option<&str>) {
    BACKEND_LATENCY
        .with_label_values(&[operation])
        .observe(start.elapsed().as_secs_f64());
    BACKEND_CALLS
        .with_label_values(&[operation, failure.unwrap_or("ok")])
        .inc();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy() -> BackendPolicy {
        BackendPolicy {
            call_timeout: Duration::from_millis(50),
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
            max_retry_elapsed: Duration::from_millis(500),
        }
    }

    #[tokio::test]
    async fn test_rate_limited_call_is_retried() {
        let attempts = AtomicU32::new(0);
        let result = fast_policy()
            .call_gateway("search_faces", || async {
                if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(GatewayError::RateLimited("throttled".into()))
                } else {
                    Ok(42)
                }
            })
            .await;

        assert_eq!(result, Ok(42));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_unavailable_is_not_retried() {
        let attempts = AtomicU32::new(0);
        let result: Result<(), _> = fast_policy()
            .call_gateway("index_faces", || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(GatewayError::Unavailable("connection refused".into()))
            })
            .await;

        assert!(matches!(result, Err(GatewayError::Unavailable(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_slow_call_times_out() {
        let result: Result<(), _> = fast_policy()
            .call_gateway("delete_faces", || async {
                tokio::time::sleep(Duration::from_millis(500)).await;
                Ok(())
            })
            .await;

        assert_eq!(
            result,
            Err(GatewayError::Timeout {
                operation: "delete_faces",
                timeout_ms: 50
            })
        );
    }

    #[tokio::test]
    async fn test_sink_failures_are_retried() {
        let attempts = AtomicU32::new(0);
        let result = fast_policy()
            .call_sink("write_record", || async {
                if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(SinkError::RecordStore {
                        frame_id: "f".into(),
                        message: "connection reset".into(),
                    })
                } else {
                    Ok(())
                }
            })
            .await;

        assert!(result.is_ok());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }
}
