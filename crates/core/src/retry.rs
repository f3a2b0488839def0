//! Retry with exponential backoff and jitter
//!
//! For callers wrapping individual backend calls. The bulk-delete batch
//! failure ceiling is a separate mechanism and deliberately not built on
//! this: a batch gives up after a fixed number of total failures instead of
//! retrying each key.

use std::time::Duration;

use crate::config::RetryConfig;
use crate::error::{Error, Result};

/// Run `operation` until it succeeds, the error stops being retryable, or
/// `config.max_attempts` is exhausted
///
/// # Example
/// ```ignore
/// let data = retry_with_backoff(
///     &config.retry,
///     || backend.get_object("bkt", "key", None),
///     is_retryable_error,
/// ).await?;
/// ```
pub async fn retry_with_backoff<T, F, Fut, R>(
    config: &RetryConfig,
    mut operation: F,
    is_retryable: R,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
    R: Fn(&Error) -> bool,
{
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        if attempt >= config.max_attempts || !is_retryable(&err) {
            return Err(err);
        }

        let delay = backoff_delay(config, attempt);
        tracing::debug!(
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "retrying transient failure"
        );
        tokio::time::sleep(delay).await;
    }
}

/// Delay before the next attempt: `initial * 2^(attempt-1)`, capped at
/// `max_backoff_ms`, plus jitter in `[0, capped)`
fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let exponent = (attempt - 1).min(10);
    let capped_ms = config
        .initial_backoff_ms
        .saturating_mul(1 << exponent)
        .min(config.max_backoff_ms);
    Duration::from_millis(capped_ms + clock_jitter(capped_ms))
}

/// Jitter from the clock's subsecond nanos; spreads concurrent retries
/// without pulling in an RNG crate
fn clock_jitter(max: u64) -> u64 {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    u64::from(nanos) % max.max(1)
}

/// Check if an error is retryable (transient)
pub fn is_retryable_error(error: &Error) -> bool {
    match error {
        // Throttling and server-side hiccups reported by the backend
        Error::Service { code, .. } => matches!(
            code.as_str(),
            "SlowDown"
                | "RequestTimeout"
                | "InternalError"
                | "ServiceUnavailable"
                | "TooManyRequests"
                | "503"
        ),
        Error::Transport(msg) => {
            let msg_lower = msg.to_lowercase();
            msg_lower.contains("timeout")
                || msg_lower.contains("connection reset")
                || msg_lower.contains("connection refused")
                || msg_lower.contains("503")
                || msg_lower.contains("service unavailable")
                || msg_lower.contains("too many requests")
                || msg_lower.contains("429")
                || msg_lower.contains("slow down")
                || msg_lower.contains("dispatch")
        }
        Error::Io(e) => {
            matches!(
                e.kind(),
                std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::Interrupted
            )
        }
        // Input, not-found and configuration errors never benefit from retry
        _ => false,
    }
}
