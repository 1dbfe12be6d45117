//! Bounded retry with exponential backoff for convergence operations.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{ControlError, Result};

/// Configuration for retry behavior.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts before giving up.
    pub max_attempts: u32,
    /// Backoff before the second attempt, in milliseconds.
    pub initial_backoff_ms: u64,
    /// Backoff ceiling, in milliseconds.
    pub max_backoff_ms: u64,
    /// Multiplier applied to the backoff after each attempt.
    pub backoff_multiplier: f64,
    /// Whether to add random jitter (up to 50% of the computed delay).
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            initial_backoff_ms: 100,
            max_backoff_ms: 10_000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Runs `operation` until it succeeds, a permanent error surfaces, or the
/// attempt cap is reached.
///
/// Only errors whose `is_retryable()` is true are retried. Backoff grows
/// exponentially with jitter and is capped. Cancellation is observed
/// between attempts: dropping the returned future during a backoff sleep
/// abandons the loop without side effects.
pub async fn try_until_succeeds<F, Fut, T>(
    config: &RetryConfig,
    what: &str,
    operation: F,
) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::debug!(what, attempt, "succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) if attempt >= config.max_attempts => {
                return Err(ControlError::RetriesExhausted {
                    what: what.to_string(),
                    attempts: attempt,
                    source: Box::new(e),
                });
            }
            Err(e) => {
                let backoff = compute_backoff(config, attempt - 1);
                tracing::debug!(
                    what,
                    attempt,
                    error = %e,
                    backoff_ms = backoff.as_millis() as u64,
                    "transient failure, backing off"
                );
                tokio::time::sleep(backoff).await;
            }
        }
    }
}

/// Backoff for a given zero-based attempt:
/// `initial * multiplier^attempt`, capped, plus optional jitter.
fn compute_backoff(config: &RetryConfig, attempt: u32) -> Duration {
    let base = config.initial_backoff_ms as f64 * config.backoff_multiplier.powi(attempt as i32);
    let capped = base.min(config.max_backoff_ms as f64) as u64;
    let total = if config.jitter && capped > 0 {
        capped + rand::thread_rng().gen_range(0..=capped / 2)
    } else {
        capped
    };
    Duration::from_millis(total)
}
