//! Exponential backoff with jitter for external model calls.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use super::ExternalCallError;
use crate::config::RetryConfig;

/// Upper bound on the base delay between attempts.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    retries: u32,
    initial_delay: Duration,
    backoff_factor: f64,
    retryable_codes: Vec<u16>,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            retries: config.retries,
            initial_delay: Duration::from_secs_f64(
                config
                    .initial_delay_secs
                    .min(MAX_RETRY_DELAY.as_secs_f64())
                    .max(0.0),
            ),
            backoff_factor: config.backoff_factor,
            retryable_codes: config.retryable_codes.clone(),
        }
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            retries: 0,
            initial_delay: Duration::ZERO,
            backoff_factor: 1.0,
            retryable_codes: Vec::new(),
        }
    }

    pub fn is_retryable(&self, error: &ExternalCallError) -> bool {
        error
            .code()
            .is_some_and(|code| self.retryable_codes.contains(&code))
    }

    /// Base delay before retry number `attempt` (zero-based), without jitter.
    /// Capped at [`MAX_RETRY_DELAY`].
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        // NaN and infinity collapse to the cap here
        Duration::from_secs_f64(secs.min(MAX_RETRY_DELAY.as_secs_f64()).max(0.0))
    }

    /// Runs `op` until it succeeds, fails with a non-retryable error, or the
    /// retry budget is spent.
    pub async fn run<T, F, Fut>(&self, op_name: &str, mut op: F) -> Result<T, ExternalCallError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ExternalCallError>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.retries && self.is_retryable(&e) => {
                    let delay = self.delay_for(attempt);
                    let jitter = {
                        let max = delay.as_secs_f64() * 0.5;
                        rand::thread_rng().gen_range(0.0..=max)
                    };
                    let wait = delay + Duration::from_secs_f64(jitter);
                    tracing::warn!(
                        "Retry {}/{} for {} after {} (waiting {:.1}s)",
                        attempt + 1,
                        self.retries,
                        op_name,
                        e,
                        wait.as_secs_f64()
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
