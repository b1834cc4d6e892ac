//! Bounded retry with exponential backoff.
//!
//! Only operations that may fail transiently go through here: starting the
//! export process and the driver-based connection test. Anything that
//! resolves to a [`UserError`](crate::error::UserError) aborts immediately;
//! retrying a bad query or bad credentials only delays the message.

use std::future::Future;
use std::time::Duration;

use crate::error::is_user_error;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

/// Run `operation` until it succeeds, a user error surfaces, or the attempt
/// budget runs out.
pub async fn retry_async<T, F, Fut>(
    config: &RetryConfig,
    description: &str,
    mut operation: F,
) -> anyhow::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let mut delay = config.initial_delay;
    let mut attempt = 1u32;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if is_user_error(&e) => return Err(e),
            Err(e) if attempt >= config.max_attempts => return Err(e),
            Err(e) => {
                tracing::warn!(
                    "{description} failed (attempt {attempt}/{}): {e:#}, retrying in {delay:?}",
                    config.max_attempts
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
                delay = delay.mul_f64(config.backoff_multiplier).min(config.max_delay);
            }
        }
    }
}
