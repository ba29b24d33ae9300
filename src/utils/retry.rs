//! Retry with exponential backoff
//!
//! Shared by page loads and actions: attempt `n` (0-based) that fails waits
//! `base * 2^n` before the next attempt. The last failure is returned as-is.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// Delay before the attempt following failed attempt `attempt` (0-based)
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt))
}

/// Run `op` up to `attempts` times (minimum once)
///
/// `op` receives the 0-based attempt number. Between failures the task sleeps
/// for [`backoff_delay`]. Returns the first success or the final error.
pub async fn retry_with_backoff<T, E, F, Fut>(
    label: &str,
    attempts: u32,
    base: Duration,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let attempts = attempts.max(1);
    let mut attempt = 0;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if attempt + 1 >= attempts => return Err(e),
            Err(e) => {
                let delay = backoff_delay(base, attempt);
                warn!(
                    "{} attempt {}/{} failed: {}. Retrying in {:?}",
                    label,
                    attempt + 1,
                    attempts,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
