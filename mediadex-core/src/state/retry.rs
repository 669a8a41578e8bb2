use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::config::RetryConfig;
use crate::error::Result;

/// Delay before retry `attempt` (1-based): exponential from
/// `backoff_base_ms`, capped at `backoff_max_ms`, spread by `jitter_ratio`.
pub fn jittered_delay_ms(config: &RetryConfig, attempt: u16) -> u64 {
    let anchor = config.base_delay_ms(attempt);
    if anchor == 0 {
        return 0;
    }

    let jitter_ratio = f64::from(config.jitter_ratio.max(0.0));
    let jitter_span = (anchor as f64 * jitter_ratio)
        .min(config.backoff_max_ms as f64);
    let lower = 0f64.max(anchor as f64 - jitter_span);
    let upper = (anchor as f64 + jitter_span).min(config.backoff_max_ms as f64);
    if upper <= lower {
        return lower.round() as u64;
    }
    rand::rng().random_range(lower..upper).round() as u64
}

/// Runs `op` until it succeeds, fails with a non-transient error, or
/// exhausts `max_attempts`.
pub async fn with_retry<T, F, Fut>(
    config: &RetryConfig,
    operation: &str,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt: u16 = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < config.max_attempts => {
                let delay = jittered_delay_ms(config, attempt);
                warn!(
                    target: "scan::store",
                    operation,
                    attempt,
                    delay_ms = delay,
                    error = %err,
                    "transient failure, retrying"
                );
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            Err(err) => return Err(err),
        }
    }
}
