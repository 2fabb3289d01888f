use crate::utils::clock::Sleeper;
use anyhow::{Context, Result};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Bounded retry with a uniformly random pause between attempts.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    /// Total number of calls, including the first one.
    pub max_attempts: u32,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            min_delay_ms: 2_000,
            max_delay_ms: 5_000,
        }
    }
}

impl RetryConfig {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    pub fn with_delay_range(mut self, min_delay_ms: u64, max_delay_ms: u64) -> Self {
        self.min_delay_ms = min_delay_ms.min(max_delay_ms);
        self.max_delay_ms = max_delay_ms.max(min_delay_ms);
        self
    }

    fn calculate_delay(&self) -> Duration {
        let delay_ms = if self.max_delay_ms > self.min_delay_ms {
            rand::thread_rng().gen_range(self.min_delay_ms..=self.max_delay_ms)
        } else {
            self.min_delay_ms
        };
        Duration::from_millis(delay_ms)
    }
}

/// Runs `operation` until it succeeds or `max_attempts` calls have failed.
///
/// The last error is returned with `operation_name` attached as context; the
/// underlying cause stays in the chain.
pub async fn with_retry<T, F, Fut>(
    config: RetryConfig,
    operation_name: &str,
    sleeper: &dyn Sleeper,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = config.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    debug!("{} succeeded on attempt {}", operation_name, attempt);
                }
                return Ok(result);
            }
            Err(e) if attempt >= attempts => {
                warn!(
                    "{} failed after {} attempts: {:#}",
                    operation_name, attempts, e
                );
                return Err(e)
                    .with_context(|| format!("{} failed after {} attempts", operation_name, attempts));
            }
            Err(e) => {
                let delay = config.calculate_delay();
                debug!(
                    "{} failed (attempt {}/{}). Retrying in {:?}: {:#}",
                    operation_name, attempt, attempts, delay, e
                );
                sleeper.sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
