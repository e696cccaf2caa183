use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::error::{AdmissionError, ConfigError, StoreError};
use crate::metrics::STORE_CONFLICTS;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    max_attempts: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Result<Self, ConfigError> {
        if max_attempts == 0 {
            return Err(ConfigError::InvalidRetry);
        }
        Ok(Self {
            max_attempts,
            base_delay,
        })
    }

    /// Sleep after the given failed attempt (0-indexed): `base * 2^attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
        }
    }
}

/// Run `op` until it succeeds, fails with a non-conflict error, or runs out of attempts.
pub async fn with_retry<F, Fut, T>(policy: &RetryPolicy, mut op: F) -> Result<T, AdmissionError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_conflict() => {
                STORE_CONFLICTS.inc();
                attempt += 1;
                if attempt >= policy.max_attempts {
                    return Err(AdmissionError::RetriesExhausted {
                        attempts: attempt,
                        source: err,
                    });
                }
                let delay = policy.delay_for(attempt - 1);
                warn!(attempt, delay_ms = delay.as_millis() as u64, error = %err, "write conflict, retrying");
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(AdmissionError::Store(err)),
        }
    }
}
