//! Retry helper for idempotent store writes.
//!
//! Only errors whose [`is_transient`](brainstore_core::Error::is_transient) is true are retried. Callers
//! must pass operations that are safe to repeat: writes with client-chosen
//! ids, insert-or-ignore links, and deletes.

use std::future::Future;
use std::time::Duration;

use brainstore_core::Result;

/// Attempts and backoff for [`retry_idempotent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base_delay_ms: u64,
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based): `base * 2^(attempt-1)`,
    /// exponent capped at 5.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(5);
        Duration::from_millis(self.base_delay_ms.saturating_mul(1 << exponent))
    }
}

/// Run `op` until it succeeds, fails with a final error, or the policy is
/// exhausted. The last error is returned unchanged.
pub async fn retry_idempotent<T, F, Fut>(policy: RetryPolicy, op_name: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < policy.max_retries => {
                attempt += 1;
                let delay = policy.delay(attempt);
                tracing::warn!(
                    op = op_name,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                if e.is_transient() {
                    tracing::error!(op = op_name, attempts = attempt + 1, error = %e, "retries exhausted");
                }
                return Err(e);
            }
        }
    }
}
