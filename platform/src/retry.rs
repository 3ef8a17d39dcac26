//! Bounded retry with exponential backoff, shared by every remote call
//! site. Only transient failures (remote 5xx / rate limiting) are
//! retried; timeouts and client errors surface immediately.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::errors::GatewayError;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempt budget, including the first call.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on each subsequent one.
    pub base_delay_ms: u64,
    /// Cap applied to the doubled delay.
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay_ms: 250,
            max_delay_ms: 5_000,
        }
    }
}

impl RetryPolicy {
    /// Delay applied after the given 1-based failed attempt.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(20);
        let ms = self.base_delay_ms.saturating_mul(1u64 << exp);
        Duration::from_millis(ms.min(self.max_delay_ms))
    }
}

/// Run `op` under the policy, returning the first non-transient result.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    label: &'static str,
    mut op: F,
) -> Result<T, GatewayError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GatewayError>>,
{
    let mut attempt: u32 = 1;

    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if e.is_transient() && attempt < policy.max_attempts => {
                let delay = policy.delay_after(attempt);
                warn!(
                    call = label,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "transient remote failure, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}


#[cfg(test)]
mod proptests {
    use proptest::prelude::*;

    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(500))]
        #[test]
        fn delay_is_capped_and_monotone(
            base in 1..=10_000u64,
            cap in 1..=60_000u64,
            attempt in 1..=64u32,
        ) {
            let policy = RetryPolicy {
                max_attempts: 5,
                base_delay_ms: base,
                max_delay_ms: cap,
            };

            let d = policy.delay_after(attempt);
            prop_assert!(d.as_millis() as u64 <= cap);

            let next = policy.delay_after(attempt + 1);
            prop_assert!(next >= d, "backoff must never shrink");
        }
    }
}
