use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::warn;

use crate::error::CapabilityError;

/// Terminal outcome of an exhausted or non-retryable operation: the last
/// error plus how many attempts were actually made.
#[derive(Debug)]
pub struct RetryExhausted {
    pub attempts: u32,
    pub error: CapabilityError,
}

/// Runs `operation` up to `max_attempts` times total, sleeping
/// `attempt_index * base_delay` between attempts (linear schedule). Only
/// errors accepted by `is_retryable` are retried; anything else returns
/// immediately with the attempt count so far.
pub async fn with_retry<T, F, Fut>(
    label: &str,
    max_attempts: u32,
    base_delay: Duration,
    is_retryable: impl Fn(&CapabilityError) -> bool,
    mut operation: F,
) -> Result<T, RetryExhausted>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CapabilityError>>,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1u32;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < max_attempts && is_retryable(&err) => {
                let delay = base_delay * attempt;
                warn!(
                    operation = label,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retrying after transient failure"
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(err) => {
                return Err(RetryExhausted {
                    attempts: attempt,
                    error: err,
                });
            }
        }
    }
}
