//! Delay and fixed-interval retry, shared by the watcher and the driver.
//!
//! Nothing in here logs; callers decide what an attempt or a failure means.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;

/// Suspend the current task for at least `duration`.
pub async fn wait(duration: Duration) {
    sleep(duration).await;
}

/// Last failure of an operation that ran out of attempts.
#[derive(Debug, thiserror::Error)]
#[error("{operation} failed after {attempts} attempt(s): {last}")]
pub struct RetryError<E> {
    pub operation: String,
    pub attempts: usize,
    pub last: E,
}

/// Run `op` up to `max_attempts` times (at least once), waiting a constant
/// `delay` between attempts. `op` receives the 1-based attempt number.
pub async fn with_retry<T, E, F, Fut>(
    operation: &str,
    max_attempts: usize,
    delay: Duration,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let total_attempts = max_attempts.max(1);
    let mut attempt = 0usize;
    loop {
        attempt += 1;
        match op(attempt).await {
            Ok(v) => return Ok(v),
            Err(last) if attempt >= total_attempts => {
                return Err(RetryError {
                    operation: operation.to_string(),
                    attempts: attempt,
                    last,
                });
            }
            Err(_) => wait(delay).await,
        }
    }
}
