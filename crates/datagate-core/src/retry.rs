//! Operation-level retry with exponential backoff
//!
//! Transient store and service failures are retried here, at the call site
//! that owns the operation. Failures are never downgraded to an empty
//! result; once the budget is exhausted the last error propagates and the
//! engine parks the run in its error state.

use crate::constants::{MAX_OPERATION_ATTEMPTS, RETRY_BACKOFF_MULTIPLIER, RETRY_INITIAL_DELAY_MS};
use crate::error::Result;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Run `op` until it succeeds, a non-transient error occurs, or the attempt
/// budget is exhausted. `name` only labels log lines.
pub async fn with_backoff<T, F, Fut>(name: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut delay_ms = RETRY_INITIAL_DELAY_MS;

    for attempt in 1..=MAX_OPERATION_ATTEMPTS {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < MAX_OPERATION_ATTEMPTS => {
                log::warn!(
                    "Operation {} failed (attempt {}/{}), retrying in {}ms: {}",
                    name,
                    attempt,
                    MAX_OPERATION_ATTEMPTS,
                    delay_ms,
                    e
                );
                sleep(Duration::from_millis(delay_ms)).await;
                delay_ms *= RETRY_BACKOFF_MULTIPLIER;
            }
            Err(e) => {
                log::error!("Operation {} failed permanently: {}", name, e);
                return Err(e);
            }
        }
    }

    unreachable!("retry loop returns on the final attempt")
}
