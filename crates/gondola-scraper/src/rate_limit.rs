//! Retry utilities for the catalog API client.
//!
//! Transient HTTP failures (429, connection resets, timeouts) are retried with
//! exponential backoff plus a small random jitter so concurrent page workers
//! do not hit the storefront in lockstep. Everything else propagates on the
//! first failure.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::error::ScraperError;

/// Upper bound for the random jitter added to each backoff delay.
const MAX_JITTER_MS: u64 = 250;

/// Returns `true` if `err` represents a transient condition that should be
/// retried after a backoff delay.
///
/// Only [`ScraperError::RateLimited`] and [`ScraperError::Http`] qualify. A 404,
/// another non-2xx status, a malformed body or an unparseable price would
/// fail the same way again.
fn is_retriable(err: &ScraperError) -> bool {
    matches!(
        err,
        ScraperError::RateLimited { .. } | ScraperError::Http(_)
    )
}

fn backoff_delay(backoff_base_secs: u64, attempt: u32) -> Duration {
    let base = Duration::from_secs(backoff_base_secs.saturating_mul(1u64 << attempt.min(62)));
    if backoff_base_secs == 0 {
        return base;
    }
    let jitter = rand::rng().random_range(0..=MAX_JITTER_MS);
    base.saturating_add(Duration::from_millis(jitter))
}

/// Executes `operation` with exponential backoff retries on transient errors.
///
/// The wait before the n-th retry is `backoff_base_secs * 2^(n-1)` seconds plus
/// up to [`MAX_JITTER_MS`] of jitter. With `max_retries = 3` the operation is
/// attempted at most 4 times. When all retries are exhausted the last error
/// is returned.
pub(crate) async fn retry_with_backoff<T, F, Fut>(
    max_retries: u32,
    backoff_base_secs: u64,
    mut operation: F,
) -> Result<T, ScraperError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ScraperError>>,
{
    let mut attempt = 0u32;

    loop {
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        if !is_retriable(&err) || attempt >= max_retries {
            return Err(err);
        }

        let delay = backoff_delay(backoff_base_secs, attempt);
        tracing::warn!(
            attempt,
            max_retries,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            error = %err,
            "transient fetch error, retrying after backoff"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
