//! Bounded, cancellable fan-out of independent units of work.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error::{panic_message, HarvestError};

/// Results of one [`run_bounded`] call.
#[derive(Debug)]
pub(crate) struct PoolOutcome<T> {
    /// One entry per dispatched unit, in completion order. `Err` means the
    /// task itself died (a panic that escaped the unit).
    pub results: Vec<Result<T, HarvestError>>,
    /// Units never dispatched because cancellation fired first.
    pub skipped: usize,
}

/// Awaits `fut`, turning a panic inside it into [`HarvestError::Panicked`].
pub(crate) async fn catch_panics<T, Fut>(fut: Fut) -> Result<T, HarvestError>
where
    Fut: Future<Output = Result<T, HarvestError>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(HarvestError::Panicked(panic_message(payload.as_ref()))),
    }
}

/// Runs `work` over `units` with at most `limit` units in flight.
///
/// A permit is acquired before each unit is spawned, racing the acquisition
/// against `cancel`; once cancelled no further units start and the remainder
/// is counted as skipped. Units already running are always joined, so when
/// this returns nothing spawned here is still alive.
pub(crate) async fn run_bounded<U, T, F, Fut>(
    units: Vec<U>,
    limit: usize,
    cancel: &CancellationToken,
    mut work: F,
) -> PoolOutcome<T>
where
    F: FnMut(U) -> Fut,
    Fut: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let total = units.len();
    let semaphore = Arc::new(Semaphore::new(limit.max(1)));
    let mut tasks = JoinSet::new();
    let mut skipped = 0usize;

    for (dispatched, unit) in units.into_iter().enumerate() {
        let permit = tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            permit = Arc::clone(&semaphore).acquire_owned() => permit.ok(),
        };
        let Some(permit) = permit else {
            skipped = total - dispatched;
            break;
        };

        let fut = work(unit);
        tasks.spawn(async move {
            let _permit = permit;
            fut.await
        });
    }

    let mut results = Vec::with_capacity(total - skipped);
    while let Some(joined) = tasks.join_next().await {
        results.push(joined.map_err(|e| {
            if e.is_panic() {
                HarvestError::Panicked(panic_message(e.into_panic().as_ref()))
            } else {
                HarvestError::Panicked(e.to_string())
            }
        }));
    }

    PoolOutcome { results, skipped }
}
