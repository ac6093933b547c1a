//! Concurrency primitives shared by the mode drivers: a bounded parallel
//! map with ordered results and fail-fast, and a winner-takes-all race that
//! aborts the losers.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::error::{Result, SwarmError};

/// Outcome of [`map_bounded`]. `results[i]` is `None` for items never
/// started before an abort.
#[derive(Debug)]
pub struct BoundedMapOutcome<T> {
    pub results: Vec<Option<T>>,
    pub aborted: bool,
}

/// Map `f` over `items` with at most `concurrency` workers.
///
/// Results land at their input index. `concurrency == 0` means unbounded
/// (one worker per item). The first non-cancellation error from any worker
/// aborts the rest and propagates without waiting for in-flight workers; an
/// external cancel instead yields partial results with `aborted: true`.
pub async fn map_bounded<I, T, F, Fut>(
    items: Vec<I>,
    concurrency: usize,
    f: F,
    cancel: &CancelToken,
) -> Result<BoundedMapOutcome<T>>
where
    I: Send + 'static,
    T: Send + 'static,
    F: Fn(I, usize) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
{
    let len = items.len();
    if len == 0 {
        return Ok(BoundedMapOutcome {
            results: Vec::new(),
            aborted: false,
        });
    }

    let normalized = if concurrency == 0 { len } else { concurrency };
    let limit = normalized.min(len).max(1);

    let combined = cancel.child();
    let f = Arc::new(f);
    let items: Arc<Mutex<Vec<Option<I>>>> =
        Arc::new(Mutex::new(items.into_iter().map(Some).collect()));
    let results: Arc<Mutex<Vec<Option<T>>>> =
        Arc::new(Mutex::new((0..len).map(|_| None).collect()));
    let next_index = Arc::new(AtomicUsize::new(0));
    let first_error: Arc<Mutex<Option<SwarmError>>> = Arc::new(Mutex::new(None));

    debug!(items = len, workers = limit, "Starting bounded map");

    let mut handles = Vec::with_capacity(limit);
    for _ in 0..limit {
        let combined = combined.clone();
        let external = cancel.clone();
        let f = Arc::clone(&f);
        let items = Arc::clone(&items);
        let results = Arc::clone(&results);
        let next_index = Arc::clone(&next_index);
        let first_error = Arc::clone(&first_error);

        handles.push(tokio::spawn(async move {
            loop {
                if combined.is_cancelled() {
                    return;
                }
                let index = next_index.fetch_add(1, Ordering::SeqCst);
                if index >= len {
                    return;
                }
                let item = items.lock()[index].take().expect("item claimed once");
                match f(item, index).await {
                    Ok(value) => {
                        results.lock()[index] = Some(value);
                    }
                    Err(e) => {
                        if external.is_cancelled() {
                            // The caller's cancel wins; the error is noise.
                            return;
                        }
                        warn!(index, error = %e, "Bounded map worker failed, aborting siblings");
                        let mut slot = first_error.lock();
                        if slot.is_none() {
                            *slot = Some(e);
                        }
                        drop(slot);
                        combined.cancel("parallel task failed");
                        return;
                    }
                }
            }
        }));
    }

    let mut drain = Box::pin(futures::future::join_all(handles));
    tokio::select! {
        _ = &mut drain => {}
        _ = combined.cancelled() => {
            if cancel.is_cancelled() {
                // External cancel: let in-flight workers unwind before
                // reporting the partial results.
                drain.await;
            }
        }
    }

    if cancel.is_cancelled() {
        return Ok(BoundedMapOutcome {
            results: std::mem::take(&mut *results.lock()),
            aborted: true,
        });
    }
    if let Some(error) = first_error.lock().take() {
        return Err(error);
    }

    let taken_results = std::mem::take(&mut *results.lock());
    Ok(BoundedMapOutcome {
        results: taken_results,
        aborted: false,
    })
}

/// Outcome of [`race`].
#[derive(Debug)]
pub enum RaceOutcome<T> {
    Won { winner: String, result: T },
    Aborted,
}

/// Run every task concurrently; the first to return `Ok` wins and the rest
/// are asked to stop through the shared token. All tasks are drained before
/// returning. If every task fails, the per-task errors are aggregated.
pub async fn race<T, F, Fut>(tasks: Vec<(String, F)>, parent: &CancelToken) -> Result<RaceOutcome<T>>
where
    T: Send + 'static,
    F: FnOnce(CancelToken) -> Fut,
    Fut: Future<Output = Result<T>> + Send + 'static,
{
    if tasks.is_empty() {
        return Err(SwarmError::EmptyRace);
    }
    if parent.is_cancelled() {
        return Ok(RaceOutcome::Aborted);
    }

    let combined = parent.child();
    let mut set: JoinSet<(String, Result<T>)> = JoinSet::new();
    for (id, f) in tasks {
        let token = combined.clone();
        let future = f(token);
        set.spawn(async move { (id, future.await) });
    }

    let mut winner: Option<(String, T)> = None;
    let mut failures: Vec<(String, String)> = Vec::new();

    while let Some(joined) = set.join_next().await {
        let Ok((id, outcome)) = joined else {
            continue;
        };
        match outcome {
            Ok(result) if winner.is_none() => {
                debug!(winner = %id, "Race won, cancelling losers");
                combined.cancel("race lost");
                winner = Some((id, result));
            }
            Ok(_) => {}
            Err(e) => failures.push((id, e.to_string())),
        }
    }

    match winner {
        Some((winner, result)) => Ok(RaceOutcome::Won { winner, result }),
        None if parent.is_cancelled() => Ok(RaceOutcome::Aborted),
        None => Err(SwarmError::RaceFailed { failures }),
    }
}
