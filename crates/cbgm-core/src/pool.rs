//! Bounded worker pool for the embarrassingly parallel stages.
//!
//! Witness initialization and substemma optimization are independent per
//! witness: workers pull indices from a shared queue, write results through a
//! single collector, and share nothing else but the immutable inputs. The
//! first error cancels the remaining work via the shared token and is
//! re-raised after the pool joins; results finished before the failure stay
//! valid for the caller.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use parking_lot::Mutex;
use tracing::{debug, warn};

/// Cooperative cancellation shared by a pool and its tasks.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// The raw flag, for handing to [`crate::set_cover::SearchLimits`].
    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.0)
    }
}

/// Run `task` over every item on a bounded pool and collect the results in
/// input order. Task failures are collected centrally; the first one is
/// returned after all workers have stopped.
pub fn run_over_items<T, R, F>(items: &[T], task: F) -> Result<Vec<R>>
where
    T: Sync,
    R: Send,
    F: Fn(&T, &CancellationToken) -> Result<R> + Sync,
{
    if items.is_empty() {
        return Ok(Vec::new());
    }
    let workers = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .min(items.len());

    let token = CancellationToken::new();
    let next = AtomicUsize::new(0);
    let results: Mutex<Vec<Option<R>>> = Mutex::new((0..items.len()).map(|_| None).collect());
    let errors: Mutex<Vec<anyhow::Error>> = Mutex::new(Vec::new());

    std::thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| loop {
                if token.is_cancelled() {
                    return;
                }
                let i = next.fetch_add(1, Ordering::Relaxed);
                if i >= items.len() {
                    return;
                }
                match task(&items[i], &token) {
                    Ok(r) => {
                        results.lock()[i] = Some(r);
                    }
                    Err(e) => {
                        warn!(item = i, error = %e, "worker task failed; cancelling pool");
                        errors.lock().push(e);
                        token.cancel();
                        return;
                    }
                }
            });
        }
    });

    let mut errors = errors.into_inner();
    if let Some(first) = errors.drain(..).next() {
        return Err(first);
    }
    let results = results.into_inner();
    debug!(items = items.len(), workers, "worker pool completed");
    results
        .into_iter()
        .enumerate()
        .map(|(i, r)| r.ok_or_else(|| anyhow!("worker pool produced no result for item {i}")))
        .collect()
}
