//! Bounded-concurrency fan-out / fan-in.
//!
//! `FanOut::run` spreads a list of items over a scoped pool of OS threads and
//! funnels every result back to the calling thread, which is the only writer
//! of the progress counter and the only caller of the sink. A failing or
//! panicking item never affects its siblings.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, mpsc};
use std::thread;

use crate::jobs::Progress;

/// Why a single item did not produce a value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ItemError<E> {
    #[error("{0}")]
    Failed(E),
    #[error("panicked: {0}")]
    Panicked(String),
}

/// Live, shared view of a fan-out's progress.
#[derive(Debug, Clone, Default)]
pub struct ProgressCounter(Arc<Mutex<Progress>>);

impl ProgressCounter {
    pub fn snapshot(&self) -> Progress {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn reset(&self, total: usize) -> Progress {
        let mut progress = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        *progress = Progress::new(total);
        *progress
    }

    fn record(&self, success: bool) -> Progress {
        let mut progress = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        if success {
            progress.record_success();
        } else {
            progress.record_failure();
        }
        *progress
    }
}

/// Outcome of one [`FanOut::run`].
#[derive(Debug)]
pub struct FanOutReport<R, E> {
    /// `(item index, result)` in completion order.
    pub outcomes: Vec<(usize, Result<R, ItemError<E>>)>,
    pub progress: Progress,
}

impl<R, E> FanOutReport<R, E> {
    pub fn succeeded(&self) -> usize {
        self.progress.completed
    }

    pub fn failed(&self) -> usize {
        self.progress.failed
    }
}

#[derive(Debug)]
pub struct FanOut {
    max_concurrency: usize,
    counter: ProgressCounter,
}

impl FanOut {
    /// `max_concurrency` is clamped to at least 1.
    pub fn new(max_concurrency: usize) -> Self {
        Self {
            max_concurrency: max_concurrency.max(1),
            counter: ProgressCounter::default(),
        }
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    pub fn progress(&self) -> ProgressCounter {
        self.counter.clone()
    }

    /// Run `work` over every item with at most `max_concurrency` calls in
    /// flight, calling `sink` on this thread after each item resolves.
    ///
    /// Returns once every item has resolved.
    pub fn run<T, R, E, W, S>(&self, items: &[T], work: W, mut sink: S) -> FanOutReport<R, E>
    where
        T: Sync,
        R: Send,
        E: Send,
        W: Fn(&T) -> Result<R, E> + Sync,
        S: FnMut(&T, &Result<R, ItemError<E>>, Progress),
    {
        let total = items.len();
        let mut progress = self.counter.reset(total);
        let mut outcomes = Vec::with_capacity(total);
        if total == 0 {
            return FanOutReport { outcomes, progress };
        }

        let cursor = AtomicUsize::new(0);
        let next = || {
            let i = cursor.fetch_add(1, Ordering::Relaxed);
            (i < total).then_some(i)
        };
        let process = |i: usize| run_item(&work, &items[i]);

        thread::scope(|scope| {
            let (tx, rx) = mpsc::channel();
            let workers = self.max_concurrency.min(total);
            for n in 0..workers {
                let tx = tx.clone();
                let (next, process) = (&next, &process);
                let spawned = thread::Builder::new()
                    .name(format!("fan-out-{n}"))
                    .spawn_scoped(scope, move || {
                        while let Some(i) = next() {
                            if tx.send((i, process(i))).is_err() {
                                break;
                            }
                        }
                    });
                if let Err(e) = spawned {
                    tracing::warn!(worker = n, error = %e, "failed to spawn fan-out worker");
                }
            }
            drop(tx);

            for (i, result) in rx {
                progress = self.counter.record(result.is_ok());
                sink(&items[i], &result, progress);
                outcomes.push((i, result));
            }

            // Only reached with items left when no worker could be spawned.
            while let Some(i) = next() {
                let result = process(i);
                progress = self.counter.record(result.is_ok());
                sink(&items[i], &result, progress);
                outcomes.push((i, result));
            }
        });

        FanOutReport { outcomes, progress }
    }
}

fn run_item<T, R, E>(work: &(impl Fn(&T) -> Result<R, E> + Sync), item: &T) -> Result<R, ItemError<E>> {
    match panic::catch_unwind(AssertUnwindSafe(|| work(item))) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(ItemError::Failed(e)),
        Err(payload) => Err(ItemError::Panicked(panic_message(payload.as_ref()))),
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
