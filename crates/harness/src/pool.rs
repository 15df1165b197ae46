//! Bounded worker pool with a per-unit timeout.
//!
//! Each worker pulls the next unit off a shared queue and runs it on its own
//! thread, waiting on an mpsc channel for the result. A unit that does not
//! answer in time is abandoned and recorded through its fault handler. Each
//! worker keeps its own accumulator; results are merged and put back into
//! submission order after a single join.

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Duration;

use log::{debug, warn};
use xlbench_model::FeatureScore;

use crate::unit::panic_message;

type RunFn = Box<dyn FnOnce() -> FeatureScore + Send + 'static>;
type FaultFn = Box<dyn FnOnce(String) -> FeatureScore + Send + 'static>;

/// One unit of work plus what to report if it never finishes.
pub struct Job {
    pub label: String,
    run: RunFn,
    fault: FaultFn,
}

impl Job {
    pub fn new(
        label: impl Into<String>,
        run: impl FnOnce() -> FeatureScore + Send + 'static,
        fault: impl FnOnce(String) -> FeatureScore + Send + 'static,
    ) -> Self {
        Self {
            label: label.into(),
            run: Box::new(run),
            fault: Box::new(fault),
        }
    }
}

pub struct WorkerPool {
    workers: usize,
    timeout: Duration,
}

impl WorkerPool {
    pub fn new(workers: usize, timeout: Duration) -> Self {
        Self {
            workers: workers.max(1),
            timeout,
        }
    }

    /// Run every job and return the scores in submission order.
    pub fn run(&self, jobs: Vec<Job>) -> Vec<FeatureScore> {
        let total = jobs.len();
        let queue: Arc<Mutex<VecDeque<(usize, Job)>>> =
            Arc::new(Mutex::new(jobs.into_iter().enumerate().collect()));
        let workers = self.workers.min(total.max(1));

        let mut scored: Vec<(usize, FeatureScore)> = thread::scope(|scope| {
            let handles: Vec<_> = (0..workers)
                .map(|_| {
                    let queue = Arc::clone(&queue);
                    scope.spawn(move || self.work(&queue))
                })
                .collect();

            handles
                .into_iter()
                .flat_map(|h| match h.join() {
                    Ok(done) => done,
                    Err(_) => {
                        warn!("worker thread panicked");
                        Vec::new()
                    }
                })
                .collect()
        });

        scored.sort_by_key(|(idx, _)| *idx);
        scored.into_iter().map(|(_, score)| score).collect()
    }

    fn work(&self, queue: &Mutex<VecDeque<(usize, Job)>>) -> Vec<(usize, FeatureScore)> {
        let mut done = Vec::new();
        loop {
            let next = match queue.lock() {
                Ok(mut q) => q.pop_front(),
                Err(_) => None,
            };
            let Some((idx, job)) = next else { break };
            done.push((idx, self.run_one(job)));
        }
        done
    }

    fn run_one(&self, job: Job) -> FeatureScore {
        let Job { label, run, fault } = job;
        let (tx, rx) = mpsc::channel();

        let spawned = thread::Builder::new()
            .name(format!("unit-{label}"))
            .spawn(move || {
                let outcome = catch_unwind(AssertUnwindSafe(run))
                    .map_err(|payload| panic_message(payload.as_ref()));
                // The receiver is gone when the unit already timed out.
                let _ = tx.send(outcome);
            });
        if let Err(e) = spawned {
            warn!("{label}: could not start unit thread: {e}");
            return fault(format!("Failed to start unit: {e}"));
        }

        match rx.recv_timeout(self.timeout) {
            Ok(Ok(score)) => score,
            Ok(Err(msg)) => {
                warn!("{label}: unit panicked: {msg}");
                fault(format!("Unit panicked: {msg}"))
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                warn!("{label}: timed out after {}s", self.timeout.as_secs());
                fault(format!("Timed out after {}s", self.timeout.as_secs()))
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                debug!("{label}: unit thread exited without a result");
                fault("Unit exited without a result".to_string())
            }
        }
    }
}
