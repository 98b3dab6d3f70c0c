//! Worker pool for per-ROM executions.
//!
//! Jobs are fed through a small bounded queue to a fixed set of scoped worker
//! threads. Results come back tagged with their input index and are put back in
//! input order, so the caller never sees scheduling order.

use std::thread;

use crossbeam_channel::{bounded, unbounded};
use tracing::debug;

/// Applies `run` to every item on up to `workers` threads.
///
/// The output has one result per item, in input order. A panic in `run`
/// propagates to the caller once all workers have stopped.
pub fn run_batch<T, R, F>(items: &[T], workers: usize, run: F) -> Vec<R>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync,
{
    if items.is_empty() {
        return Vec::new();
    }
    let workers = workers.clamp(1, items.len());
    debug!("running {} jobs on {workers} worker(s)", items.len());

    // Backpressure: the producer stays at most two jobs per worker ahead.
    let (job_tx, job_rx) = bounded::<(usize, &T)>(workers * 2);
    let (result_tx, result_rx) = unbounded::<(usize, R)>();

    thread::scope(|scope| {
        for _ in 0..workers {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            let run = &run;
            scope.spawn(move || {
                for (index, item) in job_rx {
                    if result_tx.send((index, run(item))).is_err() {
                        break;
                    }
                }
            });
        }
        drop(job_rx);
        drop(result_tx);

        for job in items.iter().enumerate() {
            if job_tx.send(job).is_err() {
                break;
            }
        }
        drop(job_tx);
    });

    let mut slots: Vec<Option<R>> = std::iter::repeat_with(|| None).take(items.len()).collect();
    for (index, result) in result_rx.iter() {
        slots[index] = Some(result);
    }
    slots.into_iter().flatten().collect()
}
