//! Batch driver: fan requests out over a fixed pool of workers
//!
//! Every worker owns a [`ResilientClient`] (and therefore its own breaker
//! window) and pulls jobs from a shared queue until it is empty. A job whose
//! failure the breaker suppresses is skipped; a failure the breaker lets
//! through stops all workers and fails the batch.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use crate::client::{ClientStats, Provider, ResilientClient};
use crate::error::GenerationError;
use crate::progress::{ProgressContext, fmt_num};
use crate::request::Request;
use crate::work_queue::WorkQueue;

/// One unit of work: an identifier (used for output naming) and its request.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: String,
    pub request: Request,
}

impl Job {
    pub fn new(id: impl Into<String>, request: Request) -> Self {
        Self {
            id: id.into(),
            request,
        }
    }
}

/// Batch execution summary
#[derive(Debug)]
pub struct Summary {
    pub total: usize,
    pub completed: usize,
    /// Failures suppressed by the breaker.
    pub skipped: usize,
    /// Responses the sink could not persist.
    pub failed: usize,
    pub stats: ClientStats,
    pub elapsed: Duration,
}

/// Process `jobs` on `workers` threads.
///
/// `factory` is called once per worker, before any job starts, so each
/// client's setup (e.g. clearing the exception log) completes before
/// anything is written. `sink` receives every response.
pub fn run_batch<P, F, S>(
    jobs: Vec<Job>,
    workers: usize,
    mut factory: F,
    sink: S,
    progress: &ProgressContext,
) -> Result<Summary>
where
    P: Provider + Send,
    F: FnMut() -> Result<ResilientClient<P>>,
    S: Fn(&Job, &str) -> Result<()> + Sync,
{
    let start = Instant::now();
    let workers = workers.clamp(1, jobs.len().max(1));
    let clients = (0..workers)
        .map(|_| factory())
        .collect::<Result<Vec<_>>>()
        .context("failed to create client")?;

    let queue = WorkQueue::new(jobs);
    let total = queue.total();
    log::info!("Processing {} jobs with {} workers", fmt_num(total), workers);

    let pb = progress.batch_bar("extract", total);
    let completed = AtomicUsize::new(0);
    let skipped = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);
    let abort = AtomicBool::new(false);
    let fatal: Mutex<Option<(String, GenerationError)>> = Mutex::new(None);
    let stats = Mutex::new(ClientStats::default());

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .context("Failed to create thread pool")?;

    pool.scope(|s| {
        for mut client in clients {
            let (queue, sink, pb) = (&queue, &sink, &pb);
            let (completed, skipped, failed) = (&completed, &skipped, &failed);
            let (abort, fatal, stats) = (&abort, &fatal, &stats);
            s.spawn(move |_| {
                while !abort.load(Ordering::Relaxed) {
                    let Some(job) = queue.next() else {
                        break;
                    };
                    match client.generate(&job.request) {
                        Ok(Some(text)) => match sink(job, &text) {
                            Ok(()) => {
                                completed.fetch_add(1, Ordering::Relaxed);
                            }
                            Err(e) => {
                                failed.fetch_add(1, Ordering::Relaxed);
                                log::error!("{}: {e:#}", job.id);
                            }
                        },
                        Ok(None) => {
                            skipped.fetch_add(1, Ordering::Relaxed);
                            log::debug!("{}: skipped", job.id);
                        }
                        Err(e) => {
                            abort.store(true, Ordering::Relaxed);
                            log::error!("{}: stopping batch: {e}", job.id);
                            let mut slot = fatal.lock().unwrap_or_else(|p| p.into_inner());
                            slot.get_or_insert((job.id.clone(), e));
                            break;
                        }
                    }
                    pb.inc(1);
                }
                stats
                    .lock()
                    .unwrap_or_else(|p| p.into_inner())
                    .merge(&client.stats());
            });
        }
    });
    pb.finish_and_clear();

    let summary = Summary {
        total,
        completed: completed.into_inner(),
        skipped: skipped.into_inner(),
        failed: failed.into_inner(),
        stats: stats.into_inner().unwrap_or_else(|p| p.into_inner()),
        elapsed: start.elapsed(),
    };

    if let Some((job_id, e)) = fatal.into_inner().unwrap_or_else(|p| p.into_inner()) {
        return Err(anyhow::Error::new(e).context(format!(
            "batch aborted at {job_id} after {} of {} jobs",
            summary.completed + summary.skipped + summary.failed,
            summary.total
        )));
    }

    log::info!("=== Batch Summary ===");
    log::info!(
        "Jobs: {}/{} completed ({} skipped, {} failed)",
        fmt_num(summary.completed),
        fmt_num(summary.total),
        summary.skipped,
        summary.failed
    );
    log::info!(
        "Cache hits: {}, degraded: {}, provider calls: {}",
        summary.stats.cache_hits,
        summary.stats.degraded,
        summary.stats.invocations
    );
    log::info!("Time: {:.1}s", summary.elapsed.as_secs_f64());

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_new() {
        let job = Job::new("a", Request::new("p"));
        assert_eq!(job.id, "a");
        assert_eq!(job.request.prompt(), "p");
    }
}
