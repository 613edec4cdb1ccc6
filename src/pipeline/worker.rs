//! Worker pool: N tasks draining one shared job queue

use super::task::{EntryTaskContext, run_entry_task};
use crate::types::{RemoteEntry, WorkerReport};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

/// Consumer side of the job queue, shared by every worker
///
/// The receiver sits behind a mutex so each entry is handed to exactly one
/// worker. `next` returns `None` once the producer side is dropped and the
/// queue is drained.
#[derive(Clone)]
pub(crate) struct SharedJobs {
    rx: Arc<Mutex<mpsc::Receiver<RemoteEntry>>>,
}

impl SharedJobs {
    pub(crate) async fn next(&self) -> Option<RemoteEntry> {
        self.rx.lock().await.recv().await
    }
}

/// Create a bounded job queue
pub(crate) fn job_queue(capacity: usize) -> (mpsc::Sender<RemoteEntry>, SharedJobs) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        tx,
        SharedJobs {
            rx: Arc::new(Mutex::new(rx)),
        },
    )
}

/// Spawn `count` workers over `jobs`
pub(crate) fn spawn_workers(
    count: usize,
    jobs: SharedJobs,
    ctx: EntryTaskContext,
) -> Vec<JoinHandle<WorkerReport>> {
    (0..count)
        .map(|worker| {
            let jobs = jobs.clone();
            let ctx = ctx.clone();
            tokio::spawn(async move { run_worker(worker, jobs, ctx).await })
        })
        .collect()
}

/// Pull entries until the queue is closed and drained, or the run is cancelled
async fn run_worker(worker: usize, jobs: SharedJobs, ctx: EntryTaskContext) -> WorkerReport {
    let mut report = WorkerReport::default();

    loop {
        let entry = tokio::select! {
            biased;
            _ = ctx.cancel_token.cancelled() => {
                tracing::debug!(worker, "Worker stopping: run cancelled");
                break;
            }
            next = jobs.next() => match next {
                Some(entry) => entry,
                None => break,
            },
        };

        if ctx.output_tx.is_closed() {
            tracing::warn!(worker, entry = %entry.name, "Output closed, worker stopping");
            report.failed += 1;
            break;
        }

        let outcome = run_entry_task(&ctx, &entry, worker).await;
        report.records_skipped += outcome.stats.skipped;
        if outcome.result.is_ok() {
            report.succeeded += 1;
        } else {
            report.failed += 1;
        }
    }

    tracing::debug!(
        worker,
        succeeded = report.succeeded,
        failed = report.failed,
        "Worker finished"
    );
    report
}

/// Completion barrier: wait for every worker and sum their reports
///
/// A worker that panicked is logged and counted; its entries are lost but the
/// other reports still count.
pub(crate) async fn join_workers(handles: Vec<JoinHandle<WorkerReport>>) -> (WorkerReport, usize) {
    let mut total = WorkerReport::default();
    let mut panicked = 0;

    for (worker, joined) in futures::future::join_all(handles).await.into_iter().enumerate() {
        match joined {
            Ok(report) => total.merge(report),
            Err(e) => {
                panicked += 1;
                tracing::error!(worker, error = %e, "Worker task failed");
            }
        }
    }
    (total, panicked)
}
