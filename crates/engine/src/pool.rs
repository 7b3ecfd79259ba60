//! Worker pool: N concurrent claim-and-run loops over the durable
//! queue.
//!
//! Each loop polls `claim_next` on an interval and runs at most one job
//! at a time, so the pool processes up to `worker_concurrency` jobs
//! concurrently. Store errors are logged and retried on the next tick;
//! a loop never dies from an infrastructure failure.

use std::sync::Arc;
use std::time::Duration;

use atelier_core::ports::JobStore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::worker::Worker;

/// Pool of concurrent worker loops sharing one queue and one worker.
pub struct WorkerPool {
    store: Arc<dyn JobStore>,
    worker: Arc<Worker>,
    worker_concurrency: usize,
    poll_interval: Duration,
}

impl WorkerPool {
    pub fn new(
        store: Arc<dyn JobStore>,
        worker: Arc<Worker>,
        worker_concurrency: usize,
        poll_interval: Duration,
    ) -> Self {
        Self {
            store,
            worker,
            worker_concurrency: worker_concurrency.max(1),
            poll_interval,
        }
    }

    /// Run the pool until `cancel` is triggered, then wait for every
    /// loop to drain its current job.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(
            worker_concurrency = self.worker_concurrency,
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "Worker pool started",
        );

        let mut loops = JoinSet::new();
        for worker_id in 0..self.worker_concurrency {
            let store = self.store.clone();
            let worker = self.worker.clone();
            let poll_interval = self.poll_interval;
            let cancel = cancel.clone();
            loops.spawn(async move {
                worker_loop(worker_id, store, worker, poll_interval, cancel).await;
            });
        }
        while loops.join_next().await.is_some() {}

        tracing::info!("Worker pool stopped");
    }
}

/// One claim-and-run loop.
async fn worker_loop(
    worker_id: usize,
    store: Arc<dyn JobStore>,
    worker: Arc<Worker>,
    poll_interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(poll_interval);
    tracing::info!(worker_id, "Worker loop started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!(worker_id, "Worker loop shutting down");
                break;
            }
            _ = ticker.tick() => {
                match store.claim_next().await {
                    Ok(Some(job)) => {
                        let job_id = job.id;
                        tracing::info!(worker_id, job_id, "Job claimed");
                        if let Err(e) = worker.run_job(job, &cancel).await {
                            tracing::error!(worker_id, job_id, error = %e, "Job run failed");
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        tracing::error!(worker_id, error = %e, "Queue poll failed");
                    }
                }
            }
        }
    }
}
