//! Per-job execution: fan-out, join, aggregation, finalization.
//!
//! A [`Worker`] takes one claimed job and drives every item to a
//! terminal sub-task result, bounded by the per-job prompt concurrency.
//! Items are started in index order and may complete in any order; the
//! job never short-circuits on item failures. The aggregate is always
//! recomputed from the stored sub-task rows, so a redelivered job can
//! never double-count.

use std::collections::HashSet;
use std::sync::Arc;

use atelier_core::aggregate::{self, JobAggregate};
use atelier_core::credential::SealedCredential;
use atelier_core::job::{Job, JobItem, JobStatus};
use atelier_core::ports::{JobStore, StoreError};
use atelier_core::types::{DbId, Timestamp};
use chrono::Utc;
use tokio::sync::{Mutex as TokioMutex, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::cancel::CancelRegistry;
use crate::events::{EventBus, JobEvent};
use crate::executor::SubTaskExecutor;

/// Runs one claimed job to its terminal status.
pub struct Worker {
    store: Arc<dyn JobStore>,
    executor: Arc<SubTaskExecutor>,
    events: Arc<EventBus>,
    cancels: Arc<CancelRegistry>,
    prompt_concurrency: usize,
}

impl Worker {
    pub fn new(
        store: Arc<dyn JobStore>,
        executor: Arc<SubTaskExecutor>,
        events: Arc<EventBus>,
        cancels: Arc<CancelRegistry>,
        prompt_concurrency: usize,
    ) -> Self {
        Self {
            store,
            executor,
            events,
            cancels,
            prompt_concurrency: prompt_concurrency.max(1),
        }
    }

    /// Execute a claimed job to completion.
    ///
    /// Registers the job in the cancellation registry for its lifetime;
    /// `shutdown` is the pool-wide token the job token is derived from.
    pub async fn run_job(&self, job: Job, shutdown: &CancellationToken) -> Result<(), StoreError> {
        let cancel = self.cancels.register(job.id, shutdown);
        let result = self.run_job_inner(&job, &cancel).await;
        self.cancels.deregister(job.id);
        result
    }

    async fn run_job_inner(&self, job: &Job, cancel: &CancellationToken) -> Result<(), StoreError> {
        let started_at = job.started_at.unwrap_or(job.created_at);
        let items = self.store.load_items(job.id).await?;

        tracing::info!(
            job_id = job.id,
            capability = %job.capability,
            items = items.len(),
            "Job execution started",
        );

        // Zero-item fast path: nothing to fan out.
        if items.is_empty() {
            return self
                .finalize(job.id, &JobAggregate::empty(), cancel)
                .await;
        }

        let sealed = self.store.load_credential(job.id).await?;
        for item in &items {
            self.store.create_subtask(job.id, item.item_index).await?;
        }

        // On redelivery some items may already be resolved; never send
        // those to the provider again.
        let resolved: HashSet<i32> = self
            .store
            .list_results(job.id)
            .await?
            .iter()
            .filter(|r| r.status.is_terminal())
            .map(|r| r.item_index)
            .collect();

        let total = items.len() as u32;
        let semaphore = Arc::new(Semaphore::new(self.prompt_concurrency));
        let aggregate_lock = Arc::new(TokioMutex::new(()));
        let mut tasks: JoinSet<()> = JoinSet::new();

        for item in items {
            if resolved.contains(&item.item_index) {
                tracing::debug!(
                    job_id = job.id,
                    item_index = item.item_index,
                    "Item already resolved, skipping",
                );
                continue;
            }
            // Acquiring before spawning keeps item start order equal to
            // index order under the concurrency bound.
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break, // semaphore closed; cannot happen
            };
            let ctx = self.subtask_context(job.id, total, started_at, aggregate_lock.clone());
            let sealed = sealed.clone();
            let capability = job.capability.clone();
            let cancel = cancel.clone();

            tasks.spawn(async move {
                ctx.run_one(item, &capability, &sealed, &cancel).await;
                drop(permit);
            });
        }

        // Join everything; item failures never abort the job.
        while tasks.join_next().await.is_some() {}

        let results = self.store.list_results(job.id).await?;
        let aggregate = aggregate::recompute(&results, total, elapsed_ms(started_at));
        self.finalize(job.id, &aggregate, cancel).await
    }

    // ---- private helpers ----

    fn subtask_context(
        &self,
        job_id: DbId,
        total: u32,
        started_at: Timestamp,
        aggregate_lock: Arc<TokioMutex<()>>,
    ) -> SubTaskContext {
        SubTaskContext {
            store: self.store.clone(),
            executor: self.executor.clone(),
            events: self.events.clone(),
            job_id,
            total,
            started_at,
            aggregate_lock,
        }
    }

    /// Finalize the job with the terminal status derived from its
    /// aggregate. A `false` from the store means another finalization
    /// already won; nothing is emitted in that case.
    async fn finalize(
        &self,
        job_id: DbId,
        aggregate: &JobAggregate,
        cancel: &CancellationToken,
    ) -> Result<(), StoreError> {
        let status = aggregate::terminal_status(aggregate);
        let finalized = self.store.finalize_job(job_id, status, aggregate).await?;
        if !finalized {
            tracing::debug!(job_id, "Job already finalized, skipping");
            return Ok(());
        }

        tracing::info!(
            job_id,
            status = ?status,
            succeeded = aggregate.succeeded,
            failed = aggregate.failed,
            total = aggregate.total,
            cost = aggregate.cost,
            duration_ms = aggregate.duration_ms,
            "Job finalized",
        );

        let aggregate = *aggregate;
        match status {
            JobStatus::Completed => self.events.publish(JobEvent::Completed { job_id, aggregate }),
            _ => self.events.publish(JobEvent::Failed { job_id, aggregate }),
        }
        if cancel.is_cancelled() {
            self.events.publish(JobEvent::Cancelled { job_id });
        }
        Ok(())
    }
}

/// Everything one spawned sub-task needs from the worker.
struct SubTaskContext {
    store: Arc<dyn JobStore>,
    executor: Arc<SubTaskExecutor>,
    events: Arc<EventBus>,
    job_id: DbId,
    total: u32,
    started_at: Timestamp,
    /// Serializes recompute-and-write of the running aggregate so a
    /// stale snapshot can never overwrite a newer one.
    aggregate_lock: Arc<TokioMutex<()>>,
}

impl SubTaskContext {
    /// Execute one item and persist its outcome.
    ///
    /// Store failures here are logged, not propagated: the item's row
    /// simply stays `Processing` and the job settles without it.
    async fn run_one(
        &self,
        item: JobItem,
        capability: &str,
        sealed: &SealedCredential,
        cancel: &CancellationToken,
    ) {
        let item_index = item.item_index;
        let outcome = self.executor.run(&item, capability, sealed, cancel).await;

        let wrote = match self.store.finalize_subtask(&outcome).await {
            Ok(wrote) => wrote,
            Err(e) => {
                tracing::error!(
                    job_id = self.job_id,
                    item_index,
                    error = %e,
                    "Failed to persist sub-task outcome",
                );
                return;
            }
        };
        if !wrote {
            tracing::debug!(
                job_id = self.job_id,
                item_index,
                "Sub-task already finalized, skipping",
            );
            return;
        }

        self.events.publish(JobEvent::SubTaskResolved {
            job_id: self.job_id,
            item_index,
            status: outcome.status,
        });

        // Refresh the running aggregate so progress polls stay current.
        // List and write under the job's lock: concurrent resolutions
        // would otherwise race and progress could transiently regress.
        let _guard = self.aggregate_lock.lock().await;
        match self.store.list_results(self.job_id).await {
            Ok(results) => {
                let aggregate =
                    aggregate::recompute(&results, self.total, elapsed_ms(self.started_at));
                match self.store.update_aggregate(self.job_id, &aggregate).await {
                    Ok(()) => self.events.publish(JobEvent::Progress {
                        job_id: self.job_id,
                        aggregate,
                    }),
                    Err(e) => {
                        tracing::error!(
                            job_id = self.job_id,
                            error = %e,
                            "Failed to persist running aggregate",
                        );
                    }
                }
            }
            Err(e) => {
                tracing::error!(
                    job_id = self.job_id,
                    error = %e,
                    "Failed to reload sub-task results",
                );
            }
        }
    }
}

fn elapsed_ms(since: Timestamp) -> i64 {
    (Utc::now() - since).num_milliseconds().max(0)
}
