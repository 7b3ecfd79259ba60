//! Submission and progress entry points for the (external) API layer.

use atelier_core::error::CoreError;
use atelier_core::job::{self, Job, JobSubmission};
use atelier_core::ports::{JobStore, StoreError};
use atelier_core::subtask::SubTaskResult;
use atelier_core::types::DbId;
use serde::Serialize;

/// Failure of a job submission.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error(transparent)]
    Invalid(#[from] CoreError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A job with its per-item results, sorted by `item_index` so the
/// result order always reproduces the submitted batch order.
#[derive(Debug, Serialize)]
pub struct JobProgress {
    pub job: Job,
    pub results: Vec<SubTaskResult>,
}

/// Validate and enqueue a new batch job, returning its id.
pub async fn submit_job(
    store: &dyn JobStore,
    submission: JobSubmission,
) -> Result<DbId, SubmitError> {
    job::validate_submission(&submission)?;
    let job_id = store.enqueue(submission).await?;
    tracing::info!(job_id, "Job submitted");
    Ok(job_id)
}

/// Current state of a job with all its resolved and in-flight items.
pub async fn job_progress(
    store: &dyn JobStore,
    job_id: DbId,
) -> Result<Option<JobProgress>, StoreError> {
    let Some(job) = store.get_job(job_id).await? else {
        return Ok(None);
    };
    let mut results = store.list_results(job_id).await?;
    results.sort_by_key(|r| r.item_index);
    Ok(Some(JobProgress { job, results }))
}
