//! Postgres implementation of the `JobStore` port.
//!
//! A thin adapter: all SQL lives in the repositories, this type only
//! maps rows to domain values and `sqlx::Error` to `StoreError`.

use async_trait::async_trait;
use atelier_core::aggregate::JobAggregate;
use atelier_core::credential::SealedCredential;
use atelier_core::job::{Job, JobItem, JobStatus, JobSubmission};
use atelier_core::ports::{JobStore, StoreError};
use atelier_core::subtask::{SubTaskOutcome, SubTaskResult};
use atelier_core::types::DbId;

use crate::repositories::{JobRepo, SubTaskRepo};
use crate::DbPool;

/// Durable job store backed by a Postgres connection pool.
#[derive(Clone)]
pub struct PgJobStore {
    pool: DbPool,
}

impl PgJobStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn enqueue(&self, submission: JobSubmission) -> Result<DbId, StoreError> {
        JobRepo::submit(&self.pool, &submission)
            .await
            .map_err(backend)
    }

    async fn claim_next(&self) -> Result<Option<Job>, StoreError> {
        match JobRepo::claim_next(&self.pool).await.map_err(backend)? {
            Some(row) => Ok(Some(row.into_job()?)),
            None => Ok(None),
        }
    }

    async fn load_items(&self, job_id: DbId) -> Result<Vec<JobItem>, StoreError> {
        JobRepo::load_items(&self.pool, job_id)
            .await
            .map_err(backend)?
            .into_iter()
            .map(|row| row.into_item())
            .collect()
    }

    async fn load_credential(&self, job_id: DbId) -> Result<SealedCredential, StoreError> {
        let bytes = JobRepo::load_credential(&self.pool, job_id)
            .await
            .map_err(backend)?
            .ok_or(StoreError::JobNotFound(job_id))?;
        Ok(SealedCredential::from_bytes(bytes))
    }

    async fn create_subtask(&self, job_id: DbId, item_index: i32) -> Result<(), StoreError> {
        SubTaskRepo::create(&self.pool, job_id, item_index)
            .await
            .map_err(backend)
    }

    async fn finalize_subtask(&self, outcome: &SubTaskOutcome) -> Result<bool, StoreError> {
        SubTaskRepo::finalize(&self.pool, outcome)
            .await
            .map_err(backend)
    }

    async fn update_aggregate(
        &self,
        job_id: DbId,
        aggregate: &JobAggregate,
    ) -> Result<(), StoreError> {
        JobRepo::update_aggregate(&self.pool, job_id, aggregate)
            .await
            .map_err(backend)
    }

    async fn finalize_job(
        &self,
        job_id: DbId,
        status: JobStatus,
        aggregate: &JobAggregate,
    ) -> Result<bool, StoreError> {
        JobRepo::finalize(&self.pool, job_id, status, aggregate)
            .await
            .map_err(backend)
    }

    async fn list_results(&self, job_id: DbId) -> Result<Vec<SubTaskResult>, StoreError> {
        SubTaskRepo::list_by_job(&self.pool, job_id)
            .await
            .map_err(backend)?
            .into_iter()
            .map(|row| row.into_result())
            .collect()
    }

    async fn get_job(&self, job_id: DbId) -> Result<Option<Job>, StoreError> {
        match JobRepo::find_by_id(&self.pool, job_id)
            .await
            .map_err(backend)?
        {
            Some(row) => Ok(Some(row.into_job()?)),
            None => Ok(None),
        }
    }
}
