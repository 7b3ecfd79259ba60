//! Repository for the `jobs` and `job_items` tables.
//!
//! Every finalizing write is guarded so at-least-once queue delivery
//! can never regress a terminal job.

use atelier_core::aggregate::JobAggregate;
use atelier_core::job::{JobStatus, JobSubmission};
use atelier_core::types::DbId;
use sqlx::PgPool;

use crate::models::{JobItemRow, JobRow};

/// Column list for `jobs` queries. The sealed `credential` column is
/// deliberately excluded; see [`JobRepo::load_credential`].
const COLUMNS: &str = "\
    id, capability, status_id, \
    succeeded_count, failed_count, total_count, cost, duration_ms, \
    created_at, started_at, completed_at";

/// Column list for `job_items` queries.
const ITEM_COLUMNS: &str = "job_id, item_index, prompt, reference_assets, aspect_ratio";

/// Terminal statuses: completed, failed.
const TERMINAL_STATUSES: [i16; 2] = [JobStatus::Completed as i16, JobStatus::Failed as i16];

/// Provides CRUD operations for batch jobs.
pub struct JobRepo;

impl JobRepo {
    /// Persist a new pending job with its items in one transaction.
    /// Returns the new job ID.
    pub async fn submit(pool: &PgPool, submission: &JobSubmission) -> Result<DbId, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let job_id: DbId = sqlx::query_scalar(
            "INSERT INTO jobs (capability, status_id, credential, total_count) \
             VALUES ($1, $2, $3, $4) \
             RETURNING id",
        )
        .bind(&submission.capability)
        .bind(JobStatus::Pending.id())
        .bind(submission.credential.as_bytes())
        .bind(submission.items.len() as i32)
        .fetch_one(&mut *tx)
        .await?;

        for (index, item) in submission.items.iter().enumerate() {
            sqlx::query(
                "INSERT INTO job_items \
                     (job_id, item_index, prompt, reference_assets, aspect_ratio) \
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(job_id)
            .bind(index as i32)
            .bind(&item.prompt)
            .bind(serde_json::json!(item.reference_assets))
            .bind(&item.aspect_ratio)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(job_id)
    }

    /// Atomically claim the oldest pending job, moving it to
    /// `Processing` and setting `started_at`.
    ///
    /// Uses `SELECT FOR UPDATE SKIP LOCKED` so concurrent workers never
    /// double-claim. Jobs are claimed in approximate FIFO order.
    pub async fn claim_next(pool: &PgPool) -> Result<Option<JobRow>, sqlx::Error> {
        let query = format!(
            "UPDATE jobs \
             SET status_id = $1, started_at = NOW() \
             WHERE id = ( \
                 SELECT id FROM jobs \
                 WHERE status_id = $2 \
                 ORDER BY created_at ASC \
                 LIMIT 1 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, JobRow>(&query)
            .bind(JobStatus::Processing.id())
            .bind(JobStatus::Pending.id())
            .fetch_optional(pool)
            .await
    }

    /// Load a job's items in index order.
    pub async fn load_items(pool: &PgPool, job_id: DbId) -> Result<Vec<JobItemRow>, sqlx::Error> {
        let query = format!(
            "SELECT {ITEM_COLUMNS} FROM job_items WHERE job_id = $1 ORDER BY item_index ASC"
        );
        sqlx::query_as::<_, JobItemRow>(&query)
            .bind(job_id)
            .fetch_all(pool)
            .await
    }

    /// Load the sealed credential bytes for a job.
    pub async fn load_credential(
        pool: &PgPool,
        job_id: DbId,
    ) -> Result<Option<Vec<u8>>, sqlx::Error> {
        sqlx::query_scalar("SELECT credential FROM jobs WHERE id = $1")
            .bind(job_id)
            .fetch_optional(pool)
            .await
    }

    /// Persist the recomputed running aggregate so progress polls see
    /// the latest counts. Never touches `status_id`.
    pub async fn update_aggregate(
        pool: &PgPool,
        job_id: DbId,
        aggregate: &JobAggregate,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE jobs \
             SET succeeded_count = $2, failed_count = $3, cost = $4, duration_ms = $5 \
             WHERE id = $1",
        )
        .bind(job_id)
        .bind(aggregate.succeeded as i32)
        .bind(aggregate.failed as i32)
        .bind(aggregate.cost)
        .bind(aggregate.duration_ms)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Move a job to a terminal status with its final aggregate.
    ///
    /// Guarded: returns `false` without writing when the job is already
    /// terminal, making redelivered finalizations a no-op.
    pub async fn finalize(
        pool: &PgPool,
        job_id: DbId,
        status: JobStatus,
        aggregate: &JobAggregate,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs \
             SET status_id = $2, completed_at = NOW(), \
                 succeeded_count = $3, failed_count = $4, cost = $5, duration_ms = $6 \
             WHERE id = $1 AND status_id NOT IN ($7, $8)",
        )
        .bind(job_id)
        .bind(status.id())
        .bind(aggregate.succeeded as i32)
        .bind(aggregate.failed as i32)
        .bind(aggregate.cost)
        .bind(aggregate.duration_ms)
        .bind(TERMINAL_STATUSES[0])
        .bind(TERMINAL_STATUSES[1])
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Find a job by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<JobRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE id = $1");
        sqlx::query_as::<_, JobRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }
}
