//! Repository for the `subtask_results` table.

use atelier_core::subtask::{SubTaskOutcome, SubTaskStatus};
use atelier_core::types::DbId;
use sqlx::PgPool;

use crate::models::SubTaskRow;

const COLUMNS: &str = "\
    job_id, item_index, status_id, output_ref, error_kind, error_message, \
    cost, processing_time_ms, started_at, completed_at";

/// Provides CRUD operations for per-item sub-task results.
pub struct SubTaskRepo;

impl SubTaskRepo {
    /// Insert a processing-state row for an item. Idempotent: a second
    /// insert for the same (job, index) is silently ignored, so a
    /// redelivered job never clobbers existing results.
    pub async fn create(pool: &PgPool, job_id: DbId, item_index: i32) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO subtask_results (job_id, item_index, status_id) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (job_id, item_index) DO NOTHING",
        )
        .bind(job_id)
        .bind(item_index)
        .bind(SubTaskStatus::Processing.id())
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Record an item's terminal outcome.
    ///
    /// Guarded: only a row still in the processing state is written, so
    /// a duplicate finalization after redelivery is a no-op. Returns
    /// whether the write took effect.
    pub async fn finalize(pool: &PgPool, outcome: &SubTaskOutcome) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE subtask_results \
             SET status_id = $3, output_ref = $4, error_kind = $5, error_message = $6, \
                 cost = $7, processing_time_ms = $8, completed_at = NOW() \
             WHERE job_id = $1 AND item_index = $2 AND status_id = $9",
        )
        .bind(outcome.job_id)
        .bind(outcome.item_index)
        .bind(outcome.status.id())
        .bind(&outcome.output_ref)
        .bind(outcome.error_kind.map(|k| k.as_str()))
        .bind(&outcome.error_message)
        .bind(outcome.cost)
        .bind(outcome.processing_time_ms)
        .bind(SubTaskStatus::Processing.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// List all result rows for a job in item order.
    pub async fn list_by_job(pool: &PgPool, job_id: DbId) -> Result<Vec<SubTaskRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM subtask_results WHERE job_id = $1 ORDER BY item_index ASC"
        );
        sqlx::query_as::<_, SubTaskRow>(&query)
            .bind(job_id)
            .fetch_all(pool)
            .await
    }
}
