//! Row models for the `jobs` and `job_items` tables.

use atelier_core::aggregate::JobAggregate;
use atelier_core::job::{Job, JobItem, JobStatus};
use atelier_core::ports::StoreError;
use atelier_core::types::{DbId, Timestamp};
use sqlx::FromRow;

/// A row from the `jobs` table (credential column excluded; it is
/// loaded separately and only at the point of use).
#[derive(Debug, Clone, FromRow)]
pub struct JobRow {
    pub id: DbId,
    pub capability: String,
    pub status_id: i16,
    pub succeeded_count: i32,
    pub failed_count: i32,
    pub total_count: i32,
    pub cost: f64,
    pub duration_ms: i64,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
}

impl JobRow {
    /// Convert into the domain type, rejecting unknown status IDs.
    pub fn into_job(self) -> Result<Job, StoreError> {
        let status = JobStatus::from_id(self.status_id).ok_or_else(|| {
            StoreError::Backend(format!(
                "job {} has unknown status_id {}",
                self.id, self.status_id
            ))
        })?;
        Ok(Job {
            id: self.id,
            capability: self.capability,
            status,
            aggregate: JobAggregate {
                succeeded: self.succeeded_count.max(0) as u32,
                failed: self.failed_count.max(0) as u32,
                total: self.total_count.max(0) as u32,
                cost: self.cost,
                duration_ms: self.duration_ms,
            },
            created_at: self.created_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
        })
    }
}

/// A row from the `job_items` table.
#[derive(Debug, Clone, FromRow)]
pub struct JobItemRow {
    pub job_id: DbId,
    pub item_index: i32,
    pub prompt: String,
    pub reference_assets: serde_json::Value,
    pub aspect_ratio: Option<String>,
}

impl JobItemRow {
    /// Convert into the domain type, decoding the JSONB asset list.
    pub fn into_item(self) -> Result<JobItem, StoreError> {
        let reference_assets: Vec<String> = serde_json::from_value(self.reference_assets)
            .map_err(|e| {
                StoreError::Backend(format!(
                    "job {} item {}: bad reference_assets: {e}",
                    self.job_id, self.item_index
                ))
            })?;
        Ok(JobItem {
            job_id: self.job_id,
            item_index: self.item_index,
            prompt: self.prompt,
            reference_assets,
            aspect_ratio: self.aspect_ratio,
        })
    }
}
