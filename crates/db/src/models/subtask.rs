//! Row model for the `subtask_results` table.

use atelier_core::ports::StoreError;
use atelier_core::subtask::{ErrorKind, SubTaskResult, SubTaskStatus};
use atelier_core::types::{DbId, Timestamp};
use sqlx::FromRow;

/// A row from the `subtask_results` table.
#[derive(Debug, Clone, FromRow)]
pub struct SubTaskRow {
    pub job_id: DbId,
    pub item_index: i32,
    pub status_id: i16,
    pub output_ref: Option<String>,
    pub error_kind: Option<String>,
    pub error_message: Option<String>,
    pub cost: f64,
    pub processing_time_ms: i64,
    pub started_at: Timestamp,
    pub completed_at: Option<Timestamp>,
}

impl SubTaskRow {
    /// Convert into the domain type, rejecting unknown status IDs or
    /// error kinds.
    pub fn into_result(self) -> Result<SubTaskResult, StoreError> {
        let status = SubTaskStatus::from_id(self.status_id).ok_or_else(|| {
            StoreError::Backend(format!(
                "subtask ({}, {}) has unknown status_id {}",
                self.job_id, self.item_index, self.status_id
            ))
        })?;
        let error_kind = match self.error_kind.as_deref() {
            None => None,
            Some(s) => Some(ErrorKind::parse(s).ok_or_else(|| {
                StoreError::Backend(format!(
                    "subtask ({}, {}) has unknown error_kind '{s}'",
                    self.job_id, self.item_index
                ))
            })?),
        };
        Ok(SubTaskResult {
            job_id: self.job_id,
            item_index: self.item_index,
            status,
            output_ref: self.output_ref,
            error_kind,
            error_message: self.error_message,
            cost: self.cost,
            processing_time_ms: self.processing_time_ms,
        })
    }
}
