//! Sub-task result types and the failure taxonomy.
//!
//! Each job item produces exactly one [`SubTaskResult`], written at most
//! twice: created as `Processing` when the owning worker begins fan-out,
//! then finalized once as `Completed` or `Failed`. Re-finalization is a
//! no-op enforced by the store.

use serde::{Deserialize, Serialize};

use crate::types::DbId;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Sub-task lifecycle status. Discriminants match the `status_id`
/// SMALLINT column (1-based, seed-data order).
#[repr(i16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubTaskStatus {
    Processing = 1,
    Completed = 2,
    Failed = 3,
}

impl SubTaskStatus {
    /// Return the database status ID.
    pub fn id(self) -> i16 {
        self as i16
    }

    /// Whether this status is terminal.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Parse a status ID back into the enum.
    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            1 => Some(Self::Processing),
            2 => Some(Self::Completed),
            3 => Some(Self::Failed),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Error taxonomy
// ---------------------------------------------------------------------------

/// Category of a failed sub-task, stored as a snake_case string so the
/// UI can show an actionable message per category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The remote capability rejected the credential. Not retried.
    InvalidCredential,
    /// The request payload was rejected as malformed. Not retried.
    MalformedInput,
    /// The remote capability refused the content. Not retried.
    ContentPolicy,
    /// Transient failures (timeouts, 5xx, remote rate limits) persisted
    /// through every retry attempt.
    TransientExhausted,
    /// The generated artifact could not be handed to storage.
    StorageFailed,
    /// The job was cancelled before this item started (or while it was
    /// waiting on the rate limiter).
    Cancelled,
}

impl ErrorKind {
    /// Database / wire representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidCredential => "invalid_credential",
            Self::MalformedInput => "malformed_input",
            Self::ContentPolicy => "content_policy",
            Self::TransientExhausted => "transient_exhausted",
            Self::StorageFailed => "storage_failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parse the database representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "invalid_credential" => Some(Self::InvalidCredential),
            "malformed_input" => Some(Self::MalformedInput),
            "content_policy" => Some(Self::ContentPolicy),
            "transient_exhausted" => Some(Self::TransientExhausted),
            "storage_failed" => Some(Self::StorageFailed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// Outcome of one item within a job, keyed by `(job_id, item_index)`.
///
/// `item_index` always reflects the original input order, so results
/// sorted by index reproduce the submitted batch regardless of
/// completion order.
#[derive(Debug, Clone, Serialize)]
pub struct SubTaskResult {
    pub job_id: DbId,
    pub item_index: i32,
    pub status: SubTaskStatus,
    /// Opaque reference to the produced artifact. Present only when
    /// `Completed`.
    pub output_ref: Option<String>,
    /// Present only when `Failed`.
    pub error_kind: Option<ErrorKind>,
    pub error_message: Option<String>,
    /// Cost charged for this item (0 for failed items).
    pub cost: f64,
    /// Wall-clock execution time including every retry attempt.
    pub processing_time_ms: i64,
}

/// Terminal outcome produced by the sub-task executor, applied to the
/// `Processing` row exactly once.
#[derive(Debug, Clone)]
pub struct SubTaskOutcome {
    pub job_id: DbId,
    pub item_index: i32,
    pub status: SubTaskStatus,
    pub output_ref: Option<String>,
    pub error_kind: Option<ErrorKind>,
    pub error_message: Option<String>,
    pub cost: f64,
    pub processing_time_ms: i64,
}

impl SubTaskOutcome {
    /// A successful outcome with its artifact reference and cost.
    pub fn completed(
        job_id: DbId,
        item_index: i32,
        output_ref: String,
        cost: f64,
        processing_time_ms: i64,
    ) -> Self {
        Self {
            job_id,
            item_index,
            status: SubTaskStatus::Completed,
            output_ref: Some(output_ref),
            error_kind: None,
            error_message: None,
            cost,
            processing_time_ms,
        }
    }

    /// A failed outcome with its category and message.
    pub fn failed(
        job_id: DbId,
        item_index: i32,
        kind: ErrorKind,
        message: impl Into<String>,
        processing_time_ms: i64,
    ) -> Self {
        Self {
            job_id,
            item_index,
            status: SubTaskStatus::Failed,
            output_ref: None,
            error_kind: Some(kind),
            error_message: Some(message.into()),
            cost: 0.0,
            processing_time_ms,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
