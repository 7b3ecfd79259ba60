//! Job types, status state machine, and submission validation.
//!
//! A job is one batch execution request: an ordered list of independent
//! items, all executed against the same named generative capability.
//! This module lives in `core` (zero internal deps) so it can be used by
//! both the persistence layer and the execution engine.

use serde::{Deserialize, Serialize};

use crate::aggregate::JobAggregate;
use crate::credential::SealedCredential;
use crate::error::CoreError;
use crate::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// Limits
// ---------------------------------------------------------------------------

/// Maximum number of items in a single job submission.
pub const MAX_ITEMS_PER_JOB: usize = 500;

/// Maximum length of a single prompt.
pub const MAX_PROMPT_LEN: usize = 4096;

/// Maximum number of reference assets attached to one item.
pub const MAX_REFERENCE_ASSETS: usize = 8;

// ---------------------------------------------------------------------------
// Status state machine
// ---------------------------------------------------------------------------

/// Job lifecycle status. Discriminants match the `status_id` SMALLINT
/// column (1-based, seed-data order).
#[repr(i16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Enqueued, not yet claimed by a worker.
    Pending = 1,
    /// Claimed by a worker; sub-tasks are executing.
    Processing = 2,
    /// Terminal: at least one item succeeded (or the job had no items).
    Completed = 3,
    /// Terminal: every item failed.
    Failed = 4,
}

impl JobStatus {
    /// Return the database status ID.
    pub fn id(self) -> i16 {
        self as i16
    }

    /// Whether this status is terminal (no outgoing transitions).
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Parse a status ID back into the enum.
    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            1 => Some(Self::Pending),
            2 => Some(Self::Processing),
            3 => Some(Self::Completed),
            4 => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Returns the set of valid target statuses reachable from `from`.
///
/// Terminal states return an empty slice: a job never regresses from
/// `Completed` or `Failed` back to `Processing`.
pub fn valid_transitions(from: JobStatus) -> &'static [JobStatus] {
    match from {
        JobStatus::Pending => &[JobStatus::Processing, JobStatus::Completed],
        JobStatus::Processing => &[JobStatus::Completed, JobStatus::Failed],
        JobStatus::Completed | JobStatus::Failed => &[],
    }
}

/// Check whether a transition from `from` to `to` is valid.
///
/// `Pending -> Completed` is allowed only for the zero-item fast path.
pub fn can_transition(from: JobStatus, to: JobStatus) -> bool {
    valid_transitions(from).contains(&to)
}

/// Validate a state transition, returning a descriptive error for
/// invalid ones.
pub fn validate_transition(from: JobStatus, to: JobStatus) -> Result<(), CoreError> {
    if can_transition(from, to) {
        Ok(())
    } else {
        Err(CoreError::Conflict(format!(
            "Invalid job transition: {from:?} ({}) -> {to:?} ({})",
            from.id(),
            to.id(),
        )))
    }
}

// ---------------------------------------------------------------------------
// Domain types
// ---------------------------------------------------------------------------

/// A persisted job row, without its items or credential.
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub id: DbId,
    /// Named generative capability (e.g. `"standard"`, `"pro"`). Each
    /// capability has its own rate-limit budget.
    pub capability: String,
    pub status: JobStatus,
    pub aggregate: JobAggregate,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
}

/// One unit of work within a job. `item_index` is the 0-based position
/// in the submitted batch and the stable ordering key for results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobItem {
    pub job_id: DbId,
    pub item_index: i32,
    pub prompt: String,
    /// Opaque references to input assets (owned by external storage).
    #[serde(default)]
    pub reference_assets: Vec<String>,
    pub aspect_ratio: Option<String>,
}

/// Payload for one item of a new submission.
#[derive(Debug, Clone, Deserialize)]
pub struct NewItem {
    pub prompt: String,
    #[serde(default)]
    pub reference_assets: Vec<String>,
    pub aspect_ratio: Option<String>,
}

/// A new batch request handed over by the (external) submission layer.
///
/// The credential arrives sealed and stays sealed until the moment of
/// the generation call.
#[derive(Debug)]
pub struct JobSubmission {
    pub capability: String,
    pub items: Vec<NewItem>,
    pub credential: SealedCredential,
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate a job submission's structure.
///
/// Rules:
/// - Capability name must not be empty.
/// - At most [`MAX_ITEMS_PER_JOB`] items (an empty batch is allowed and
///   completes immediately).
/// - Every prompt must be non-empty and within [`MAX_PROMPT_LEN`].
/// - At most [`MAX_REFERENCE_ASSETS`] reference assets per item.
pub fn validate_submission(submission: &JobSubmission) -> Result<(), CoreError> {
    if submission.capability.is_empty() {
        return Err(CoreError::Validation(
            "Capability must not be empty".to_string(),
        ));
    }
    if submission.items.len() > MAX_ITEMS_PER_JOB {
        return Err(CoreError::Validation(format!(
            "A job may have at most {MAX_ITEMS_PER_JOB} items"
        )));
    }
    for (i, item) in submission.items.iter().enumerate() {
        if item.prompt.trim().is_empty() {
            return Err(CoreError::Validation(format!(
                "Prompt at index {i} must not be empty"
            )));
        }
        if item.prompt.len() > MAX_PROMPT_LEN {
            return Err(CoreError::Validation(format!(
                "Prompt at index {i} exceeds {MAX_PROMPT_LEN} characters"
            )));
        }
        if item.reference_assets.len() > MAX_REFERENCE_ASSETS {
            return Err(CoreError::Validation(format!(
                "Item at index {i} has more than {MAX_REFERENCE_ASSETS} reference assets"
            )));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
