//! Port traits implemented by the outer crates.
//!
//! The engine is written against these seams so its fan-out, rate-limit,
//! and aggregation logic is independent of Postgres and of the concrete
//! generative provider. `atelier-db` supplies the [`JobStore`]
//! implementation, `atelier-client` the [`Generator`], and the worker
//! binary an [`ArtifactStore`].

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::aggregate::JobAggregate;
use crate::credential::SealedCredential;
use crate::job::{Job, JobItem, JobStatus, JobSubmission};
use crate::subtask::{ErrorKind, SubTaskOutcome, SubTaskResult};
use crate::types::DbId;

// ---------------------------------------------------------------------------
// Generation request/response
// ---------------------------------------------------------------------------

/// One request to the remote generative capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reference_assets: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<String>,
}

impl From<&JobItem> for GenerationRequest {
    fn from(item: &JobItem) -> Self {
        Self {
            prompt: item.prompt.clone(),
            reference_assets: item.reference_assets.clone(),
            aspect_ratio: item.aspect_ratio.clone(),
        }
    }
}

/// A successfully generated artifact, not yet handed to storage.
#[derive(Debug, Clone)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    /// Cost charged by the capability for this call.
    pub cost: f64,
}

// ---------------------------------------------------------------------------
// Generation errors
// ---------------------------------------------------------------------------

/// Typed failure of one generation attempt.
///
/// Transient variants are retried with backoff by the generation client;
/// permanent variants surface immediately as a failed sub-task.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GenerationError {
    /// The capability rejected the credential (401/403). Permanent.
    #[error("Authentication rejected: {0}")]
    Auth(String),

    /// The request payload was rejected as malformed (400/422). Permanent.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The capability refused to generate the content. Permanent.
    #[error("Content policy rejection: {0}")]
    ContentPolicy(String),

    /// The capability reported its own rate limit (429). Transient.
    #[error("Remote rate limit: {0}")]
    RateLimited(String),

    /// The per-call timeout elapsed. Transient.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// The capability returned a 5xx-class error. Transient.
    #[error("Remote server error ({status}): {message}")]
    Remote { status: u16, message: String },

    /// The request never reached the capability (DNS, TLS, connect).
    /// Transient.
    #[error("Network error: {0}")]
    Network(String),

    /// Unrecognized response shape. Treated as transient so recoverable
    /// provider hiccups are not failed permanently.
    #[error("Unexpected response: {0}")]
    Unknown(String),
}

impl GenerationError {
    /// Whether this failure should be retried with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimited(_)
                | Self::Timeout(_)
                | Self::Remote { .. }
                | Self::Network(_)
                | Self::Unknown(_)
        )
    }

    /// The sub-task [`ErrorKind`] this failure maps to.
    ///
    /// Transient variants map to `TransientExhausted` because a
    /// transient error only reaches a sub-task result once every retry
    /// attempt is spent.
    pub fn error_kind(&self) -> ErrorKind {
        match self {
            Self::Auth(_) => ErrorKind::InvalidCredential,
            Self::InvalidInput(_) => ErrorKind::MalformedInput,
            Self::ContentPolicy(_) => ErrorKind::ContentPolicy,
            Self::RateLimited(_)
            | Self::Timeout(_)
            | Self::Remote { .. }
            | Self::Network(_)
            | Self::Unknown(_) => ErrorKind::TransientExhausted,
        }
    }
}

// ---------------------------------------------------------------------------
// Store / storage errors
// ---------------------------------------------------------------------------

/// Failure of the durable job store.
///
/// Infrastructure failures are never swallowed: the worker loop logs
/// them and retries the operation on its next tick.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Job {0} not found")]
    JobNotFound(DbId),

    #[error("Store backend error: {0}")]
    Backend(String),
}

/// Failure of the external artifact storage collaborator. Treated as a
/// sub-task failure, never as a job-level abort.
#[derive(Debug, thiserror::Error)]
#[error("Artifact storage error: {0}")]
pub struct StorageError(pub String);

// ---------------------------------------------------------------------------
// Ports
// ---------------------------------------------------------------------------

/// Durable queue and state store for jobs and sub-task results.
///
/// Delivery is at-least-once: a job claimed by a worker that crashes
/// before finalization becomes claimable again, so every finalizing
/// write is guarded (re-finalizing a terminal row is a no-op returning
/// `false`).
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a new pending job with its items and sealed credential.
    async fn enqueue(&self, submission: JobSubmission) -> Result<DbId, StoreError>;

    /// Atomically claim the oldest pending job, marking it processing
    /// and setting `started_at`. Returns `None` when the queue is empty.
    async fn claim_next(&self) -> Result<Option<Job>, StoreError>;

    /// Load a job's items in index order.
    async fn load_items(&self, job_id: DbId) -> Result<Vec<JobItem>, StoreError>;

    /// Load the sealed credential stored with the job.
    async fn load_credential(&self, job_id: DbId) -> Result<SealedCredential, StoreError>;

    /// Create a `Processing` sub-task row. Idempotent: a row that
    /// already exists (crash redelivery) is left untouched.
    async fn create_subtask(&self, job_id: DbId, item_index: i32) -> Result<(), StoreError>;

    /// Apply a terminal outcome to a `Processing` sub-task row.
    /// Returns `false` without writing when the row is already terminal.
    async fn finalize_subtask(&self, outcome: &SubTaskOutcome) -> Result<bool, StoreError>;

    /// Persist the recomputed running aggregate for progress polling.
    async fn update_aggregate(
        &self,
        job_id: DbId,
        aggregate: &JobAggregate,
    ) -> Result<(), StoreError>;

    /// Move a job to a terminal status with its final aggregate.
    /// Returns `false` without writing when the job is already terminal.
    async fn finalize_job(
        &self,
        job_id: DbId,
        status: JobStatus,
        aggregate: &JobAggregate,
    ) -> Result<bool, StoreError>;

    /// All sub-task results for a job, sorted by `item_index`.
    async fn list_results(&self, job_id: DbId) -> Result<Vec<SubTaskResult>, StoreError>;

    /// Fetch a job row (without items or credential).
    async fn get_job(&self, job_id: DbId) -> Result<Option<Job>, StoreError>;
}

/// One call to the remote generative capability.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Execute a single generation attempt with a hard per-call timeout.
    /// Retry policy is applied by the caller, not the implementation.
    async fn generate(
        &self,
        request: &GenerationRequest,
        api_key: &str,
    ) -> Result<GeneratedImage, GenerationError>;
}

/// External artifact storage collaborator.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Persist artifact bytes, returning an opaque reference (URL or
    /// path) recorded on the sub-task result.
    async fn store(&self, bytes: &[u8], mime_type: &str) -> Result<String, StorageError>;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
