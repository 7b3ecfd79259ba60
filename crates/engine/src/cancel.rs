//! Registry of cancellation tokens for running jobs.
//!
//! Each claimed job gets a child token of the pool-wide shutdown token,
//! keyed by job id, so a single job can be cancelled without touching
//! its siblings. Cancellation is cooperative: in-flight generation
//! attempts run to completion, waiting and unstarted items resolve as
//! `cancelled`.

use std::collections::HashMap;
use std::sync::Mutex;

use atelier_core::types::DbId;
use tokio_util::sync::CancellationToken;

/// Maps running job ids to their cancellation tokens.
#[derive(Default)]
pub struct CancelRegistry {
    jobs: Mutex<HashMap<DbId, CancellationToken>>,
}

impl CancelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job, returning its token as a child of `parent` so a
    /// pool shutdown cancels every running job too.
    pub fn register(&self, job_id: DbId, parent: &CancellationToken) -> CancellationToken {
        let token = parent.child_token();
        if let Ok(mut jobs) = self.jobs.lock() {
            jobs.insert(job_id, token.clone());
        }
        token
    }

    /// Cancel one running job. Returns `false` when the job is not
    /// currently registered (not running on this process).
    pub fn cancel(&self, job_id: DbId) -> bool {
        match self.jobs.lock() {
            Ok(jobs) => match jobs.get(&job_id) {
                Some(token) => {
                    token.cancel();
                    true
                }
                None => false,
            },
            Err(_) => false,
        }
    }

    /// Remove a finished job from the registry.
    pub fn deregister(&self, job_id: DbId) {
        if let Ok(mut jobs) = self.jobs.lock() {
            jobs.remove(&job_id);
        }
    }

    /// Number of currently registered (running) jobs.
    pub fn running(&self) -> usize {
        self.jobs.lock().map(|jobs| jobs.len()).unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
