//! Sub-task executor: runs one job item end to end.
//!
//! Pipeline per item: cancellation check, rate-limit admission,
//! credential opening, generation with retries, artifact storage. The
//! credential is opened immediately before the generation call and the
//! plaintext never leaves this function or appears in logs.
//!
//! Every exit path produces a terminal [`SubTaskOutcome`]; the executor
//! itself never fails the surrounding job.

use std::sync::Arc;
use std::time::Instant;

use atelier_client::generate_with_retry;
use atelier_core::credential::{self, CredentialKey, SealedCredential};
use atelier_core::job::JobItem;
use atelier_core::ports::{ArtifactStore, GenerationRequest, Generator};
use atelier_core::ratelimit::{Admission, RateLimiter};
use atelier_core::retry::RetryPolicy;
use atelier_core::subtask::{ErrorKind, SubTaskOutcome};
use tokio_util::sync::CancellationToken;

/// Executes individual job items against the generative capability.
pub struct SubTaskExecutor {
    generator: Arc<dyn Generator>,
    artifacts: Arc<dyn ArtifactStore>,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    key: CredentialKey,
}

impl SubTaskExecutor {
    pub fn new(
        generator: Arc<dyn Generator>,
        artifacts: Arc<dyn ArtifactStore>,
        limiter: Arc<RateLimiter>,
        retry: RetryPolicy,
        key: CredentialKey,
    ) -> Self {
        Self {
            generator,
            artifacts,
            limiter,
            retry,
            key,
        }
    }

    /// Run one item to a terminal outcome.
    ///
    /// `processing_time_ms` covers the whole pipeline: rate-limit waits,
    /// every retry attempt, and artifact storage.
    pub async fn run(
        &self,
        item: &JobItem,
        capability: &str,
        sealed: &SealedCredential,
        cancel: &CancellationToken,
    ) -> SubTaskOutcome {
        let started = Instant::now();
        let elapsed_ms = || started.elapsed().as_millis() as i64;

        if cancel.is_cancelled() {
            return SubTaskOutcome::failed(
                item.job_id,
                item.item_index,
                ErrorKind::Cancelled,
                "job cancelled before item started",
                elapsed_ms(),
            );
        }

        // Admission loop: backpressure is a wait, not a failure.
        loop {
            match self.limiter.try_acquire(capability) {
                Ok(Admission::Granted) => break,
                Ok(Admission::RetryAfter(delay)) => {
                    tracing::debug!(
                        job_id = item.job_id,
                        item_index = item.item_index,
                        capability,
                        delay_ms = delay.as_millis() as u64,
                        "Rate limit reached, waiting for window reset",
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            return SubTaskOutcome::failed(
                                item.job_id,
                                item.item_index,
                                ErrorKind::Cancelled,
                                "job cancelled while waiting for rate limit",
                                elapsed_ms(),
                            );
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(e) => {
                    // Unconfigured capability: permanent, affects every
                    // item of the job the same way.
                    return SubTaskOutcome::failed(
                        item.job_id,
                        item.item_index,
                        ErrorKind::MalformedInput,
                        e.to_string(),
                        elapsed_ms(),
                    );
                }
            }
        }

        let api_key = match credential::open(&self.key, sealed) {
            Ok(key) => key,
            Err(e) => {
                tracing::warn!(
                    job_id = item.job_id,
                    item_index = item.item_index,
                    error = %e,
                    "Sealed credential could not be opened",
                );
                return SubTaskOutcome::failed(
                    item.job_id,
                    item.item_index,
                    ErrorKind::InvalidCredential,
                    "stored credential could not be opened",
                    elapsed_ms(),
                );
            }
        };

        let request = GenerationRequest::from(item);
        let image = match generate_with_retry(
            self.generator.as_ref(),
            &request,
            &api_key,
            &self.retry,
            cancel,
        )
        .await
        {
            Ok(image) => image,
            Err(e) => {
                tracing::info!(
                    job_id = item.job_id,
                    item_index = item.item_index,
                    error = %e,
                    kind = e.error_kind().as_str(),
                    "Generation failed",
                );
                return SubTaskOutcome::failed(
                    item.job_id,
                    item.item_index,
                    e.error_kind(),
                    e.to_string(),
                    elapsed_ms(),
                );
            }
        };

        match self.artifacts.store(&image.bytes, &image.mime_type).await {
            Ok(output_ref) => {
                tracing::debug!(
                    job_id = item.job_id,
                    item_index = item.item_index,
                    output_ref = %output_ref,
                    "Item completed",
                );
                SubTaskOutcome::completed(
                    item.job_id,
                    item.item_index,
                    output_ref,
                    image.cost,
                    elapsed_ms(),
                )
            }
            Err(e) => {
                tracing::error!(
                    job_id = item.job_id,
                    item_index = item.item_index,
                    error = %e,
                    "Artifact storage failed",
                );
                SubTaskOutcome::failed(
                    item.job_id,
                    item.item_index,
                    ErrorKind::StorageFailed,
                    e.to_string(),
                    elapsed_ms(),
                )
            }
        }
    }
}
