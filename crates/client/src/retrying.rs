//! Bounded exponential-backoff retry wrapper around a [`Generator`].
//!
//! Only transient failures are retried; permanent failures (bad
//! credential, malformed input, content policy) surface immediately.
//! Cancellation stops further attempts but never interrupts an attempt
//! that is already in flight.

use atelier_core::ports::{GeneratedImage, GenerationError, GenerationRequest, Generator};
use atelier_core::retry::RetryPolicy;
use tokio_util::sync::CancellationToken;

/// Execute `generator.generate` with up to `policy.max_attempts`
/// attempts.
///
/// Returns the last transient error once attempts are exhausted or the
/// token is cancelled during backoff.
pub async fn generate_with_retry(
    generator: &dyn Generator,
    request: &GenerationRequest,
    api_key: &str,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<GeneratedImage, GenerationError> {
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        match generator.generate(request, api_key).await {
            Ok(image) => return Ok(image),
            Err(e) if !e.is_transient() => return Err(e),
            Err(e) => {
                if !policy.allows_retry(attempt) || cancel.is_cancelled() {
                    return Err(e);
                }

                let delay = policy.delay_after(attempt);
                tracing::warn!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Transient generation failure, backing off",
                );

                tokio::select! {
                    _ = cancel.cancelled() => return Err(e),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
