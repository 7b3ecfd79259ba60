//! Process-wide, fixed-window rate limiter for the external generative
//! capabilities.
//!
//! One [`RateLimiter`] is shared by every worker in the pool; each named
//! capability has an independent counter. Windows are wall-clock aligned
//! (window start is rounded down to a multiple of the window duration),
//! and the check-and-increment happens under a single lock so concurrent
//! executors can never over-admit past the limit.
//!
//! Hitting the limit is backpressure, not an error: the caller receives
//! the time remaining until the window resets and is expected to sleep
//! and retry.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::error::CoreError;

/// Per-capability budget: `limit` admitted calls per `window`.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub limit: u32,
    pub window: Duration,
}

/// Result of an admission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The call may proceed; the counter has been incremented.
    Granted,
    /// The window budget is exhausted; retry after this duration.
    RetryAfter(Duration),
}

/// Mutable counter state for one capability.
#[derive(Debug)]
struct CapabilityState {
    config: RateLimitConfig,
    window_start_ms: i64,
    count: u32,
}

impl CapabilityState {
    /// Check-and-increment against the window containing `now_ms`.
    ///
    /// Rolls the window forward when it has expired; `count` never
    /// exceeds `config.limit` within one window.
    fn admit(&mut self, now_ms: i64) -> Admission {
        let window_ms = self.config.window.as_millis() as i64;
        let current_window_start = now_ms - now_ms.rem_euclid(window_ms);

        if current_window_start != self.window_start_ms {
            self.window_start_ms = current_window_start;
            self.count = 0;
        }

        if self.count < self.config.limit {
            self.count += 1;
            Admission::Granted
        } else {
            let reset_at = self.window_start_ms + window_ms;
            Admission::RetryAfter(Duration::from_millis((reset_at - now_ms).max(1) as u64))
        }
    }
}

/// Shared admission gate, one counter per named capability.
///
/// Lives in memory for the process lifetime only. A multi-process
/// deployment must externalize this state into a shared counter service.
pub struct RateLimiter {
    capabilities: Mutex<HashMap<String, CapabilityState>>,
}

impl RateLimiter {
    /// Build a limiter with one isolated counter per configured
    /// capability.
    pub fn new(configs: HashMap<String, RateLimitConfig>) -> Self {
        let capabilities = configs
            .into_iter()
            .map(|(name, config)| {
                (
                    name,
                    CapabilityState {
                        config,
                        window_start_ms: 0,
                        count: 0,
                    },
                )
            })
            .collect();
        Self {
            capabilities: Mutex::new(capabilities),
        }
    }

    /// Attempt to admit one call for `capability`.
    ///
    /// Unknown capabilities are a configuration error, not backpressure.
    pub fn try_acquire(&self, capability: &str) -> Result<Admission, CoreError> {
        self.try_acquire_at(capability, chrono::Utc::now().timestamp_millis())
    }

    /// Deterministic admission entry point with an injected clock.
    /// `try_acquire` delegates here with the current wall clock.
    pub fn try_acquire_at(&self, capability: &str, now_ms: i64) -> Result<Admission, CoreError> {
        let mut capabilities = self
            .capabilities
            .lock()
            .map_err(|_| CoreError::Internal("rate limiter lock poisoned".to_string()))?;
        let state = capabilities.get_mut(capability).ok_or_else(|| {
            CoreError::Validation(format!("Unknown capability: '{capability}'"))
        })?;
        Ok(state.admit(now_ms))
    }

    /// The configured limit for a capability, if it exists.
    pub fn limit_for(&self, capability: &str) -> Option<u32> {
        self.capabilities
            .lock()
            .ok()?
            .get(capability)
            .map(|s| s.config.limit)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
