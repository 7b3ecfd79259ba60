//! Engine configuration loaded from environment variables.

use std::collections::HashMap;
use std::time::Duration;

use atelier_core::ratelimit::RateLimitConfig;
use atelier_core::retry::RetryPolicy;

/// Prefix for per-capability rate-limit env vars, e.g.
/// `RATE_LIMIT_STANDARD=10/60` (10 calls per 60-second window for the
/// `standard` capability).
const RATE_LIMIT_PREFIX: &str = "RATE_LIMIT_";

/// Engine tuning knobs loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Number of concurrent worker loops (jobs in flight at once).
    pub worker_concurrency: usize,
    /// Max concurrent sub-tasks within one job.
    pub prompt_concurrency: usize,
    /// Queue polling interval per worker loop.
    pub poll_interval: Duration,
    /// Hard timeout for one generation call.
    pub generation_timeout: Duration,
    /// Backoff policy for transient generation failures.
    pub retry: RetryPolicy,
    /// Per-capability rate-limit budgets.
    pub rate_limits: HashMap<String, RateLimitConfig>,
}

impl EngineConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                   | Default |
    /// |---------------------------|---------|
    /// | `WORKER_CONCURRENCY`      | `4`     |
    /// | `PROMPT_CONCURRENCY`      | `3`     |
    /// | `POLL_INTERVAL_MS`        | `1000`  |
    /// | `GENERATION_TIMEOUT_SECS` | `120`   |
    /// | `RETRY_MAX_ATTEMPTS`      | `4`     |
    /// | `RETRY_BASE_DELAY_MS`     | `500`   |
    /// | `RETRY_MAX_DELAY_MS`      | `30000` |
    /// | `RATE_LIMIT_<CAPABILITY>` | `standard` at `10/60` when none set |
    pub fn from_env() -> Self {
        let worker_concurrency: usize = std::env::var("WORKER_CONCURRENCY")
            .unwrap_or_else(|_| "4".into())
            .parse()
            .expect("WORKER_CONCURRENCY must be a valid usize");

        let prompt_concurrency: usize = std::env::var("PROMPT_CONCURRENCY")
            .unwrap_or_else(|_| "3".into())
            .parse()
            .expect("PROMPT_CONCURRENCY must be a valid usize");

        let poll_interval_ms: u64 = std::env::var("POLL_INTERVAL_MS")
            .unwrap_or_else(|_| "1000".into())
            .parse()
            .expect("POLL_INTERVAL_MS must be a valid u64");

        let generation_timeout_secs: u64 = std::env::var("GENERATION_TIMEOUT_SECS")
            .unwrap_or_else(|_| "120".into())
            .parse()
            .expect("GENERATION_TIMEOUT_SECS must be a valid u64");

        let max_attempts: u32 = std::env::var("RETRY_MAX_ATTEMPTS")
            .unwrap_or_else(|_| "4".into())
            .parse()
            .expect("RETRY_MAX_ATTEMPTS must be a valid u32");

        let base_delay_ms: u64 = std::env::var("RETRY_BASE_DELAY_MS")
            .unwrap_or_else(|_| "500".into())
            .parse()
            .expect("RETRY_BASE_DELAY_MS must be a valid u64");

        let max_delay_ms: u64 = std::env::var("RETRY_MAX_DELAY_MS")
            .unwrap_or_else(|_| "30000".into())
            .parse()
            .expect("RETRY_MAX_DELAY_MS must be a valid u64");

        let mut rate_limits: HashMap<String, RateLimitConfig> = std::env::vars()
            .filter_map(|(name, value)| {
                let capability = name.strip_prefix(RATE_LIMIT_PREFIX)?.to_lowercase();
                let config = parse_rate_limit(&value)
                    .unwrap_or_else(|| panic!("{name} must have the form 'limit/window_secs'"));
                Some((capability, config))
            })
            .collect();
        if rate_limits.is_empty() {
            rate_limits.insert(
                "standard".to_string(),
                RateLimitConfig {
                    limit: 10,
                    window: Duration::from_secs(60),
                },
            );
        }

        Self {
            worker_concurrency,
            prompt_concurrency,
            poll_interval: Duration::from_millis(poll_interval_ms),
            generation_timeout: Duration::from_secs(generation_timeout_secs),
            retry: RetryPolicy {
                max_attempts,
                initial_delay: Duration::from_millis(base_delay_ms),
                max_delay: Duration::from_millis(max_delay_ms),
                ..RetryPolicy::default()
            },
            rate_limits,
        }
    }
}

/// Parse a `limit/window_secs` budget string, e.g. `"10/60"`.
///
/// A zero-second window is rejected here so the misconfiguration
/// fails at load time, not inside a running sub-task.
fn parse_rate_limit(value: &str) -> Option<RateLimitConfig> {
    let (limit, window_secs) = value.split_once('/')?;
    let window_secs: u64 = window_secs.trim().parse().ok()?;
    if window_secs == 0 {
        return None;
    }
    Some(RateLimitConfig {
        limit: limit.trim().parse().ok()?,
        window: Duration::from_secs(window_secs),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
