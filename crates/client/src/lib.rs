//! HTTP client for the remote generative capability.
//!
//! [`http::HttpGenerator`] performs one generation call with a hard
//! per-call timeout and classifies every failure into the typed
//! taxonomy; [`retrying::generate_with_retry`] wraps any
//! [`Generator`](atelier_core::ports::Generator) with bounded
//! exponential-backoff retries for transient failures.

pub mod http;
pub mod retrying;

pub use http::HttpGenerator;
pub use retrying::generate_with_retry;
