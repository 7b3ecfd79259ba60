//! Domain logic for the Atelier batch generation engine.
//!
//! This crate has zero internal dependencies so it can be used by the
//! persistence layer, the execution engine, the worker binary, and any
//! future CLI tooling. It holds the job and sub-task state machines,
//! aggregate computation, the retry policy, the process-wide rate
//! limiter, credential sealing, and the async port traits implemented
//! by the outer crates.

pub mod aggregate;
pub mod credential;
pub mod error;
pub mod job;
pub mod ports;
pub mod ratelimit;
pub mod retry;
pub mod subtask;
pub mod types;
