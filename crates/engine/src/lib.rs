//! The batch execution engine: worker pool, per-job fan-out, sub-task
//! execution, and result aggregation.
//!
//! The engine is written entirely against the port traits in
//! `atelier-core` (`JobStore`, `Generator`, `ArtifactStore`), so the
//! worker binary wires in Postgres and HTTP implementations while tests
//! run against in-memory fakes.

pub mod cancel;
pub mod config;
pub mod events;
pub mod executor;
pub mod pool;
pub mod progress;
pub mod worker;

pub use cancel::CancelRegistry;
pub use config::EngineConfig;
pub use events::{EventBus, JobEvent};
pub use executor::SubTaskExecutor;
pub use pool::WorkerPool;
pub use worker::Worker;
