//! In-process job event bus backed by a `tokio::sync::broadcast`
//! channel.
//!
//! The engine publishes an event for every sub-task resolution and job
//! state change; the (external) web/WebSocket layer subscribes to relay
//! progress to clients. Publishing never blocks and never fails: with
//! no subscribers an event is simply dropped.

use atelier_core::aggregate::JobAggregate;
use atelier_core::subtask::SubTaskStatus;
use atelier_core::types::DbId;
use serde::Serialize;
use tokio::sync::broadcast;

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 256;

/// A job lifecycle event.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    /// One item resolved (completed or failed).
    SubTaskResolved {
        job_id: DbId,
        item_index: i32,
        status: SubTaskStatus,
    },
    /// The running aggregate changed.
    Progress {
        job_id: DbId,
        aggregate: JobAggregate,
    },
    /// The job reached `Completed`.
    Completed {
        job_id: DbId,
        aggregate: JobAggregate,
    },
    /// The job reached `Failed` (every item failed).
    Failed {
        job_id: DbId,
        aggregate: JobAggregate,
    },
    /// The job was cancelled while running.
    Cancelled { job_id: DbId },
}

/// In-process fan-out bus for [`JobEvent`]s, shared via `Arc`.
pub struct EventBus {
    sender: broadcast::Sender<JobEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to all events published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to all current subscribers.
    pub fn publish(&self, event: JobEvent) {
        // Err means no subscribers; that is fine.
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
