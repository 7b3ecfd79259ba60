//! Job aggregate computation and the terminal-status policy.
//!
//! The aggregate is recomputed from the sub-task rows after every
//! resolution (never incremented in place), so redelivered or
//! double-finalized sub-tasks can never double-count.

use serde::{Deserialize, Serialize};

use crate::job::JobStatus;
use crate::subtask::{SubTaskResult, SubTaskStatus};

/// Running counts and totals for one job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct JobAggregate {
    pub succeeded: u32,
    pub failed: u32,
    pub total: u32,
    /// Cumulative cost of succeeded items. Failed items are not charged.
    pub cost: f64,
    /// Elapsed wall-clock time for the job so far.
    pub duration_ms: i64,
}

impl JobAggregate {
    /// Aggregate for a job with no items.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether every item has resolved (success or failure).
    pub fn is_settled(&self) -> bool {
        self.succeeded + self.failed == self.total
    }
}

/// Recompute the aggregate from the current sub-task rows.
///
/// `total` is the item count of the job, not the number of rows, so a
/// partially fanned-out job still reports the right denominator.
pub fn recompute(results: &[SubTaskResult], total: u32, duration_ms: i64) -> JobAggregate {
    let mut agg = JobAggregate {
        total,
        duration_ms,
        ..JobAggregate::default()
    };
    for result in results {
        match result.status {
            SubTaskStatus::Completed => {
                agg.succeeded += 1;
                agg.cost += result.cost;
            }
            SubTaskStatus::Failed => agg.failed += 1,
            SubTaskStatus::Processing => {}
        }
    }
    agg
}

/// Terminal status for a settled aggregate.
///
/// Partial success is success: the job is `Failed` only when it had
/// items and every one of them failed. A zero-item job completes.
pub fn terminal_status(aggregate: &JobAggregate) -> JobStatus {
    if aggregate.total > 0 && aggregate.succeeded == 0 {
        JobStatus::Failed
    } else {
        JobStatus::Completed
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subtask::{ErrorKind, SubTaskResult};

    fn completed(index: i32, cost: f64) -> SubTaskResult {
        SubTaskResult {
            job_id: 1,
            item_index: index,
            status: SubTaskStatus::Completed,
            output_ref: Some(format!("out/{index}")),
            error_kind: None,
            error_message: None,
            cost,
            processing_time_ms: 100,
        }
    }

    fn failed(index: i32) -> SubTaskResult {
        SubTaskResult {
            job_id: 1,
            item_index: index,
            status: SubTaskStatus::Failed,
            output_ref: None,
            error_kind: Some(ErrorKind::TransientExhausted),
            error_message: Some("boom".into()),
            cost: 0.0,
            processing_time_ms: 100,
        }
    }

    fn processing(index: i32) -> SubTaskResult {
        SubTaskResult {
            job_id: 1,
            item_index: index,
            status: SubTaskStatus::Processing,
            output_ref: None,
            error_kind: None,
            error_message: None,
            cost: 0.0,
            processing_time_ms: 0,
        }
    }

    #[test]
    fn recompute_counts_and_cost() {
        let results = [completed(0, 0.04), failed(1), completed(2, 0.04)];
        let agg = recompute(&results, 3, 5000);
        assert_eq!(agg.succeeded, 2);
        assert_eq!(agg.failed, 1);
        assert_eq!(agg.total, 3);
        assert!((agg.cost - 0.08).abs() < f64::EPSILON);
        assert_eq!(agg.duration_ms, 5000);
        assert!(agg.is_settled());
    }

    #[test]
    fn recompute_ignores_unresolved_items() {
        let results = [completed(0, 0.04), processing(1)];
        let agg = recompute(&results, 2, 100);
        assert_eq!(agg.succeeded, 1);
        assert_eq!(agg.failed, 0);
        assert!(!agg.is_settled());
    }

    #[test]
    fn recompute_total_comes_from_item_count() {
        // Fan-out has not created all rows yet.
        let agg = recompute(&[completed(0, 0.01)], 5, 0);
        assert_eq!(agg.total, 5);
        assert!(!agg.is_settled());
    }

    #[test]
    fn partial_success_is_completed() {
        let agg = recompute(&[completed(0, 0.04), failed(1)], 2, 0);
        assert_eq!(terminal_status(&agg), JobStatus::Completed);
    }

    #[test]
    fn all_failed_is_failed() {
        let agg = recompute(&[failed(0), failed(1)], 2, 0);
        assert_eq!(terminal_status(&agg), JobStatus::Failed);
    }

    #[test]
    fn zero_items_is_completed() {
        assert_eq!(terminal_status(&JobAggregate::empty()), JobStatus::Completed);
    }

    #[test]
    fn settled_aggregate_arithmetic_holds() {
        let results = [completed(0, 0.01), failed(1), failed(2)];
        let agg = recompute(&results, 3, 0);
        assert_eq!(agg.succeeded + agg.failed, agg.total);
    }
}
