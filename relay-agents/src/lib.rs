//! RELAY Agents - Handoff Coordination
//!
//! Coordination components over a shared ledger:
//! - Pipeline catalog and successor lookup
//! - Handoff state machine with pipeline auto-advance
//! - Conflict detection over agent perspectives
//! - Parallel work tracking
//! - History, statistics and retention
//!
//! [`CoordinationHub`] wires them together behind one constructor.

pub mod conflict;
pub mod handoff;
pub mod history;
pub mod hub;
pub mod parallel;
pub mod pipeline;
pub mod retention;
pub mod task_queue;

pub use conflict::{classify_perspectives, ConflictDetector};
pub use handoff::{AdvanceRequest, HandoffCompletion, HandoffCoordinator, InitiateHandoff};
pub use history::{HistoryAggregator, ProjectStatistics, RetentionReport};
pub use hub::CoordinationHub;
pub use parallel::{pair_key, ParallelWorkTracker};
pub use pipeline::PipelineCatalog;
pub use retention::{
    retention_sweep_task, run_sweep_once, RetentionMetrics, RetentionSnapshot,
    RetentionSweepConfig,
};
pub use task_queue::{
    ChannelTaskQueue, FollowUpTask, MemoryTaskQueue, NoopTaskQueue, TaskQueue, TaskQueueError,
};

use relay_core::{CoordinationError, RelayError, StorageError};

/// Translate a lost compare-and-swap into the protocol error callers see.
///
/// A status mismatch means another writer moved the record first, which the
/// caller observes as `InvalidState`; an unknown id becomes `NotFound`.
pub(crate) fn lost_swap(err: RelayError) -> RelayError {
    match err {
        RelayError::Storage(StorageError::StatusMismatch {
            kind,
            id,
            expected,
            actual,
        }) => CoordinationError::InvalidState {
            kind,
            id,
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
        .into(),
        RelayError::Storage(StorageError::NotFound { kind, id }) => {
            CoordinationError::NotFound { kind, id }.into()
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::{new_record_id, HandoffStatus, RecordKind, RecordStatus};

    #[test]
    fn test_lost_swap_maps_to_invalid_state() {
        let id = new_record_id();
        let err = lost_swap(
            StorageError::StatusMismatch {
                kind: RecordKind::Handoff,
                id,
                expected: RecordStatus::Handoff(HandoffStatus::Pending),
                actual: RecordStatus::Handoff(HandoffStatus::Rejected),
            }
            .into(),
        );
        assert_eq!(
            err,
            RelayError::Coordination(CoordinationError::InvalidState {
                kind: RecordKind::Handoff,
                id,
                expected: "pending".to_string(),
                actual: "rejected".to_string(),
            })
        );
    }

    #[test]
    fn test_lost_swap_keeps_backend_errors() {
        let err = lost_swap(StorageError::LockPoisoned.into());
        assert_eq!(err, RelayError::Storage(StorageError::LockPoisoned));
    }
}
