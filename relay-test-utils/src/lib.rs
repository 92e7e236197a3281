//! RELAY Test Utilities
//!
//! Shared test infrastructure for the RELAY workspace:
//! - Proptest generators for records and perspectives
//! - Failing collaborators for error-path tests
//! - Fixtures wiring a hub over in-memory collaborators
//! - Assertions for coordination error variants

pub use relay_agents::{CoordinationHub, InitiateHandoff, MemoryTaskQueue};
pub use relay_core::{
    AgentName, CoordinationError, HandoffData, HandoffKind, HandoffStatus, ItemRef, ItemType,
    LedgerRecord, Perspective, RecordId, RecordStatus, RelayConfig, RelayError, RelayResult,
    StorageError, StoredHandoff, Timestamp,
};
pub use relay_events::MemoryEventBus;
pub use relay_storage::{InMemoryLedger, LedgerFilter, LedgerStore};

use relay_agents::{FollowUpTask, TaskQueue, TaskQueueError};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

// ============================================================================
// FAILING COLLABORATORS
// ============================================================================

/// Task queue that rejects every task and counts the attempts.
#[derive(Debug, Default)]
pub struct FailingTaskQueue {
    attempts: AtomicUsize,
}

impl FailingTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl TaskQueue for FailingTaskQueue {
    fn enqueue(&self, _task: FollowUpTask) -> Result<(), TaskQueueError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(TaskQueueError::Unavailable {
            reason: "queue offline".to_string(),
        })
    }
}

/// In-memory ledger whose inserts can be switched to fail.
///
/// Reads, swaps and deletes always go through.
#[derive(Debug, Clone, Default)]
pub struct FlakyLedger {
    inner: InMemoryLedger,
    fail_inserts: Arc<AtomicBool>,
}

impl FlakyLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    pub fn inner(&self) -> &InMemoryLedger {
        &self.inner
    }
}

impl LedgerStore for FlakyLedger {
    fn insert(&self, record: &LedgerRecord) -> RelayResult<()> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(StorageError::Backend {
                reason: "insert disabled".to_string(),
            }
            .into());
        }
        self.inner.insert(record)
    }

    fn get(&self, id: RecordId) -> RelayResult<Option<LedgerRecord>> {
        self.inner.get(id)
    }

    fn compare_and_swap(&self, expected: RecordStatus, next: &LedgerRecord) -> RelayResult<()> {
        self.inner.compare_and_swap(expected, next)
    }

    fn query(&self, filter: &LedgerFilter) -> RelayResult<Vec<LedgerRecord>> {
        self.inner.query(filter)
    }

    fn delete_where(&self, filter: &LedgerFilter) -> RelayResult<usize> {
        self.inner.delete_where(filter)
    }
}

// ============================================================================
// GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for RELAY types.

    use super::*;
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;
    use relay_core::roles;
    use serde_json::json;

    /// Generate a random UUID.
    pub fn arb_uuid() -> impl Strategy<Value = Uuid> {
        any::<[u8; 16]>().prop_map(Uuid::from_bytes)
    }

    /// Generate a timestamp between 2020 and 2030.
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        (1_577_836_800i64..1_893_456_000i64)
            .prop_map(|secs| Utc.timestamp_opt(secs, 0).single().unwrap_or_else(Utc::now))
    }

    pub fn arb_item_type() -> impl Strategy<Value = ItemType> {
        prop::sample::select(ItemType::ALL.to_vec())
    }

    pub fn arb_item_ref() -> impl Strategy<Value = ItemRef> {
        ("[a-z][0-9]{1,3}", arb_item_type()).prop_map(|(id, item_type)| ItemRef::new(id, item_type))
    }

    /// One of the known agent roles.
    pub fn arb_agent() -> impl Strategy<Value = AgentName> {
        prop::sample::select(roles::ALL.to_vec()).prop_map(str::to_string)
    }

    pub fn arb_handoff_status() -> impl Strategy<Value = HandoffStatus> {
        prop::sample::select(HandoffStatus::ALL.to_vec())
    }

    /// A stored handoff in any status, with timestamps consistent with it.
    pub fn arb_stored_handoff() -> impl Strategy<Value = StoredHandoff> {
        (
            prop::sample::select(vec!["p1", "p2", "p3"]),
            arb_item_ref(),
            arb_agent(),
            arb_agent(),
            arb_handoff_status(),
            arb_timestamp(),
            0i64..86_400_000,
        )
            .prop_map(|(project, item, from, to, status, created_at, took_ms)| {
                let done = created_at + chrono::Duration::milliseconds(took_ms);
                StoredHandoff {
                    data: HandoffData {
                        handoff_id: relay_core::new_record_id(),
                        project_id: project.to_string(),
                        item,
                        from_agent: from,
                        to_agent: to,
                        kind: HandoffKind::Auto,
                        message: None,
                        context: json!({}),
                        created_at,
                        accepted_at: matches!(
                            status,
                            HandoffStatus::Accepted | HandoffStatus::Completed
                        )
                        .then_some(created_at),
                        completed_at: status.is_terminal().then_some(done),
                    },
                    status,
                }
            })
    }

    /// Perspective text free of every conflict keyword.
    pub fn arb_neutral_position() -> impl Strategy<Value = String> {
        prop::sample::select(vec![
            "Looks good to me",
            "Tests are ready",
            "Docs updated",
            "Build is green",
            "Ready for review",
        ])
        .prop_map(str::to_string)
    }

    pub fn arb_neutral_perspective() -> impl Strategy<Value = Perspective> {
        (arb_agent(), arb_neutral_position())
            .prop_map(|(agent, position)| Perspective::new(agent, position, ""))
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built fixtures for common scenarios.

    use super::*;

    pub const PROJECT: &str = "p1";

    pub fn story(id: &str) -> ItemRef {
        ItemRef::new(id, ItemType::Story)
    }

    pub fn task(id: &str) -> ItemRef {
        ItemRef::new(id, ItemType::Task)
    }

    /// A hub over in-memory collaborators, with handles to inspect them.
    pub struct Harness {
        pub ledger: InMemoryLedger,
        pub events: MemoryEventBus,
        pub tasks: MemoryTaskQueue,
        pub hub: Arc<CoordinationHub>,
    }

    impl Harness {
        pub fn new() -> Self {
            Self::with_config(RelayConfig::default())
        }

        /// Panics if `config` is invalid.
        pub fn with_config(config: RelayConfig) -> Self {
            let ledger = InMemoryLedger::new();
            let events = MemoryEventBus::new();
            let tasks = MemoryTaskQueue::new();
            let hub = CoordinationHub::new(
                Arc::new(ledger.clone()),
                Arc::new(events.clone()),
                Arc::new(tasks.clone()),
                config,
            )
            .unwrap_or_else(|e| panic!("invalid harness config: {}", e));
            Self {
                ledger,
                events,
                tasks,
                hub: Arc::new(hub),
            }
        }

        /// Initiate a pipeline handoff in [`PROJECT`].
        pub fn initiate(&self, item: &ItemRef, from: &str) -> RelayResult<StoredHandoff> {
            self.hub
                .initiate_handoff(InitiateHandoff::new(PROJECT, item.clone(), from))
        }

        /// Statuses a handoff went through, reconstructed from the event log.
        pub fn status_trail(&self, handoff_id: RecordId) -> Vec<HandoffStatus> {
            use relay_events::CoordinationEvent as E;
            self.events
                .events()
                .into_iter()
                .filter_map(|event| match event {
                    E::HandoffCreated { handoff }
                    | E::HandoffAccepted { handoff }
                    | E::HandoffCompleted { handoff }
                    | E::HandoffRejected { handoff }
                        if handoff.data.handoff_id == handoff_id =>
                    {
                        Some(handoff.status)
                    }
                    E::HandoffsExpired { handoff_ids, .. } if handoff_ids.contains(&handoff_id) => {
                        Some(HandoffStatus::Expired)
                    }
                    _ => None,
                })
                .collect()
        }
    }

    impl Default for Harness {
        fn default() -> Self {
            Self::new()
        }
    }
}

// ============================================================================
// ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions on coordination error variants.

    use super::*;

    #[track_caller]
    fn coordination<T: std::fmt::Debug>(result: &RelayResult<T>) -> &CoordinationError {
        match result {
            Err(RelayError::Coordination(e)) => e,
            other => panic!("Expected coordination error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_not_found<T: std::fmt::Debug>(result: &RelayResult<T>) {
        match coordination(result) {
            CoordinationError::NotFound { .. } => {}
            other => panic!("Expected NotFound, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_invalid_state<T: std::fmt::Debug>(result: &RelayResult<T>) {
        match coordination(result) {
            CoordinationError::InvalidState { .. } => {}
            other => panic!("Expected InvalidState, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_wrong_agent<T: std::fmt::Debug>(result: &RelayResult<T>) {
        match coordination(result) {
            CoordinationError::WrongAgent { .. } => {}
            other => panic!("Expected WrongAgent, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_no_next_agent<T: std::fmt::Debug>(result: &RelayResult<T>) {
        match coordination(result) {
            CoordinationError::NoNextAgent { .. } => {}
            other => panic!("Expected NoNextAgent, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_duplicate_claim<T: std::fmt::Debug>(result: &RelayResult<T>) {
        match coordination(result) {
            CoordinationError::DuplicateClaim { .. } => {}
            other => panic!("Expected DuplicateClaim, got: {:?}", other),
        }
    }

    /// Assert a handoff's current status in the ledger.
    #[track_caller]
    pub fn assert_handoff_status(hub: &CoordinationHub, handoff_id: RecordId, expected: HandoffStatus) {
        match hub.get_handoff(handoff_id) {
            Ok(handoff) => assert_eq!(handoff.status, expected, "handoff {}", handoff_id),
            Err(e) => panic!("Handoff {} not loadable: {}", handoff_id, e),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
