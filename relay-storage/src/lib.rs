//! RELAY Storage - Coordination Ledger
//!
//! Defines the ledger abstraction shared by every coordination component,
//! plus an in-memory implementation for tests and a durable LMDB one.

pub mod filter;
pub mod lmdb;
pub mod memory;

pub use filter::{sort_by_creation, LedgerFilter};
pub use lmdb::{LmdbLedger, LmdbLedgerError};
pub use memory::InMemoryLedger;

use relay_core::{
    Conflict, LedgerRecord, RecordId, RecordKind, RecordStatus, RelayResult, StoredHandoff,
    WorkClaim,
};
use std::collections::BTreeSet;

// ============================================================================
// LEDGER TRAIT
// ============================================================================

/// Persistent store for handoffs, conflicts and work claims.
///
/// Every state change goes through [`LedgerStore::compare_and_swap`], so two
/// writers racing on the same record cannot both win.
pub trait LedgerStore: Send + Sync {
    /// Insert a new record. Fails if the id is already present.
    fn insert(&self, record: &LedgerRecord) -> RelayResult<()>;

    /// Get a record by id.
    fn get(&self, id: RecordId) -> RelayResult<Option<LedgerRecord>>;

    /// Replace the record with `next.id()` if its current status equals `expected`.
    ///
    /// Fails with `StorageError::NotFound` when the id is unknown and
    /// `StorageError::StatusMismatch` when the status (or kind) differs.
    fn compare_and_swap(&self, expected: RecordStatus, next: &LedgerRecord) -> RelayResult<()>;

    /// All records matching `filter`, in creation order.
    fn query(&self, filter: &LedgerFilter) -> RelayResult<Vec<LedgerRecord>>;

    /// Delete all records matching `filter`; returns how many were removed.
    fn delete_where(&self, filter: &LedgerFilter) -> RelayResult<usize>;
}

// ============================================================================
// TYPED CONVENIENCE
// ============================================================================

/// Typed helpers over any [`LedgerStore`].
pub trait LedgerStoreExt: LedgerStore {
    /// Get a handoff by id; `None` if absent or a different kind.
    fn get_handoff(&self, id: RecordId) -> RelayResult<Option<StoredHandoff>> {
        Ok(self.get(id)?.and_then(LedgerRecord::into_handoff))
    }

    /// Get a conflict by id; `None` if absent or a different kind.
    fn get_conflict(&self, id: RecordId) -> RelayResult<Option<Conflict>> {
        Ok(self.get(id)?.and_then(LedgerRecord::into_conflict))
    }

    /// Get a work claim by id; `None` if absent or a different kind.
    fn get_work_claim(&self, id: RecordId) -> RelayResult<Option<WorkClaim>> {
        Ok(self.get(id)?.and_then(LedgerRecord::into_work_claim))
    }

    /// Handoffs matching `filter`, in creation order.
    fn handoffs(&self, filter: LedgerFilter) -> RelayResult<Vec<StoredHandoff>> {
        Ok(self
            .query(&filter.kind(RecordKind::Handoff))?
            .into_iter()
            .filter_map(LedgerRecord::into_handoff)
            .collect())
    }

    /// Conflicts matching `filter`, in creation order.
    fn conflicts(&self, filter: LedgerFilter) -> RelayResult<Vec<Conflict>> {
        Ok(self
            .query(&filter.kind(RecordKind::Conflict))?
            .into_iter()
            .filter_map(LedgerRecord::into_conflict)
            .collect())
    }

    /// Work claims matching `filter`, in creation order.
    fn work_claims(&self, filter: LedgerFilter) -> RelayResult<Vec<WorkClaim>> {
        Ok(self
            .query(&filter.kind(RecordKind::WorkClaim))?
            .into_iter()
            .filter_map(LedgerRecord::into_work_claim)
            .collect())
    }

    /// Every project that has at least one record.
    fn project_ids(&self) -> RelayResult<BTreeSet<String>> {
        Ok(self
            .query(&LedgerFilter::new())?
            .iter()
            .map(|r| r.project_id().to_string())
            .collect())
    }
}

impl<T: LedgerStore + ?Sized> LedgerStoreExt for T {}

// ============================================================================
// SHARED CONTRACT TESTS
// ============================================================================

/// Behavior every [`LedgerStore`] must share; run against each backend.
#[cfg(test)]
pub(crate) mod contract {
    use super::*;
    use chrono::{Duration, Utc};
    use relay_core::{
        ClaimStatus, HandoffData, HandoffKind, HandoffStatus, ItemRef, ItemType, RelayError,
        StorageError, new_record_id,
    };
    use serde_json::json;

    pub fn make_handoff(project: &str, item: &str, to: &str) -> StoredHandoff {
        StoredHandoff {
            data: HandoffData {
                handoff_id: new_record_id(),
                project_id: project.to_string(),
                item: ItemRef::new(item, ItemType::Story),
                from_agent: "developer".to_string(),
                to_agent: to.to_string(),
                kind: HandoffKind::Auto,
                message: None,
                context: json!({}),
                created_at: Utc::now(),
                accepted_at: None,
                completed_at: None,
            },
            status: HandoffStatus::Pending,
        }
    }

    pub fn insert_then_get(store: &dyn LedgerStore) {
        let handoff = make_handoff("p1", "s1", "tester");
        let id = handoff.data.handoff_id;
        store.insert(&handoff.clone().into()).unwrap();
        assert_eq!(store.get_handoff(id).unwrap(), Some(handoff));
        assert!(store.get_conflict(id).unwrap().is_none());
        assert!(store.get(new_record_id()).unwrap().is_none());
    }

    pub fn duplicate_insert_fails(store: &dyn LedgerStore) {
        let record: LedgerRecord = make_handoff("p1", "s1", "tester").into();
        store.insert(&record).unwrap();
        let err = store.insert(&record).unwrap_err();
        assert!(matches!(
            err,
            RelayError::Storage(StorageError::InsertFailed { .. })
        ));
    }

    pub fn compare_and_swap_single_winner(store: &dyn LedgerStore) {
        let pending = make_handoff("p1", "s1", "tester");
        store.insert(&pending.clone().into()).unwrap();

        let mut accepted = pending.clone();
        accepted.status = HandoffStatus::Accepted;
        let mut rejected = pending.clone();
        rejected.status = HandoffStatus::Rejected;

        let expected = RecordStatus::Handoff(HandoffStatus::Pending);
        store.compare_and_swap(expected, &accepted.clone().into()).unwrap();
        let err = store
            .compare_and_swap(expected, &rejected.into())
            .unwrap_err();
        match err {
            RelayError::Storage(StorageError::StatusMismatch { actual, .. }) => {
                assert_eq!(actual, RecordStatus::Handoff(HandoffStatus::Accepted))
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(
            store.get_handoff(pending.data.handoff_id).unwrap().unwrap().status,
            HandoffStatus::Accepted
        );
    }

    pub fn compare_and_swap_unknown_id(store: &dyn LedgerStore) {
        let ghost = make_handoff("p1", "s1", "tester");
        let err = store
            .compare_and_swap(
                RecordStatus::Handoff(HandoffStatus::Pending),
                &ghost.into(),
            )
            .unwrap_err();
        assert!(matches!(err, RelayError::Storage(StorageError::NotFound { .. })));
    }

    pub fn query_in_creation_order(store: &dyn LedgerStore) {
        let base = Utc::now();
        let mut ids = Vec::new();
        for offset in [3i64, 1, 2] {
            let mut h = make_handoff("p1", "s1", "tester");
            h.data.created_at = base + Duration::seconds(offset);
            ids.push((offset, h.data.handoff_id));
            store.insert(&h.into()).unwrap();
        }
        store
            .insert(&make_handoff("p2", "s9", "tester").into())
            .unwrap();

        ids.sort();
        let found: Vec<_> = store
            .query(&LedgerFilter::new().project("p1"))
            .unwrap()
            .iter()
            .map(LedgerRecord::id)
            .collect();
        let expected: Vec<_> = ids.into_iter().map(|(_, id)| id).collect();
        assert_eq!(found, expected);
    }

    pub fn delete_where_counts(store: &dyn LedgerStore) {
        let old = Utc::now() - Duration::days(40);
        let mut done = make_handoff("p1", "s1", "tester");
        done.status = HandoffStatus::Completed;
        done.data.created_at = old;
        let mut waiting = make_handoff("p1", "s1", "tester");
        waiting.data.created_at = old;
        store.insert(&done.into()).unwrap();
        store.insert(&waiting.clone().into()).unwrap();

        let claim = relay_core::WorkClaim::start(
            "p1",
            "tester",
            ItemRef::new("s1", ItemType::Story),
            old,
        );
        store.insert(&claim.into()).unwrap();

        let removed = store
            .delete_where(
                &LedgerFilter::new()
                    .project("p1")
                    .terminal_only()
                    .created_before(Utc::now() - Duration::days(30)),
            )
            .unwrap();
        assert_eq!(removed, 1);

        let left = store.query(&LedgerFilter::new()).unwrap();
        assert_eq!(left.len(), 2);
        assert!(left
            .iter()
            .any(|r| r.status() == RecordStatus::WorkClaim(ClaimStatus::InProgress)));
        assert!(left.iter().any(|r| r.id() == waiting.data.handoff_id));
    }

    pub fn project_ids(store: &dyn LedgerStore) {
        store.insert(&make_handoff("beta", "s1", "tester").into()).unwrap();
        store.insert(&make_handoff("alpha", "s2", "tester").into()).unwrap();
        store.insert(&make_handoff("beta", "s3", "tester").into()).unwrap();
        let ids: Vec<_> = store.project_ids().unwrap().into_iter().collect();
        assert_eq!(ids, vec!["alpha".to_string(), "beta".to_string()]);
    }
}
