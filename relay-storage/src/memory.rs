//! In-memory ledger

use crate::{sort_by_creation, LedgerFilter, LedgerStore};
use relay_core::{LedgerRecord, RecordId, RecordStatus, RelayResult, StorageError};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// In-memory ledger for tests and single-process use.
///
/// Clones share the same underlying map.
#[derive(Debug, Default, Clone)]
pub struct InMemoryLedger {
    records: Arc<RwLock<HashMap<RecordId, LedgerRecord>>>,
}

impl InMemoryLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove every record.
    pub fn clear(&self) -> RelayResult<()> {
        self.records
            .write()
            .map_err(|_| StorageError::LockPoisoned)?
            .clear();
        Ok(())
    }

    /// Number of stored records.
    pub fn len(&self) -> RelayResult<usize> {
        Ok(self
            .records
            .read()
            .map_err(|_| StorageError::LockPoisoned)?
            .len())
    }

    pub fn is_empty(&self) -> RelayResult<bool> {
        Ok(self.len()? == 0)
    }
}

impl LedgerStore for InMemoryLedger {
    fn insert(&self, record: &LedgerRecord) -> RelayResult<()> {
        let mut records = self.records.write().map_err(|_| StorageError::LockPoisoned)?;
        let id = record.id();
        if records.contains_key(&id) {
            return Err(StorageError::InsertFailed {
                kind: record.kind(),
                id,
                reason: "already exists".to_string(),
            }
            .into());
        }
        records.insert(id, record.clone());
        Ok(())
    }

    fn get(&self, id: RecordId) -> RelayResult<Option<LedgerRecord>> {
        let records = self.records.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(records.get(&id).cloned())
    }

    fn compare_and_swap(&self, expected: RecordStatus, next: &LedgerRecord) -> RelayResult<()> {
        let mut records = self.records.write().map_err(|_| StorageError::LockPoisoned)?;
        let id = next.id();
        let current = records.get_mut(&id).ok_or(StorageError::NotFound {
            kind: next.kind(),
            id,
        })?;

        let actual = current.status();
        if actual != expected || current.kind() != next.kind() {
            tracing::debug!(%id, %expected, %actual, "Ledger compare-and-swap lost");
            return Err(StorageError::StatusMismatch {
                kind: next.kind(),
                id,
                expected,
                actual,
            }
            .into());
        }

        *current = next.clone();
        Ok(())
    }

    fn query(&self, filter: &LedgerFilter) -> RelayResult<Vec<LedgerRecord>> {
        let records = self.records.read().map_err(|_| StorageError::LockPoisoned)?;
        let mut found: Vec<LedgerRecord> = records
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        sort_by_creation(&mut found);
        Ok(found)
    }

    fn delete_where(&self, filter: &LedgerFilter) -> RelayResult<usize> {
        let mut records = self.records.write().map_err(|_| StorageError::LockPoisoned)?;
        let before = records.len();
        records.retain(|_, r| !filter.matches(r));
        Ok(before - records.len())
    }
}

// ============================================================================
// TESTS
// ============================================================================
