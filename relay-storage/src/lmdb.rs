//! LMDB-backed ledger.
//!
//! Uses the heed crate (Rust bindings for LMDB) for a durable, memory-mapped
//! record store. Keys are the 16 raw bytes of the record UUID; values are the
//! JSON encoding of [`LedgerRecord`].
//!
//! # Atomicity
//!
//! LMDB serializes write transactions, across threads and processes sharing
//! the environment. `compare_and_swap` reads, checks and writes inside one
//! write transaction, so at most one of several racing swaps commits.

use std::path::Path;

use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions, RoTxn};
use relay_core::{LedgerRecord, RecordId, RecordStatus, RelayError, RelayResult, StorageError};

use crate::{sort_by_creation, LedgerFilter, LedgerStore};

/// Error type for LMDB ledger operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbLedgerError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open the database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LmdbLedgerError> for RelayError {
    fn from(e: LmdbLedgerError) -> Self {
        match e {
            LmdbLedgerError::Serialization(reason) => {
                RelayError::Storage(StorageError::Serialization { reason })
            }
            other => RelayError::Storage(StorageError::Backend {
                reason: other.to_string(),
            }),
        }
    }
}

fn txn_err(e: heed::Error) -> LmdbLedgerError {
    LmdbLedgerError::Transaction(e.to_string())
}

fn decode(bytes: &[u8]) -> Result<LedgerRecord, LmdbLedgerError> {
    serde_json::from_slice(bytes).map_err(|e| LmdbLedgerError::Serialization(e.to_string()))
}

fn encode(record: &LedgerRecord) -> Result<Vec<u8>, LmdbLedgerError> {
    serde_json::to_vec(record).map_err(|e| LmdbLedgerError::Serialization(e.to_string()))
}

/// Durable ledger stored in an LMDB environment.
///
/// # Example
///
/// ```ignore
/// use relay_storage::{LedgerStore, LmdbLedger, LedgerFilter};
///
/// let ledger = LmdbLedger::open("/var/lib/relay/ledger", 64)?;
/// let open = ledger.query(&LedgerFilter::new().project("p1"))?;
/// ```
#[derive(Clone)]
pub struct LmdbLedger {
    env: Env,
    db: Database<Bytes, Bytes>,
}

impl LmdbLedger {
    /// Open (or create) a ledger in `path`.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where LMDB files will be stored
    /// * `max_size_mb` - Maximum size of the database in megabytes
    pub fn open<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbLedgerError> {
        std::fs::create_dir_all(&path)?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbLedgerError::EnvOpen(e.to_string()))?;

        let mut wtxn = env.write_txn().map_err(txn_err)?;
        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbLedgerError::DbOpen(e.to_string()))?;
        wtxn.commit().map_err(txn_err)?;

        tracing::debug!(path = %path.as_ref().display(), max_size_mb, "Opened LMDB ledger");
        Ok(Self { env, db })
    }

    fn read(&self, txn: &RoTxn<'_>, id: RecordId) -> Result<Option<LedgerRecord>, LmdbLedgerError> {
        match self.db.get(txn, id.as_bytes().as_slice()).map_err(txn_err)? {
            Some(bytes) => Ok(Some(decode(bytes)?)),
            None => Ok(None),
        }
    }

    fn scan(&self, txn: &RoTxn<'_>, filter: &LedgerFilter) -> Result<Vec<LedgerRecord>, LmdbLedgerError> {
        let mut found = Vec::new();
        for entry in self.db.iter(txn).map_err(txn_err)? {
            let (_, bytes) = entry.map_err(txn_err)?;
            let record = decode(bytes)?;
            if filter.matches(&record) {
                found.push(record);
            }
        }
        Ok(found)
    }
}

impl LedgerStore for LmdbLedger {
    fn insert(&self, record: &LedgerRecord) -> RelayResult<()> {
        let id = record.id();
        let bytes = encode(record)?;

        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        if self.read(&wtxn, id)?.is_some() {
            return Err(StorageError::InsertFailed {
                kind: record.kind(),
                id,
                reason: "already exists".to_string(),
            }
            .into());
        }
        self.db
            .put(&mut wtxn, id.as_bytes().as_slice(), &bytes)
            .map_err(txn_err)?;
        wtxn.commit().map_err(txn_err)?;
        Ok(())
    }

    fn get(&self, id: RecordId) -> RelayResult<Option<LedgerRecord>> {
        let rtxn = self.env.read_txn().map_err(txn_err)?;
        Ok(self.read(&rtxn, id)?)
    }

    fn compare_and_swap(&self, expected: RecordStatus, next: &LedgerRecord) -> RelayResult<()> {
        let id = next.id();
        let bytes = encode(next)?;

        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        let current = self.read(&wtxn, id)?.ok_or(StorageError::NotFound {
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

        self.db
            .put(&mut wtxn, id.as_bytes().as_slice(), &bytes)
            .map_err(txn_err)?;
        wtxn.commit().map_err(txn_err)?;
        Ok(())
    }

    fn query(&self, filter: &LedgerFilter) -> RelayResult<Vec<LedgerRecord>> {
        let rtxn = self.env.read_txn().map_err(txn_err)?;
        let mut found = self.scan(&rtxn, filter)?;
        sort_by_creation(&mut found);
        Ok(found)
    }

    fn delete_where(&self, filter: &LedgerFilter) -> RelayResult<usize> {
        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        let doomed: Vec<RecordId> = self
            .scan(&wtxn, filter)?
            .iter()
            .map(LedgerRecord::id)
            .collect();

        let mut removed = 0;
        for id in doomed {
            if self
                .db
                .delete(&mut wtxn, id.as_bytes().as_slice())
                .map_err(txn_err)?
            {
                removed += 1;
            }
        }
        wtxn.commit().map_err(txn_err)?;
        Ok(removed)
    }
}

// ============================================================================
// TESTS
// ============================================================================
