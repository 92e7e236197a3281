//! Error types for RELAY operations

use crate::{AgentName, HandoffStateError, ItemType, RecordId, RecordKind, RecordStatus};
use thiserror::Error;

/// Ledger storage errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Record not found: {kind} with id {id}")]
    NotFound { kind: RecordKind, id: RecordId },

    #[error("Insert failed for {kind} {id}: {reason}")]
    InsertFailed {
        kind: RecordKind,
        id: RecordId,
        reason: String,
    },

    /// Conditional update lost: the stored status differs from the expected one.
    #[error("Status mismatch for {kind} {id}: expected {expected}, found {actual}")]
    StatusMismatch {
        kind: RecordKind,
        id: RecordId,
        expected: RecordStatus,
        actual: RecordStatus,
    },

    #[error("Storage backend error: {reason}")]
    Backend { reason: String },

    #[error("Serialization error: {reason}")]
    Serialization { reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Coordination protocol errors surfaced to callers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CoordinationError {
    #[error("{kind} {id} not found")]
    NotFound { kind: RecordKind, id: RecordId },

    #[error("{kind} {id} is {actual}, expected {expected}")]
    InvalidState {
        kind: RecordKind,
        id: RecordId,
        expected: String,
        actual: String,
    },

    #[error("Handoff {handoff_id} is addressed to {expected}, not {actual}")]
    WrongAgent {
        handoff_id: RecordId,
        expected: AgentName,
        actual: AgentName,
    },

    #[error("No next agent after {from_agent} for {item_type} items")]
    NoNextAgent {
        item_type: ItemType,
        from_agent: AgentName,
    },

    #[error("Agent {agent} already has work in progress on item {item_id}")]
    DuplicateClaim { agent: AgentName, item_id: String },
}

impl From<HandoffStateError> for CoordinationError {
    fn from(err: HandoffStateError) -> Self {
        match err {
            HandoffStateError::WrongState {
                handoff_id,
                expected,
                actual,
            } => CoordinationError::InvalidState {
                kind: RecordKind::Handoff,
                id: handoff_id,
                expected: expected.to_string(),
                actual: actual.to_string(),
            },
        }
    }
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to parse configuration: {reason}")]
    Parse { reason: String },

    #[error("Failed to read configuration file {path}: {reason}")]
    Io { path: String, reason: String },
}

/// Master error type for all RELAY errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RelayError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Coordination error: {0}")]
    Coordination(#[from] CoordinationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl From<HandoffStateError> for RelayError {
    fn from(err: HandoffStateError) -> Self {
        RelayError::Coordination(err.into())
    }
}

impl RelayError {
    /// Borrow the coordination error, if this is one.
    pub fn as_coordination(&self) -> Option<&CoordinationError> {
        match self {
            RelayError::Coordination(err) => Some(err),
            _ => None,
        }
    }
}

/// Result type alias for RELAY operations.
pub type RelayResult<T> = Result<T, RelayError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HandoffStatus;
    use uuid::Uuid;

    #[test]
    fn test_storage_error_display_status_mismatch() {
        let err = StorageError::StatusMismatch {
            kind: RecordKind::Handoff,
            id: Uuid::nil(),
            expected: RecordStatus::Handoff(HandoffStatus::Pending),
            actual: RecordStatus::Handoff(HandoffStatus::Accepted),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("handoff"));
        assert!(msg.contains("expected pending"));
        assert!(msg.contains("found accepted"));
    }

    #[test]
    fn test_coordination_error_display_wrong_agent() {
        let err = CoordinationError::WrongAgent {
            handoff_id: Uuid::nil(),
            expected: "tester".to_string(),
            actual: "security".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("tester"));
        assert!(msg.contains("security"));
    }

    #[test]
    fn test_coordination_error_display_no_next_agent() {
        let err = CoordinationError::NoNextAgent {
            item_type: ItemType::CodeReview,
            from_agent: "security".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "No next agent after security for code-review items"
        );
    }

    #[test]
    fn test_handoff_state_error_maps_to_invalid_state() {
        let err: RelayError = HandoffStateError::WrongState {
            handoff_id: Uuid::nil(),
            expected: HandoffStatus::Pending,
            actual: HandoffStatus::Completed,
        }
        .into();
        match err.as_coordination() {
            Some(CoordinationError::InvalidState { expected, actual, .. }) => {
                assert_eq!(expected, "pending");
                assert_eq!(actual, "completed");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_config_error_display_invalid_value() {
        let err = ConfigError::InvalidValue {
            field: "retention_days".to_string(),
            value: "0".to_string(),
            reason: "must be positive".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("retention_days"));
        assert!(msg.contains("must be positive"));
    }
}
