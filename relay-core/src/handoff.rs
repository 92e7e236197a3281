//! Handoff typestate for compile-time safety of the handoff lifecycle.
//!
//! Uses the typestate pattern to make invalid state transitions uncompilable.
//!
//! # State Transition Diagram
//!
//! ```text
//! new() → Pending ──┬── accept() ──→ Accepted ── complete() → Completed
//!                   ├── reject() ──→ Rejected (terminal)
//!                   └── expire() ──→ Expired  (terminal)
//! ```

use crate::{AgentName, HandoffId, HandoffKind, ItemRef, ProjectId, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;

/// Context key stamped with the agent that completed a handoff.
pub const COMPLETED_BY_KEY: &str = "completedBy";

// ============================================================================
// HANDOFF STATUS ENUM
// ============================================================================

/// Status of a handoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum HandoffStatus {
    /// Waiting for the receiving agent
    Pending,
    /// Receiving agent has taken the work
    Accepted,
    /// Receiving agent finished the work
    Completed,
    /// Receiving agent declined the work
    Rejected,
    /// Abandoned or swept before anyone accepted it
    Expired,
}

impl HandoffStatus {
    /// All statuses in lifecycle order.
    pub const ALL: [HandoffStatus; 5] = [
        HandoffStatus::Pending,
        HandoffStatus::Accepted,
        HandoffStatus::Completed,
        HandoffStatus::Rejected,
        HandoffStatus::Expired,
    ];

    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            HandoffStatus::Pending => "pending",
            HandoffStatus::Accepted => "accepted",
            HandoffStatus::Completed => "completed",
            HandoffStatus::Rejected => "rejected",
            HandoffStatus::Expired => "expired",
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> Result<Self, HandoffStatusParseError> {
        match s.to_lowercase().as_str() {
            "pending" | "initiated" => Ok(HandoffStatus::Pending),
            "accepted" => Ok(HandoffStatus::Accepted),
            "completed" | "complete" => Ok(HandoffStatus::Completed),
            "rejected" => Ok(HandoffStatus::Rejected),
            "expired" | "cancelled" => Ok(HandoffStatus::Expired),
            _ => Err(HandoffStatusParseError(s.to_string())),
        }
    }

    /// Check if this is a terminal state (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            HandoffStatus::Completed | HandoffStatus::Rejected | HandoffStatus::Expired
        )
    }

    /// Whether `next` is a legal successor of this status.
    pub fn can_transition_to(&self, next: HandoffStatus) -> bool {
        matches!(
            (self, next),
            (HandoffStatus::Pending, HandoffStatus::Accepted)
                | (HandoffStatus::Pending, HandoffStatus::Rejected)
                | (HandoffStatus::Pending, HandoffStatus::Expired)
                | (HandoffStatus::Accepted, HandoffStatus::Completed)
        )
    }
}

impl fmt::Display for HandoffStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

impl FromStr for HandoffStatus {
    type Err = HandoffStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

/// Error when parsing an invalid handoff status string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandoffStatusParseError(pub String);

impl fmt::Display for HandoffStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid handoff status: {}", self.0)
    }
}

impl std::error::Error for HandoffStatusParseError {}

// ============================================================================
// HANDOFF DATA (internal storage, state-independent)
// ============================================================================

/// Data carried by a handoff, independent of typestate.
/// This is what gets persisted to the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct HandoffData {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub handoff_id: HandoffId,
    pub project_id: ProjectId,
    pub item: ItemRef,
    pub from_agent: AgentName,
    pub to_agent: AgentName,
    pub kind: HandoffKind,
    /// Free-form note; holds the rejection reason once rejected
    pub message: Option<String>,
    /// Opaque payload carried forward between chained handoffs
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub context: Value,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date-time"))]
    pub accepted_at: Option<Timestamp>,
    /// Terminal timestamp: completion, rejection or expiry
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date-time"))]
    pub completed_at: Option<Timestamp>,
}

impl HandoffData {
    /// Wall-clock time from creation to the terminal timestamp, in milliseconds.
    pub fn duration_ms(&self) -> Option<i64> {
        self.completed_at
            .map(|done| (done - self.created_at).num_milliseconds())
    }
}

/// Merge a completion output into a handoff context.
///
/// Object outputs contribute their top-level keys; any other non-null output
/// is stored under `"output"`. A non-object context is kept under `"context"`.
/// The result always carries `completedBy`.
pub fn merge_completion_context(context: &Value, output: Option<&Value>, completed_by: &str) -> Value {
    let mut merged = match context {
        Value::Object(map) => map.clone(),
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("context".to_string(), other.clone());
            map
        }
    };

    match output {
        Some(Value::Object(fields)) => {
            for (key, value) in fields {
                merged.insert(key.clone(), value.clone());
            }
        }
        Some(Value::Null) | None => {}
        Some(other) => {
            merged.insert("output".to_string(), other.clone());
        }
    }

    merged.insert(
        COMPLETED_BY_KEY.to_string(),
        Value::String(completed_by.to_string()),
    );
    Value::Object(merged)
}

// ============================================================================
// TYPESTATE MARKERS
// ============================================================================

/// Marker trait for handoff states.
pub trait HandoffState: private::Sealed + Send + Sync {
    /// Runtime status matching this marker.
    const STATUS: HandoffStatus;
}

/// Handoff is waiting for the receiving agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pending;
impl HandoffState for Pending {
    const STATUS: HandoffStatus = HandoffStatus::Pending;
}

/// Handoff was accepted by the receiving agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandoffAccepted;
impl HandoffState for HandoffAccepted {
    const STATUS: HandoffStatus = HandoffStatus::Accepted;
}

/// Handoff has been completed (terminal).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandoffCompleted;
impl HandoffState for HandoffCompleted {
    const STATUS: HandoffStatus = HandoffStatus::Completed;
}

/// Handoff was rejected by the receiving agent (terminal).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rejected;
impl HandoffState for Rejected {
    const STATUS: HandoffStatus = HandoffStatus::Rejected;
}

/// Handoff expired while pending (terminal).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expired;
impl HandoffState for Expired {
    const STATUS: HandoffStatus = HandoffStatus::Expired;
}

mod private {
    pub trait Sealed {}
    impl Sealed for super::Pending {}
    impl Sealed for super::HandoffAccepted {}
    impl Sealed for super::HandoffCompleted {}
    impl Sealed for super::Rejected {}
    impl Sealed for super::Expired {}
}

// ============================================================================
// HANDOFF TYPESTATE WRAPPER
// ============================================================================

/// A handoff with compile-time state tracking.
///
/// - `Handoff<Pending>`: can be accepted, rejected or expired
/// - `Handoff<HandoffAccepted>`: can be completed
/// - `Handoff<HandoffCompleted>`, `Handoff<Rejected>`, `Handoff<Expired>`: terminal
#[derive(Debug, Clone)]
pub struct Handoff<S: HandoffState> {
    data: HandoffData,
    _state: PhantomData<S>,
}

impl<S: HandoffState> Handoff<S> {
    /// Access the underlying handoff data (read-only).
    pub fn data(&self) -> &HandoffData {
        &self.data
    }

    /// Get the handoff ID.
    pub fn handoff_id(&self) -> HandoffId {
        self.data.handoff_id
    }

    /// Get the receiving agent.
    pub fn to_agent(&self) -> &str {
        &self.data.to_agent
    }

    /// Runtime status of this handoff.
    pub fn status(&self) -> HandoffStatus {
        S::STATUS
    }

    /// Convert into the status-agnostic stored form.
    pub fn into_stored(self) -> StoredHandoff {
        StoredHandoff {
            data: self.data,
            status: S::STATUS,
        }
    }

    fn transition<T: HandoffState>(self) -> Handoff<T> {
        Handoff {
            data: self.data,
            _state: PhantomData,
        }
    }
}

impl Handoff<Pending> {
    /// Create a new pending handoff.
    pub fn new(data: HandoffData) -> Self {
        Handoff {
            data,
            _state: PhantomData,
        }
    }

    /// Accept the handoff.
    pub fn accept(mut self, accepted_at: Timestamp) -> Handoff<HandoffAccepted> {
        self.data.accepted_at = Some(accepted_at);
        self.transition()
    }

    /// Reject the handoff. The reason replaces the message.
    pub fn reject(mut self, reason: Option<String>, rejected_at: Timestamp) -> Handoff<Rejected> {
        if reason.is_some() {
            self.data.message = reason;
        }
        self.data.completed_at = Some(rejected_at);
        self.transition()
    }

    /// Expire the handoff.
    pub fn expire(mut self, expired_at: Timestamp) -> Handoff<Expired> {
        self.data.completed_at = Some(expired_at);
        self.transition()
    }
}

impl Handoff<HandoffAccepted> {
    /// Complete the handoff, merging `output` into the carried context.
    pub fn complete(mut self, output: Option<&Value>, completed_at: Timestamp) -> Handoff<HandoffCompleted> {
        self.data.context =
            merge_completion_context(&self.data.context, output, &self.data.to_agent);
        self.data.completed_at = Some(completed_at);
        self.transition()
    }
}

impl Handoff<HandoffCompleted> {
    /// Merged context produced on completion.
    pub fn context(&self) -> &Value {
        &self.data.context
    }
}

// ============================================================================
// DATABASE BOUNDARY: STORED HANDOFF
// ============================================================================

/// A handoff as stored in the ledger (status-agnostic).
///
/// When loading from the ledger the state is unknown at compile time.
/// Use the `into_*` methods to validate and convert to a typed handoff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct StoredHandoff {
    pub data: HandoffData,
    pub status: HandoffStatus,
}

/// All possible runtime states of a loaded handoff.
#[derive(Debug, Clone)]
pub enum LoadedHandoff {
    Pending(Handoff<Pending>),
    Accepted(Handoff<HandoffAccepted>),
    Completed(Handoff<HandoffCompleted>),
    Rejected(Handoff<Rejected>),
    Expired(Handoff<Expired>),
}

impl StoredHandoff {
    /// Convert to a typed handoff based on the stored status.
    pub fn into_typed(self) -> LoadedHandoff {
        let handoff = Handoff::<Pending>::new(self.data);
        match self.status {
            HandoffStatus::Pending => LoadedHandoff::Pending(handoff),
            HandoffStatus::Accepted => LoadedHandoff::Accepted(handoff.transition()),
            HandoffStatus::Completed => LoadedHandoff::Completed(handoff.transition()),
            HandoffStatus::Rejected => LoadedHandoff::Rejected(handoff.transition()),
            HandoffStatus::Expired => LoadedHandoff::Expired(handoff.transition()),
        }
    }

    /// Try to convert to a pending handoff.
    pub fn into_pending(self) -> Result<Handoff<Pending>, HandoffStateError> {
        self.expect_status(HandoffStatus::Pending)?;
        Ok(Handoff::new(self.data))
    }

    /// Try to convert to an accepted handoff.
    pub fn into_accepted(self) -> Result<Handoff<HandoffAccepted>, HandoffStateError> {
        self.expect_status(HandoffStatus::Accepted)?;
        Ok(Handoff::new(self.data).transition())
    }

    fn expect_status(&self, expected: HandoffStatus) -> Result<(), HandoffStateError> {
        if self.status != expected {
            return Err(HandoffStateError::WrongState {
                handoff_id: self.data.handoff_id,
                expected,
                actual: self.status,
            });
        }
        Ok(())
    }

    /// Get the underlying data without state validation.
    pub fn data(&self) -> &HandoffData {
        &self.data
    }

    /// Get the current status.
    pub fn status(&self) -> HandoffStatus {
        self.status
    }
}

/// Errors when transitioning handoff states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandoffStateError {
    /// Handoff is not in the expected state.
    WrongState {
        handoff_id: HandoffId,
        expected: HandoffStatus,
        actual: HandoffStatus,
    },
}

impl fmt::Display for HandoffStateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandoffStateError::WrongState {
                handoff_id,
                expected,
                actual,
            } => {
                write!(
                    f,
                    "Handoff {} is in state {} but expected {}",
                    handoff_id, actual, expected
                )
            }
        }
    }
}

impl std::error::Error for HandoffStateError {}

// =============================================================================
// TESTS
// =============================================================================
