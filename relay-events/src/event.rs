//! Coordination event types
//!
//! Every state change in the coordination ledger publishes one of these
//! events for UI and automation layers.

use relay_core::{Conflict, HandoffId, ProjectId, StoredHandoff, WorkClaim};
use serde::{Deserialize, Serialize};

/// Events published by the coordination engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum CoordinationEvent {
    // ========================================================================
    // HANDOFF EVENTS
    // ========================================================================
    /// A handoff was created and is waiting for its receiver.
    HandoffCreated { handoff: StoredHandoff },

    /// The receiving agent accepted a handoff.
    HandoffAccepted { handoff: StoredHandoff },

    /// The receiving agent completed a handoff.
    HandoffCompleted { handoff: StoredHandoff },

    /// The receiving agent rejected a handoff.
    HandoffRejected { handoff: StoredHandoff },

    /// Pending handoffs of one item were expired in bulk.
    HandoffsExpired {
        project_id: ProjectId,
        item_id: String,
        handoff_ids: Vec<HandoffId>,
    },

    // ========================================================================
    // CONFLICT EVENTS
    // ========================================================================
    /// A conflict was recorded.
    ConflictDetected { conflict: Conflict },

    /// A conflict was resolved.
    ConflictResolved { conflict: Conflict },

    // ========================================================================
    // WORK CLAIM EVENTS
    // ========================================================================
    /// An agent started working an item.
    AgentStarted { claim: WorkClaim },

    /// An agent finished working an item.
    AgentFinished { claim: WorkClaim },

    // ========================================================================
    // RETENTION
    // ========================================================================
    /// Old terminal records were purged from a project.
    LedgerPurged {
        project_id: ProjectId,
        handoffs: usize,
        conflicts: usize,
        work_claims: usize,
    },
}

impl CoordinationEvent {
    /// Wire name of the event.
    pub fn event_name(&self) -> &'static str {
        match self {
            CoordinationEvent::HandoffCreated { .. } => "handoff-created",
            CoordinationEvent::HandoffAccepted { .. } => "handoff-accepted",
            CoordinationEvent::HandoffCompleted { .. } => "handoff-completed",
            CoordinationEvent::HandoffRejected { .. } => "handoff-rejected",
            CoordinationEvent::HandoffsExpired { .. } => "handoffs-expired",
            CoordinationEvent::ConflictDetected { .. } => "conflict-detected",
            CoordinationEvent::ConflictResolved { .. } => "conflict-resolved",
            CoordinationEvent::AgentStarted { .. } => "agent-started",
            CoordinationEvent::AgentFinished { .. } => "agent-finished",
            CoordinationEvent::LedgerPurged { .. } => "ledger-purged",
        }
    }

    /// Project the event belongs to.
    pub fn project_id(&self) -> &str {
        match self {
            CoordinationEvent::HandoffCreated { handoff }
            | CoordinationEvent::HandoffAccepted { handoff }
            | CoordinationEvent::HandoffCompleted { handoff }
            | CoordinationEvent::HandoffRejected { handoff } => &handoff.data.project_id,
            CoordinationEvent::HandoffsExpired { project_id, .. }
            | CoordinationEvent::LedgerPurged { project_id, .. } => project_id,
            CoordinationEvent::ConflictDetected { conflict }
            | CoordinationEvent::ConflictResolved { conflict } => &conflict.project_id,
            CoordinationEvent::AgentStarted { claim }
            | CoordinationEvent::AgentFinished { claim } => &claim.project_id,
        }
    }

    /// Item the event refers to, if it concerns a single item.
    pub fn item_id(&self) -> Option<&str> {
        match self {
            CoordinationEvent::HandoffCreated { handoff }
            | CoordinationEvent::HandoffAccepted { handoff }
            | CoordinationEvent::HandoffCompleted { handoff }
            | CoordinationEvent::HandoffRejected { handoff } => Some(&handoff.data.item.id),
            CoordinationEvent::HandoffsExpired { item_id, .. } => Some(item_id),
            CoordinationEvent::ConflictDetected { conflict }
            | CoordinationEvent::ConflictResolved { conflict } => Some(&conflict.item.id),
            CoordinationEvent::AgentStarted { claim }
            | CoordinationEvent::AgentFinished { claim } => Some(&claim.item.id),
            CoordinationEvent::LedgerPurged { .. } => None,
        }
    }
}
