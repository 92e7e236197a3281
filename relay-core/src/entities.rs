//! Ledger entities: item references, conflicts, work claims and the record sum type.

use crate::{
    new_record_id, AgentName, ClaimId, ClaimStatus, ConflictId, ConflictStatus, ConflictType,
    CoordinationError, DecidedBy, HandoffStatus, ItemType, ProjectId, RecordId, RecordKind,
    StoredHandoff, Timestamp,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

// ============================================================================
// ITEM REFERENCE
// ============================================================================

/// Reference to a work item owned by the surrounding system.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ItemRef {
    pub id: String,
    #[serde(rename = "type")]
    pub item_type: ItemType,
}

impl ItemRef {
    pub fn new(id: impl Into<String>, item_type: ItemType) -> Self {
        Self {
            id: id.into(),
            item_type,
        }
    }
}

impl fmt::Display for ItemRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.item_type, self.id)
    }
}

// ============================================================================
// CONFLICTS
// ============================================================================

/// One agent's stated position on an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Perspective {
    pub agent: AgentName,
    pub position: String,
    pub reasoning: String,
}

impl Perspective {
    pub fn new(
        agent: impl Into<AgentName>,
        position: impl Into<String>,
        reasoning: impl Into<String>,
    ) -> Self {
        Self {
            agent: agent.into(),
            position: position.into(),
            reasoning: reasoning.into(),
        }
    }
}

/// Outcome recorded when a conflict is settled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ConflictResolution {
    pub decision: String,
    pub decided_by: DecidedBy,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub decided_at: Timestamp,
}

/// A detected contradiction among agents about the same item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Conflict {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub conflict_id: ConflictId,
    pub project_id: ProjectId,
    pub item: ItemRef,
    pub agents: BTreeSet<AgentName>,
    pub conflict_type: ConflictType,
    pub perspectives: Vec<Perspective>,
    pub status: ConflictStatus,
    pub resolution: Option<ConflictResolution>,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
}

impl Conflict {
    /// Create a pending conflict. Participating agents are taken from the perspectives.
    pub fn new(
        project_id: impl Into<ProjectId>,
        item: ItemRef,
        conflict_type: ConflictType,
        perspectives: Vec<Perspective>,
        created_at: Timestamp,
    ) -> Self {
        let agents = perspectives.iter().map(|p| p.agent.clone()).collect();
        Self {
            conflict_id: new_record_id(),
            project_id: project_id.into(),
            item,
            agents,
            conflict_type,
            perspectives,
            status: ConflictStatus::Pending,
            resolution: None,
            created_at,
        }
    }

    /// Produce the resolved form of this conflict.
    ///
    /// Fails with `InvalidState` if a resolution was already recorded.
    pub fn resolve(
        &self,
        decision: impl Into<String>,
        decided_by: DecidedBy,
        decided_at: Timestamp,
    ) -> Result<Conflict, CoordinationError> {
        if self.status != ConflictStatus::Pending || self.resolution.is_some() {
            return Err(CoordinationError::InvalidState {
                kind: RecordKind::Conflict,
                id: self.conflict_id,
                expected: ConflictStatus::Pending.to_string(),
                actual: self.status.to_string(),
            });
        }
        let mut resolved = self.clone();
        resolved.status = ConflictStatus::Resolved;
        resolved.resolution = Some(ConflictResolution {
            decision: decision.into(),
            decided_by,
            decided_at,
        });
        Ok(resolved)
    }
}

// ============================================================================
// WORK CLAIMS
// ============================================================================

/// Marker that an agent is actively working an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct WorkClaim {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub claim_id: ClaimId,
    pub project_id: ProjectId,
    pub agent: AgentName,
    pub item: ItemRef,
    pub status: ClaimStatus,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub started_at: Timestamp,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date-time"))]
    pub finished_at: Option<Timestamp>,
}

impl WorkClaim {
    /// Open a new in-progress claim.
    pub fn start(
        project_id: impl Into<ProjectId>,
        agent: impl Into<AgentName>,
        item: ItemRef,
        started_at: Timestamp,
    ) -> Self {
        Self {
            claim_id: new_record_id(),
            project_id: project_id.into(),
            agent: agent.into(),
            item,
            status: ClaimStatus::InProgress,
            started_at,
            finished_at: None,
        }
    }

    /// Produce the closed form of this claim.
    pub fn finish(&self, finished_at: Timestamp) -> WorkClaim {
        let mut closed = self.clone();
        closed.status = ClaimStatus::Completed;
        closed.finished_at = Some(finished_at);
        closed
    }

    pub fn is_open(&self) -> bool {
        self.status == ClaimStatus::InProgress
    }
}

// ============================================================================
// LEDGER RECORD (tagged union)
// ============================================================================

/// Status of any ledger record, tagged by kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "status", rename_all = "snake_case")]
pub enum RecordStatus {
    Handoff(HandoffStatus),
    Conflict(ConflictStatus),
    WorkClaim(ClaimStatus),
}

impl RecordStatus {
    pub fn kind(&self) -> RecordKind {
        match self {
            RecordStatus::Handoff(_) => RecordKind::Handoff,
            RecordStatus::Conflict(_) => RecordKind::Conflict,
            RecordStatus::WorkClaim(_) => RecordKind::WorkClaim,
        }
    }

    /// Terminal records are the only ones retention may delete.
    pub fn is_terminal(&self) -> bool {
        match self {
            RecordStatus::Handoff(s) => s.is_terminal(),
            RecordStatus::Conflict(s) => s.is_terminal(),
            RecordStatus::WorkClaim(s) => s.is_terminal(),
        }
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordStatus::Handoff(s) => write!(f, "{}", s),
            RecordStatus::Conflict(s) => write!(f, "{}", s),
            RecordStatus::WorkClaim(s) => write!(f, "{}", s),
        }
    }
}

impl From<HandoffStatus> for RecordStatus {
    fn from(status: HandoffStatus) -> Self {
        RecordStatus::Handoff(status)
    }
}

impl From<ConflictStatus> for RecordStatus {
    fn from(status: ConflictStatus) -> Self {
        RecordStatus::Conflict(status)
    }
}

impl From<ClaimStatus> for RecordStatus {
    fn from(status: ClaimStatus) -> Self {
        RecordStatus::WorkClaim(status)
    }
}

/// One row of the coordination ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LedgerRecord {
    Handoff(StoredHandoff),
    Conflict(Conflict),
    WorkClaim(WorkClaim),
}

impl LedgerRecord {
    pub fn id(&self) -> RecordId {
        match self {
            LedgerRecord::Handoff(h) => h.data.handoff_id,
            LedgerRecord::Conflict(c) => c.conflict_id,
            LedgerRecord::WorkClaim(w) => w.claim_id,
        }
    }

    pub fn kind(&self) -> RecordKind {
        match self {
            LedgerRecord::Handoff(_) => RecordKind::Handoff,
            LedgerRecord::Conflict(_) => RecordKind::Conflict,
            LedgerRecord::WorkClaim(_) => RecordKind::WorkClaim,
        }
    }

    pub fn project_id(&self) -> &str {
        match self {
            LedgerRecord::Handoff(h) => &h.data.project_id,
            LedgerRecord::Conflict(c) => &c.project_id,
            LedgerRecord::WorkClaim(w) => &w.project_id,
        }
    }

    pub fn item(&self) -> &ItemRef {
        match self {
            LedgerRecord::Handoff(h) => &h.data.item,
            LedgerRecord::Conflict(c) => &c.item,
            LedgerRecord::WorkClaim(w) => &w.item,
        }
    }

    pub fn created_at(&self) -> Timestamp {
        match self {
            LedgerRecord::Handoff(h) => h.data.created_at,
            LedgerRecord::Conflict(c) => c.created_at,
            LedgerRecord::WorkClaim(w) => w.started_at,
        }
    }

    pub fn status(&self) -> RecordStatus {
        match self {
            LedgerRecord::Handoff(h) => RecordStatus::Handoff(h.status),
            LedgerRecord::Conflict(c) => RecordStatus::Conflict(c.status),
            LedgerRecord::WorkClaim(w) => RecordStatus::WorkClaim(w.status),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }

    pub fn as_handoff(&self) -> Option<&StoredHandoff> {
        match self {
            LedgerRecord::Handoff(h) => Some(h),
            _ => None,
        }
    }

    pub fn as_conflict(&self) -> Option<&Conflict> {
        match self {
            LedgerRecord::Conflict(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_work_claim(&self) -> Option<&WorkClaim> {
        match self {
            LedgerRecord::WorkClaim(w) => Some(w),
            _ => None,
        }
    }

    pub fn into_handoff(self) -> Option<StoredHandoff> {
        match self {
            LedgerRecord::Handoff(h) => Some(h),
            _ => None,
        }
    }

    pub fn into_conflict(self) -> Option<Conflict> {
        match self {
            LedgerRecord::Conflict(c) => Some(c),
            _ => None,
        }
    }

    pub fn into_work_claim(self) -> Option<WorkClaim> {
        match self {
            LedgerRecord::WorkClaim(w) => Some(w),
            _ => None,
        }
    }
}

impl From<StoredHandoff> for LedgerRecord {
    fn from(handoff: StoredHandoff) -> Self {
        LedgerRecord::Handoff(handoff)
    }
}

impl From<Conflict> for LedgerRecord {
    fn from(conflict: Conflict) -> Self {
        LedgerRecord::Conflict(conflict)
    }
}

impl From<WorkClaim> for LedgerRecord {
    fn from(claim: WorkClaim) -> Self {
        LedgerRecord::WorkClaim(claim)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn make_conflict() -> Conflict {
        Conflict::new(
            "p1",
            ItemRef::new("s1", ItemType::Story),
            ConflictType::Recommendation,
            vec![
                Perspective::new("security", "I reject this", "unsafe"),
                Perspective::new("developer", "I approve", "done"),
            ],
            Utc::now(),
        )
    }

    #[test]
    fn test_conflict_agents_collected_from_perspectives() {
        let conflict = make_conflict();
        let agents: Vec<_> = conflict.agents.iter().cloned().collect();
        assert_eq!(agents, vec!["developer".to_string(), "security".to_string()]);
        assert_eq!(conflict.perspectives[0].agent, "security");
    }

    #[test]
    fn test_conflict_resolves_only_once() {
        let conflict = make_conflict();
        let resolved = conflict
            .resolve("ship behind a flag", DecidedBy::User, Utc::now())
            .unwrap();
        assert_eq!(resolved.status, ConflictStatus::Resolved);
        assert_eq!(resolved.resolution.as_ref().unwrap().decided_by, DecidedBy::User);

        let err = resolved.resolve("again", DecidedBy::Auto, Utc::now()).unwrap_err();
        assert!(matches!(err, CoordinationError::InvalidState { .. }));
    }

    #[test]
    fn test_claim_finish() {
        let claim = WorkClaim::start("p1", "tester", ItemRef::new("t1", ItemType::Task), Utc::now());
        assert!(claim.is_open());
        let closed = claim.finish(Utc::now());
        assert!(!closed.is_open());
        assert!(closed.finished_at.is_some());
        assert_eq!(closed.claim_id, claim.claim_id);
    }

    #[test]
    fn test_ledger_record_json_is_tagged() {
        let claim = WorkClaim::start("p1", "tester", ItemRef::new("t1", ItemType::Task), Utc::now());
        let record = LedgerRecord::from(claim.clone());
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["kind"], "work_claim");
        assert_eq!(json["status"], "in_progress");
        assert_eq!(json["item"]["type"], "task");

        let back: LedgerRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back.into_work_claim(), Some(claim));
    }

    #[test]
    fn test_record_status_terminality() {
        assert!(!RecordStatus::from(HandoffStatus::Accepted).is_terminal());
        assert!(RecordStatus::from(HandoffStatus::Expired).is_terminal());
        assert!(RecordStatus::from(ConflictStatus::Resolved).is_terminal());
        assert!(!RecordStatus::from(ClaimStatus::InProgress).is_terminal());
    }

    #[cfg(feature = "openapi")]
    #[test]
    fn test_entity_schemas_describe_ids_and_timestamps_as_strings() {
        use utoipa::PartialSchema;

        let conflict = serde_json::to_value(Conflict::schema()).unwrap();
        assert_eq!(conflict["properties"]["conflict_id"]["format"], "uuid");
        assert_eq!(conflict["properties"]["created_at"]["format"], "date-time");

        let claim = serde_json::to_value(WorkClaim::schema()).unwrap();
        assert_eq!(claim["properties"]["claim_id"]["format"], "uuid");
        assert_eq!(claim["properties"]["started_at"]["format"], "date-time");
        assert_eq!(claim["properties"]["finished_at"]["format"], "date-time");

        let resolution = serde_json::to_value(ConflictResolution::schema()).unwrap();
        assert_eq!(resolution["properties"]["decided_at"]["format"], "date-time");
    }
}
