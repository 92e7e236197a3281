//! Range-query filter over ledger records

use relay_core::{LedgerRecord, RecordKind, RecordStatus, Timestamp};

/// Conjunctive filter for ledger queries. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LedgerFilter {
    pub project_id: Option<String>,
    pub item_id: Option<String>,
    pub kind: Option<RecordKind>,
    /// Record must have one of these statuses
    pub statuses: Vec<RecordStatus>,
    /// Receiving agent of a handoff, claiming agent of a claim, or a conflict participant
    pub agent: Option<String>,
    /// Strictly older than this timestamp
    pub created_before: Option<Timestamp>,
    pub terminal_only: bool,
}

impl LedgerFilter {
    /// Filter matching every record.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn item(mut self, item_id: impl Into<String>) -> Self {
        self.item_id = Some(item_id.into());
        self
    }

    pub fn kind(mut self, kind: RecordKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn status(mut self, status: impl Into<RecordStatus>) -> Self {
        self.statuses.push(status.into());
        self
    }

    pub fn agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = Some(agent.into());
        self
    }

    pub fn created_before(mut self, cutoff: Timestamp) -> Self {
        self.created_before = Some(cutoff);
        self
    }

    pub fn terminal_only(mut self) -> Self {
        self.terminal_only = true;
        self
    }

    /// Evaluate the filter against one record.
    pub fn matches(&self, record: &LedgerRecord) -> bool {
        if let Some(project_id) = &self.project_id {
            if record.project_id() != project_id {
                return false;
            }
        }
        if let Some(item_id) = &self.item_id {
            if &record.item().id != item_id {
                return false;
            }
        }
        if let Some(kind) = self.kind {
            if record.kind() != kind {
                return false;
            }
        }
        if !self.statuses.is_empty() && !self.statuses.contains(&record.status()) {
            return false;
        }
        if let Some(agent) = &self.agent {
            let involved = match record {
                LedgerRecord::Handoff(h) => &h.data.to_agent == agent,
                LedgerRecord::Conflict(c) => c.agents.contains(agent),
                LedgerRecord::WorkClaim(w) => &w.agent == agent,
            };
            if !involved {
                return false;
            }
        }
        if let Some(cutoff) = self.created_before {
            if record.created_at() >= cutoff {
                return false;
            }
        }
        if self.terminal_only && !record.is_terminal() {
            return false;
        }
        true
    }
}

/// Sort records into creation order, ties broken by id.
pub fn sort_by_creation(records: &mut [LedgerRecord]) {
    records.sort_by(|a, b| {
        a.created_at()
            .cmp(&b.created_at())
            .then_with(|| a.id().cmp(&b.id()))
    });
}
