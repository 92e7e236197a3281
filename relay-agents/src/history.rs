//! Item history, project statistics and retention cleanup

use chrono::{Duration, Utc};
use relay_core::{
    AgentName, ClaimStatus, ConflictStatus, HandoffStatus, LedgerRecord, RecordKind, RelayResult,
};
use relay_events::{CoordinationEvent, EventBus};
use relay_storage::{LedgerFilter, LedgerStore, LedgerStoreExt};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info};

/// Per-project coordination metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ProjectStatistics {
    pub project_id: String,
    /// Handoff count per status; every status is present
    pub handoffs_by_status: BTreeMap<String, usize>,
    /// Conflict count per status; every status is present
    pub conflicts_by_status: BTreeMap<String, usize>,
    /// Agents with at least one open work claim, sorted
    pub active_agents: Vec<AgentName>,
    /// Mean creation-to-completion time of completed handoffs; 0 when none
    pub average_completion_ms: f64,
}

impl ProjectStatistics {
    pub fn handoff_count(&self, status: HandoffStatus) -> usize {
        self.handoffs_by_status
            .get(status.as_db_str())
            .copied()
            .unwrap_or(0)
    }

    pub fn conflict_count(&self, status: ConflictStatus) -> usize {
        self.conflicts_by_status
            .get(status.as_db_str())
            .copied()
            .unwrap_or(0)
    }

    pub fn total_handoffs(&self) -> usize {
        self.handoffs_by_status.values().sum()
    }
}

/// Records removed by one retention cleanup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct RetentionReport {
    pub handoffs: usize,
    pub conflicts: usize,
    pub work_claims: usize,
}

impl RetentionReport {
    pub fn total(&self) -> usize {
        self.handoffs + self.conflicts + self.work_claims
    }
}

/// Read-only views over the ledger, plus retention cleanup.
pub struct HistoryAggregator {
    store: Arc<dyn LedgerStore>,
    events: Arc<dyn EventBus>,
}

impl HistoryAggregator {
    pub fn new(store: Arc<dyn LedgerStore>, events: Arc<dyn EventBus>) -> Self {
        Self { store, events }
    }

    /// Every handoff, conflict and work claim of an item, in creation order.
    pub fn item_history(&self, item_id: &str) -> RelayResult<Vec<LedgerRecord>> {
        self.store.query(&LedgerFilter::new().item(item_id))
    }

    pub fn project_statistics(&self, project_id: &str) -> RelayResult<ProjectStatistics> {
        let handoffs = self.store.handoffs(LedgerFilter::new().project(project_id))?;
        let conflicts = self.store.conflicts(LedgerFilter::new().project(project_id))?;
        let open_claims = self.store.work_claims(
            LedgerFilter::new()
                .project(project_id)
                .status(ClaimStatus::InProgress),
        )?;

        let mut handoffs_by_status: BTreeMap<String, usize> = HandoffStatus::ALL
            .iter()
            .map(|s| (s.as_db_str().to_string(), 0))
            .collect();
        for handoff in &handoffs {
            *handoffs_by_status
                .entry(handoff.status.as_db_str().to_string())
                .or_default() += 1;
        }

        let mut conflicts_by_status: BTreeMap<String, usize> =
            [ConflictStatus::Pending, ConflictStatus::Resolved]
                .iter()
                .map(|s| (s.as_db_str().to_string(), 0))
                .collect();
        for conflict in &conflicts {
            *conflicts_by_status
                .entry(conflict.status.as_db_str().to_string())
                .or_default() += 1;
        }

        let durations: Vec<i64> = handoffs
            .iter()
            .filter(|h| h.status == HandoffStatus::Completed)
            .filter_map(|h| h.data.duration_ms())
            .collect();
        let average_completion_ms = if durations.is_empty() {
            0.0
        } else {
            durations.iter().sum::<i64>() as f64 / durations.len() as f64
        };

        let active_agents: BTreeSet<AgentName> =
            open_claims.into_iter().map(|claim| claim.agent).collect();

        Ok(ProjectStatistics {
            project_id: project_id.to_string(),
            handoffs_by_status,
            conflicts_by_status,
            active_agents: active_agents.into_iter().collect(),
            average_completion_ms,
        })
    }

    /// Delete terminal records of a project created more than
    /// `days_to_keep` days ago. Open records are never removed.
    ///
    /// A cutoff earlier than the representable date range purges nothing.
    pub fn clear_old_data(&self, project_id: &str, days_to_keep: u32) -> RelayResult<RetentionReport> {
        let Some(cutoff) = Duration::try_days(i64::from(days_to_keep))
            .and_then(|keep| Utc::now().checked_sub_signed(keep))
        else {
            debug!(project_id, days_to_keep, "Retention window predates every record");
            return Ok(RetentionReport::default());
        };
        let doomed = |kind| {
            LedgerFilter::new()
                .project(project_id)
                .kind(kind)
                .terminal_only()
                .created_before(cutoff)
        };

        let report = RetentionReport {
            handoffs: self.store.delete_where(&doomed(RecordKind::Handoff))?,
            conflicts: self.store.delete_where(&doomed(RecordKind::Conflict))?,
            work_claims: self.store.delete_where(&doomed(RecordKind::WorkClaim))?,
        };

        if report.total() == 0 {
            debug!(project_id, days_to_keep, "Nothing to purge");
            return Ok(report);
        }

        info!(
            project_id,
            days_to_keep,
            handoffs = report.handoffs,
            conflicts = report.conflicts,
            work_claims = report.work_claims,
            "Purged old coordination records"
        );
        self.events.publish(CoordinationEvent::LedgerPurged {
            project_id: project_id.to_string(),
            handoffs: report.handoffs,
            conflicts: report.conflicts,
            work_claims: report.work_claims,
        });
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::{
        new_record_id, Conflict, ConflictType, DecidedBy, HandoffData, HandoffKind, ItemRef,
        ItemType, Perspective, StoredHandoff, WorkClaim,
    };
    use relay_events::MemoryEventBus;
    use relay_storage::InMemoryLedger;
    use serde_json::json;

    fn handoff(project: &str, item: &str, status: HandoffStatus, age: Duration, took: Option<Duration>) -> StoredHandoff {
        let created_at = Utc::now() - age;
        StoredHandoff {
            data: HandoffData {
                handoff_id: new_record_id(),
                project_id: project.to_string(),
                item: ItemRef::new(item, ItemType::Story),
                from_agent: "developer".to_string(),
                to_agent: "tester".to_string(),
                kind: HandoffKind::Auto,
                message: None,
                context: json!({}),
                created_at,
                accepted_at: None,
                completed_at: took.map(|d| created_at + d),
            },
            status,
        }
    }

    fn setup() -> (HistoryAggregator, InMemoryLedger, MemoryEventBus) {
        let ledger = InMemoryLedger::new();
        let events = MemoryEventBus::new();
        let history = HistoryAggregator::new(Arc::new(ledger.clone()), Arc::new(events.clone()));
        (history, ledger, events)
    }

    #[test]
    fn test_item_history_in_creation_order() {
        let (history, ledger, _) = setup();
        let h = handoff("p1", "s1", HandoffStatus::Pending, Duration::minutes(10), None);
        let claim = WorkClaim::start("p1", "tester", ItemRef::new("s1", ItemType::Story), Utc::now() - Duration::minutes(5));
        let conflict = Conflict::new(
            "p1",
            ItemRef::new("s1", ItemType::Story),
            ConflictType::Action,
            vec![Perspective::new("developer", "add", "")],
            Utc::now(),
        );
        ledger.insert(&conflict.clone().into()).unwrap();
        ledger.insert(&claim.clone().into()).unwrap();
        ledger.insert(&h.clone().into()).unwrap();
        ledger
            .insert(&handoff("p1", "s2", HandoffStatus::Pending, Duration::zero(), None).into())
            .unwrap();

        let kinds: Vec<_> = history
            .item_history("s1")
            .unwrap()
            .iter()
            .map(LedgerRecord::kind)
            .collect();
        assert_eq!(
            kinds,
            vec![RecordKind::Handoff, RecordKind::WorkClaim, RecordKind::Conflict]
        );
    }

    #[test]
    fn test_statistics_counts_and_mean() {
        let (history, ledger, _) = setup();
        for (status, took) in [
            (HandoffStatus::Completed, Some(Duration::milliseconds(1_000))),
            (HandoffStatus::Completed, Some(Duration::milliseconds(3_000))),
            (HandoffStatus::Rejected, Some(Duration::milliseconds(50))),
            (HandoffStatus::Pending, None),
        ] {
            ledger
                .insert(&handoff("p1", "s1", status, Duration::hours(1), took).into())
                .unwrap();
        }
        ledger
            .insert(&handoff("p2", "x", HandoffStatus::Completed, Duration::hours(1), Some(Duration::seconds(60))).into())
            .unwrap();

        let conflict = Conflict::new("p1", ItemRef::new("s1", ItemType::Story), ConflictType::Priority, vec![], Utc::now());
        let resolved = conflict.resolve("ship", DecidedBy::User, Utc::now()).unwrap();
        ledger.insert(&resolved.into()).unwrap();

        let open = WorkClaim::start("p1", "tester", ItemRef::new("s1", ItemType::Story), Utc::now());
        let closed = WorkClaim::start("p1", "devops", ItemRef::new("s1", ItemType::Story), Utc::now()).finish(Utc::now());
        ledger.insert(&open.into()).unwrap();
        ledger.insert(&closed.into()).unwrap();

        let stats = history.project_statistics("p1").unwrap();
        assert_eq!(stats.handoff_count(HandoffStatus::Completed), 2);
        assert_eq!(stats.handoff_count(HandoffStatus::Rejected), 1);
        assert_eq!(stats.handoff_count(HandoffStatus::Pending), 1);
        assert_eq!(stats.handoff_count(HandoffStatus::Expired), 0);
        assert_eq!(stats.total_handoffs(), 4);
        assert_eq!(stats.conflict_count(ConflictStatus::Resolved), 1);
        assert_eq!(stats.conflict_count(ConflictStatus::Pending), 0);
        assert_eq!(stats.active_agents, vec!["tester".to_string()]);
        assert_eq!(stats.average_completion_ms, 2_000.0);
    }

    #[test]
    fn test_statistics_of_empty_project() {
        let (history, _, _) = setup();
        let stats = history.project_statistics("nobody").unwrap();
        assert_eq!(stats.total_handoffs(), 0);
        assert_eq!(stats.average_completion_ms, 0.0);
        assert!(stats.active_agents.is_empty());
    }

    #[test]
    fn test_clear_old_data_keeps_open_and_recent() {
        let (history, ledger, events) = setup();
        let old = Duration::days(45);
        let ancient_done = handoff("p1", "s1", HandoffStatus::Completed, old, Some(Duration::seconds(1)));
        let ancient_expired = handoff("p1", "s1", HandoffStatus::Expired, old, Some(Duration::seconds(1)));
        let ancient_pending = handoff("p1", "s1", HandoffStatus::Pending, old, None);
        let ancient_accepted = handoff("p1", "s1", HandoffStatus::Accepted, old, None);
        let recent_done = handoff("p1", "s1", HandoffStatus::Completed, Duration::days(2), Some(Duration::seconds(1)));
        let other_project = handoff("p2", "s1", HandoffStatus::Completed, old, Some(Duration::seconds(1)));
        for h in [
            &ancient_done,
            &ancient_expired,
            &ancient_pending,
            &ancient_accepted,
            &recent_done,
            &other_project,
        ] {
            ledger.insert(&h.clone().into()).unwrap();
        }
        let item = ItemRef::new("s1", ItemType::Story);
        let old_claim = WorkClaim::start("p1", "tester", item.clone(), Utc::now() - old);
        ledger.insert(&old_claim.finish(Utc::now()).into()).unwrap();
        ledger
            .insert(&WorkClaim::start("p1", "developer", item, Utc::now() - old).into())
            .unwrap();

        let report = history.clear_old_data("p1", 30).unwrap();
        assert_eq!(
            report,
            RetentionReport {
                handoffs: 2,
                conflicts: 0,
                work_claims: 1
            }
        );
        assert_eq!(report.total(), 3);
        assert_eq!(ledger.len().unwrap(), 5);
        assert_eq!(events.names(), vec!["ledger-purged"]);

        let again = history.clear_old_data("p1", 30).unwrap();
        assert_eq!(again.total(), 0);
        assert_eq!(events.names().len(), 1);
    }

    #[test]
    fn test_clear_old_data_purges_only_old_resolved_conflicts() {
        let (history, ledger, _) = setup();
        let item = ItemRef::new("s1", ItemType::Story);
        let conflict_at = |age: Duration| {
            Conflict::new(
                "p1",
                item.clone(),
                ConflictType::Recommendation,
                vec![Perspective::new("security", "reject", "")],
                Utc::now() - age,
            )
        };

        let old_resolved = conflict_at(Duration::days(45))
            .resolve("ship it", DecidedBy::User, Utc::now())
            .unwrap();
        let old_pending = conflict_at(Duration::days(45));
        let recent_resolved = conflict_at(Duration::days(2))
            .resolve("hold", DecidedBy::Auto, Utc::now())
            .unwrap();
        for conflict in [&old_resolved, &old_pending, &recent_resolved] {
            ledger.insert(&conflict.clone().into()).unwrap();
        }

        let report = history.clear_old_data("p1", 30).unwrap();
        assert_eq!(
            report,
            RetentionReport {
                handoffs: 0,
                conflicts: 1,
                work_claims: 0
            }
        );
        assert!(ledger.get(old_resolved.conflict_id).unwrap().is_none());
        assert!(ledger.get(old_pending.conflict_id).unwrap().is_some());
        assert!(ledger.get(recent_resolved.conflict_id).unwrap().is_some());
    }

    #[test]
    fn test_clear_old_data_with_unrepresentable_window_purges_nothing() {
        let (history, ledger, events) = setup();
        ledger
            .insert(&handoff("p1", "s1", HandoffStatus::Completed, Duration::days(400), Some(Duration::seconds(1))).into())
            .unwrap();

        let report = history.clear_old_data("p1", u32::MAX).unwrap();
        assert_eq!(report, RetentionReport::default());
        assert_eq!(ledger.len().unwrap(), 1);
        assert!(events.names().is_empty());
    }
}
