//! Parallel work tracking
//!
//! Work claims record which agent is working which item. The current owner
//! of an item is the agent of its most recent open claim.

use crate::lost_swap;
use chrono::Utc;
use relay_core::{
    AgentName, ClaimStatus, CoordinationError, ItemRef, RelayResult, WorkClaim,
    DEFAULT_COMPATIBLE_PAIRS,
};
use relay_events::{CoordinationEvent, EventBus};
use relay_storage::{LedgerFilter, LedgerStore, LedgerStoreExt};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Key of an agent pair as matched against the compatibility set:
/// the two names sorted and joined with `-`.
pub fn pair_key(a: &str, b: &str) -> String {
    let mut pair = [a, b];
    pair.sort_unstable();
    pair.join("-")
}

/// Tracks work claims and answers ownership questions.
pub struct ParallelWorkTracker {
    store: Arc<dyn LedgerStore>,
    events: Arc<dyn EventBus>,
    compatible_pairs: HashSet<String>,
}

impl ParallelWorkTracker {
    /// Tracker using the default compatibility set.
    pub fn new(store: Arc<dyn LedgerStore>, events: Arc<dyn EventBus>) -> Self {
        Self::with_compatible_pairs(
            store,
            events,
            DEFAULT_COMPATIBLE_PAIRS.iter().map(|p| p.to_string()),
        )
    }

    pub fn with_compatible_pairs<I, S>(store: Arc<dyn LedgerStore>, events: Arc<dyn EventBus>, pairs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            store,
            events,
            compatible_pairs: pairs.into_iter().map(Into::into).collect(),
        }
    }

    /// Open a claim for `agent` on `item`.
    ///
    /// Fails with `DuplicateClaim` if the agent already has an open claim on
    /// the item.
    pub fn track_agent_start(&self, project_id: &str, agent: &str, item: ItemRef) -> RelayResult<WorkClaim> {
        if self.open_claim(agent, &item.id)?.is_some() {
            return Err(CoordinationError::DuplicateClaim {
                agent: agent.to_string(),
                item_id: item.id,
            }
            .into());
        }

        let claim = WorkClaim::start(project_id, agent, item, Utc::now());
        self.store.insert(&claim.clone().into())?;

        info!(
            claim_id = %claim.claim_id,
            project_id,
            agent,
            item = %claim.item,
            "Agent started work"
        );
        self.events.publish(CoordinationEvent::AgentStarted {
            claim: claim.clone(),
        });
        Ok(claim)
    }

    /// Close the agent's most recent open claim on the item.
    ///
    /// Returns `None` when there is nothing to close.
    pub fn track_agent_finish(&self, agent: &str, item_id: &str) -> RelayResult<Option<WorkClaim>> {
        let Some(open) = self.open_claim(agent, item_id)? else {
            debug!(agent, item_id, "No open work claim to finish");
            return Ok(None);
        };

        let closed = open.finish(Utc::now());
        self.store
            .compare_and_swap(ClaimStatus::InProgress.into(), &closed.clone().into())
            .map_err(lost_swap)?;

        info!(claim_id = %closed.claim_id, agent, item_id, "Agent finished work");
        self.events.publish(CoordinationEvent::AgentFinished {
            claim: closed.clone(),
        });
        Ok(Some(closed))
    }

    /// Agent of the most recent open claim on the item.
    pub fn current_owner(&self, item_id: &str) -> RelayResult<Option<AgentName>> {
        Ok(self
            .open_claims(item_id)?
            .into_iter()
            .last()
            .map(|claim| claim.agent))
    }

    pub fn is_item_being_worked_on(&self, item_id: &str) -> RelayResult<bool> {
        Ok(self.current_owner(item_id)?.is_some())
    }

    /// Whether `candidate` may work the item alongside its current owner.
    ///
    /// True when the item is free. False when the candidate already owns it.
    /// Otherwise the sorted pair key must be in the compatibility set.
    pub fn is_parallel_execution_safe(&self, candidate: &str, item_id: &str) -> RelayResult<bool> {
        let Some(owner) = self.current_owner(item_id)? else {
            return Ok(true);
        };
        if owner == candidate {
            return Ok(false);
        }
        Ok(self.compatible_pairs.contains(&pair_key(&owner, candidate)))
    }

    /// Open claims on an item, oldest first.
    pub fn open_claims(&self, item_id: &str) -> RelayResult<Vec<WorkClaim>> {
        self.store.work_claims(
            LedgerFilter::new()
                .item(item_id)
                .status(ClaimStatus::InProgress),
        )
    }

    fn open_claim(&self, agent: &str, item_id: &str) -> RelayResult<Option<WorkClaim>> {
        Ok(self
            .store
            .work_claims(
                LedgerFilter::new()
                    .item(item_id)
                    .agent(agent)
                    .status(ClaimStatus::InProgress),
            )?
            .into_iter()
            .last())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::{roles, ItemType, RelayError};
    use relay_events::MemoryEventBus;
    use relay_storage::InMemoryLedger;

    fn tracker() -> (ParallelWorkTracker, MemoryEventBus) {
        let events = MemoryEventBus::new();
        let tracker = ParallelWorkTracker::new(Arc::new(InMemoryLedger::new()), Arc::new(events.clone()));
        (tracker, events)
    }

    fn story() -> ItemRef {
        ItemRef::new("s1", ItemType::Story)
    }

    #[test]
    fn test_pair_key_sorts() {
        assert_eq!(pair_key("tester", "developer"), "developer-tester");
        assert_eq!(pair_key("developer", "tester"), "developer-tester");
    }

    #[test]
    fn test_start_finish_cycle() {
        let (tracker, events) = tracker();
        assert!(!tracker.is_item_being_worked_on("s1").unwrap());

        tracker.track_agent_start("p1", "developer", story()).unwrap();
        assert_eq!(tracker.current_owner("s1").unwrap().as_deref(), Some("developer"));

        let closed = tracker.track_agent_finish("developer", "s1").unwrap().unwrap();
        assert_eq!(closed.status, ClaimStatus::Completed);
        assert!(closed.finished_at.is_some());
        assert!(!tracker.is_item_being_worked_on("s1").unwrap());
        assert_eq!(events.names(), vec!["agent-started", "agent-finished"]);

        assert!(tracker.track_agent_finish("developer", "s1").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_start_fails() {
        let (tracker, _) = tracker();
        tracker.track_agent_start("p1", "tester", story()).unwrap();
        let err = tracker.track_agent_start("p1", "tester", story()).unwrap_err();
        assert!(matches!(
            err,
            RelayError::Coordination(CoordinationError::DuplicateClaim { .. })
        ));

        tracker.track_agent_finish("tester", "s1").unwrap();
        tracker.track_agent_start("p1", "tester", story()).unwrap();
    }

    #[test]
    fn test_owner_is_most_recent_open_claim() {
        let (tracker, _) = tracker();
        tracker.track_agent_start("p1", "developer", story()).unwrap();
        tracker.track_agent_start("p1", "documentation", story()).unwrap();
        assert_eq!(tracker.current_owner("s1").unwrap().as_deref(), Some("documentation"));

        tracker.track_agent_finish("documentation", "s1").unwrap();
        assert_eq!(tracker.current_owner("s1").unwrap().as_deref(), Some("developer"));
    }

    #[test]
    fn test_free_item_is_safe_and_owner_is_not() {
        let (tracker, _) = tracker();
        assert!(tracker.is_parallel_execution_safe("tester", "s1").unwrap());
        tracker.track_agent_start("p1", "tester", story()).unwrap();
        assert!(!tracker.is_parallel_execution_safe("tester", "s1").unwrap());
    }

    /// Every declared default pair sorts to `developer-…`, which is never in
    /// the set, so no two distinct agents are ever safe together.
    #[test]
    fn test_parallel_safety_truth_table() {
        for owner in roles::ALL {
            for candidate in roles::ALL {
                let (tracker, _) = tracker();
                tracker.track_agent_start("p1", owner, story()).unwrap();
                assert!(
                    !tracker.is_parallel_execution_safe(candidate, "s1").unwrap(),
                    "{} with {}",
                    owner,
                    candidate
                );
            }
        }
    }

    #[test]
    fn test_custom_pairs_use_sorted_key() {
        let tracker = ParallelWorkTracker::with_compatible_pairs(
            Arc::new(InMemoryLedger::new()),
            Arc::new(MemoryEventBus::new()),
            ["developer-tester"],
        );
        tracker.track_agent_start("p1", "tester", story()).unwrap();
        assert!(tracker.is_parallel_execution_safe("developer", "s1").unwrap());
        assert!(!tracker.is_parallel_execution_safe("security", "s1").unwrap());
    }
}
