//! Conflict detection over agent perspectives
//!
//! Detection is a keyword heuristic: categories are checked in order, and the
//! first one where some perspective uses a positive term while a different
//! perspective uses an opposing term decides the conflict type.

use crate::lost_swap;
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use relay_core::{
    Conflict, ConflictId, ConflictStatus, ConflictType, CoordinationError, DecidedBy, ItemRef,
    Perspective, ProjectId, RecordKind, RelayResult,
};
use relay_events::{CoordinationEvent, EventBus};
use relay_storage::{LedgerFilter, LedgerStore, LedgerStoreExt};
use std::sync::Arc;
use tracing::{debug, info};

struct KeywordCategory {
    conflict_type: ConflictType,
    positive: Regex,
    negative: Regex,
}

impl KeywordCategory {
    fn new(conflict_type: ConflictType, positive: &str, negative: &str) -> Option<Self> {
        Some(Self {
            conflict_type,
            positive: Regex::new(positive).ok()?,
            negative: Regex::new(negative).ok()?,
        })
    }
}

// Order matters: the first matching category wins.
static CATEGORIES: Lazy<Vec<KeywordCategory>> = Lazy::new(|| {
    [
        KeywordCategory::new(
            ConflictType::Recommendation,
            r"(?i)\b(approve|accept|proceed|safe|secure)",
            r"(?i)\b(reject|deny|unsafe|vulnerable|risk)",
        ),
        KeywordCategory::new(
            ConflictType::Action,
            r"(?i)\b(implement|add|create)",
            r"(?i)\b(remove|delete|skip|don['’]t)",
        ),
        KeywordCategory::new(
            ConflictType::Priority,
            r"(?i)\b(high[- ]priority|urgent|critical)",
            r"(?i)\b(low[- ]priority|optional|defer)",
        ),
    ]
    .into_iter()
    .flatten()
    .collect()
});

fn text_of(perspective: &Perspective) -> String {
    format!("{} {}", perspective.position, perspective.reasoning)
}

/// Classify contradicting perspectives, or `None` when they agree.
pub fn classify_perspectives(perspectives: &[Perspective]) -> Option<ConflictType> {
    let texts: Vec<String> = perspectives.iter().map(text_of).collect();
    CATEGORIES.iter().find_map(|category| {
        let positive = texts
            .iter()
            .enumerate()
            .filter(|(_, t)| category.positive.is_match(t))
            .map(|(i, _)| i);
        for i in positive {
            let opposed = texts
                .iter()
                .enumerate()
                .any(|(j, t)| j != i && category.negative.is_match(t));
            if opposed {
                return Some(category.conflict_type);
            }
        }
        None
    })
}

/// Detects, records and resolves conflicts between agents.
pub struct ConflictDetector {
    store: Arc<dyn LedgerStore>,
    events: Arc<dyn EventBus>,
}

impl ConflictDetector {
    pub fn new(store: Arc<dyn LedgerStore>, events: Arc<dyn EventBus>) -> Self {
        Self { store, events }
    }

    /// Record a conflict if the perspectives contradict each other.
    pub fn detect_conflict(
        &self,
        project_id: &str,
        item: ItemRef,
        perspectives: Vec<Perspective>,
    ) -> RelayResult<Option<Conflict>> {
        match classify_perspectives(&perspectives) {
            Some(conflict_type) => self
                .record_conflict(project_id, item, conflict_type, perspectives)
                .map(Some),
            None => {
                debug!(project_id, %item, "No conflict among perspectives");
                Ok(None)
            }
        }
    }

    /// Persist a pending conflict with every perspective.
    pub fn record_conflict(
        &self,
        project_id: impl Into<ProjectId>,
        item: ItemRef,
        conflict_type: ConflictType,
        perspectives: Vec<Perspective>,
    ) -> RelayResult<Conflict> {
        let conflict = Conflict::new(project_id, item, conflict_type, perspectives, Utc::now());
        self.store.insert(&conflict.clone().into())?;

        info!(
            conflict_id = %conflict.conflict_id,
            project_id = %conflict.project_id,
            item = %conflict.item,
            conflict_type = %conflict.conflict_type,
            agents = ?conflict.agents,
            "Conflict recorded"
        );
        self.events.publish(CoordinationEvent::ConflictDetected {
            conflict: conflict.clone(),
        });
        Ok(conflict)
    }

    /// Resolve a pending conflict. A conflict is resolved at most once.
    pub fn resolve_conflict(
        &self,
        conflict_id: ConflictId,
        decision: impl Into<String>,
        decided_by: DecidedBy,
    ) -> RelayResult<Conflict> {
        let current = self.get_conflict(conflict_id)?;
        let resolved = current.resolve(decision, decided_by, Utc::now())?;
        self.store
            .compare_and_swap(ConflictStatus::Pending.into(), &resolved.clone().into())
            .map_err(lost_swap)?;

        info!(%conflict_id, %decided_by, "Conflict resolved");
        self.events.publish(CoordinationEvent::ConflictResolved {
            conflict: resolved.clone(),
        });
        Ok(resolved)
    }

    /// Get a conflict by id; `NotFound` when absent.
    pub fn get_conflict(&self, conflict_id: ConflictId) -> RelayResult<Conflict> {
        self.store.get_conflict(conflict_id)?.ok_or_else(|| {
            CoordinationError::NotFound {
                kind: RecordKind::Conflict,
                id: conflict_id,
            }
            .into()
        })
    }

    /// Unresolved conflicts of a project, oldest first.
    pub fn pending_conflicts(&self, project_id: &str) -> RelayResult<Vec<Conflict>> {
        self.store.conflicts(
            LedgerFilter::new()
                .project(project_id)
                .status(ConflictStatus::Pending),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::{ItemType, RelayError};
    use relay_events::MemoryEventBus;
    use relay_storage::InMemoryLedger;

    fn p(agent: &str, position: &str) -> Perspective {
        Perspective::new(agent, position, "")
    }

    fn detector() -> (ConflictDetector, MemoryEventBus) {
        let events = MemoryEventBus::new();
        let detector = ConflictDetector::new(Arc::new(InMemoryLedger::new()), Arc::new(events.clone()));
        (detector, events)
    }

    #[test]
    fn test_approve_vs_reject_is_a_conflict() {
        let (detector, events) = detector();
        let conflict = detector
            .detect_conflict(
                "p1",
                ItemRef::new("s1", ItemType::Story),
                vec![
                    p("developer", "I approve this implementation"),
                    p("security", "I reject this - unsafe code"),
                ],
            )
            .unwrap()
            .unwrap();
        assert_eq!(conflict.conflict_type, ConflictType::Recommendation);
        assert_eq!(conflict.status, ConflictStatus::Pending);
        assert_eq!(conflict.perspectives.len(), 2);
        assert!(conflict.agents.contains("security"));
        assert_eq!(events.names(), vec!["conflict-detected"]);
    }

    #[test]
    fn test_agreeing_perspectives_are_not_a_conflict() {
        let (detector, events) = detector();
        let found = detector
            .detect_conflict(
                "p1",
                ItemRef::new("s1", ItemType::Story),
                vec![
                    p("developer", "Implementation looks good"),
                    p("tester", "Tests are ready"),
                ],
            )
            .unwrap();
        assert!(found.is_none());
        assert!(events.events().is_empty());
    }

    #[test]
    fn test_category_classification() {
        assert_eq!(
            classify_perspectives(&[p("developer", "We should add caching"), p("devops", "Skip it for now")]),
            Some(ConflictType::Action)
        );
        assert_eq!(
            classify_perspectives(&[
                p("product-owner", "This is urgent"),
                p("developer", "Looks optional to me")
            ]),
            Some(ConflictType::Priority)
        );
        assert_eq!(
            classify_perspectives(&[p("developer", "Don't merge yet"), p("tester", "create a fixture")]),
            Some(ConflictType::Action)
        );
    }

    #[test]
    fn test_one_agent_cannot_conflict_with_itself() {
        assert_eq!(
            classify_perspectives(&[p("security", "Approve, but there is some risk")]),
            None
        );
        assert_eq!(classify_perspectives(&[]), None);
    }

    #[test]
    fn test_unsafe_is_not_safe() {
        assert_eq!(
            classify_perspectives(&[p("developer", "unsafe"), p("tester", "unsafe")]),
            None
        );
    }

    #[test]
    fn test_reasoning_is_scanned() {
        let perspectives = vec![
            Perspective::new("developer", "Ship it", "It is secure enough"),
            Perspective::new("security", "Hold", "The endpoint is vulnerable"),
        ];
        assert_eq!(
            classify_perspectives(&perspectives),
            Some(ConflictType::Recommendation)
        );
    }

    #[test]
    fn test_resolve_once() {
        let (detector, events) = detector();
        let conflict = detector
            .record_conflict(
                "p1",
                ItemRef::new("s1", ItemType::Story),
                ConflictType::Action,
                vec![p("developer", "add"), p("tester", "remove")],
            )
            .unwrap();
        assert_eq!(detector.pending_conflicts("p1").unwrap().len(), 1);

        let resolved = detector
            .resolve_conflict(conflict.conflict_id, "keep the feature", DecidedBy::User)
            .unwrap();
        assert_eq!(resolved.status, ConflictStatus::Resolved);
        assert_eq!(resolved.resolution.unwrap().decision, "keep the feature");
        assert!(detector.pending_conflicts("p1").unwrap().is_empty());

        let err = detector
            .resolve_conflict(conflict.conflict_id, "again", DecidedBy::Auto)
            .unwrap_err();
        assert!(matches!(
            err,
            RelayError::Coordination(CoordinationError::InvalidState { .. })
        ));
        assert_eq!(events.names(), vec!["conflict-detected", "conflict-resolved"]);
    }

    #[test]
    fn test_resolve_unknown() {
        let (detector, _) = detector();
        let err = detector
            .resolve_conflict(relay_core::new_record_id(), "x", DecidedBy::User)
            .unwrap_err();
        assert!(matches!(
            err,
            RelayError::Coordination(CoordinationError::NotFound { .. })
        ));
    }
}
