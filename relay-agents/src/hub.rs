//! Coordination hub
//!
//! One object wiring the shared ledger, event bus, task queue, pipeline
//! catalog and configuration into every coordination component.

use crate::{
    ConflictDetector, HandoffCompletion, HandoffCoordinator, HistoryAggregator, InitiateHandoff,
    ParallelWorkTracker, PipelineCatalog, ProjectStatistics, RetentionReport, TaskQueue,
};
use relay_core::{
    AgentName, Conflict, ConflictId, ConflictType, DecidedBy, HandoffId, ItemRef, LedgerRecord,
    Perspective, RelayConfig, RelayResult, StoredHandoff, Timestamp, WorkClaim,
};
use relay_events::EventBus;
use relay_storage::{LedgerStore, LedgerStoreExt};
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Entry point exposing every coordination operation.
///
/// Instances are independent: each owns its components and shares only the
/// collaborators passed to [`CoordinationHub::new`].
pub struct CoordinationHub {
    config: RelayConfig,
    store: Arc<dyn LedgerStore>,
    handoffs: HandoffCoordinator,
    conflicts: ConflictDetector,
    parallel: ParallelWorkTracker,
    history: HistoryAggregator,
}

impl CoordinationHub {
    /// Validate `config` and build the components.
    ///
    /// The catalog comes from `config.pipelines`, or the built-in one.
    pub fn new(
        store: Arc<dyn LedgerStore>,
        events: Arc<dyn EventBus>,
        tasks: Arc<dyn TaskQueue>,
        config: RelayConfig,
    ) -> RelayResult<Self> {
        config.validate()?;
        let catalog = Arc::new(PipelineCatalog::from_config(&config)?);

        let handoffs = HandoffCoordinator::new(store.clone(), events.clone(), tasks, catalog)
            .with_auto_create_tasks(config.auto_create_tasks);
        let conflicts = ConflictDetector::new(store.clone(), events.clone());
        let parallel = ParallelWorkTracker::with_compatible_pairs(
            store.clone(),
            events.clone(),
            config.compatible_pairs.iter().cloned(),
        );
        let history = HistoryAggregator::new(store.clone(), events);

        Ok(Self {
            config,
            store,
            handoffs,
            conflicts,
            parallel,
            history,
        })
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    pub fn handoffs(&self) -> &HandoffCoordinator {
        &self.handoffs
    }

    pub fn conflicts(&self) -> &ConflictDetector {
        &self.conflicts
    }

    pub fn parallel(&self) -> &ParallelWorkTracker {
        &self.parallel
    }

    pub fn history(&self) -> &HistoryAggregator {
        &self.history
    }

    pub fn catalog(&self) -> &PipelineCatalog {
        self.handoffs.catalog()
    }

    // ========================================================================
    // HANDOFFS
    // ========================================================================

    pub fn initiate_handoff(&self, request: InitiateHandoff) -> RelayResult<StoredHandoff> {
        self.handoffs.initiate_handoff(request)
    }

    pub fn accept_handoff(&self, handoff_id: HandoffId, agent: &str) -> RelayResult<StoredHandoff> {
        self.handoffs.accept_handoff(handoff_id, agent)
    }

    pub fn complete_handoff(&self, handoff_id: HandoffId, output: Option<Value>) -> RelayResult<HandoffCompletion> {
        self.handoffs.complete_handoff(handoff_id, output)
    }

    pub fn reject_handoff(
        &self,
        handoff_id: HandoffId,
        agent: &str,
        reason: Option<String>,
    ) -> RelayResult<StoredHandoff> {
        self.handoffs.reject_handoff(handoff_id, agent, reason)
    }

    pub fn cancel_item_handoffs(&self, item_id: &str) -> RelayResult<usize> {
        self.handoffs.cancel_item_handoffs(item_id)
    }

    pub fn expire_stale_handoffs(&self, older_than: Timestamp) -> RelayResult<usize> {
        self.handoffs.expire_stale_handoffs(older_than)
    }

    pub fn drive_pipeline(&self) -> RelayResult<Vec<StoredHandoff>> {
        self.handoffs.drive_pipeline()
    }

    pub fn get_handoff(&self, handoff_id: HandoffId) -> RelayResult<StoredHandoff> {
        self.handoffs.get_handoff(handoff_id)
    }

    pub fn pending_handoffs_for(&self, agent: &str) -> RelayResult<Vec<StoredHandoff>> {
        self.handoffs.pending_handoffs_for(agent)
    }

    pub fn handoffs_for_item(&self, item_id: &str) -> RelayResult<Vec<StoredHandoff>> {
        self.handoffs.handoffs_for_item(item_id)
    }

    // ========================================================================
    // CONFLICTS
    // ========================================================================

    pub fn detect_conflict(
        &self,
        project_id: &str,
        item: ItemRef,
        perspectives: Vec<Perspective>,
    ) -> RelayResult<Option<Conflict>> {
        self.conflicts.detect_conflict(project_id, item, perspectives)
    }

    pub fn record_conflict(
        &self,
        project_id: &str,
        item: ItemRef,
        conflict_type: ConflictType,
        perspectives: Vec<Perspective>,
    ) -> RelayResult<Conflict> {
        self.conflicts
            .record_conflict(project_id, item, conflict_type, perspectives)
    }

    pub fn resolve_conflict(
        &self,
        conflict_id: ConflictId,
        decision: &str,
        decided_by: DecidedBy,
    ) -> RelayResult<Conflict> {
        self.conflicts.resolve_conflict(conflict_id, decision, decided_by)
    }

    pub fn get_conflict(&self, conflict_id: ConflictId) -> RelayResult<Conflict> {
        self.conflicts.get_conflict(conflict_id)
    }

    pub fn pending_conflicts(&self, project_id: &str) -> RelayResult<Vec<Conflict>> {
        self.conflicts.pending_conflicts(project_id)
    }

    // ========================================================================
    // PARALLEL WORK
    // ========================================================================

    pub fn track_agent_start(&self, project_id: &str, agent: &str, item: ItemRef) -> RelayResult<WorkClaim> {
        self.parallel.track_agent_start(project_id, agent, item)
    }

    pub fn track_agent_finish(&self, agent: &str, item_id: &str) -> RelayResult<Option<WorkClaim>> {
        self.parallel.track_agent_finish(agent, item_id)
    }

    pub fn current_owner(&self, item_id: &str) -> RelayResult<Option<AgentName>> {
        self.parallel.current_owner(item_id)
    }

    pub fn is_item_being_worked_on(&self, item_id: &str) -> RelayResult<bool> {
        self.parallel.is_item_being_worked_on(item_id)
    }

    pub fn is_parallel_execution_safe(&self, candidate: &str, item_id: &str) -> RelayResult<bool> {
        self.parallel.is_parallel_execution_safe(candidate, item_id)
    }

    // ========================================================================
    // HISTORY
    // ========================================================================

    pub fn item_history(&self, item_id: &str) -> RelayResult<Vec<LedgerRecord>> {
        self.history.item_history(item_id)
    }

    pub fn project_statistics(&self, project_id: &str) -> RelayResult<ProjectStatistics> {
        self.history.project_statistics(project_id)
    }

    pub fn clear_old_data(&self, project_id: &str, days_to_keep: u32) -> RelayResult<RetentionReport> {
        self.history.clear_old_data(project_id, days_to_keep)
    }

    /// Every project with at least one ledger record.
    pub fn project_ids(&self) -> RelayResult<BTreeSet<String>> {
        self.store.project_ids()
    }
}
