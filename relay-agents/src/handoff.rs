//! Handoff coordination engine
//!
//! Initiates, accepts, completes and rejects handoffs, and advances the item
//! along its pipeline when a handoff completes.
//!
//! # Auto-advance
//!
//! Completion creates its own successor handoff directly from an
//! [`AdvanceRequest`]. If that fails the request is parked on a work-list which
//! [`HandoffCoordinator::drive_pipeline`] drains, so a transient ledger failure
//! never drops a chain. A completion never creates another completion's
//! successor, and a parked step never delays a fresh chain.

use crate::task_queue::{FollowUpTask, TaskQueue};
use crate::{lost_swap, PipelineCatalog};
use chrono::Utc;
use relay_core::{
    new_record_id, AgentName, CoordinationError, Handoff, HandoffData, HandoffId, HandoffKind,
    HandoffStatus, ItemRef, ProjectId, RecordKind, RelayError, RelayResult, StoredHandoff,
    Timestamp,
};
use relay_events::{CoordinationEvent, EventBus};
use relay_storage::{LedgerFilter, LedgerStore, LedgerStoreExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

// ============================================================================
// REQUESTS AND RESULTS
// ============================================================================

/// Arguments of a handoff initiation.
#[derive(Debug, Clone, PartialEq)]
pub struct InitiateHandoff {
    pub project_id: ProjectId,
    pub item: ItemRef,
    pub from_agent: AgentName,
    /// Explicit receiver; resolved from the pipeline when `None`
    pub to_agent: Option<AgentName>,
    pub message: Option<String>,
    pub context: Option<Value>,
    /// Enqueue a follow-up task; falls back to the coordinator default
    pub auto_create_task: Option<bool>,
}

impl InitiateHandoff {
    pub fn new(project_id: impl Into<ProjectId>, item: ItemRef, from_agent: impl Into<AgentName>) -> Self {
        Self {
            project_id: project_id.into(),
            item,
            from_agent: from_agent.into(),
            to_agent: None,
            message: None,
            context: None,
            auto_create_task: None,
        }
    }

    pub fn to(mut self, agent: impl Into<AgentName>) -> Self {
        self.to_agent = Some(agent.into());
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn context(mut self, context: Value) -> Self {
        self.context = Some(context);
        self
    }

    pub fn auto_create_task(mut self, enabled: bool) -> Self {
        self.auto_create_task = Some(enabled);
        self
    }
}

/// Outcome of a completion: the completed handoff and, when the pipeline
/// has a successor, the handoff created for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct HandoffCompletion {
    pub completed: StoredHandoff,
    pub chained: Option<StoredHandoff>,
}

/// Pending pipeline step produced by a completion.
#[derive(Debug, Clone, PartialEq)]
pub struct AdvanceRequest {
    /// Handoff whose completion produced this step
    pub source: HandoffId,
    pub project_id: ProjectId,
    pub item: ItemRef,
    pub from_agent: AgentName,
    pub to_agent: AgentName,
    pub context: Value,
}

// ============================================================================
// COORDINATOR
// ============================================================================

/// The handoff state machine over a shared ledger.
pub struct HandoffCoordinator {
    store: Arc<dyn LedgerStore>,
    events: Arc<dyn EventBus>,
    tasks: Arc<dyn TaskQueue>,
    catalog: Arc<PipelineCatalog>,
    auto_create_tasks: bool,
    advances: Mutex<VecDeque<AdvanceRequest>>,
}

impl HandoffCoordinator {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        events: Arc<dyn EventBus>,
        tasks: Arc<dyn TaskQueue>,
        catalog: Arc<PipelineCatalog>,
    ) -> Self {
        Self {
            store,
            events,
            tasks,
            catalog,
            auto_create_tasks: true,
            advances: Mutex::new(VecDeque::new()),
        }
    }

    /// Default for requests that leave `auto_create_task` unset.
    pub fn with_auto_create_tasks(mut self, enabled: bool) -> Self {
        self.auto_create_tasks = enabled;
        self
    }

    pub fn catalog(&self) -> &PipelineCatalog {
        &self.catalog
    }

    /// Create a pending handoff.
    ///
    /// An explicit `to_agent` makes a manual handoff. Otherwise the receiver
    /// is the pipeline successor of `from_agent` and the handoff is automatic;
    /// with no successor this fails with `NoNextAgent`.
    pub fn initiate_handoff(&self, request: InitiateHandoff) -> RelayResult<StoredHandoff> {
        let (to_agent, kind) = match request.to_agent {
            Some(agent) => (agent, HandoffKind::Manual),
            None => {
                let next = self
                    .catalog
                    .successor(request.item.item_type, &request.from_agent)
                    .ok_or_else(|| CoordinationError::NoNextAgent {
                        item_type: request.item.item_type,
                        from_agent: request.from_agent.clone(),
                    })?;
                (next.to_string(), HandoffKind::Auto)
            }
        };

        self.create(
            HandoffData {
                handoff_id: new_record_id(),
                project_id: request.project_id,
                item: request.item,
                from_agent: request.from_agent,
                to_agent,
                kind,
                message: request.message,
                context: request.context.unwrap_or_else(|| json!({})),
                created_at: Utc::now(),
                accepted_at: None,
                completed_at: None,
            },
            request.auto_create_task.unwrap_or(self.auto_create_tasks),
        )
    }

    fn create(&self, data: HandoffData, auto_create_task: bool) -> RelayResult<StoredHandoff> {
        let handoff = Handoff::new(data).into_stored();
        self.store.insert(&handoff.clone().into())?;

        info!(
            handoff_id = %handoff.data.handoff_id,
            project_id = %handoff.data.project_id,
            item = %handoff.data.item,
            from = %handoff.data.from_agent,
            to = %handoff.data.to_agent,
            kind = %handoff.data.kind,
            "Handoff initiated"
        );
        self.events.publish(CoordinationEvent::HandoffCreated {
            handoff: handoff.clone(),
        });

        if auto_create_task {
            if let Err(e) = self.tasks.enqueue(FollowUpTask::for_handoff(&handoff.data)) {
                warn!(
                    handoff_id = %handoff.data.handoff_id,
                    error = %e,
                    "Failed to enqueue follow-up task"
                );
            }
        }

        Ok(handoff)
    }

    /// Accept a pending handoff as its receiving agent.
    pub fn accept_handoff(&self, handoff_id: HandoffId, agent: &str) -> RelayResult<StoredHandoff> {
        let stored = self.load_for_receiver(handoff_id, agent)?;
        let accepted = stored.into_pending()?.accept(Utc::now()).into_stored();
        self.swap(HandoffStatus::Pending, &accepted)?;

        info!(%handoff_id, agent, "Handoff accepted");
        self.events.publish(CoordinationEvent::HandoffAccepted {
            handoff: accepted.clone(),
        });
        Ok(accepted)
    }

    /// Reject a pending handoff as its receiving agent. Never advances the pipeline.
    pub fn reject_handoff(
        &self,
        handoff_id: HandoffId,
        agent: &str,
        reason: Option<String>,
    ) -> RelayResult<StoredHandoff> {
        let stored = self.load_for_receiver(handoff_id, agent)?;
        let rejected = stored.into_pending()?.reject(reason, Utc::now()).into_stored();
        self.swap(HandoffStatus::Pending, &rejected)?;

        info!(%handoff_id, agent, reason = ?rejected.data.message, "Handoff rejected");
        self.events.publish(CoordinationEvent::HandoffRejected {
            handoff: rejected.clone(),
        });
        Ok(rejected)
    }

    /// Complete an accepted handoff and advance the pipeline.
    ///
    /// `output` is merged into the context, tagged with `completedBy`. If the
    /// item's pipeline has a successor after the receiver, a new automatic
    /// handoff carrying the merged context is created and returned as
    /// `chained`. A failure creating it leaves the step queued (see
    /// [`Self::pending_advances`]) and does not fail the completion.
    pub fn complete_handoff(
        &self,
        handoff_id: HandoffId,
        output: Option<Value>,
    ) -> RelayResult<HandoffCompletion> {
        let stored = self.load(handoff_id)?;
        let completed = stored
            .into_accepted()?
            .complete(output.as_ref(), Utc::now())
            .into_stored();
        self.swap(HandoffStatus::Accepted, &completed)?;

        info!(
            %handoff_id,
            agent = %completed.data.to_agent,
            duration_ms = ?completed.data.duration_ms(),
            "Handoff completed"
        );
        self.events.publish(CoordinationEvent::HandoffCompleted {
            handoff: completed.clone(),
        });

        let data = &completed.data;
        let chained = match self.catalog.successor(data.item.item_type, &data.to_agent) {
            Some(next) => {
                let step = AdvanceRequest {
                    source: handoff_id,
                    project_id: data.project_id.clone(),
                    item: data.item.clone(),
                    from_agent: data.to_agent.clone(),
                    to_agent: next.to_string(),
                    context: data.context.clone(),
                };
                match self.advance(&step) {
                    Ok(handoff) => Some(handoff),
                    Err(e) => {
                        warn!(%handoff_id, error = %e, "Pipeline advance deferred");
                        self.push_advance(step);
                        None
                    }
                }
            }
            None => {
                debug!(%handoff_id, item = %data.item, "Pipeline finished for item");
                None
            }
        };

        // Earlier deferred steps get another chance once the ledger accepts writes again.
        if chained.is_some() && self.pending_advances() > 0 {
            if let Err(e) = self.drive_pipeline() {
                warn!(%handoff_id, error = %e, "Queued pipeline steps still deferred");
            }
        }

        Ok(HandoffCompletion { completed, chained })
    }

    /// Create handoffs for every deferred pipeline step, oldest first.
    ///
    /// Stops at the first failure, leaving that step and the rest queued.
    pub fn drive_pipeline(&self) -> RelayResult<Vec<StoredHandoff>> {
        let mut created = Vec::new();
        while let Some(step) = self.pop_advance() {
            match self.advance(&step) {
                Ok(handoff) => {
                    debug!(source = %step.source, handoff_id = %handoff.data.handoff_id, "Deferred pipeline step created");
                    created.push(handoff);
                }
                Err(e) => {
                    self.requeue_advance(step);
                    return Err(e);
                }
            }
        }
        Ok(created)
    }

    fn advance(&self, step: &AdvanceRequest) -> RelayResult<StoredHandoff> {
        let data = HandoffData {
            handoff_id: new_record_id(),
            project_id: step.project_id.clone(),
            item: step.item.clone(),
            from_agent: step.from_agent.clone(),
            to_agent: step.to_agent.clone(),
            kind: HandoffKind::Auto,
            message: Some(format!("Auto-advanced after {} completed", step.from_agent)),
            context: step.context.clone(),
            created_at: Utc::now(),
            accepted_at: None,
            completed_at: None,
        };
        self.create(data, self.auto_create_tasks)
    }

    /// Number of pipeline steps waiting to be driven.
    pub fn pending_advances(&self) -> usize {
        match self.advances.lock() {
            Ok(queue) => queue.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    fn push_advance(&self, step: AdvanceRequest) {
        match self.advances.lock() {
            Ok(mut queue) => queue.push_back(step),
            Err(poisoned) => poisoned.into_inner().push_back(step),
        }
    }

    fn pop_advance(&self) -> Option<AdvanceRequest> {
        match self.advances.lock() {
            Ok(mut queue) => queue.pop_front(),
            Err(poisoned) => poisoned.into_inner().pop_front(),
        }
    }

    // Failed steps go back to the front so chain order is kept.
    fn requeue_advance(&self, step: AdvanceRequest) {
        match self.advances.lock() {
            Ok(mut queue) => queue.push_front(step),
            Err(poisoned) => poisoned.into_inner().push_front(step),
        }
    }

    // ========================================================================
    // EXPIRY
    // ========================================================================

    /// Expire every pending handoff of an item. Returns how many were expired.
    pub fn cancel_item_handoffs(&self, item_id: &str) -> RelayResult<usize> {
        let pending = self
            .store
            .handoffs(LedgerFilter::new().item(item_id).status(HandoffStatus::Pending))?;
        self.expire_all(pending)
    }

    /// Expire every pending handoff created before `older_than`.
    pub fn expire_stale_handoffs(&self, older_than: Timestamp) -> RelayResult<usize> {
        let pending = self.store.handoffs(
            LedgerFilter::new()
                .status(HandoffStatus::Pending)
                .created_before(older_than),
        )?;
        self.expire_all(pending)
    }

    fn expire_all(&self, pending: Vec<StoredHandoff>) -> RelayResult<usize> {
        let now = Utc::now();
        let mut expired: BTreeMap<(ProjectId, String), Vec<HandoffId>> = BTreeMap::new();

        for stored in pending {
            let id = stored.data.handoff_id;
            let key = (stored.data.project_id.clone(), stored.data.item.id.clone());
            let next = stored.into_pending()?.expire(now).into_stored();
            match self.swap(HandoffStatus::Pending, &next) {
                Ok(()) => expired.entry(key).or_default().push(id),
                Err(RelayError::Coordination(CoordinationError::InvalidState { .. })) => {
                    debug!(handoff_id = %id, "Handoff left pending state concurrently, skipping");
                }
                Err(e) => return Err(e),
            }
        }

        let mut count = 0;
        for ((project_id, item_id), handoff_ids) in expired {
            count += handoff_ids.len();
            info!(%project_id, %item_id, count = handoff_ids.len(), "Pending handoffs expired");
            self.events.publish(CoordinationEvent::HandoffsExpired {
                project_id,
                item_id,
                handoff_ids,
            });
        }
        Ok(count)
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    /// Get a handoff by id; `NotFound` when absent.
    pub fn get_handoff(&self, handoff_id: HandoffId) -> RelayResult<StoredHandoff> {
        self.load(handoff_id)
    }

    /// Pending handoffs addressed to `agent`, oldest first.
    pub fn pending_handoffs_for(&self, agent: &str) -> RelayResult<Vec<StoredHandoff>> {
        self.store
            .handoffs(LedgerFilter::new().agent(agent).status(HandoffStatus::Pending))
    }

    /// Every handoff of an item, oldest first.
    pub fn handoffs_for_item(&self, item_id: &str) -> RelayResult<Vec<StoredHandoff>> {
        self.store.handoffs(LedgerFilter::new().item(item_id))
    }

    fn load(&self, handoff_id: HandoffId) -> RelayResult<StoredHandoff> {
        self.store.get_handoff(handoff_id)?.ok_or_else(|| {
            CoordinationError::NotFound {
                kind: RecordKind::Handoff,
                id: handoff_id,
            }
            .into()
        })
    }

    fn load_for_receiver(&self, handoff_id: HandoffId, agent: &str) -> RelayResult<StoredHandoff> {
        let stored = self.load(handoff_id)?;
        if stored.data.to_agent != agent {
            return Err(CoordinationError::WrongAgent {
                handoff_id,
                expected: stored.data.to_agent.clone(),
                actual: agent.to_string(),
            }
            .into());
        }
        Ok(stored)
    }

    fn swap(&self, expected: HandoffStatus, next: &StoredHandoff) -> RelayResult<()> {
        self.store
            .compare_and_swap(expected.into(), &next.clone().into())
            .map_err(lost_swap)
    }
}

// ============================================================================
// TESTS
// ============================================================================
