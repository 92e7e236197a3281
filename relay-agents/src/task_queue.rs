//! Follow-up task seam
//!
//! When a handoff is created with `auto_create_task`, the engine hands a
//! [`FollowUpTask`] to the injected [`TaskQueue`]. What executes the task is
//! outside this crate.

use relay_core::{AgentName, HandoffData, HandoffId, ItemRef, ProjectId};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::mpsc;

/// Work item materialized for the receiving agent of a handoff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct FollowUpTask {
    pub project_id: ProjectId,
    pub item: ItemRef,
    pub assigned_agent: AgentName,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub handoff_id: HandoffId,
    pub title: String,
    pub description: Option<String>,
    /// Handoff id, sender, message and context, as JSON
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub input: Value,
}

impl FollowUpTask {
    /// Task for the receiving agent of `handoff`.
    pub fn for_handoff(handoff: &HandoffData) -> Self {
        Self {
            project_id: handoff.project_id.clone(),
            item: handoff.item.clone(),
            assigned_agent: handoff.to_agent.clone(),
            handoff_id: handoff.handoff_id,
            title: format!("Pick up {} {} from {}", handoff.item.item_type, handoff.item.id, handoff.from_agent),
            description: handoff.message.clone(),
            input: json!({
                "handoffId": handoff.handoff_id,
                "fromAgent": handoff.from_agent,
                "message": handoff.message,
                "context": handoff.context,
            }),
        }
    }
}

/// Errors a task queue may report. The engine logs and drops them.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TaskQueueError {
    #[error("Task queue unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Task rejected by queue: {reason}")]
    Rejected { reason: String },
}

/// Destination for follow-up tasks.
pub trait TaskQueue: Send + Sync {
    fn enqueue(&self, task: FollowUpTask) -> Result<(), TaskQueueError>;
}

impl<T: TaskQueue + ?Sized> TaskQueue for Arc<T> {
    fn enqueue(&self, task: FollowUpTask) -> Result<(), TaskQueueError> {
        (**self).enqueue(task)
    }
}

/// Queue that accepts and discards every task.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTaskQueue;

impl TaskQueue for NoopTaskQueue {
    fn enqueue(&self, _task: FollowUpTask) -> Result<(), TaskQueueError> {
        Ok(())
    }
}

/// Queue that keeps tasks in memory. Clones share the same list.
#[derive(Debug, Clone, Default)]
pub struct MemoryTaskQueue {
    tasks: Arc<Mutex<Vec<FollowUpTask>>>,
}

impl MemoryTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the enqueued tasks, oldest first.
    pub fn tasks(&self) -> Vec<FollowUpTask> {
        match self.tasks.lock() {
            Ok(tasks) => tasks.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Remove and return all enqueued tasks.
    pub fn drain(&self) -> Vec<FollowUpTask> {
        match self.tasks.lock() {
            Ok(mut tasks) => std::mem::take(&mut *tasks),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

impl TaskQueue for MemoryTaskQueue {
    fn enqueue(&self, task: FollowUpTask) -> Result<(), TaskQueueError> {
        self.tasks
            .lock()
            .map_err(|_| TaskQueueError::Unavailable {
                reason: "task list lock poisoned".to_string(),
            })?
            .push(task);
        Ok(())
    }
}

/// Queue forwarding tasks to an async consumer over an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelTaskQueue {
    tx: mpsc::UnboundedSender<FollowUpTask>,
}

impl ChannelTaskQueue {
    /// Create the queue and the receiving end for the consumer.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<FollowUpTask>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl TaskQueue for ChannelTaskQueue {
    fn enqueue(&self, task: FollowUpTask) -> Result<(), TaskQueueError> {
        self.tx.send(task).map_err(|_| TaskQueueError::Unavailable {
            reason: "consumer dropped".to_string(),
        })
    }
}
