//! Event bus implementations
//!
//! Publishing is fire-and-forget: an implementation must never block the
//! caller on subscribers or report their failures back.

use crate::CoordinationEvent;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Sink for coordination events, injected into the coordination engine.
pub trait EventBus: Send + Sync {
    /// Publish an event. Never fails from the caller's point of view.
    fn publish(&self, event: CoordinationEvent);
}

impl<T: EventBus + ?Sized> EventBus for Arc<T> {
    fn publish(&self, event: CoordinationEvent) {
        (**self).publish(event)
    }
}

// ============================================================================
// BROADCAST
// ============================================================================

/// Fan-out bus backed by a tokio broadcast channel.
///
/// Each subscriber receives every event published after it subscribed. A
/// subscriber that falls more than `capacity` events behind misses the
/// oldest ones (lagged).
#[derive(Clone)]
pub struct BroadcastEventBus {
    tx: broadcast::Sender<CoordinationEvent>,
}

impl BroadcastEventBus {
    /// Create a bus buffering up to `capacity` events per subscriber.
    /// A capacity of 0 is raised to 1.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribe to all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<CoordinationEvent> {
        self.tx.subscribe()
    }

    /// Number of live subscribers.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl EventBus for BroadcastEventBus {
    fn publish(&self, event: CoordinationEvent) {
        let event_name = event.event_name();
        match self.tx.send(event) {
            Ok(receivers) => {
                debug!(event_name, receivers, "Broadcast event");
            }
            Err(_) => {
                debug!(event_name, "No receivers for event");
            }
        }
    }
}

// ============================================================================
// NO-OP AND IN-MEMORY
// ============================================================================

/// Bus that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventBus;

impl EventBus for NoopEventBus {
    fn publish(&self, _event: CoordinationEvent) {}
}

/// Bus that keeps every published event in memory, in order.
///
/// Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct MemoryEventBus {
    events: Arc<Mutex<Vec<CoordinationEvent>>>,
}

impl MemoryEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the published events.
    pub fn events(&self) -> Vec<CoordinationEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Names of the published events, in order.
    pub fn names(&self) -> Vec<&'static str> {
        self.events().iter().map(CoordinationEvent::event_name).collect()
    }

    /// Drop all recorded events.
    pub fn clear(&self) {
        match self.events.lock() {
            Ok(mut events) => events.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
    }
}

impl EventBus for MemoryEventBus {
    fn publish(&self, event: CoordinationEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(_) => warn!(event_name = event.event_name(), "Event log lock poisoned, dropping event"),
        }
    }
}
