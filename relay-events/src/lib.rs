//! RELAY Events - Coordination Event Publication
//!
//! The coordination engine publishes every state change through an injected
//! [`EventBus`]. There is no global listener registry: whoever builds the
//! engine decides where events go.

pub mod bus;
pub mod event;

pub use bus::{BroadcastEventBus, EventBus, MemoryEventBus, NoopEventBus};
pub use event::CoordinationEvent;
