//! Walk one story through the built-in delivery pipeline.
//!
//! ```sh
//! RUST_LOG=relay_agents=info cargo run -p relay-agents --example story_pipeline
//! ```

use relay_agents::{ChannelTaskQueue, CoordinationHub, InitiateHandoff};
use relay_core::{ItemRef, ItemType, Perspective, RelayConfig, RelayResult};
use relay_events::BroadcastEventBus;
use relay_storage::InMemoryLedger;
use serde_json::json;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn main() -> RelayResult<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = RelayConfig::from_env();
    let bus = BroadcastEventBus::new(config.event_channel_capacity);
    let mut events = bus.subscribe();
    let (tasks, mut task_rx) = ChannelTaskQueue::new();

    let hub = CoordinationHub::new(
        Arc::new(InMemoryLedger::new()),
        Arc::new(bus),
        Arc::new(tasks),
        config,
    )?;

    let story = ItemRef::new("s1", ItemType::Story);
    let mut handoff = hub.initiate_handoff(
        InitiateHandoff::new("demo", story.clone(), "product-owner")
            .message("Acceptance criteria are final")
            .context(json!({"points": 5})),
    )?;

    loop {
        let agent = handoff.data.to_agent.clone();
        hub.accept_handoff(handoff.data.handoff_id, &agent)?;
        hub.track_agent_start("demo", &agent, story.clone())?;
        hub.track_agent_finish(&agent, &story.id)?;

        let outcome = hub.complete_handoff(
            handoff.data.handoff_id,
            Some(json!({ format!("{}Notes", agent): "done" })),
        )?;
        match outcome.chained {
            Some(next) => handoff = next,
            None => break,
        }
    }

    hub.detect_conflict(
        "demo",
        story.clone(),
        vec![
            Perspective::new("developer", "I approve this implementation", "tests are green"),
            Perspective::new("security", "I reject this - unsafe code", "input is not escaped"),
        ],
    )?;

    while let Ok(task) = task_rx.try_recv() {
        println!("task: {} -> {}", task.title, task.assigned_agent);
    }
    while let Ok(event) = events.try_recv() {
        println!("event: {} ({})", event.event_name(), event.project_id());
    }

    let stats = hub.project_statistics("demo")?;
    println!("{}", serde_json::to_string_pretty(&stats).unwrap_or_default());
    Ok(())
}
