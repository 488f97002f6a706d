//! Forwards movement events from the in-process bus to NATS.
//!
//! # Subject Convention
//!
//! - **Per-actor events:** `{prefix}.events.{actor_id}` (steps,
//!   collection results, zone changes)
//! - **Position fan-out:** `{prefix}.events.broadcast`

use tokio::sync::broadcast::Receiver;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use wayfarer_types::MovementEvent;

/// Subject an event is published on.
pub fn subject_for(prefix: &str, event: &MovementEvent) -> String {
    if event.is_broadcast() {
        format!("{prefix}.events.broadcast")
    } else {
        format!("{prefix}.events.{}", event.actor_id())
    }
}

/// Publish every event received on `events` until the bus closes.
///
/// A slow NATS connection makes the receiver lag; skipped events are
/// logged and dropped, never replayed.
pub async fn run_publisher(client: async_nats::Client, prefix: String, mut events: Receiver<MovementEvent>) {
    info!(prefix = %prefix, "Event publisher started");
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Event publisher lagged, events dropped");
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        let subject = subject_for(&prefix, &event);
        let payload = match serde_json::to_vec(&event) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Failed to serialize movement event");
                continue;
            }
        };
        if let Err(e) = client.publish(subject.clone(), payload.into()).await {
            warn!(subject = %subject, error = %e, "Failed to publish movement event");
        } else {
            debug!(subject = %subject, "Published movement event");
        }
    }
    info!("Event bus closed, publisher stopping");
}
