//! In-process event bus between the movement engine and its transports.
//!
//! The scheduler and the movement service publish [`MovementEvent`]s here.
//! Transports subscribe and forward them; nothing in the engine holds a
//! reference to a transport.

use tokio::sync::broadcast;
use wayfarer_types::MovementEvent;

/// Capacity of the event channel.
///
/// A subscriber that falls behind by more than this many events receives
/// [`broadcast::error::RecvError::Lagged`] and skips to the newest event.
pub const EVENT_BUS_CAPACITY: usize = 256;

/// Cloneable publisher/subscriber handle for movement events.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<MovementEvent>,
}

impl EventBus {
    /// Create a bus with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(EVENT_BUS_CAPACITY)
    }

    /// Create a bus with an explicit capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribe to every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<MovementEvent> {
        self.tx.subscribe()
    }

    /// Publish an event. Returns the number of subscribers that will see
    /// it; zero subscribers is not an error.
    pub fn publish(&self, event: MovementEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use wayfarer_types::{ActorId, Point, PositionBroadcast};

    use super::*;

    fn position_event() -> MovementEvent {
        MovementEvent::Position(PositionBroadcast {
            actor_id: ActorId::new(),
            position: Point::new(3.0, 4.0),
        })
    }

    #[test]
    fn publish_without_subscribers_is_fine() {
        let bus = EventBus::new();
        assert_eq!(bus.publish(position_event()), 0);
    }

    #[tokio::test]
    async fn subscribers_receive_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let event = position_event();

        assert_eq!(bus.publish(event.clone()), 1);
        assert_eq!(rx.recv().await.unwrap(), event);
    }
}
