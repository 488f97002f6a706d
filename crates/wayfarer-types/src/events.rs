//! Outbound notifications produced by the movement engine.
//!
//! The scheduler publishes [`MovementEvent`] values on an in-process bus;
//! the transport layer subscribes and forwards them to clients. Nothing in
//! the engine holds a reference to the transport.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::CollectionFailure;
use crate::ids::{ActorId, RegionId, SpawnId, WalkerId};
use crate::structs::{Point, RewardItem};

/// Progress of one walker after a tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct StepNotification {
    /// The moving actor.
    pub actor_id: ActorId,
    /// The walker that advanced.
    pub walker_id: WalkerId,
    /// Index reached this tick.
    pub current_index: usize,
    /// Position at `current_index`.
    pub position: Point,
    /// Number of positions in the route.
    pub total_steps: usize,
    /// Whether the walker arrived this tick.
    pub completed: bool,
}

/// Position update suitable for fan-out to every observer of the world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct PositionBroadcast {
    /// The actor that moved.
    pub actor_id: ActorId,
    /// Its new position.
    pub position: Point,
}

/// An event emitted by the movement engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "type", rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum MovementEvent {
    /// A walker advanced (or arrived).
    Step(StepNotification),
    /// An actor's position changed.
    Position(PositionBroadcast),
    /// A collectible was claimed and rewards resolved.
    Collected {
        /// The collecting actor.
        actor_id: ActorId,
        /// The walker that arrived.
        walker_id: WalkerId,
        /// The claimed collectible.
        spawn_id: SpawnId,
        /// Rewards to add to the actor's inventory.
        items: Vec<RewardItem>,
    },
    /// A collection attempt at the end of a walk failed.
    CollectionFailed {
        /// The actor that tried to collect.
        actor_id: ActorId,
        /// The walker that arrived.
        walker_id: WalkerId,
        /// The collectible.
        spawn_id: SpawnId,
        /// Why it failed.
        reason: CollectionFailure,
    },
    /// An actor entered a different region.
    ZoneChanged {
        /// The actor.
        actor_id: ActorId,
        /// The region left, if any.
        from: Option<RegionId>,
        /// The region entered, `None` when outside every region.
        to: Option<RegionId>,
    },
}

impl MovementEvent {
    /// The actor the event concerns.
    pub const fn actor_id(&self) -> ActorId {
        match self {
            Self::Step(step) => step.actor_id,
            Self::Position(position) => position.actor_id,
            Self::Collected { actor_id, .. }
            | Self::CollectionFailed { actor_id, .. }
            | Self::ZoneChanged { actor_id, .. } => *actor_id,
        }
    }

    /// Whether the event is meant for every observer rather than one actor.
    pub const fn is_broadcast(&self) -> bool {
        matches!(self, Self::Position(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_are_tagged_by_type() {
        let event = MovementEvent::Position(PositionBroadcast {
            actor_id: ActorId::new(),
            position: Point::new(1.0, 2.0),
        });
        let json = serde_json::to_value(&event).ok();
        let tag = json
            .as_ref()
            .and_then(|v| v.get("type"))
            .and_then(|v| v.as_str());
        assert_eq!(tag, Some("position"));
        assert!(event.is_broadcast());
    }

    #[test]
    fn collection_failure_reason_serializes() {
        let actor = ActorId::new();
        let event = MovementEvent::CollectionFailed {
            actor_id: actor,
            walker_id: WalkerId::new(),
            spawn_id: SpawnId::new(),
            reason: CollectionFailure::AlreadyCollected,
        };
        let json = serde_json::to_string(&event).unwrap_or_default();
        assert!(json.contains("\"already_collected\""));
        assert_eq!(event.actor_id(), actor);
        assert!(!event.is_broadcast());
    }
}
