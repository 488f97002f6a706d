//! Movement requests: plan a route and hand it to the scheduler.
//!
//! [`MovementService`] is the synchronous half of the engine. A request is
//! validated, planned against the current map snapshot, and persisted as a
//! new walker that supersedes whatever the actor was doing. From then on
//! the scheduler owns the walker.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use wayfarer_types::{
    ActorId, CollectionTarget, Faction, MovementEvent, Point, PositionBroadcast, SpawnId, Walker,
    WalkerId,
};
use wayfarer_world::{MapHandle, MapSnapshot, RoutePlanner, WorldError, ZoneTracker};

use crate::events::EventBus;
use crate::store::{Backend, StoreError};

/// Errors returned to the requester. Never retried by the engine.
#[derive(Debug, thiserror::Error)]
pub enum MovementError {
    /// The target region rejects the actor, or the collectible belongs to
    /// another faction.
    #[error("invalid target: {reason}")]
    InvalidTarget {
        /// Why the target was rejected.
        reason: String,
    },

    /// A coordinate is not a finite number.
    #[error("invalid coordinates ({x}, {y})")]
    InvalidCoordinates {
        /// Horizontal coordinate.
        x: f64,
        /// Vertical coordinate.
        y: f64,
    },

    /// No path node is reachable near the start or the target.
    #[error("no path network near start or target")]
    NoPathNetwork,

    /// The path graph does not connect start and target.
    #[error("no route between start and target")]
    NoRoute,

    /// The actor has no stored position.
    #[error("actor not found: {0}")]
    ActorNotFound(ActorId),

    /// The requested collectible does not exist.
    #[error("collectible not found: {0}")]
    CollectibleNotFound(SpawnId),

    /// The requested collectible has already been claimed.
    #[error("collectible already claimed: {0}")]
    ClaimConflict(SpawnId),

    /// A direct position update was attempted while the actor is walking.
    #[error("actor {0} is walking")]
    ActorWalking(ActorId),

    /// The map could not be used.
    #[error("map error: {0}")]
    Map(WorldError),

    /// A storage backend failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<WorldError> for MovementError {
    fn from(err: WorldError) -> Self {
        match err {
            WorldError::InvalidTarget { reason } => Self::InvalidTarget { reason },
            WorldError::InvalidCoordinates { x, y } => Self::InvalidCoordinates { x, y },
            WorldError::NoPathNetwork => Self::NoPathNetwork,
            WorldError::NoRoute => Self::NoRoute,
            other @ WorldError::Json(_) => Self::Map(other),
        }
    }
}

impl MovementError {
    /// Stable machine-readable code for transport replies.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidTarget { .. } => "invalid_target",
            Self::InvalidCoordinates { .. } => "invalid_coordinates",
            Self::NoPathNetwork => "no_path_network",
            Self::NoRoute => "no_route",
            Self::ActorNotFound(_) => "actor_not_found",
            Self::CollectibleNotFound(_) => "collectible_not_found",
            Self::ClaimConflict(_) => "claim_conflict",
            Self::ActorWalking(_) => "actor_walking",
            Self::Map(_) | Self::Store(_) => "unavailable",
        }
    }

    /// Message suitable for showing to the player.
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidTarget { reason } if reason.is_empty() => String::from("cannot walk there"),
            Self::InvalidTarget { reason } => format!("cannot walk there: {reason}"),
            Self::InvalidCoordinates { .. } => String::from("cannot walk there"),
            Self::NoPathNetwork | Self::NoRoute => String::from("no route found"),
            Self::ActorNotFound(_) => String::from("you are nowhere on the map"),
            Self::CollectibleNotFound(_) => String::from("there is nothing here to collect"),
            Self::ClaimConflict(_) => String::from("someone else collected it first"),
            Self::ActorWalking(_) => String::from("you are already on the move"),
            Self::Map(_) | Self::Store(_) => String::from("movement is unavailable right now"),
        }
    }
}

/// A request to walk somewhere, optionally to pick something up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovementRequest {
    /// The actor to move.
    pub actor_id: ActorId,
    /// Where to go. Ignored when `collectible` is set.
    pub target: Point,
    /// Faction to validate against; the stored faction when absent.
    #[serde(default)]
    pub faction: Option<Faction>,
    /// Collectible to walk to and claim on arrival.
    #[serde(default)]
    pub collectible: Option<SpawnId>,
}

/// Result of a successful movement request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovementStarted {
    /// The new walker.
    pub walker_id: WalkerId,
    /// Number of positions in the route, including the start.
    pub total_steps: usize,
    /// Final position of the route.
    pub destination: Point,
    /// Walkers of the same actor that this request superseded.
    pub interrupted: Vec<WalkerId>,
}

/// Handles movement, stop, and teleport requests.
#[derive(Debug)]
pub struct MovementService<B> {
    backend: Arc<B>,
    map: Arc<MapHandle>,
    planner: Arc<RoutePlanner>,
    zones: Arc<ZoneTracker>,
    events: EventBus,
}

impl<B: Backend> MovementService<B> {
    /// Create a service.
    pub const fn new(
        backend: Arc<B>,
        map: Arc<MapHandle>,
        planner: Arc<RoutePlanner>,
        zones: Arc<ZoneTracker>,
        events: EventBus,
    ) -> Self {
        Self {
            backend,
            map,
            planner,
            zones,
            events,
        }
    }

    /// Plan a route for `request` and start walking it.
    ///
    /// # Errors
    ///
    /// Returns a [`MovementError`] describing why nothing was started. No
    /// state changes in that case.
    pub async fn request_movement(&self, request: &MovementRequest) -> Result<MovementStarted, MovementError> {
        let actor = self
            .backend
            .actor(request.actor_id)
            .await?
            .ok_or(MovementError::ActorNotFound(request.actor_id))?;
        let faction = request.faction.clone().unwrap_or(actor.faction);

        let (target, collection) = match request.collectible {
            Some(spawn) => {
                let collectible = self
                    .backend
                    .collectible(spawn)
                    .await?
                    .ok_or(MovementError::CollectibleNotFound(spawn))?;
                if collectible.is_claimed() {
                    return Err(MovementError::ClaimConflict(spawn));
                }
                if !collectible.allows(&faction) {
                    return Err(MovementError::InvalidTarget {
                        reason: String::from("this belongs to another faction"),
                    });
                }
                let target = CollectionTarget {
                    spawn_id: spawn,
                    position: collectible.position,
                };
                (collectible.position, Some(target))
            }
            None => (request.target, None),
        };

        let snapshot = self.map.current();
        let route = self.planner.plan(&snapshot, actor.position, target, &faction)?;
        let walker = Walker::start(actor.actor_id, route, collection, Utc::now());

        let interrupted = self.backend.begin_walk(&walker).await?;
        for superseded in &interrupted {
            if let Err(e) = self.backend.evict_walker(*superseded, actor.actor_id).await {
                warn!(walker = %superseded, error = %e, "failed to evict superseded walker from cache");
            }
        }
        if let Err(e) = self.backend.cache_walker(&walker).await {
            warn!(walker = %walker.walker_id, error = %e, "failed to cache new walker");
        }
        self.observe_zone(&snapshot, actor.actor_id, actor.position);

        info!(
            actor = %actor.actor_id,
            walker = %walker.walker_id,
            steps = walker.total_steps(),
            interrupted = interrupted.len(),
            collecting = collection.is_some(),
            "movement started"
        );

        Ok(MovementStarted {
            walker_id: walker.walker_id,
            total_steps: walker.total_steps(),
            destination: walker.destination().unwrap_or(target),
            interrupted,
        })
    }

    /// Interrupt the actor's active walker, if any. Returns the walkers
    /// that were stopped.
    ///
    /// # Errors
    ///
    /// Returns [`MovementError::Store`] when the durable store fails.
    pub async fn stop_movement(&self, actor: ActorId) -> Result<Vec<WalkerId>, MovementError> {
        let stopped = self.backend.interrupt_walks(actor, Utc::now()).await?;
        for walker in &stopped {
            if let Err(e) = self.backend.evict_walker(*walker, actor).await {
                warn!(walker = %walker, error = %e, "failed to evict stopped walker from cache");
            }
        }
        self.zones.forget(actor);
        if !stopped.is_empty() {
            info!(actor = %actor, stopped = stopped.len(), "movement stopped");
        }
        Ok(stopped)
    }

    /// Place an actor directly at `position`.
    ///
    /// # Errors
    ///
    /// - [`MovementError::ActorWalking`] while the actor has a walker; the
    ///   scheduler owns the position until the walk ends or is stopped.
    /// - [`MovementError::ActorNotFound`] for unknown actors.
    /// - [`MovementError::InvalidCoordinates`] for non-finite input.
    pub async fn update_position(&self, actor: ActorId, position: Point) -> Result<(), MovementError> {
        if !position.is_finite() {
            return Err(MovementError::InvalidCoordinates {
                x: position.x,
                y: position.y,
            });
        }
        let previous = self
            .backend
            .actor(actor)
            .await?
            .ok_or(MovementError::ActorNotFound(actor))?
            .position;
        if self.backend.active_walker_for(actor).await?.is_some() {
            return Err(MovementError::ActorWalking(actor));
        }

        self.backend.set_actor_position(actor, position).await?;
        self.events.publish(MovementEvent::Position(PositionBroadcast {
            actor_id: actor,
            position,
        }));
        let snapshot = self.map.current();
        // Idle actors are not tracked; seed from where they stood.
        self.observe_zone(&snapshot, actor, previous);
        self.observe_zone(&snapshot, actor, position);
        Ok(())
    }

    fn observe_zone(&self, snapshot: &MapSnapshot, actor: ActorId, position: Point) {
        if let Some(event) = zone_event(&self.zones, &self.planner, snapshot, actor, position) {
            self.events.publish(event);
        }
    }
}

/// Record `actor` at `position` and build a zone-change event when the
/// containing region differs from the last one seen.
pub(crate) fn zone_event(
    zones: &ZoneTracker,
    planner: &RoutePlanner,
    snapshot: &MapSnapshot,
    actor: ActorId,
    position: Point,
) -> Option<MovementEvent> {
    let region = planner
        .validator()
        .containing(snapshot.regions(), position)
        .map(|r| r.id.clone());
    zones.observe(actor, region).map(|change| MovementEvent::ZoneChanged {
        actor_id: actor,
        from: change.from,
        to: change.to,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use wayfarer_types::{Collectible, Region, RegionId, RegionKind, WalkerStatus};

    use super::*;
    use crate::memory::MemoryBackend;
    use crate::store::{WalkerCache, WalkerStore};

    struct Harness {
        backend: Arc<MemoryBackend>,
        map: Arc<MapHandle>,
        service: MovementService<MemoryBackend>,
        events: EventBus,
    }

    fn harness() -> Harness {
        let backend = Arc::new(MemoryBackend::new());
        let map = Arc::new(MapHandle::default());
        let events = EventBus::new();
        let service = MovementService::new(
            Arc::clone(&backend),
            Arc::clone(&map),
            Arc::new(RoutePlanner::default()),
            Arc::new(ZoneTracker::new()),
            events.clone(),
        );
        Harness {
            backend,
            map,
            service,
            events,
        }
    }

    fn request(actor: ActorId, x: f64, y: f64) -> MovementRequest {
        MovementRequest {
            actor_id: actor,
            target: Point::new(x, y),
            faction: None,
            collectible: None,
        }
    }

    #[test]
    fn request_json_defaults_optional_fields() {
        let actor = ActorId::new();
        let json = format!(r#"{{"actor_id":"{actor}","target":{{"x":12.5,"y":-3.0}}}}"#);
        let parsed: MovementRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, request(actor, 12.5, -3.0));
    }

    fn home_region() -> Region {
        Region {
            id: RegionId::from("r1"),
            name: String::from("Home"),
            owner: Some(Faction::from("alpha")),
            walkable: true,
            kind: RegionKind::Standard,
            polygon: vec![
                Point::new(0.0, 0.0),
                Point::new(1000.0, 0.0),
                Point::new(1000.0, 1000.0),
                Point::new(0.0, 1000.0),
            ],
        }
    }

    #[tokio::test]
    async fn request_creates_cached_walker() {
        let h = harness();
        let actor = ActorId::new();
        h.backend.add_actor(actor, Point::new(0.0, 0.0), Faction::from("alpha"));

        let started = h.service.request_movement(&request(actor, 100.0, 0.0)).await.unwrap();

        assert_eq!(started.total_steps, 5);
        assert_eq!(started.destination, Point::new(100.0, 0.0));
        let walker = h.backend.walker(started.walker_id).unwrap();
        assert_eq!(walker.status, WalkerStatus::Walking);
        assert_eq!(walker.positions[0], Point::new(0.0, 0.0));
        assert!(h.backend.cached(started.walker_id).is_some());
    }

    #[tokio::test]
    async fn new_request_supersedes_active_walker() {
        let h = harness();
        let actor = ActorId::new();
        h.backend.add_actor(actor, Point::new(0.0, 0.0), Faction::from("alpha"));

        let first = h.service.request_movement(&request(actor, 100.0, 0.0)).await.unwrap();
        let second = h.service.request_movement(&request(actor, 0.0, 100.0)).await.unwrap();

        assert_eq!(second.interrupted, vec![first.walker_id]);
        assert_eq!(
            h.backend.walker(first.walker_id).unwrap().status,
            WalkerStatus::InterruptedByNewWalk
        );
        assert!(h.backend.cached(first.walker_id).is_none());

        let walking: Vec<_> = h
            .backend
            .walkers_of(actor)
            .into_iter()
            .filter(|w| w.status == WalkerStatus::Walking)
            .collect();
        assert_eq!(walking.len(), 1);
        assert_eq!(walking[0].walker_id, second.walker_id);
    }

    #[tokio::test]
    async fn unknown_actor_is_rejected() {
        let h = harness();
        let err = h
            .service
            .request_movement(&request(ActorId::new(), 1.0, 1.0))
            .await
            .unwrap_err();
        assert!(matches!(err, MovementError::ActorNotFound(_)));
        assert_eq!(err.code(), "actor_not_found");
    }

    #[tokio::test]
    async fn foreign_region_is_rejected_with_readable_reason() {
        let h = harness();
        h.map.replace(MapSnapshot::new(vec![home_region()], Vec::new(), Vec::new()));
        let actor = ActorId::new();
        h.backend.add_actor(actor, Point::new(10.0, 10.0), Faction::from("beta"));

        let err = h.service.request_movement(&request(actor, 50.0, 50.0)).await.unwrap_err();

        assert_eq!(err.code(), "invalid_target");
        assert!(err.user_message().starts_with("cannot walk there"));
        assert!(h.backend.walkers_of(actor).is_empty());
    }

    #[tokio::test]
    async fn request_faction_overrides_stored_faction() {
        let h = harness();
        h.map.replace(MapSnapshot::new(vec![home_region()], Vec::new(), Vec::new()));
        let actor = ActorId::new();
        h.backend.add_actor(actor, Point::new(10.0, 10.0), Faction::from("beta"));

        let mut req = request(actor, 50.0, 50.0);
        req.faction = Some(Faction::from("alpha"));
        assert!(h.service.request_movement(&req).await.is_ok());
    }

    #[tokio::test]
    async fn missing_route_reports_no_route_found() {
        let h = harness();
        let paths = vec![wayfarer_types::Path {
            id: wayfarer_types::PathId::from("island"),
            name: String::new(),
            points: vec![Point::new(50_000.0, 50_000.0)],
            is_loop: false,
        }];
        h.map.replace(MapSnapshot::new(Vec::new(), Vec::new(), paths));
        let actor = ActorId::new();
        h.backend.add_actor(actor, Point::new(0.0, 0.0), Faction::from("alpha"));

        let err = h.service.request_movement(&request(actor, 3000.0, 0.0)).await.unwrap_err();
        assert!(matches!(err, MovementError::NoPathNetwork));
        assert_eq!(err.user_message(), "no route found");
    }

    #[tokio::test]
    async fn collectible_target_is_its_location() {
        let h = harness();
        let actor = ActorId::new();
        h.backend.add_actor(actor, Point::new(0.0, 0.0), Faction::from("alpha"));
        let spawn = SpawnId::new();
        h.backend.add_collectible(
            Collectible {
                spawn_id: spawn,
                position: Point::new(100.0, 100.0),
                faction: None,
                claimed_at: None,
                claimed_by: None,
            },
            Vec::new(),
        );

        let mut req = request(actor, 9999.0, 9999.0);
        req.collectible = Some(spawn);
        let started = h.service.request_movement(&req).await.unwrap();

        assert_eq!(started.destination, Point::new(100.0, 100.0));
        let walker = h.backend.walker(started.walker_id).unwrap();
        assert_eq!(walker.collection.map(|c| c.spawn_id), Some(spawn));
    }

    #[tokio::test]
    async fn collectible_checks_run_before_planning() {
        let h = harness();
        let actor = ActorId::new();
        h.backend.add_actor(actor, Point::new(0.0, 0.0), Faction::from("alpha"));

        let mut req = request(actor, 0.0, 0.0);
        req.collectible = Some(SpawnId::new());
        let err = h.service.request_movement(&req).await.unwrap_err();
        assert!(matches!(err, MovementError::CollectibleNotFound(_)));

        let claimed = SpawnId::new();
        h.backend.add_collectible(
            Collectible {
                spawn_id: claimed,
                position: Point::new(10.0, 10.0),
                faction: None,
                claimed_at: Some(Utc::now()),
                claimed_by: Some(ActorId::new()),
            },
            Vec::new(),
        );
        req.collectible = Some(claimed);
        let err = h.service.request_movement(&req).await.unwrap_err();
        assert!(matches!(err, MovementError::ClaimConflict(_)));

        let foreign = SpawnId::new();
        h.backend.add_collectible(
            Collectible {
                spawn_id: foreign,
                position: Point::new(10.0, 10.0),
                faction: Some(Faction::from("beta")),
                claimed_at: None,
                claimed_by: None,
            },
            Vec::new(),
        );
        req.collectible = Some(foreign);
        let err = h.service.request_movement(&req).await.unwrap_err();
        assert!(matches!(err, MovementError::InvalidTarget { .. }));
    }

    #[tokio::test]
    async fn stop_movement_interrupts_without_replacement() {
        let h = harness();
        let actor = ActorId::new();
        h.backend.add_actor(actor, Point::new(0.0, 0.0), Faction::from("alpha"));
        let started = h.service.request_movement(&request(actor, 200.0, 0.0)).await.unwrap();

        let stopped = h.service.stop_movement(actor).await.unwrap();

        assert_eq!(stopped, vec![started.walker_id]);
        assert!(h.backend.active_walker_for(actor).await.unwrap().is_none());
        assert_eq!(h.backend.cached_walkers().await.unwrap(), Some(Vec::new()));
        assert!(h.service.stop_movement(actor).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn position_update_is_rejected_while_walking() {
        let h = harness();
        let actor = ActorId::new();
        h.backend.add_actor(actor, Point::new(0.0, 0.0), Faction::from("alpha"));
        h.service.request_movement(&request(actor, 200.0, 0.0)).await.unwrap();

        let err = h.service.update_position(actor, Point::new(5.0, 5.0)).await.unwrap_err();
        assert!(matches!(err, MovementError::ActorWalking(_)));

        h.service.stop_movement(actor).await.unwrap();
        let mut rx = h.events.subscribe();
        h.service.update_position(actor, Point::new(5.0, 5.0)).await.unwrap();
        assert_eq!(h.backend.position_of(actor), Some(Point::new(5.0, 5.0)));
        assert!(matches!(rx.recv().await.unwrap(), MovementEvent::Position(_)));
    }

    #[tokio::test]
    async fn idle_relocation_reports_leaving_a_region() {
        let h = harness();
        h.map.replace(MapSnapshot::new(vec![home_region()], Vec::new(), Vec::new()));
        let actor = ActorId::new();
        h.backend.add_actor(actor, Point::new(10.0, 10.0), Faction::from("alpha"));
        let mut rx = h.events.subscribe();

        h.service.update_position(actor, Point::new(-50.0, -50.0)).await.unwrap();

        assert!(matches!(rx.recv().await.unwrap(), MovementEvent::Position(_)));
        let event = rx.recv().await.unwrap();
        assert!(matches!(
            event,
            MovementEvent::ZoneChanged { from: Some(ref id), to: None, .. } if *id == RegionId::from("r1")
        ));
    }

    #[tokio::test]
    async fn cache_outage_does_not_block_requests() {
        let h = harness();
        let actor = ActorId::new();
        h.backend.add_actor(actor, Point::new(0.0, 0.0), Faction::from("alpha"));
        h.backend.set_cache_down(true);

        let started = h.service.request_movement(&request(actor, 50.0, 0.0)).await.unwrap();
        assert!(h.backend.walker(started.walker_id).is_some());
        assert_eq!(h.backend.active_walkers().await.unwrap().len(), 1);
    }

    #[test]
    fn world_errors_map_to_movement_errors() {
        let err = MovementError::from(WorldError::NoRoute);
        assert_eq!(err.code(), "no_route");
        let err = MovementError::from(WorldError::InvalidTarget {
            reason: String::from("no land here"),
        });
        assert_eq!(err.user_message(), "cannot walk there: no land here");
    }
}
