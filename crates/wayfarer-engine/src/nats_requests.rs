//! NATS intake for movement and scheduler commands.
//!
//! # Subject Convention
//!
//! - **Commands (request/reply):** `{prefix}.movement.request`
//! - **Map reload (request/reply or fire-and-forget):** `{prefix}.map.reload`
//!
//! Command payloads are JSON objects tagged by `command`:
//!
//! ```json
//! {"command": "move", "actor_id": "...", "target": {"x": 10, "y": 20}}
//! {"command": "move", "actor_id": "...", "target": {"x": 0, "y": 0}, "collectible": "..."}
//! {"command": "stop", "actor_id": "..."}
//! {"command": "teleport", "actor_id": "...", "position": {"x": 5, "y": 5}}
//! {"command": "status"}
//! {"command": "set_tick_interval", "ms": 250}
//! ```
//!
//! Every command with a reply subject gets a JSON reply tagged by `status`.

use std::sync::Arc;

use futures::StreamExt as _;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use wayfarer_core::control::{SchedulerControl, SchedulerStatus};
use wayfarer_core::movement::{MovementError, MovementRequest, MovementService, MovementStarted};
use wayfarer_core::store::Backend;
use wayfarer_types::{ActorId, Point, WalkerId};
use wayfarer_world::{MapHandle, RoutePlanner};

use crate::error::EngineError;
use crate::map_source::MapSource;

/// An inbound command.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    /// Start walking.
    Move(MovementRequest),
    /// Stop the actor's current walk.
    Stop {
        /// The actor.
        actor_id: ActorId,
    },
    /// Place an idle actor directly.
    Teleport {
        /// The actor.
        actor_id: ActorId,
        /// New position.
        position: Point,
    },
    /// Report scheduler state.
    Status,
    /// Pause ticking.
    Pause,
    /// Resume ticking.
    Resume,
    /// Change the tick interval.
    SetTickInterval {
        /// New interval in milliseconds.
        ms: u64,
    },
}

/// Reply to a command.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Reply {
    /// A walk started.
    Started(MovementStarted),
    /// Walks were stopped.
    Stopped {
        /// Interrupted walkers; empty when the actor was idle.
        interrupted: Vec<WalkerId>,
    },
    /// The actor was placed.
    Teleported {
        /// Where the actor now stands.
        position: Point,
    },
    /// Current scheduler state.
    Scheduler(SchedulerStatus),
    /// The map was reloaded.
    MapReloaded {
        /// New snapshot version.
        version: u64,
        /// Regions loaded.
        regions: usize,
        /// Walls loaded.
        walls: usize,
        /// Paths loaded.
        paths: usize,
        /// Reasons features were skipped.
        skipped: Vec<String>,
    },
    /// The command was not carried out.
    Rejected {
        /// Stable machine-readable code.
        code: String,
        /// Message suitable for players.
        message: String,
    },
}

impl Reply {
    fn rejected(code: &str, message: impl Into<String>) -> Self {
        Self::Rejected {
            code: code.to_owned(),
            message: message.into(),
        }
    }
}

impl From<MovementError> for Reply {
    fn from(e: MovementError) -> Self {
        if matches!(e, MovementError::Store(_) | MovementError::Map(_)) {
            warn!(error = %e, "Movement command failed");
        } else {
            debug!(code = e.code(), error = %e, "Movement command rejected");
        }
        Self::rejected(e.code(), e.user_message())
    }
}

/// Handles decoded commands.
pub struct Intake<B> {
    service: Arc<MovementService<B>>,
    control: Arc<SchedulerControl>,
    map: Arc<MapHandle>,
    planner: Arc<RoutePlanner>,
    source: Arc<MapSource>,
}

impl<B: Backend> Intake<B> {
    /// Create an intake. `planner` must be the one `service` plans with,
    /// so reloads can rebuild its path graph ahead of the next request.
    pub const fn new(
        service: Arc<MovementService<B>>,
        control: Arc<SchedulerControl>,
        map: Arc<MapHandle>,
        planner: Arc<RoutePlanner>,
        source: Arc<MapSource>,
    ) -> Self {
        Self {
            service,
            control,
            map,
            planner,
            source,
        }
    }

    /// Carry out one command.
    pub async fn handle(&self, command: Command) -> Reply {
        match command {
            Command::Move(request) => match self.service.request_movement(&request).await {
                Ok(started) => Reply::Started(started),
                Err(e) => e.into(),
            },
            Command::Stop { actor_id } => match self.service.stop_movement(actor_id).await {
                Ok(interrupted) => Reply::Stopped { interrupted },
                Err(e) => e.into(),
            },
            Command::Teleport { actor_id, position } => {
                match self.service.update_position(actor_id, position).await {
                    Ok(()) => Reply::Teleported { position },
                    Err(e) => e.into(),
                }
            }
            Command::Status => Reply::Scheduler(self.control.status()),
            Command::Pause => {
                self.control.pause();
                info!("Scheduler paused by command");
                Reply::Scheduler(self.control.status())
            }
            Command::Resume => {
                self.control.resume();
                info!("Scheduler resumed by command");
                Reply::Scheduler(self.control.status())
            }
            Command::SetTickInterval { ms } => match self.control.set_tick_interval_ms(ms) {
                Some(_) => Reply::Scheduler(self.control.status()),
                None => Reply::rejected("invalid_interval", "tick interval is too short"),
            },
        }
    }

    /// Reload the map from its source and swap it in. The previous map
    /// stays active when loading fails.
    pub async fn reload_map(&self) -> Reply {
        match self.source.load().await {
            Ok((snapshot, report)) => {
                let version = self.map.replace(snapshot);
                warm_graph(&self.planner, &self.map).await;
                Reply::MapReloaded {
                    version,
                    regions: report.regions,
                    walls: report.walls,
                    paths: report.paths,
                    skipped: report.skipped,
                }
            }
            Err(e) => {
                warn!(error = %e, "Map reload failed, keeping the current map");
                Reply::rejected("map_reload_failed", "the map could not be reloaded")
            }
        }
    }

    /// Decode a command payload and handle it.
    pub async fn handle_payload(&self, payload: &[u8]) -> Reply {
        match serde_json::from_slice::<Command>(payload) {
            Ok(command) => self.handle(command).await,
            Err(e) => {
                debug!(error = %e, "Malformed command payload");
                Reply::rejected("bad_request", format!("malformed command: {e}"))
            }
        }
    }
}

async fn reply(client: &async_nats::Client, to: Option<async_nats::Subject>, reply: &Reply) {
    let Some(to) = to else {
        return;
    };
    match serde_json::to_vec(reply) {
        Ok(payload) => {
            if let Err(e) = client.publish(to, payload.into()).await {
                warn!(error = %e, "Failed to send command reply");
            }
        }
        Err(e) => warn!(error = %e, "Failed to serialize command reply"),
    }
}


/// Build the path graph for the current map on the blocking pool, so the
/// first request after a map change finds it cached.
pub async fn warm_graph(planner: &Arc<RoutePlanner>, map: &Arc<MapHandle>) {
    let (planner, snapshot) = (Arc::clone(planner), map.current());
    let version = snapshot.version();
    match tokio::task::spawn_blocking(move || planner.graph_for(&snapshot)).await {
        Ok(graph) => debug!(version, nodes = graph.nodes().len(), "Path graph ready"),
        Err(e) => warn!(version, error = %e, "Path graph build failed, next request will retry"),
    }
}

/// Serve commands until both subscriptions close.
///
/// Each message is handled on its own task so one slow request does not
/// hold up others.
///
/// # Errors
///
/// Returns [`EngineError::Nats`] if subscribing fails.
pub async fn serve<B: Backend>(
    client: async_nats::Client,
    prefix: &str,
    intake: Arc<Intake<B>>,
) -> Result<(), EngineError> {
    let request_subject = format!("{prefix}.movement.request");
    let reload_subject = format!("{prefix}.map.reload");

    let mut requests = client
        .subscribe(request_subject.clone())
        .await
        .map_err(|e| EngineError::Nats {
            message: format!("failed to subscribe to {request_subject}: {e}"),
        })?;
    let mut reloads = client
        .subscribe(reload_subject.clone())
        .await
        .map_err(|e| EngineError::Nats {
            message: format!("failed to subscribe to {reload_subject}: {e}"),
        })?;

    info!(requests = %request_subject, reloads = %reload_subject, "Command intake started");

    loop {
        tokio::select! {
            msg = requests.next() => {
                let Some(msg) = msg else { break };
                let intake = Arc::clone(&intake);
                let client = client.clone();
                tokio::spawn(async move {
                    let answer = intake.handle_payload(&msg.payload).await;
                    reply(&client, msg.reply, &answer).await;
                });
            }
            msg = reloads.next() => {
                let Some(msg) = msg else { break };
                let answer = intake.reload_map().await;
                reply(&client, msg.reply, &answer).await;
            }
        }
    }

    info!("Command intake stopped");
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use wayfarer_core::config::SchedulerConfig;
    use wayfarer_core::events::EventBus;
    use wayfarer_core::memory::MemoryBackend;
    use wayfarer_types::Faction;
    use wayfarer_world::{RoutePlanner, ZoneTracker};

    use super::*;

    fn intake() -> (Arc<MemoryBackend>, Intake<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::new());
        let map = Arc::new(MapHandle::default());
        let planner = Arc::new(RoutePlanner::default());
        let service = Arc::new(MovementService::new(
            Arc::clone(&backend),
            Arc::clone(&map),
            Arc::clone(&planner),
            Arc::new(ZoneTracker::new()),
            EventBus::new(),
        ));
        let control = Arc::new(SchedulerControl::new(&SchedulerConfig::default()));
        (
            backend,
            Intake::new(service, control, map, planner, Arc::new(MapSource::Empty)),
        )
    }

    #[tokio::test]
    async fn move_command_starts_a_walk() {
        let (backend, intake) = intake();
        let actor = ActorId::new();
        backend.add_actor(actor, Point::new(0.0, 0.0), Faction::from("alpha"));

        let payload = format!(r#"{{"command":"move","actor_id":"{actor}","target":{{"x":50,"y":0}}}}"#);
        let reply = intake.handle_payload(payload.as_bytes()).await;

        assert!(
            matches!(reply, Reply::Started(ref s) if s.destination == Point::new(50.0, 0.0) && s.total_steps == 3),
            "unexpected reply {reply:?}"
        );
    }

    #[tokio::test]
    async fn unknown_actor_is_rejected_with_a_code() {
        let (_, intake) = intake();
        let reply = intake
            .handle(Command::Stop { actor_id: ActorId::new() })
            .await;
        assert_eq!(reply, Reply::Stopped { interrupted: Vec::new() });

        let reply = intake
            .handle(Command::Teleport {
                actor_id: ActorId::new(),
                position: Point::new(1.0, 1.0),
            })
            .await;
        assert!(matches!(reply, Reply::Rejected { ref code, .. } if code == "actor_not_found"));
    }

    #[tokio::test]
    async fn teleport_is_refused_while_walking() {
        let (backend, intake) = intake();
        let actor = ActorId::new();
        backend.add_actor(actor, Point::new(0.0, 0.0), Faction::from("alpha"));
        intake
            .handle(Command::Move(MovementRequest {
                actor_id: actor,
                target: Point::new(100.0, 0.0),
                faction: None,
                collectible: None,
            }))
            .await;

        let reply = intake
            .handle(Command::Teleport {
                actor_id: actor,
                position: Point::new(5.0, 5.0),
            })
            .await;
        assert!(matches!(reply, Reply::Rejected { ref code, .. } if code == "actor_walking"));

        let reply = intake.handle(Command::Stop { actor_id: actor }).await;
        assert!(matches!(reply, Reply::Stopped { ref interrupted } if interrupted.len() == 1));

        let reply = intake
            .handle(Command::Teleport {
                actor_id: actor,
                position: Point::new(5.0, 5.0),
            })
            .await;
        assert_eq!(reply, Reply::Teleported { position: Point::new(5.0, 5.0) });
    }

    #[tokio::test]
    async fn scheduler_commands_update_control() {
        let (_, intake) = intake();

        let reply = intake.handle_payload(br#"{"command":"pause"}"#).await;
        assert!(matches!(reply, Reply::Scheduler(ref s) if s.paused));

        let reply = intake.handle_payload(br#"{"command":"set_tick_interval","ms":250}"#).await;
        assert!(matches!(reply, Reply::Scheduler(ref s) if s.tick_interval_ms == 250));

        let reply = intake.handle_payload(br#"{"command":"set_tick_interval","ms":1}"#).await;
        assert!(matches!(reply, Reply::Rejected { ref code, .. } if code == "invalid_interval"));
    }

    #[tokio::test]
    async fn malformed_payload_is_a_bad_request() {
        let (_, intake) = intake();
        let reply = intake.handle_payload(b"{\"command\":\"fly\"}").await;
        assert!(matches!(reply, Reply::Rejected { ref code, .. } if code == "bad_request"));
    }

    #[tokio::test]
    async fn reload_swaps_in_a_new_version() {
        let (_, intake) = intake();
        let before = intake.map.current().version();

        let reply = intake.reload_map().await;

        let current = intake.map.current();
        assert!(current.version() > before);
        assert!(matches!(reply, Reply::MapReloaded { version, .. } if version == current.version()));
        let graph = intake.planner.graph_for(&current);
        assert_eq!(graph.version(), current.version());
    }

    #[test]
    fn replies_are_tagged_by_status() {
        let json = serde_json::to_value(Reply::rejected("no_route", "no route found")).unwrap();
        assert_eq!(json["status"], "rejected");
        assert_eq!(json["code"], "no_route");
    }
}
