//! Core entity structs: map features, walkers, and collectibles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::{RegionKind, WalkerStatus};
use crate::ids::{ActorId, PathId, RegionId, SpawnId, WalkerId, WallId};

// ---------------------------------------------------------------------------
// Geometry
// ---------------------------------------------------------------------------

/// A position on the continuous 2D world map.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Point {
    /// Horizontal map coordinate.
    pub x: f64,
    /// Vertical map coordinate.
    pub y: f64,
}

impl Point {
    /// Create a point from its coordinates.
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Whether both coordinates are finite numbers.
    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// A faction (realm) an actor fights for. Regions and collectibles may be
/// restricted to a single faction.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Faction(pub String);

impl Faction {
    /// Wrap a faction name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Borrow the faction name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Faction {
    fn from(name: &str) -> Self {
        Self(name.to_owned())
    }
}

impl core::fmt::Display for Faction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Static map data
// ---------------------------------------------------------------------------

/// A named polygon of land with an owner and a walkable flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Region {
    /// Editor key.
    pub id: RegionId,
    /// Display name.
    pub name: String,
    /// Owning faction, `None` when unowned.
    pub owner: Option<Faction>,
    /// Whether travelers may stand inside the polygon at all.
    pub walkable: bool,
    /// Special rule set of the region.
    pub kind: RegionKind,
    /// Polygon outline, at least three points, not necessarily convex.
    pub polygon: Vec<Point>,
}

/// An open polyline acting as an obstacle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Wall {
    /// Editor key.
    pub id: WallId,
    /// Display name.
    pub name: String,
    /// Polyline points; every consecutive pair is a blocking segment.
    pub points: Vec<Point>,
}

/// A named chain of traversable waypoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Path {
    /// Editor key.
    pub id: PathId,
    /// Display name.
    pub name: String,
    /// Ordered waypoints, at least one.
    pub points: Vec<Point>,
    /// Whether the chain closes on itself. Not used for planning.
    pub is_loop: bool,
}

// ---------------------------------------------------------------------------
// Walkers
// ---------------------------------------------------------------------------

/// The collectible a walk is meant to pick up on arrival.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct CollectionTarget {
    /// The collectible spawn.
    pub spawn_id: SpawnId,
    /// Where the collectible lies.
    pub position: Point,
}

/// One in-flight movement job of an actor.
///
/// `positions` is the fully interpolated route and never changes after
/// creation; `current_index` only grows and never passes the last index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Walker {
    /// Walker identifier.
    pub walker_id: WalkerId,
    /// The actor being moved.
    pub actor_id: ActorId,
    /// Interpolated route, starting at the actor's position.
    pub positions: Vec<Point>,
    /// Index into `positions` of the actor's current step.
    pub current_index: usize,
    /// Lifecycle status.
    pub status: WalkerStatus,
    /// Collectible to claim on arrival.
    pub collection: Option<CollectionTarget>,
    /// When the walk was created.
    pub started_at: DateTime<Utc>,
    /// When the walk last advanced.
    pub updated_at: DateTime<Utc>,
    /// When the walk reached a terminal state.
    pub finished_at: Option<DateTime<Utc>>,
}

impl Walker {
    /// Create a walking record at index 0.
    pub fn start(
        actor_id: ActorId,
        positions: Vec<Point>,
        collection: Option<CollectionTarget>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            walker_id: WalkerId::new(),
            actor_id,
            positions,
            current_index: 0,
            status: WalkerStatus::Walking,
            collection,
            started_at: now,
            updated_at: now,
            finished_at: None,
        }
    }

    /// Index of the final position.
    pub fn last_index(&self) -> usize {
        self.positions.len().saturating_sub(1)
    }

    /// Number of steps in the route.
    pub fn total_steps(&self) -> usize {
        self.positions.len()
    }

    /// The position at `current_index`, if the route is not empty.
    pub fn current_position(&self) -> Option<Point> {
        self.positions.get(self.current_index).copied()
    }

    /// The final position of the route, if the route is not empty.
    pub fn destination(&self) -> Option<Point> {
        self.positions.last().copied()
    }
}

// ---------------------------------------------------------------------------
// Collectibles
// ---------------------------------------------------------------------------

/// A collectible item spawn that can be claimed exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Collectible {
    /// Spawn identifier.
    pub spawn_id: SpawnId,
    /// Where the collectible lies.
    pub position: Point,
    /// Faction allowed to pick it up, `None` for neutral spawns.
    pub faction: Option<Faction>,
    /// When it was claimed.
    pub claimed_at: Option<DateTime<Utc>>,
    /// Who claimed it.
    pub claimed_by: Option<ActorId>,
}

impl Collectible {
    /// Whether a claim has already been recorded.
    pub const fn is_claimed(&self) -> bool {
        self.claimed_at.is_some() || self.claimed_by.is_some()
    }

    /// Whether an actor of `faction` may pick this collectible up.
    pub fn allows(&self, faction: &Faction) -> bool {
        self.faction.as_ref().is_none_or(|f| f == faction)
    }
}

/// An item awarded for a successful collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct RewardItem {
    /// Item template key understood by the inventory subsystem.
    pub template: String,
    /// Stack size.
    pub quantity: u32,
}
