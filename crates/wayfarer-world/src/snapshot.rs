//! Immutable map snapshots and their normalization from editor exports.
//!
//! Map data (regions, walls, paths) is authored in an external editor whose
//! export format has drifted over time: polygons appear under
//! `polygon`, `coordinates`, `points`, or `positions`; points are either
//! `[x, y]` pairs or `{ "x": .., "y": .. }` objects; region owners appear as
//! `owner` or `realm`. [`MapSnapshot::from_raw`] normalizes all of that once
//! so the rest of the engine only ever sees canonical types.
//!
//! Snapshots are shared behind [`MapHandle`], which swaps the current
//! snapshot atomically on reload. Every snapshot carries a process-unique
//! version number; derived structures (the path graph) key their caches on
//! it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use serde::Deserialize;
use tracing::warn;
use wayfarer_types::{Faction, Path, PathId, Point, Region, RegionId, RegionKind, Wall, WallId};

use crate::error::WorldError;

/// Source of snapshot versions. Starts at 1 so 0 never names a real map.
static NEXT_VERSION: AtomicU64 = AtomicU64::new(1);

fn next_version() -> u64 {
    NEXT_VERSION.fetch_add(1, Ordering::Relaxed)
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// One consistent view of the static map.
#[derive(Debug, Clone)]
pub struct MapSnapshot {
    version: u64,
    regions: Vec<Region>,
    walls: Vec<Wall>,
    paths: Vec<Path>,
}

impl MapSnapshot {
    /// Build a snapshot from already-canonical features.
    pub fn new(regions: Vec<Region>, walls: Vec<Wall>, paths: Vec<Path>) -> Self {
        Self {
            version: next_version(),
            regions,
            walls,
            paths,
        }
    }

    /// A snapshot with no map data. Every target is valid and every
    /// straight line is clear.
    pub fn empty() -> Self {
        Self::new(Vec::new(), Vec::new(), Vec::new())
    }

    /// Normalize a raw editor export, skipping features that cannot be
    /// used and reporting what was loaded.
    pub fn from_raw(raw: RawMap) -> (Self, LoadReport) {
        let mut report = LoadReport::default();

        let regions: Vec<Region> = raw
            .regions
            .into_iter()
            .filter_map(|r| r.normalize().map_err(|why| report.skip(why)).ok())
            .collect();
        let walls: Vec<Wall> = raw
            .walls
            .into_iter()
            .filter_map(|w| w.normalize().map_err(|why| report.skip(why)).ok())
            .collect();
        let paths: Vec<Path> = raw
            .paths
            .into_iter()
            .filter_map(|p| p.normalize().map_err(|why| report.skip(why)).ok())
            .collect();

        report.regions = regions.len();
        report.walls = walls.len();
        report.paths = paths.len();

        for reason in &report.skipped {
            warn!(reason = %reason, "skipped malformed map feature");
        }

        (Self::new(regions, walls, paths), report)
    }

    /// Parse and normalize a JSON editor export.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::Json`] when the document itself is not valid
    /// JSON. Individual malformed features are skipped, not rejected.
    pub fn from_json(json: &str) -> Result<(Self, LoadReport), WorldError> {
        let raw: RawMap = serde_json::from_str(json)?;
        Ok(Self::from_raw(raw))
    }

    /// Process-unique version of this snapshot.
    pub const fn version(&self) -> u64 {
        self.version
    }

    /// All regions in authoring order.
    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    /// All walls in authoring order.
    pub fn walls(&self) -> &[Wall] {
        &self.walls
    }

    /// All paths in authoring order.
    pub fn paths(&self) -> &[Path] {
        &self.paths
    }

    /// Whether the snapshot holds no features at all.
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty() && self.walls.is_empty() && self.paths.is_empty()
    }
}

impl Default for MapSnapshot {
    fn default() -> Self {
        Self::empty()
    }
}

/// Counts of loaded features and reasons for skipped ones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Regions kept.
    pub regions: usize,
    /// Walls kept.
    pub walls: usize,
    /// Paths kept.
    pub paths: usize,
    /// One entry per skipped feature.
    pub skipped: Vec<String>,
}

impl LoadReport {
    fn skip(&mut self, reason: String) {
        self.skipped.push(reason);
    }
}

// ---------------------------------------------------------------------------
// Shared handle
// ---------------------------------------------------------------------------

/// The current snapshot, replaceable at runtime.
///
/// Readers get an `Arc` and keep planning against it even if a reload
/// happens mid-request.
#[derive(Debug)]
pub struct MapHandle {
    current: RwLock<Arc<MapSnapshot>>,
}

impl MapHandle {
    /// Wrap an initial snapshot.
    pub fn new(snapshot: MapSnapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    /// The snapshot in effect right now.
    pub fn current(&self) -> Arc<MapSnapshot> {
        let guard = self
            .current
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Arc::clone(&guard)
    }

    /// Install a new snapshot. Returns its version.
    pub fn replace(&self, snapshot: MapSnapshot) -> u64 {
        let version = snapshot.version();
        let mut guard = self
            .current
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *guard = Arc::new(snapshot);
        version
    }
}

impl Default for MapHandle {
    fn default() -> Self {
        Self::new(MapSnapshot::empty())
    }
}

// ---------------------------------------------------------------------------
// Raw editor format
// ---------------------------------------------------------------------------

/// Top-level editor export.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawMap {
    /// Region features.
    #[serde(default)]
    pub regions: Vec<RawRegion>,
    /// Wall features.
    #[serde(default)]
    pub walls: Vec<RawWall>,
    /// Path features.
    #[serde(default)]
    pub paths: Vec<RawPath>,
}

/// A point in either of the two encodings the editor has used.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(untagged)]
pub enum RawPoint {
    /// `[x, y]`
    Pair([f64; 2]),
    /// `{ "x": .., "y": .. }`
    Object {
        /// Horizontal coordinate.
        x: f64,
        /// Vertical coordinate.
        y: f64,
    },
}

impl RawPoint {
    const fn to_point(self) -> Point {
        match self {
            Self::Pair([x, y]) | Self::Object { x, y } => Point::new(x, y),
        }
    }
}

/// Region as exported by the editor.
#[derive(Debug, Clone, Deserialize)]
pub struct RawRegion {
    /// Editor key.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Owning faction. Empty or `"none"` means unowned.
    #[serde(default, alias = "realm")]
    pub owner: Option<String>,
    /// Walkable flag; regions are walkable unless stated otherwise.
    #[serde(default = "default_walkable")]
    pub walkable: bool,
    /// Region type, e.g. `"free_travel"`.
    #[serde(default, alias = "type")]
    pub kind: Option<String>,
    /// Outline.
    #[serde(default, alias = "coordinates", alias = "points", alias = "positions")]
    pub polygon: Vec<RawPoint>,
}

/// Wall as exported by the editor.
#[derive(Debug, Clone, Deserialize)]
pub struct RawWall {
    /// Editor key.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Polyline.
    #[serde(default, alias = "coordinates", alias = "positions")]
    pub points: Vec<RawPoint>,
}

/// Path as exported by the editor.
#[derive(Debug, Clone, Deserialize)]
pub struct RawPath {
    /// Editor key.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Waypoints.
    #[serde(default, alias = "coordinates", alias = "positions")]
    pub points: Vec<RawPoint>,
    /// Loop flag.
    #[serde(default, alias = "loop")]
    pub is_loop: bool,
}

const fn default_walkable() -> bool {
    true
}

fn convert_points(kind: &str, id: &str, raw: &[RawPoint]) -> Result<Vec<Point>, String> {
    let points: Vec<Point> = raw.iter().map(|p| p.to_point()).collect();
    if points.iter().any(|p| !p.is_finite()) {
        return Err(format!("{kind} {id}: non-finite coordinate"));
    }
    Ok(points)
}

fn normalize_owner(owner: Option<String>) -> Option<Faction> {
    owner
        .map(|o| o.trim().to_owned())
        .filter(|o| !o.is_empty() && !o.eq_ignore_ascii_case("none"))
        .map(Faction)
}

fn normalize_kind(kind: Option<&str>) -> RegionKind {
    match kind.map(|k| k.trim().to_ascii_lowercase().replace(['-', ' '], "_")) {
        Some(k) if k == "free_travel" || k == "freetravel" => RegionKind::FreeTravel,
        _ => RegionKind::Standard,
    }
}

impl RawRegion {
    fn normalize(self) -> Result<Region, String> {
        let polygon = convert_points("region", &self.id, &self.polygon)?;
        if polygon.len() < 3 {
            return Err(format!("region {}: polygon needs at least 3 points", self.id));
        }
        Ok(Region {
            kind: normalize_kind(self.kind.as_deref()),
            owner: normalize_owner(self.owner),
            id: RegionId::new(self.id),
            name: self.name,
            walkable: self.walkable,
            polygon,
        })
    }
}

impl RawWall {
    fn normalize(self) -> Result<Wall, String> {
        let points = convert_points("wall", &self.id, &self.points)?;
        if points.len() < 2 {
            return Err(format!("wall {}: needs at least 2 points", self.id));
        }
        Ok(Wall {
            id: WallId::new(self.id),
            name: self.name,
            points,
        })
    }
}

impl RawPath {
    fn normalize(self) -> Result<Path, String> {
        let points = convert_points("path", &self.id, &self.points)?;
        if points.is_empty() {
            return Err(format!("path {}: needs at least 1 point", self.id));
        }
        Ok(Path {
            id: PathId::new(self.id),
            name: self.name,
            points,
            is_loop: self.is_loop,
        })
    }
}
