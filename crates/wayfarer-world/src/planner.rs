//! Route planning: turn a start and a target into a dense list of steps.
//!
//! Policy, in order:
//!
//! 1. Short, wall-clear trips walk a straight line. So does any wall-clear
//!    trip on a map without paths.
//! 2. A straight line blocked by walls first tries the cheapest passage
//!    through one of them whose entry is visible from the start and whose
//!    exit sees the target, leaving it early as soon as the target is close
//!    and visible.
//! 3. Everything else is a Dijkstra search over the [`PathGraph`], attached
//!    at the nearest visible nodes around the search start and the target.
//!
//! The result always begins with the start point, ends exactly at the
//! target, and has no gap longer than the configured step distance.

use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;
use wayfarer_types::{Faction, Point};

use crate::error::WorldError;
use crate::geometry::{crosses_wall, distance, first_blocking_wall, interpolate_steps, is_clear, same_point};
use crate::graph::{PathGraph, cheapest_passage, passage_legs_clear, paths_crossing};
use crate::region::RegionValidator;
use crate::snapshot::MapSnapshot;

/// Distance between consecutive interpolated steps.
pub const DEFAULT_STEP_DISTANCE: f64 = 25.0;
/// Trips shorter than this skip the graph when unobstructed.
pub const DEFAULT_SHORT_TRIP_DISTANCE: f64 = 250.0;
/// Waypoints closer than this are linked in the graph.
pub const DEFAULT_LINK_DISTANCE: f64 = 120.0;
/// How far a start or target may be from its graph node.
pub const DEFAULT_NODE_ATTACH_DISTANCE: f64 = 400.0;

/// Distances that shape generated routes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlannerSettings {
    /// Distance between consecutive interpolated steps.
    pub step_distance: f64,
    /// Direct-line threshold.
    pub short_trip_distance: f64,
    /// Graph link threshold.
    pub link_distance: f64,
    /// Maximum distance from a point to the node it attaches to.
    pub node_attach_distance: f64,
}

impl Default for PlannerSettings {
    fn default() -> Self {
        Self {
            step_distance: DEFAULT_STEP_DISTANCE,
            short_trip_distance: DEFAULT_SHORT_TRIP_DISTANCE,
            link_distance: DEFAULT_LINK_DISTANCE,
            node_attach_distance: DEFAULT_NODE_ATTACH_DISTANCE,
        }
    }
}

/// Accumulates an interpolated route, dropping repeated boundary points.
struct RouteBuilder {
    step: f64,
    points: Vec<Point>,
}

impl RouteBuilder {
    fn new(start: Point, step: f64) -> Self {
        Self {
            step,
            points: vec![start],
        }
    }

    fn last(&self) -> Point {
        self.points.last().copied().unwrap_or_default()
    }

    /// Walk in a straight line from the current end to `to`.
    fn walk_to(&mut self, to: Point) {
        let from = self.last();
        if same_point(from, to) {
            return;
        }
        self.points.extend(interpolate_steps(from, to, self.step));
    }

    fn finish(self) -> Vec<Point> {
        self.points
    }
}

/// Plans routes against a map snapshot.
#[derive(Debug)]
pub struct RoutePlanner {
    settings: PlannerSettings,
    validator: RegionValidator,
    graph: Mutex<Option<Arc<PathGraph>>>,
}

impl RoutePlanner {
    /// Create a planner.
    pub const fn new(settings: PlannerSettings, validator: RegionValidator) -> Self {
        Self {
            settings,
            validator,
            graph: Mutex::new(None),
        }
    }

    /// The distances in effect.
    pub const fn settings(&self) -> &PlannerSettings {
        &self.settings
    }

    /// The region validator in effect.
    pub const fn validator(&self) -> &RegionValidator {
        &self.validator
    }

    /// The path graph for `snapshot`, rebuilt only when the snapshot
    /// version changes.
    ///
    /// The build runs without holding the cache lock, so callers planning
    /// against an already cached version are never held up by it.
    pub fn graph_for(&self, snapshot: &MapSnapshot) -> Arc<PathGraph> {
        if let Some(graph) = self.cached_graph(snapshot.version()) {
            return graph;
        }
        let graph = Arc::new(PathGraph::build(snapshot, self.settings.link_distance));
        debug!(
            version = snapshot.version(),
            nodes = graph.nodes().len(),
            edges = graph.edge_count(),
            "rebuilt path graph"
        );
        let mut cached = self.graph.lock().unwrap_or_else(PoisonError::into_inner);
        if cached.as_ref().is_none_or(|current| current.version() <= graph.version()) {
            *cached = Some(Arc::clone(&graph));
        }
        graph
    }

    fn cached_graph(&self, version: u64) -> Option<Arc<PathGraph>> {
        let cached = self.graph.lock().unwrap_or_else(PoisonError::into_inner);
        cached.as_ref().filter(|graph| graph.version() == version).map(Arc::clone)
    }

    /// Plan a route from `start` to `target` for an actor of `faction`.
    ///
    /// # Errors
    ///
    /// - [`WorldError::InvalidCoordinates`] for non-finite input.
    /// - [`WorldError::InvalidTarget`] when the target region rejects the
    ///   faction.
    /// - [`WorldError::NoPathNetwork`] when no graph node is visible near
    ///   the search start or the target.
    /// - [`WorldError::NoRoute`] when the graph does not connect them.
    pub fn plan(
        &self,
        snapshot: &MapSnapshot,
        start: Point,
        target: Point,
        faction: &Faction,
    ) -> Result<Vec<Point>, WorldError> {
        for p in [start, target] {
            if !p.is_finite() {
                return Err(WorldError::InvalidCoordinates { x: p.x, y: p.y });
            }
        }

        let verdict = self.validator.validate(snapshot.regions(), target, faction);
        if !verdict.allowed {
            return Err(WorldError::InvalidTarget {
                reason: verdict.reason.unwrap_or_default(),
            });
        }

        let walls = snapshot.walls();
        let short = self.settings.short_trip_distance;
        let mut route = RouteBuilder::new(start, self.settings.step_distance);

        let blocking = first_blocking_wall(start, target, walls);
        if blocking.is_none() && (distance(start, target) < short || snapshot.paths().is_empty()) {
            route.walk_to(target);
            return Ok(route.finish());
        }

        let mut search_start = start;
        if blocking.is_some() {
            let paths = snapshot.paths();
            let mut candidates: Vec<usize> = walls
                .iter()
                .filter(|wall| crosses_wall(start, target, wall))
                .flat_map(|wall| paths_crossing(paths, wall))
                .collect();
            candidates.sort_unstable();
            candidates.dedup();
            let passage = cheapest_passage(paths, &candidates, start, target, |p| {
                passage_legs_clear(paths, walls, p, start, target)
            });

            if let Some((passage, _)) = passage {
                debug!(path = passage.path, "routing through passage");
                for waypoint in passage.points(paths) {
                    route.walk_to(waypoint);
                    if distance(waypoint, target) < short && is_clear(waypoint, target, walls) {
                        route.walk_to(target);
                        return Ok(route.finish());
                    }
                }
                search_start = route.last();
            }
        }

        let graph = self.graph_for(snapshot);
        let attach = self.settings.node_attach_distance;
        let (Some(from_node), Some(to_node)) = (
            graph.nearest_clear_node(search_start, walls, attach),
            graph.nearest_clear_node(target, walls, attach),
        ) else {
            return Err(WorldError::NoPathNetwork);
        };
        let nodes = graph.shortest_path(from_node, to_node).ok_or(WorldError::NoRoute)?;

        let paths = snapshot.paths();
        route.walk_to(graph.position(from_node));
        for pair in nodes.windows(2) {
            let [from, to] = pair else { continue };
            if let Some(passage) = graph.edge(*from, *to).and_then(|e| e.passage) {
                for waypoint in passage.points(paths) {
                    route.walk_to(waypoint);
                }
            }
            route.walk_to(graph.position(*to));
        }
        route.walk_to(target);

        Ok(route.finish())
    }
}

impl Default for RoutePlanner {
    fn default() -> Self {
        Self::new(PlannerSettings::default(), RegionValidator::default())
    }
}
