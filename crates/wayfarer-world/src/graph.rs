//! Waypoint graph built from the map's paths.
//!
//! Every path point becomes a node. Edges join consecutive points of a path
//! and any two points closer than the link distance, unless the straight
//! segment between them crosses a wall. A link blocked by a wall is rerouted
//! through a *passage*: another path that itself crosses that wall. The
//! passage edge is weighted by the full detour and remembers which path to
//! unfold when the planner turns node sequences into waypoints.
//!
//! Construction is O(n^2) in the number of path points. Graphs are cached
//! by snapshot version (see [`crate::planner::RoutePlanner`]).

use wayfarer_types::{Path, Point, Wall};

use crate::geometry::{crosses_wall, distance, is_clear, polyline_length, polylines_cross};
use crate::snapshot::MapSnapshot;

/// A path point in the graph.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GraphNode {
    /// Map position.
    pub position: Point,
    /// Index of the originating path in the snapshot.
    pub path: usize,
    /// Index of the point within that path.
    pub point_index: usize,
}

/// A traversal of a whole path used to get through a wall.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Passage {
    /// Index of the passage path in the snapshot.
    pub path: usize,
    /// Walk the path from its last point to its first.
    pub reversed: bool,
}

impl Passage {
    /// The oriented waypoints of the passage.
    pub fn points(self, paths: &[Path]) -> Vec<Point> {
        let Some(path) = paths.get(self.path) else {
            return Vec::new();
        };
        if self.reversed {
            path.points.iter().rev().copied().collect()
        } else {
            path.points.clone()
        }
    }

    /// Where the passage is entered.
    pub fn entry(self, paths: &[Path]) -> Option<Point> {
        let points = &paths.get(self.path)?.points;
        if self.reversed {
            points.last().copied()
        } else {
            points.first().copied()
        }
    }

    /// Where the passage is left.
    pub fn exit(self, paths: &[Path]) -> Option<Point> {
        let points = &paths.get(self.path)?.points;
        if self.reversed {
            points.first().copied()
        } else {
            points.last().copied()
        }
    }

    /// The same passage walked the other way.
    #[must_use]
    pub const fn flipped(self) -> Self {
        Self {
            path: self.path,
            reversed: !self.reversed,
        }
    }
}

/// A directed half of an undirected edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Edge {
    /// Target node index.
    pub to: usize,
    /// Straight-line distance, or the detour length for passages.
    pub weight: f64,
    /// Set when the edge must be walked through a passage.
    pub passage: Option<Passage>,
}

/// Indices of the paths whose own polyline crosses `wall`.
pub fn paths_crossing(paths: &[Path], wall: &Wall) -> Vec<usize> {
    paths
        .iter()
        .enumerate()
        .filter(|(_, path)| polylines_cross(&path.points, &wall.points))
        .map(|(index, _)| index)
        .collect()
}

/// Cost of going `from` -> passage entry -> along the passage -> exit -> `to`.
pub fn passage_cost(paths: &[Path], passage: Passage, from: Point, to: Point) -> Option<f64> {
    let path = paths.get(passage.path)?;
    let entry = passage.entry(paths)?;
    let exit = passage.exit(paths)?;
    Some(distance(from, entry) + polyline_length(&path.points) + distance(exit, to))
}

/// Whether the legs onto and off `passage` are free of walls: `from` to
/// the entry and the exit to `to`. Only the passage itself may cross one.
pub fn passage_legs_clear(paths: &[Path], walls: &[Wall], passage: Passage, from: Point, to: Point) -> bool {
    passage.entry(paths).is_some_and(|entry| is_clear(from, entry, walls))
        && passage.exit(paths).is_some_and(|exit| is_clear(exit, to, walls))
}

/// The cheapest passage among `candidates` for getting from `from` to `to`,
/// considering both traversal directions of each candidate. `accept` can
/// veto individual options.
pub fn cheapest_passage(
    paths: &[Path],
    candidates: &[usize],
    from: Point,
    to: Point,
    accept: impl Fn(Passage) -> bool,
) -> Option<(Passage, f64)> {
    candidates
        .iter()
        .flat_map(|&path| {
            [false, true].map(|reversed| Passage { path, reversed })
        })
        .filter(|&p| accept(p))
        .filter_map(|p| passage_cost(paths, p, from, to).map(|cost| (p, cost)))
        .min_by(|a, b| a.1.total_cmp(&b.1))
}

/// Undirected weighted waypoint graph.
#[derive(Debug, Clone)]
pub struct PathGraph {
    version: u64,
    nodes: Vec<GraphNode>,
    adjacency: Vec<Vec<Edge>>,
}

impl PathGraph {
    /// Build the graph for a snapshot.
    pub fn build(snapshot: &MapSnapshot, link_distance: f64) -> Self {
        let paths = snapshot.paths();
        let walls = snapshot.walls();

        let nodes: Vec<GraphNode> = paths
            .iter()
            .enumerate()
            .flat_map(|(path, p)| {
                p.points.iter().enumerate().map(move |(point_index, &position)| GraphNode {
                    position,
                    path,
                    point_index,
                })
            })
            .collect();

        let mut graph = Self {
            version: snapshot.version(),
            adjacency: vec![Vec::new(); nodes.len()],
            nodes,
        };

        // Consecutive points of the same path.
        let consecutive: Vec<(usize, usize)> = graph
            .nodes
            .windows(2)
            .enumerate()
            .filter_map(|(a, pair)| match pair {
                [first, second] if first.path == second.path => Some((a, a.saturating_add(1))),
                _ => None,
            })
            .collect();
        for (a, b) in consecutive {
            let (pa, pb) = (graph.position(a), graph.position(b));
            if is_clear(pa, pb, walls) {
                graph.add_edge(a, b, distance(pa, pb), None);
            }
        }

        // Short links between any two points, rerouted through passages
        // when a wall is in the way.
        let crossings: Vec<Vec<usize>> = walls.iter().map(|w| paths_crossing(paths, w)).collect();
        let count = graph.nodes.len();
        for a in 0..count {
            for b in a.saturating_add(1)..count {
                let (pa, pb) = (graph.position(a), graph.position(b));
                let d = distance(pa, pb);
                if d >= link_distance {
                    continue;
                }
                // Any wall the link crosses may be the one a passage gets
                // through; the legs around the passage must be clear.
                let blocking: Vec<&Vec<usize>> = walls
                    .iter()
                    .zip(&crossings)
                    .filter(|(wall, _)| crosses_wall(pa, pb, wall))
                    .map(|(_, crossing)| crossing)
                    .collect();
                if blocking.is_empty() {
                    graph.add_edge(a, b, d, None);
                    continue;
                }
                let mut candidates: Vec<usize> = blocking.into_iter().flatten().copied().collect();
                candidates.sort_unstable();
                candidates.dedup();
                if let Some((passage, cost)) = cheapest_passage(paths, &candidates, pa, pb, |p| {
                    passage_legs_clear(paths, walls, p, pa, pb)
                }) {
                    graph.add_edge(a, b, cost, Some(passage));
                }
            }
        }

        graph
    }

    /// Version of the snapshot this graph was built from.
    pub const fn version(&self) -> u64 {
        self.version
    }

    /// All nodes.
    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    /// Position of node `index`. Out-of-range indices map to the origin.
    pub fn position(&self, index: usize) -> Point {
        self.nodes.get(index).map(|n| n.position).unwrap_or_default()
    }

    /// Outgoing edges of node `index`.
    pub fn edges(&self, index: usize) -> &[Edge] {
        self.adjacency.get(index).map_or(&[], Vec::as_slice)
    }

    /// The edge from `from` to `to`, if one exists.
    pub fn edge(&self, from: usize, to: usize) -> Option<&Edge> {
        self.edges(from).iter().find(|e| e.to == to)
    }

    /// Number of undirected edges.
    pub fn edge_count(&self) -> usize {
        self.adjacency
            .iter()
            .enumerate()
            .map(|(from, edges)| edges.iter().filter(|e| e.to > from).count())
            .sum()
    }

    fn add_edge(&mut self, a: usize, b: usize, weight: f64, passage: Option<Passage>) {
        if a == b || self.edge(a, b).is_some() {
            return;
        }
        if let Some(out) = self.adjacency.get_mut(a) {
            out.push(Edge { to: b, weight, passage });
        }
        if let Some(back) = self.adjacency.get_mut(b) {
            back.push(Edge {
                to: a,
                weight,
                passage: passage.map(Passage::flipped),
            });
        }
    }

    /// The closest node to `point` within `max_distance` whose straight
    /// line to `point` crosses no wall.
    pub fn nearest_clear_node(&self, point: Point, walls: &[Wall], max_distance: f64) -> Option<usize> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (i, distance(point, n.position)))
            .filter(|&(_, d)| d <= max_distance)
            .filter(|&(i, _)| is_clear(point, self.position(i), walls))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(i, _)| i)
    }

    /// Dijkstra from `start` to `goal` using a linear scan for the next
    /// node. Returns the node sequence, both ends inclusive.
    pub fn shortest_path(&self, start: usize, goal: usize) -> Option<Vec<usize>> {
        let n = self.nodes.len();
        if start >= n || goal >= n {
            return None;
        }
        if start == goal {
            return Some(vec![start]);
        }

        let mut dist = vec![f64::INFINITY; n];
        let mut prev: Vec<Option<usize>> = vec![None; n];
        let mut done = vec![false; n];
        if let Some(d) = dist.get_mut(start) {
            *d = 0.0;
        }

        loop {
            let next = dist
                .iter()
                .zip(&done)
                .enumerate()
                .filter(|(_, (d, seen))| !**seen && d.is_finite())
                .min_by(|a, b| (a.1).0.total_cmp((b.1).0))
                .map(|(i, _)| i);
            let u = next?;
            if u == goal {
                break;
            }
            if let Some(flag) = done.get_mut(u) {
                *flag = true;
            }
            let du = dist.get(u).copied().unwrap_or(f64::INFINITY);
            for edge in self.edges(u) {
                let candidate = du + edge.weight;
                if let Some(dv) = dist.get_mut(edge.to)
                    && candidate < *dv
                {
                    *dv = candidate;
                    if let Some(p) = prev.get_mut(edge.to) {
                        *p = Some(u);
                    }
                }
            }
        }

        let mut sequence = vec![goal];
        let mut cursor = goal;
        while let Some(p) = prev.get(cursor).copied().flatten() {
            sequence.push(p);
            cursor = p;
        }
        sequence.reverse();
        Some(sequence)
    }
}
