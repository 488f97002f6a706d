//! Map data, geometry, and route planning for the Wayfarer movement engine.
//!
//! This crate is pure computation: it knows nothing about storage, clocks,
//! or transports. The movement service in `wayfarer-core` calls into it to
//! validate targets and plan routes.
//!
//! # Modules
//!
//! - [`geometry`] -- Distances, containment, segment intersection, and
//!   step interpolation.
//! - [`snapshot`] -- Immutable map snapshots normalized from editor exports,
//!   shared through a reloadable [`MapHandle`].
//! - [`region`] -- Whether a faction may enter a point.
//! - [`graph`] -- Waypoint graph with wall-aware links and passage reroutes.
//! - [`planner`] -- Direct, passage, and graph routing into dense steps.
//! - [`zone`] -- Last-known region per actor for zone-change cues.
//! - [`error`] -- Error types for loading and planning.

pub mod error;
pub mod geometry;
pub mod graph;
pub mod planner;
pub mod region;
pub mod snapshot;
pub mod zone;

pub use error::WorldError;
pub use graph::{Passage, PathGraph};
pub use planner::{PlannerSettings, RoutePlanner};
pub use region::{RegionTieBreak, RegionValidator, Validation};
pub use snapshot::{LoadReport, MapHandle, MapSnapshot, RawMap};
pub use zone::{ZoneChange, ZoneTracker};
