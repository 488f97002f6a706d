//! Movement service, scheduler, and storage seams for the Wayfarer engine.
//!
//! This crate owns everything that changes over time: walker records,
//! actor positions, and collectible claims. Geometry and routing live in
//! `wayfarer-world`; concrete storage lives in `wayfarer-db`.
//!
//! # Modules
//!
//! - [`config`] -- Configuration loading from `wayfarer-config.yaml`.
//! - [`store`] -- Storage traits ([`Backend`]) the engine runs against.
//! - [`memory`] -- In-process [`Backend`] for tests and `--memory` runs.
//! - [`events`] -- Broadcast bus for outbound [`MovementEvent`]s.
//! - [`movement`] -- Movement requests, stops, and direct position updates.
//! - [`scheduler`] -- The per-tick walker advance and collectible claims.
//! - [`control`] -- Pause, stop, and tick speed shared with the loop.
//! - [`runner`] -- The tick loop.
//!
//! [`Backend`]: store::Backend
//! [`MovementEvent`]: wayfarer_types::MovementEvent

pub mod config;
pub mod control;
pub mod events;
pub mod memory;
pub mod movement;
pub mod runner;
pub mod scheduler;
pub mod store;
