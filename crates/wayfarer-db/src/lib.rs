//! Data layer for the Wayfarer movement engine (`Dragonfly` + `PostgreSQL`).
//!
//! `PostgreSQL` is the source of truth for walkers, actor positions,
//! collectible claims, speed effects, and authored map features.
//! `Dragonfly` mirrors the walking set so the scheduler rarely reads
//! `PostgreSQL` on the hot path.
//!
//! ```text
//! Movement request / tick
//!     |
//!     +-- load walking set ----> Dragonfly (DragonflyPool)
//!     |                            miss -> PostgreSQL, then re-prime
//!     |
//!     +-- conditional writes --> PostgreSQL (PostgresPool)
//!         |-- WalkerRepo       (walkers)
//!         |-- ActorRepo        (actors, actor_speed_effects)
//!         |-- CollectibleRepo  (collectibles, compare-and-swap claims)
//!         +-- MapRepo          (map_regions, map_walls, map_paths)
//! ```
//!
//! # Modules
//!
//! - [`dragonfly`] -- `Dragonfly` walker mirror and speed cache
//! - [`postgres`] -- `PostgreSQL` connection pool and migrations
//! - [`walker_repo`] -- Walker rows
//! - [`actor_repo`] -- Actor rows and speed effects
//! - [`collectible_repo`] -- Collectible rows and claims
//! - [`map_repo`] -- Map feature rows
//! - [`error`] -- Shared error types

pub mod actor_repo;
pub mod collectible_repo;
pub mod dragonfly;
pub mod error;
pub mod map_repo;
pub mod postgres;
pub mod walker_repo;

pub use actor_repo::{ActorRepo, ActorRow};
pub use collectible_repo::{CollectibleRepo, CollectibleRow};
pub use dragonfly::DragonflyPool;
pub use error::DbError;
pub use map_repo::MapRepo;
pub use postgres::{PostgresConfig, PostgresPool};
pub use walker_repo::{WalkerRepo, WalkerRow};
