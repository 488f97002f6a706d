//! Storage seams consumed by the movement service and the scheduler.
//!
//! The durable store is the source of truth for walkers, actor positions,
//! and collectible claims. The walker cache is a low-latency mirror that may
//! be missing, stale, or evicted at any time; callers treat a cache miss as
//! a reason to read the durable store, never as an error.
//!
//! Method names are unique across the traits so a single backend type can
//! implement all of them (see [`Backend`]).

use std::future::Future;

use chrono::{DateTime, Utc};
use wayfarer_types::{ActorId, Collectible, Faction, Point, RewardItem, SpawnId, Walker, WalkerId};

/// Errors surfaced by storage backends.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The durable store failed.
    #[error("durable store error: {source}")]
    Durable {
        /// The underlying backend error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The cache mirror failed.
    #[error("cache error: {source}")]
    Cache {
        /// The underlying backend error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A stored record could not be decoded.
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Wrap a durable backend error.
    pub fn durable(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Durable {
            source: Box::new(source),
        }
    }

    /// Wrap a cache backend error.
    pub fn cache(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Cache {
            source: Box::new(source),
        }
    }
}

/// Result of a write that only applies while a walker is still walking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The walker was walking and the write took effect.
    Applied,
    /// The walker had already finished or been interrupted.
    Superseded,
}

/// What the movement engine needs to know about an actor.
#[derive(Debug, Clone, PartialEq)]
pub struct ActorRecord {
    /// The actor.
    pub actor_id: ActorId,
    /// Last persisted position.
    pub position: Point,
    /// Faction used for region and collectible checks.
    pub faction: Faction,
}

/// Durable walker records.
pub trait WalkerStore: Send + Sync {
    /// Interrupt any walking record of `walker.actor_id`, then insert
    /// `walker`. Both happen atomically. Returns the interrupted ids.
    fn begin_walk(&self, walker: &Walker) -> impl Future<Output = Result<Vec<WalkerId>, StoreError>> + Send;

    /// Interrupt the walking record of `actor` without replacing it.
    fn interrupt_walks(
        &self,
        actor: ActorId,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<WalkerId>, StoreError>> + Send;

    /// Every walker with status `walking`.
    fn active_walkers(&self) -> impl Future<Output = Result<Vec<Walker>, StoreError>> + Send;

    /// The walking record of `actor`, if any.
    fn active_walker_for(&self, actor: ActorId) -> impl Future<Output = Result<Option<Walker>, StoreError>> + Send;

    /// Move a walking record to `index`. Never lowers the stored index.
    fn advance_walker(
        &self,
        walker: WalkerId,
        index: usize,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<WriteOutcome, StoreError>> + Send;

    /// Mark a walking record `done` at `index` and move its actor to
    /// `position`, as one unit: on error neither write is applied, so the
    /// walker is still walking on the next tick.
    fn finish_walker(
        &self,
        walker: WalkerId,
        index: usize,
        position: Point,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<WriteOutcome, StoreError>> + Send;
}

/// Low-latency mirror of walking records.
pub trait WalkerCache: Send + Sync {
    /// All cached walking records, or `None` on a miss (the mirror has not
    /// been populated since the cache last started).
    fn cached_walkers(&self) -> impl Future<Output = Result<Option<Vec<Walker>>, StoreError>> + Send;

    /// Insert or replace one walker.
    fn cache_walker(&self, walker: &Walker) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Drop one walker.
    fn evict_walker(&self, walker: WalkerId, actor: ActorId) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Add `walkers` to the mirror and mark it populated. Entries added
    /// concurrently by [`WalkerCache::cache_walker`] are kept.
    fn prime_walkers(&self, walkers: &[Walker]) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// Actor positions and factions.
pub trait ActorStore: Send + Sync {
    /// Load an actor.
    fn actor(&self, actor: ActorId) -> impl Future<Output = Result<Option<ActorRecord>, StoreError>> + Send;

    /// Persist an actor's position.
    fn set_actor_position(&self, actor: ActorId, position: Point) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// Collectible spawns and their one-time claims.
pub trait CollectibleStore: Send + Sync {
    /// Load a collectible.
    fn collectible(&self, spawn: SpawnId) -> impl Future<Output = Result<Option<Collectible>, StoreError>> + Send;

    /// Record a claim only if nobody has claimed the collectible yet.
    /// Returns `true` for the single winner.
    fn try_claim(
        &self,
        spawn: SpawnId,
        actor: ActorId,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;
}

/// Source of per-actor speed modifiers (equipment and active effects).
pub trait SpeedModifiers: Send + Sync {
    /// The current modifier. Extra steps per tick are `floor(modifier)`.
    fn speed_modifier(&self, actor: ActorId) -> impl Future<Output = Result<f64, StoreError>> + Send;
}

/// Turns a claimed collectible into inventory rewards.
pub trait RewardResolver: Send + Sync {
    /// Rewards for a successful claim of `spawn` by `actor`.
    fn rewards_for(
        &self,
        spawn: SpawnId,
        actor: ActorId,
    ) -> impl Future<Output = Result<Vec<RewardItem>, StoreError>> + Send;
}

/// Everything the movement engine needs from its environment.
pub trait Backend:
    WalkerStore + WalkerCache + ActorStore + CollectibleStore + SpeedModifiers + RewardResolver + 'static
{
}

impl<T> Backend for T where
    T: WalkerStore + WalkerCache + ActorStore + CollectibleStore + SpeedModifiers + RewardResolver + 'static
{
}
