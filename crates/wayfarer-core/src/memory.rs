//! In-process backend implementing every storage trait.
//!
//! Used by tests and by the engine when it runs without infrastructure
//! (`--memory`). Semantics match the `PostgreSQL`/Dragonfly backend: at most
//! one walking record per actor, conditional progress writes, and
//! compare-and-swap collectible claims. Individual actors can be made to
//! fail to exercise per-walker error isolation.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use wayfarer_types::{
    ActorId, Collectible, Faction, Point, RewardItem, SpawnId, Walker, WalkerId, WalkerStatus,
};

use crate::store::{
    ActorRecord, ActorStore, CollectibleStore, RewardResolver, SpeedModifiers, StoreError,
    WalkerCache, WalkerStore, WriteOutcome,
};

/// Error raised by deliberately failing operations.
#[derive(Debug, thiserror::Error)]
#[error("injected failure for actor {0}")]
pub struct InjectedFailure(pub ActorId);

#[derive(Debug, Default)]
struct State {
    walkers: HashMap<WalkerId, Walker>,
    cache: HashMap<WalkerId, Walker>,
    cache_primed: bool,
    cache_down: bool,
    actors: HashMap<ActorId, ActorRecord>,
    collectibles: HashMap<SpawnId, Collectible>,
    rewards: HashMap<SpawnId, Vec<RewardItem>>,
    speeds: HashMap<ActorId, f64>,
    failing_speeds: HashSet<ActorId>,
    failing_writes: HashSet<ActorId>,
    failing_position_once: HashSet<ActorId>,
}

/// Thread-safe in-memory backend.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: Mutex<State>,
}

impl MemoryBackend {
    /// Create an empty backend with a primed (empty) cache.
    pub fn new() -> Self {
        let backend = Self::default();
        backend.lock().cache_primed = true;
        backend
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // -----------------------------------------------------------------------
    // Seeding and inspection
    // -----------------------------------------------------------------------

    /// Register an actor at `position`.
    pub fn add_actor(&self, actor: ActorId, position: Point, faction: Faction) {
        self.lock().actors.insert(
            actor,
            ActorRecord {
                actor_id: actor,
                position,
                faction,
            },
        );
    }

    /// Register a collectible and the rewards it yields.
    pub fn add_collectible(&self, collectible: Collectible, rewards: Vec<RewardItem>) {
        let mut state = self.lock();
        state.rewards.insert(collectible.spawn_id, rewards);
        state.collectibles.insert(collectible.spawn_id, collectible);
    }

    /// Set an actor's speed modifier.
    pub fn set_speed(&self, actor: ActorId, modifier: f64) {
        self.lock().speeds.insert(actor, modifier);
    }

    /// Make speed lookups for `actor` fail.
    pub fn fail_speed_for(&self, actor: ActorId) {
        self.lock().failing_speeds.insert(actor);
    }

    /// Make durable walker and position writes for `actor` fail.
    pub fn fail_writes_for(&self, actor: ActorId) {
        self.lock().failing_writes.insert(actor);
    }

    /// Make the next position write for `actor` fail, including the one a
    /// finishing walker makes.
    pub fn fail_next_position_write(&self, actor: ActorId) {
        self.lock().failing_position_once.insert(actor);
    }

    /// Drop the cache contents and its populated marker.
    pub fn flush_cache(&self) {
        let mut state = self.lock();
        state.cache.clear();
        state.cache_primed = false;
    }

    /// Make every cache operation fail until called again with `false`.
    pub fn set_cache_down(&self, down: bool) {
        self.lock().cache_down = down;
    }

    /// The durable copy of a walker.
    pub fn walker(&self, walker: WalkerId) -> Option<Walker> {
        self.lock().walkers.get(&walker).cloned()
    }

    /// The cached copy of a walker.
    pub fn cached(&self, walker: WalkerId) -> Option<Walker> {
        self.lock().cache.get(&walker).cloned()
    }

    /// Every durable walker of `actor`, any status.
    pub fn walkers_of(&self, actor: ActorId) -> Vec<Walker> {
        self.lock()
            .walkers
            .values()
            .filter(|w| w.actor_id == actor)
            .cloned()
            .collect()
    }

    /// Current persisted position of `actor`.
    pub fn position_of(&self, actor: ActorId) -> Option<Point> {
        self.lock().actors.get(&actor).map(|a| a.position)
    }

    /// Current state of a collectible.
    pub fn collectible_state(&self, spawn: SpawnId) -> Option<Collectible> {
        self.lock().collectibles.get(&spawn).cloned()
    }
}

fn injected(actor: ActorId) -> StoreError {
    StoreError::durable(InjectedFailure(actor))
}

fn position_write_fails(state: &mut State, actor: ActorId) -> bool {
    state.failing_writes.contains(&actor) || state.failing_position_once.remove(&actor)
}

fn interrupt_in(state: &mut State, actor: ActorId, at: DateTime<Utc>) -> Vec<WalkerId> {
    let mut interrupted = Vec::new();
    for walker in state.walkers.values_mut() {
        if walker.actor_id == actor && walker.status == WalkerStatus::Walking {
            walker.status = WalkerStatus::InterruptedByNewWalk;
            walker.updated_at = at;
            walker.finished_at = Some(at);
            interrupted.push(walker.walker_id);
        }
    }
    interrupted
}

impl WalkerStore for MemoryBackend {
    async fn begin_walk(&self, walker: &Walker) -> Result<Vec<WalkerId>, StoreError> {
        let mut state = self.lock();
        if state.failing_writes.contains(&walker.actor_id) {
            return Err(injected(walker.actor_id));
        }
        let interrupted = interrupt_in(&mut state, walker.actor_id, walker.started_at);
        state.walkers.insert(walker.walker_id, walker.clone());
        Ok(interrupted)
    }

    async fn interrupt_walks(&self, actor: ActorId, at: DateTime<Utc>) -> Result<Vec<WalkerId>, StoreError> {
        let mut state = self.lock();
        if state.failing_writes.contains(&actor) {
            return Err(injected(actor));
        }
        Ok(interrupt_in(&mut state, actor, at))
    }

    async fn active_walkers(&self) -> Result<Vec<Walker>, StoreError> {
        Ok(self
            .lock()
            .walkers
            .values()
            .filter(|w| w.status == WalkerStatus::Walking)
            .cloned()
            .collect())
    }

    async fn active_walker_for(&self, actor: ActorId) -> Result<Option<Walker>, StoreError> {
        Ok(self
            .lock()
            .walkers
            .values()
            .find(|w| w.actor_id == actor && w.status == WalkerStatus::Walking)
            .cloned())
    }

    async fn advance_walker(&self, walker: WalkerId, index: usize, at: DateTime<Utc>) -> Result<WriteOutcome, StoreError> {
        let mut state = self.lock();
        let actor = state.walkers.get(&walker).map(|w| w.actor_id);
        if let Some(actor) = actor
            && state.failing_writes.contains(&actor)
        {
            return Err(injected(actor));
        }
        match state.walkers.get_mut(&walker) {
            Some(w) if w.status == WalkerStatus::Walking => {
                w.current_index = w.current_index.max(index);
                w.updated_at = at;
                Ok(WriteOutcome::Applied)
            }
            _ => Ok(WriteOutcome::Superseded),
        }
    }

    async fn finish_walker(
        &self,
        walker: WalkerId,
        index: usize,
        position: Point,
        at: DateTime<Utc>,
    ) -> Result<WriteOutcome, StoreError> {
        let mut state = self.lock();
        let Some(actor) = state
            .walkers
            .get(&walker)
            .filter(|w| w.status == WalkerStatus::Walking)
            .map(|w| w.actor_id)
        else {
            return Ok(WriteOutcome::Superseded);
        };
        if position_write_fails(&mut state, actor) {
            return Err(injected(actor));
        }
        if let Some(w) = state.walkers.get_mut(&walker) {
            w.current_index = w.current_index.max(index);
            w.status = WalkerStatus::Done;
            w.updated_at = at;
            w.finished_at = Some(at);
        }
        if let Some(record) = state.actors.get_mut(&actor) {
            record.position = position;
        }
        Ok(WriteOutcome::Applied)
    }
}

/// Error raised while the in-memory cache is marked down.
#[derive(Debug, thiserror::Error)]
#[error("cache unavailable")]
pub struct CacheDown;

impl WalkerCache for MemoryBackend {
    async fn cached_walkers(&self) -> Result<Option<Vec<Walker>>, StoreError> {
        let state = self.lock();
        if state.cache_down {
            return Err(StoreError::cache(CacheDown));
        }
        if !state.cache_primed {
            return Ok(None);
        }
        Ok(Some(state.cache.values().cloned().collect()))
    }

    async fn cache_walker(&self, walker: &Walker) -> Result<(), StoreError> {
        let mut state = self.lock();
        if state.cache_down {
            return Err(StoreError::cache(CacheDown));
        }
        state.cache.insert(walker.walker_id, walker.clone());
        Ok(())
    }

    async fn evict_walker(&self, walker: WalkerId, _actor: ActorId) -> Result<(), StoreError> {
        let mut state = self.lock();
        if state.cache_down {
            return Err(StoreError::cache(CacheDown));
        }
        state.cache.remove(&walker);
        Ok(())
    }

    async fn prime_walkers(&self, walkers: &[Walker]) -> Result<(), StoreError> {
        let mut state = self.lock();
        if state.cache_down {
            return Err(StoreError::cache(CacheDown));
        }
        for walker in walkers {
            state.cache.insert(walker.walker_id, walker.clone());
        }
        state.cache_primed = true;
        Ok(())
    }
}

impl ActorStore for MemoryBackend {
    async fn actor(&self, actor: ActorId) -> Result<Option<ActorRecord>, StoreError> {
        Ok(self.lock().actors.get(&actor).cloned())
    }

    async fn set_actor_position(&self, actor: ActorId, position: Point) -> Result<(), StoreError> {
        let mut state = self.lock();
        if position_write_fails(&mut state, actor) {
            return Err(injected(actor));
        }
        if let Some(record) = state.actors.get_mut(&actor) {
            record.position = position;
        }
        Ok(())
    }
}

impl CollectibleStore for MemoryBackend {
    async fn collectible(&self, spawn: SpawnId) -> Result<Option<Collectible>, StoreError> {
        Ok(self.lock().collectibles.get(&spawn).cloned())
    }

    async fn try_claim(&self, spawn: SpawnId, actor: ActorId, at: DateTime<Utc>) -> Result<bool, StoreError> {
        let mut state = self.lock();
        match state.collectibles.get_mut(&spawn) {
            Some(c) if !c.is_claimed() => {
                c.claimed_at = Some(at);
                c.claimed_by = Some(actor);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

impl SpeedModifiers for MemoryBackend {
    async fn speed_modifier(&self, actor: ActorId) -> Result<f64, StoreError> {
        let state = self.lock();
        if state.failing_speeds.contains(&actor) {
            return Err(injected(actor));
        }
        Ok(state.speeds.get(&actor).copied().unwrap_or(0.0))
    }
}

impl RewardResolver for MemoryBackend {
    async fn rewards_for(&self, spawn: SpawnId, _actor: ActorId) -> Result<Vec<RewardItem>, StoreError> {
        Ok(self.lock().rewards.get(&spawn).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn walker_for(actor: ActorId) -> Walker {
        Walker::start(
            actor,
            vec![Point::new(0.0, 0.0), Point::new(10.0, 0.0)],
            None,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn begin_walk_interrupts_previous() {
        let backend = MemoryBackend::new();
        let actor = ActorId::new();
        let first = walker_for(actor);
        let second = walker_for(actor);

        assert!(backend.begin_walk(&first).await.unwrap().is_empty());
        let interrupted = backend.begin_walk(&second).await.unwrap();

        assert_eq!(interrupted, vec![first.walker_id]);
        assert_eq!(
            backend.walker(first.walker_id).unwrap().status,
            WalkerStatus::InterruptedByNewWalk
        );
        let active = backend.active_walker_for(actor).await.unwrap().unwrap();
        assert_eq!(active.walker_id, second.walker_id);
    }

    #[tokio::test]
    async fn writes_to_superseded_walker_do_not_apply() {
        let backend = MemoryBackend::new();
        let actor = ActorId::new();
        let walker = walker_for(actor);
        backend.begin_walk(&walker).await.unwrap();
        backend.interrupt_walks(actor, Utc::now()).await.unwrap();

        let outcome = backend.advance_walker(walker.walker_id, 1, Utc::now()).await.unwrap();
        assert_eq!(outcome, WriteOutcome::Superseded);
        let outcome = backend
            .finish_walker(walker.walker_id, 1, Point::new(25.0, 0.0), Utc::now())
            .await
            .unwrap();
        assert_eq!(outcome, WriteOutcome::Superseded);
        assert_eq!(
            backend.walker(walker.walker_id).unwrap().status,
            WalkerStatus::InterruptedByNewWalk
        );
    }

    #[tokio::test]
    async fn advance_never_lowers_index() {
        let backend = MemoryBackend::new();
        let walker = walker_for(ActorId::new());
        backend.begin_walk(&walker).await.unwrap();
        backend.advance_walker(walker.walker_id, 1, Utc::now()).await.unwrap();
        backend.advance_walker(walker.walker_id, 0, Utc::now()).await.unwrap();
        assert_eq!(backend.walker(walker.walker_id).unwrap().current_index, 1);
    }

    #[tokio::test]
    async fn claim_has_single_winner() {
        let backend = MemoryBackend::new();
        let spawn = SpawnId::new();
        backend.add_collectible(
            Collectible {
                spawn_id: spawn,
                position: Point::new(1.0, 1.0),
                faction: None,
                claimed_at: None,
                claimed_by: None,
            },
            Vec::new(),
        );
        let (a, b) = (ActorId::new(), ActorId::new());
        assert!(backend.try_claim(spawn, a, Utc::now()).await.unwrap());
        assert!(!backend.try_claim(spawn, b, Utc::now()).await.unwrap());
        assert_eq!(backend.collectible_state(spawn).unwrap().claimed_by, Some(a));
    }

    #[tokio::test]
    async fn flushed_cache_reports_miss_until_primed() {
        let backend = MemoryBackend::new();
        assert_eq!(backend.cached_walkers().await.unwrap(), Some(Vec::new()));

        backend.flush_cache();
        assert_eq!(backend.cached_walkers().await.unwrap(), None);

        let walker = walker_for(ActorId::new());
        backend.prime_walkers(std::slice::from_ref(&walker)).await.unwrap();
        assert_eq!(backend.cached_walkers().await.unwrap(), Some(vec![walker]));
    }
}
