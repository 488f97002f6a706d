//! The movement tick: advance every walking actor by one or more steps.
//!
//! Each tick loads the walking set (cache first, durable store on a miss),
//! then processes walkers concurrently. Walkers are independent; a failure
//! for one is logged and counted but never stops the others. The only
//! shared mutation is the collectible claim, which the store resolves with
//! a compare-and-swap.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use futures::future::join_all;
use tracing::{debug, warn};
use wayfarer_types::{
    CollectionFailure, CollectionTarget, MovementEvent, Point, PositionBroadcast, StepNotification,
    Walker, WalkerStatus,
};
use wayfarer_world::geometry::distance;
use wayfarer_world::{MapHandle, RoutePlanner, ZoneTracker};

use crate::events::EventBus;
use crate::movement::zone_event;
use crate::store::{Backend, StoreError, WriteOutcome};

/// Speed modifiers above this are treated as this value.
const MAX_EXTRA_STEPS: u32 = 10_000;

/// Errors that abort a whole tick.
#[derive(Debug, thiserror::Error)]
pub enum TickError {
    /// The walking set could not be loaded from either store.
    #[error("failed to load active walkers: {source}")]
    LoadWalkers {
        /// The durable store error.
        #[from]
        source: StoreError,
    },
}

/// Counts for one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickSummary {
    /// Tick number, starting at 1.
    pub tick: u64,
    /// Walkers considered.
    pub walkers: usize,
    /// Whether the walking set came from the cache.
    pub from_cache: bool,
    /// Walkers that moved without arriving.
    pub advanced: usize,
    /// Walkers that reached their destination.
    pub arrived: usize,
    /// Successful collectible claims.
    pub collected: usize,
    /// Arrivals whose collection attempt did not yield rewards.
    pub collection_failed: usize,
    /// Walkers found finished or interrupted since they were loaded.
    pub superseded: usize,
    /// Walkers whose processing failed this tick.
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WalkerOutcome {
    Advanced,
    Arrived { collected: Option<bool> },
    Superseded,
}

impl TickSummary {
    const fn record(&mut self, outcome: WalkerOutcome) {
        match outcome {
            WalkerOutcome::Advanced => self.advanced = self.advanced.saturating_add(1),
            WalkerOutcome::Arrived { collected } => {
                self.arrived = self.arrived.saturating_add(1);
                match collected {
                    Some(true) => self.collected = self.collected.saturating_add(1),
                    Some(false) => self.collection_failed = self.collection_failed.saturating_add(1),
                    None => {}
                }
            }
            WalkerOutcome::Superseded => self.superseded = self.superseded.saturating_add(1),
        }
    }
}

/// Number of route indices to advance for a speed modifier:
/// `1 + floor(modifier)`, with negative or non-finite modifiers counting
/// as zero.
pub fn steps_for(modifier: f64) -> usize {
    if !modifier.is_finite() || modifier <= 0.0 {
        return 1;
    }
    let extra = modifier.floor();
    let extra = if extra >= f64::from(MAX_EXTRA_STEPS) {
        MAX_EXTRA_STEPS
    } else {
        // `extra` is finite, non-negative and below MAX_EXTRA_STEPS.
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let whole = extra as u32;
        whole
    };
    usize::try_from(extra).unwrap_or(0).saturating_add(1)
}

/// Advances walkers. One instance per process.
#[derive(Debug)]
pub struct Scheduler<B> {
    backend: Arc<B>,
    map: Arc<MapHandle>,
    planner: Arc<RoutePlanner>,
    zones: Arc<ZoneTracker>,
    events: EventBus,
    pickup_radius: f64,
    ticks: AtomicU64,
}

impl<B: Backend> Scheduler<B> {
    /// Create a scheduler.
    pub const fn new(
        backend: Arc<B>,
        map: Arc<MapHandle>,
        planner: Arc<RoutePlanner>,
        zones: Arc<ZoneTracker>,
        events: EventBus,
        pickup_radius: f64,
    ) -> Self {
        Self {
            backend,
            map,
            planner,
            zones,
            events,
            pickup_radius,
            ticks: AtomicU64::new(0),
        }
    }

    /// Run one tick.
    ///
    /// # Errors
    ///
    /// Returns [`TickError::LoadWalkers`] when the walking set cannot be
    /// read from the durable store. Per-walker failures are counted in
    /// [`TickSummary::failed`] instead.
    pub async fn tick(&self) -> Result<TickSummary, TickError> {
        let tick = self.ticks.fetch_add(1, Ordering::Relaxed).saturating_add(1);
        let (walkers, from_cache) = self.load_walkers().await?;

        let mut summary = TickSummary {
            tick,
            walkers: walkers.len(),
            from_cache,
            ..TickSummary::default()
        };

        let results = join_all(walkers.iter().map(|w| self.process(w))).await;
        for (walker, result) in walkers.iter().zip(results) {
            match result {
                Ok(outcome) => summary.record(outcome),
                Err(e) => {
                    warn!(
                        tick,
                        walker = %walker.walker_id,
                        actor = %walker.actor_id,
                        error = %e,
                        "walker failed this tick"
                    );
                    summary.failed = summary.failed.saturating_add(1);
                }
            }
        }

        debug!(
            tick,
            walkers = summary.walkers,
            from_cache,
            advanced = summary.advanced,
            arrived = summary.arrived,
            collected = summary.collected,
            failed = summary.failed,
            "tick complete"
        );
        Ok(summary)
    }

    async fn load_walkers(&self) -> Result<(Vec<Walker>, bool), StoreError> {
        match self.backend.cached_walkers().await {
            Ok(Some(walkers)) => return Ok((walkers, true)),
            Ok(None) => debug!("walker cache miss, reading durable store"),
            Err(e) => warn!(error = %e, "walker cache unavailable, reading durable store"),
        }

        let walkers = self.backend.active_walkers().await?;
        if let Err(e) = self.backend.prime_walkers(&walkers).await {
            warn!(error = %e, "failed to repopulate walker cache");
        }
        Ok((walkers, false))
    }

    async fn process(&self, walker: &Walker) -> Result<WalkerOutcome, StoreError> {
        if walker.status != WalkerStatus::Walking {
            self.evict(walker).await;
            return Ok(WalkerOutcome::Superseded);
        }

        let speed = match self.backend.speed_modifier(walker.actor_id).await {
            Ok(speed) => speed,
            Err(e) => {
                warn!(actor = %walker.actor_id, error = %e, "speed modifier unavailable, using base speed");
                0.0
            }
        };

        let last = walker.last_index();
        let next = walker.current_index.saturating_add(steps_for(speed)).min(last);
        let Some(position) = walker.positions.get(next).copied() else {
            warn!(walker = %walker.walker_id, "walker has an empty route");
            return Ok(WalkerOutcome::Superseded);
        };
        let now = Utc::now();

        if next >= last {
            // Position lands with the finish; a failure leaves the walker
            // walking so the next tick retries both.
            if self.backend.finish_walker(walker.walker_id, last, position, now).await? == WriteOutcome::Superseded {
                self.evict(walker).await;
                return Ok(WalkerOutcome::Superseded);
            }
            self.evict(walker).await;
            self.announce(walker, next, position, true);
            self.zones.forget(walker.actor_id);

            let collected = match walker.collection {
                Some(target) => Some(self.collect(walker, target, position).await),
                None => None,
            };
            debug!(actor = %walker.actor_id, walker = %walker.walker_id, "walker arrived");
            return Ok(WalkerOutcome::Arrived { collected });
        }

        if self.backend.advance_walker(walker.walker_id, next, now).await? == WriteOutcome::Superseded {
            self.evict(walker).await;
            return Ok(WalkerOutcome::Superseded);
        }
        self.backend.set_actor_position(walker.actor_id, position).await?;

        let mut advanced = walker.clone();
        advanced.current_index = next;
        advanced.updated_at = now;
        if let Err(e) = self.backend.cache_walker(&advanced).await {
            warn!(walker = %walker.walker_id, error = %e, "failed to update cached walker");
        }
        self.announce(walker, next, position, false);
        Ok(WalkerOutcome::Advanced)
    }

    /// Claim the collectible if the actor stopped close enough. Returns
    /// whether rewards were granted.
    async fn collect(&self, walker: &Walker, target: CollectionTarget, position: Point) -> bool {
        let failed = |reason| MovementEvent::CollectionFailed {
            actor_id: walker.actor_id,
            walker_id: walker.walker_id,
            spawn_id: target.spawn_id,
            reason,
        };

        if distance(position, target.position) > self.pickup_radius {
            self.events.publish(failed(CollectionFailure::OutOfRange));
            return false;
        }

        match self.backend.try_claim(target.spawn_id, walker.actor_id, Utc::now()).await {
            Ok(true) => {
                let items = self
                    .backend
                    .rewards_for(target.spawn_id, walker.actor_id)
                    .await
                    .unwrap_or_else(|e| {
                        warn!(spawn = %target.spawn_id, error = %e, "failed to resolve rewards");
                        Vec::new()
                    });
                self.events.publish(MovementEvent::Collected {
                    actor_id: walker.actor_id,
                    walker_id: walker.walker_id,
                    spawn_id: target.spawn_id,
                    items,
                });
                true
            }
            Ok(false) => {
                let reason = match self.backend.collectible(target.spawn_id).await {
                    Ok(None) => CollectionFailure::Missing,
                    _ => CollectionFailure::AlreadyCollected,
                };
                self.events.publish(failed(reason));
                false
            }
            Err(e) => {
                warn!(spawn = %target.spawn_id, actor = %walker.actor_id, error = %e, "collectible claim failed");
                false
            }
        }
    }

    fn announce(&self, walker: &Walker, index: usize, position: Point, completed: bool) {
        self.events.publish(MovementEvent::Step(StepNotification {
            actor_id: walker.actor_id,
            walker_id: walker.walker_id,
            current_index: index,
            position,
            total_steps: walker.total_steps(),
            completed,
        }));
        self.events.publish(MovementEvent::Position(PositionBroadcast {
            actor_id: walker.actor_id,
            position,
        }));
        let snapshot = self.map.current();
        if let Some(event) = zone_event(&self.zones, &self.planner, &snapshot, walker.actor_id, position) {
            self.events.publish(event);
        }
    }

    async fn evict(&self, walker: &Walker) {
        if let Err(e) = self.backend.evict_walker(walker.walker_id, walker.actor_id).await {
            warn!(walker = %walker.walker_id, error = %e, "failed to evict walker from cache");
        }
    }
}
