//! Per-actor record of the region each actor was last seen in.
//!
//! Used to emit zone-change notifications (music and ambience cues on the
//! client) when a step carries an actor across a region boundary.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use wayfarer_types::{ActorId, RegionId};

/// A region transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneChange {
    /// Region left, `None` when coming from outside every region.
    pub from: Option<RegionId>,
    /// Region entered, `None` when leaving every region.
    pub to: Option<RegionId>,
}

/// Tracks the last known region of every actor.
#[derive(Debug, Default)]
pub struct ZoneTracker {
    zones: Mutex<HashMap<ActorId, Option<RegionId>>>,
}

impl ZoneTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `actor` is now in `region`.
    ///
    /// Returns the transition when the region differs from the last one
    /// recorded. The first observation of an actor only records.
    pub fn observe(&self, actor: ActorId, region: Option<RegionId>) -> Option<ZoneChange> {
        let mut zones = self.zones.lock().unwrap_or_else(PoisonError::into_inner);
        match zones.insert(actor, region.clone()) {
            Some(previous) if previous != region => Some(ZoneChange {
                from: previous,
                to: region,
            }),
            _ => None,
        }
    }

    /// The last region recorded for `actor`.
    pub fn current(&self, actor: ActorId) -> Option<RegionId> {
        let zones = self.zones.lock().unwrap_or_else(PoisonError::into_inner);
        zones.get(&actor).cloned().flatten()
    }

    /// Drop everything known about `actor`. Called when its walk ends, so
    /// the tracker only holds actors that are moving.
    pub fn forget(&self, actor: ActorId) {
        let mut zones = self.zones.lock().unwrap_or_else(PoisonError::into_inner);
        zones.remove(&actor);
    }

    /// Number of actors currently tracked.
    pub fn tracked(&self) -> usize {
        self.zones.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
