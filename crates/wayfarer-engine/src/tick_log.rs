//! Tick callback that logs scheduler activity.
//!
//! Quiet ticks log at `debug`; ticks that finished walks or failed
//! walkers log at `info`. Running totals are kept for the shutdown
//! summary.

use tracing::{debug, info, warn};
use wayfarer_core::runner::TickCallback;
use wayfarer_core::scheduler::TickSummary;

/// Running totals across a scheduler run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Totals {
    /// Walkers that reached their destination.
    pub arrived: u64,
    /// Successful collectible claims.
    pub collected: u64,
    /// Failed collection attempts.
    pub collection_failed: u64,
    /// Per-walker processing failures.
    pub failed: u64,
    /// Ticks served from the cache mirror.
    pub cache_hits: u64,
}

/// Callback that logs every tick and accumulates [`Totals`].
#[derive(Debug, Default)]
pub struct TickLog {
    totals: Totals,
}

impl TickLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Totals so far.
    pub const fn totals(&self) -> Totals {
        self.totals
    }
}

const fn widen(n: usize) -> u64 {
    n as u64
}

impl TickCallback for TickLog {
    fn on_tick(&mut self, summary: &TickSummary) {
        let t = &mut self.totals;
        t.arrived = t.arrived.saturating_add(widen(summary.arrived));
        t.collected = t.collected.saturating_add(widen(summary.collected));
        t.collection_failed = t.collection_failed.saturating_add(widen(summary.collection_failed));
        t.failed = t.failed.saturating_add(widen(summary.failed));
        if summary.from_cache {
            t.cache_hits = t.cache_hits.saturating_add(1);
        }

        if summary.failed > 0 {
            warn!(
                tick = summary.tick,
                walkers = summary.walkers,
                failed = summary.failed,
                "Tick completed with failed walkers"
            );
        } else if summary.arrived > 0 || summary.superseded > 0 {
            info!(
                tick = summary.tick,
                walkers = summary.walkers,
                arrived = summary.arrived,
                collected = summary.collected,
                collection_failed = summary.collection_failed,
                superseded = summary.superseded,
                "Tick completed"
            );
        } else {
            debug!(
                tick = summary.tick,
                walkers = summary.walkers,
                advanced = summary.advanced,
                from_cache = summary.from_cache,
                "Tick completed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn totals_accumulate_across_ticks() {
        let mut log = TickLog::new();
        log.on_tick(&TickSummary {
            tick: 1,
            walkers: 3,
            from_cache: true,
            advanced: 2,
            arrived: 1,
            collected: 1,
            ..TickSummary::default()
        });
        log.on_tick(&TickSummary {
            tick: 2,
            walkers: 2,
            arrived: 1,
            collection_failed: 1,
            failed: 1,
            ..TickSummary::default()
        });

        assert_eq!(
            log.totals(),
            Totals {
                arrived: 2,
                collected: 1,
                collection_failed: 1,
                failed: 1,
                cache_hits: 1,
            }
        );
    }
}
