//! Scheduler loop runner.
//!
//! [`run_scheduler`] drives [`Scheduler::tick`] on a fixed interval until a
//! stop is requested or the tick limit is reached. Ticks never overlap: the
//! next tick is scheduled only after the previous one returns, and a tick
//! that overruns delays the schedule instead of bursting to catch up.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Interval, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::control::SchedulerControl;
use crate::scheduler::{Scheduler, TickSummary};
use crate::store::Backend;

/// Why the loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// [`SchedulerControl::request_stop`] was called.
    Requested,
    /// The configured tick limit was reached.
    TickLimit,
}

/// Result of a scheduler run.
#[derive(Debug)]
pub struct RunResult {
    /// Why the loop ended.
    pub reason: StopReason,
    /// Ticks attempted, including failed ones.
    pub total_ticks: u64,
    /// The last successful tick summary.
    pub last_summary: Option<TickSummary>,
}

/// Callback invoked after each successful tick.
pub trait TickCallback: Send {
    /// Called with the summary of the tick that just completed.
    fn on_tick(&mut self, summary: &TickSummary);
}

/// A no-op tick callback.
pub struct NoOpCallback;

impl TickCallback for NoOpCallback {
    fn on_tick(&mut self, _summary: &TickSummary) {}
}

fn interval_for(ms: u64) -> Interval {
    let mut interval = tokio::time::interval(Duration::from_millis(ms.max(1)));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// Run the scheduler until stopped.
///
/// A tick that fails to load the walking set is logged and counted; the
/// loop carries on with the next tick.
pub async fn run_scheduler<B: Backend>(
    scheduler: &Scheduler<B>,
    control: &Arc<SchedulerControl>,
    callback: &mut dyn TickCallback,
) -> RunResult {
    let mut total_ticks: u64 = 0;
    let mut last_summary: Option<TickSummary> = None;
    let mut interval_ms = control.tick_interval_ms();
    let mut interval = interval_for(interval_ms);

    info!(
        tick_interval_ms = interval_ms,
        max_ticks = control.max_ticks(),
        "Scheduler starting"
    );

    loop {
        if control.is_paused() {
            info!("Scheduler paused, waiting for resume...");
            control.wait_if_paused().await;
            info!("Scheduler resumed");
            interval.reset();
        }

        if control.is_stop_requested() {
            return finish(StopReason::Requested, total_ticks, last_summary);
        }

        tokio::select! {
            _ = interval.tick() => {}
            () = control.stopped() => {
                return finish(StopReason::Requested, total_ticks, last_summary);
            }
        }
        if control.is_paused() {
            continue;
        }

        total_ticks = total_ticks.saturating_add(1);
        match scheduler.tick().await {
            Ok(summary) => {
                control.record_tick(summary.tick);
                if summary.failed > 0 {
                    warn!(tick = summary.tick, failed = summary.failed, "Tick completed with failures");
                }
                callback.on_tick(&summary);
                last_summary = Some(summary);
            }
            Err(e) => error!(tick = total_ticks, error = %e, "Tick failed"),
        }

        if control.tick_limit_reached(total_ticks) {
            info!(tick = total_ticks, max_ticks = control.max_ticks(), "Tick limit reached");
            return finish(StopReason::TickLimit, total_ticks, last_summary);
        }

        let current = control.tick_interval_ms();
        if current != interval_ms {
            info!(from = interval_ms, to = current, "Tick interval changed");
            interval_ms = current;
            interval = interval_for(interval_ms);
            // The first tick of a fresh interval fires immediately.
            interval.tick().await;
        }
    }
}

fn finish(reason: StopReason, total_ticks: u64, last_summary: Option<TickSummary>) -> RunResult {
    info!(
        reason = ?reason,
        total_ticks,
        last_tick = last_summary.as_ref().map(|s| s.tick),
        "Scheduler stopped"
    );
    RunResult {
        reason,
        total_ticks,
        last_summary,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use wayfarer_types::{ActorId, Faction, Point, WalkerStatus};
    use wayfarer_world::{MapHandle, RoutePlanner, ZoneTracker};

    use super::*;
    use crate::config::SchedulerConfig;
    use crate::events::EventBus;
    use crate::memory::MemoryBackend;
    use crate::movement::{MovementRequest, MovementService};

    struct Counting(Vec<u64>);

    impl TickCallback for Counting {
        fn on_tick(&mut self, summary: &TickSummary) {
            self.0.push(summary.tick);
        }
    }

    fn setup() -> (Arc<MemoryBackend>, MovementService<MemoryBackend>, Scheduler<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::new());
        let map = Arc::new(MapHandle::default());
        let planner = Arc::new(RoutePlanner::default());
        let zones = Arc::new(ZoneTracker::new());
        let events = EventBus::new();
        let service = MovementService::new(
            Arc::clone(&backend),
            Arc::clone(&map),
            Arc::clone(&planner),
            Arc::clone(&zones),
            events.clone(),
        );
        let scheduler = Scheduler::new(Arc::clone(&backend), map, planner, zones, events, 40.0);
        (backend, service, scheduler)
    }

    fn control(max_ticks: u64) -> Arc<SchedulerControl> {
        Arc::new(SchedulerControl::new(&SchedulerConfig {
            tick_interval_ms: 1,
            max_ticks,
        }))
    }

    #[tokio::test]
    async fn stops_at_tick_limit() {
        let (_, _, scheduler) = setup();
        let control = control(5);
        let mut cb = Counting(Vec::new());

        let result = run_scheduler(&scheduler, &control, &mut cb).await;

        assert_eq!(result.reason, StopReason::TickLimit);
        assert_eq!(result.total_ticks, 5);
        assert_eq!(cb.0, vec![1, 2, 3, 4, 5]);
        assert_eq!(control.status().tick, 5);
    }

    #[tokio::test]
    async fn stop_before_start_runs_no_ticks() {
        let (_, _, scheduler) = setup();
        let control = control(0);
        control.request_stop();

        let result = run_scheduler(&scheduler, &control, &mut NoOpCallback).await;

        assert_eq!(result.reason, StopReason::Requested);
        assert_eq!(result.total_ticks, 0);
        assert!(result.last_summary.is_none());
    }

    #[tokio::test]
    async fn stop_request_ends_a_running_loop() {
        let (_, _, scheduler) = setup();
        let control = control(0);
        let stopper = {
            let control = Arc::clone(&control);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                control.request_stop();
            })
        };

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            run_scheduler(&scheduler, &control, &mut NoOpCallback),
        )
        .await
        .unwrap();
        stopper.await.unwrap();

        assert_eq!(result.reason, StopReason::Requested);
        assert!(result.total_ticks > 0);
    }

    #[tokio::test]
    async fn walkers_arrive_under_the_loop() {
        let (backend, service, scheduler) = setup();
        let actor = ActorId::new();
        backend.add_actor(actor, Point::new(0.0, 0.0), Faction::from("alpha"));
        let started = service
            .request_movement(&MovementRequest {
                actor_id: actor,
                target: Point::new(100.0, 0.0),
                faction: None,
                collectible: None,
            })
            .await
            .unwrap();
        let control = control(6);

        let result = run_scheduler(&scheduler, &control, &mut NoOpCallback).await;

        assert_eq!(result.total_ticks, 6);
        assert_eq!(backend.walker(started.walker_id).unwrap().status, WalkerStatus::Done);
        assert_eq!(backend.position_of(actor), Some(Point::new(100.0, 0.0)));
    }
}
