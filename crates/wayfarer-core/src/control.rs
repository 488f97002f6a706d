//! Runtime control of the scheduler loop.
//!
//! [`SchedulerControl`] is shared between the loop in [`crate::runner`] and
//! whatever drives it at runtime (the NATS intake, the shutdown signal
//! handler). All fields are atomics so the loop never waits on a lock.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

use crate::config::SchedulerConfig;

/// Smallest accepted tick interval at runtime.
pub const MIN_TICK_INTERVAL_MS: u64 = 50;

/// Shared scheduler control state.
#[derive(Debug)]
pub struct SchedulerControl {
    paused: AtomicBool,
    resume_notify: Notify,
    stop_requested: AtomicBool,
    stop_notify: Notify,
    tick_interval_ms: AtomicU64,
    last_tick: AtomicU64,
    max_ticks: u64,
    started_at: DateTime<Utc>,
}

impl SchedulerControl {
    /// Create control state from configuration.
    pub fn new(config: &SchedulerConfig) -> Self {
        Self {
            paused: AtomicBool::new(false),
            resume_notify: Notify::new(),
            stop_requested: AtomicBool::new(false),
            stop_notify: Notify::new(),
            tick_interval_ms: AtomicU64::new(config.tick_interval_ms.max(1)),
            last_tick: AtomicU64::new(0),
            max_ticks: config.max_ticks,
            started_at: Utc::now(),
        }
    }

    // -----------------------------------------------------------------------
    // Pause / Resume
    // -----------------------------------------------------------------------

    /// Whether ticking is paused.
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// Stop ticking until [`resume`](Self::resume). Walkers keep their
    /// progress; requests are still accepted.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::Release);
    }

    /// Resume ticking and wake the loop.
    pub fn resume(&self) {
        self.paused.store(false, Ordering::Release);
        self.resume_notify.notify_waiters();
    }

    /// Wait until not paused or a stop is requested.
    pub async fn wait_if_paused(&self) {
        while self.is_paused() && !self.is_stop_requested() {
            let resumed = self.resume_notify.notified();
            let stopped = self.stop_notify.notified();
            if !self.is_paused() || self.is_stop_requested() {
                break;
            }
            tokio::select! {
                () = resumed => {}
                () = stopped => {}
            }
        }
    }

    // -----------------------------------------------------------------------
    // Stop
    // -----------------------------------------------------------------------

    /// Request a clean stop. The tick in progress, if any, completes.
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
        self.stop_notify.notify_waiters();
    }

    /// Whether a stop has been requested.
    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    /// Resolve once a stop has been requested.
    pub async fn stopped(&self) {
        loop {
            let notified = self.stop_notify.notified();
            if self.is_stop_requested() {
                return;
            }
            notified.await;
        }
    }

    // -----------------------------------------------------------------------
    // Tick speed
    // -----------------------------------------------------------------------

    /// Current tick interval in milliseconds.
    pub fn tick_interval_ms(&self) -> u64 {
        self.tick_interval_ms.load(Ordering::Acquire)
    }

    /// Change the tick interval. Returns the previous interval, or `None`
    /// when `ms` is below [`MIN_TICK_INTERVAL_MS`].
    pub fn set_tick_interval_ms(&self, ms: u64) -> Option<u64> {
        if ms < MIN_TICK_INTERVAL_MS {
            return None;
        }
        Some(self.tick_interval_ms.swap(ms, Ordering::AcqRel))
    }

    // -----------------------------------------------------------------------
    // Boundaries
    // -----------------------------------------------------------------------

    /// Configured tick limit (0 = unlimited).
    pub const fn max_ticks(&self) -> u64 {
        self.max_ticks
    }

    /// `true` if a tick limit is set and `tick` has reached it.
    pub const fn tick_limit_reached(&self, tick: u64) -> bool {
        self.max_ticks > 0 && tick >= self.max_ticks
    }

    /// Record the number of the tick that just completed.
    pub fn record_tick(&self, tick: u64) {
        self.last_tick.store(tick, Ordering::Release);
    }

    /// Snapshot for status replies.
    pub fn status(&self) -> SchedulerStatus {
        let elapsed = Utc::now().signed_duration_since(self.started_at).num_seconds();
        SchedulerStatus {
            tick: self.last_tick.load(Ordering::Acquire),
            paused: self.is_paused(),
            stop_requested: self.is_stop_requested(),
            tick_interval_ms: self.tick_interval_ms(),
            max_ticks: self.max_ticks,
            elapsed_seconds: u64::try_from(elapsed.max(0)).unwrap_or(u64::MAX),
            started_at: self.started_at.to_rfc3339(),
        }
    }
}

/// JSON-serializable scheduler status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStatus {
    /// Last completed tick.
    pub tick: u64,
    /// Whether ticking is paused.
    pub paused: bool,
    /// Whether a stop has been requested.
    pub stop_requested: bool,
    /// Current tick interval in milliseconds.
    pub tick_interval_ms: u64,
    /// Configured tick limit (0 = unlimited).
    pub max_ticks: u64,
    /// Seconds since the scheduler was created.
    pub elapsed_seconds: u64,
    /// RFC 3339 start time.
    pub started_at: String,
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    fn control(max_ticks: u64) -> SchedulerControl {
        SchedulerControl::new(&SchedulerConfig {
            tick_interval_ms: 500,
            max_ticks,
        })
    }

    #[test]
    fn starts_running() {
        let c = control(0);
        assert!(!c.is_paused());
        assert!(!c.is_stop_requested());
        assert_eq!(c.tick_interval_ms(), 500);
    }

    #[test]
    fn pause_and_resume() {
        let c = control(0);
        c.pause();
        assert!(c.is_paused());
        c.resume();
        assert!(!c.is_paused());
    }

    #[test]
    fn interval_change_is_bounded() {
        let c = control(0);
        assert_eq!(c.set_tick_interval_ms(200), Some(500));
        assert_eq!(c.tick_interval_ms(), 200);
        assert_eq!(c.set_tick_interval_ms(10), None);
        assert_eq!(c.tick_interval_ms(), 200);
    }

    #[test]
    fn zero_tick_limit_is_unlimited() {
        let c = control(0);
        assert!(!c.tick_limit_reached(u64::MAX));

        let c = control(3);
        assert!(!c.tick_limit_reached(2));
        assert!(c.tick_limit_reached(3));
    }

    #[test]
    fn status_reflects_state() {
        let c = control(7);
        c.record_tick(4);
        c.pause();
        let status = c.status();
        assert_eq!(status.tick, 4);
        assert!(status.paused);
        assert_eq!(status.max_ticks, 7);
    }

    #[tokio::test]
    async fn stop_wakes_waiters() {
        let c = Arc::new(control(0));
        let waiter = {
            let c = Arc::clone(&c);
            tokio::spawn(async move { c.stopped().await })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        c.request_stop();
        assert!(tokio::time::timeout(Duration::from_secs(1), waiter).await.is_ok());
    }

    #[tokio::test]
    async fn stop_releases_a_paused_loop() {
        let c = Arc::new(control(0));
        c.pause();
        let waiter = {
            let c = Arc::clone(&c);
            tokio::spawn(async move { c.wait_if_paused().await })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        c.request_stop();
        assert!(tokio::time::timeout(Duration::from_secs(1), waiter).await.is_ok());
    }
}
