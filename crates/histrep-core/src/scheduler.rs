// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Periodic tick scheduling.
//!
//! A [`TickScheduler`] runs an async tick function on a fixed period. It owns
//! cancellation: [`TickScheduler::stop`] stops new ticks and waits for every
//! tick already in flight to finish.
//!
//! # Re-entrancy
//!
//! A tick may take longer than the period. What happens to the next tick is
//! governed by [`TickPolicy`]:
//!
//! - [`TickPolicy::SingleFlight`]: a tick that comes due while the previous
//!   one is still running is skipped and counted.
//! - [`TickPolicy::Overlapping`]: every tick is spawned; ticks may run
//!   concurrently.
//!
//! Either way [`TickScheduler::is_tick_running`] reports whether any tick is
//! currently executing.
//!
//! # Example
//!
//! ```rust,ignore
//! let scheduler = TickScheduler::new("dispatch", Duration::from_secs(1), TickPolicy::SingleFlight);
//! scheduler.start(move || {
//!     let engine = engine.clone();
//!     async move { engine.dispatch_once().await; }
//! })?;
//! // ...
//! scheduler.stop().await;
//! ```

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::error::{SchedulerError, SchedulerResult};

// =============================================================================
// Tick Policy
// =============================================================================

/// What to do when a tick comes due while the previous one is still running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TickPolicy {
    /// Spawn every tick, allowing concurrent ticks.
    Overlapping,
    /// Skip a tick while the previous one is running.
    #[default]
    SingleFlight,
}

impl TickPolicy {
    /// Returns the policy name.
    pub fn as_str(&self) -> &'static str {
        match self {
            TickPolicy::Overlapping => "overlapping",
            TickPolicy::SingleFlight => "single_flight",
        }
    }
}

impl fmt::Display for TickPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TickPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "overlapping" | "overlap" => Ok(TickPolicy::Overlapping),
            "single_flight" | "singleflight" | "serialized" => Ok(TickPolicy::SingleFlight),
            other => Err(format!("unknown tick policy '{}'", other)),
        }
    }
}

// =============================================================================
// Stats
// =============================================================================

/// A snapshot of scheduler counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TickStats {
    /// Ticks spawned.
    pub started: u64,
    /// Ticks that ran to completion.
    pub completed: u64,
    /// Ticks skipped under [`TickPolicy::SingleFlight`].
    pub skipped: u64,
    /// Highest number of ticks observed running at once.
    pub max_concurrent: usize,
}

#[derive(Debug)]
struct SchedulerInner {
    name: String,
    period: Duration,
    policy: TickPolicy,
    in_flight: AtomicUsize,
    max_concurrent: AtomicUsize,
    started: AtomicU64,
    completed: AtomicU64,
    skipped: AtomicU64,
    running: AtomicBool,
    shutdown: Notify,
}

/// Tracks one executing tick; released on drop even if the tick panics.
struct TickGuard {
    inner: Arc<SchedulerInner>,
}

impl TickGuard {
    fn enter(inner: Arc<SchedulerInner>) -> Self {
        let now = inner.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        inner.max_concurrent.fetch_max(now, Ordering::SeqCst);
        inner.started.fetch_add(1, Ordering::Relaxed);
        Self { inner }
    }
}

impl Drop for TickGuard {
    fn drop(&mut self) {
        self.inner.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.inner.completed.fetch_add(1, Ordering::Relaxed);
    }
}

// =============================================================================
// Tick Scheduler
// =============================================================================

/// Runs an async tick function on a fixed period.
pub struct TickScheduler {
    inner: Arc<SchedulerInner>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl TickScheduler {
    /// Creates a stopped scheduler.
    pub fn new(name: impl Into<String>, period: Duration, policy: TickPolicy) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                name: name.into(),
                period,
                policy,
                in_flight: AtomicUsize::new(0),
                max_concurrent: AtomicUsize::new(0),
                started: AtomicU64::new(0),
                completed: AtomicU64::new(0),
                skipped: AtomicU64::new(0),
                running: AtomicBool::new(false),
                shutdown: Notify::new(),
            }),
            handle: Mutex::new(None),
        }
    }

    /// Starts ticking in the background.
    ///
    /// The first tick fires one period after start.
    ///
    /// # Errors
    ///
    /// - `SchedulerError::InvalidPeriod` if the period is zero
    /// - `SchedulerError::AlreadyStarted` if called twice
    pub fn start<F, Fut>(&self, tick: F) -> SchedulerResult<()>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.inner.period.is_zero() {
            return Err(SchedulerError::InvalidPeriod {
                name: self.inner.name.clone(),
                period: self.inner.period,
            });
        }

        let mut handle = self.handle.lock();
        if handle.is_some() {
            return Err(SchedulerError::AlreadyStarted {
                name: self.inner.name.clone(),
            });
        }

        self.inner.running.store(true, Ordering::SeqCst);
        let inner = self.inner.clone();

        *handle = Some(tokio::spawn(async move {
            info!(
                scheduler = %inner.name,
                period_ms = inner.period.as_millis() as u64,
                policy = %inner.policy,
                "Scheduler started"
            );

            let mut interval = tokio::time::interval(inner.period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            interval.tick().await;

            let mut tasks = JoinSet::new();

            loop {
                tokio::select! {
                    biased;
                    _ = inner.shutdown.notified() => break,
                    _ = interval.tick() => {
                        while let Some(result) = tasks.try_join_next() {
                            Self::reap(&inner, result);
                        }
                        if !inner.running.load(Ordering::SeqCst) {
                            break;
                        }

                        if inner.policy == TickPolicy::SingleFlight
                            && inner.in_flight.load(Ordering::SeqCst) > 0
                        {
                            inner.skipped.fetch_add(1, Ordering::Relaxed);
                            debug!(scheduler = %inner.name, "Previous tick still running, skipping");
                            continue;
                        }

                        let guard = TickGuard::enter(inner.clone());
                        let fut = tick();
                        tasks.spawn(async move {
                            let _guard = guard;
                            fut.await;
                        });
                    }
                }
            }

            let pending = tasks.len();
            if pending > 0 {
                debug!(scheduler = %inner.name, pending, "Waiting for in-flight ticks");
            }
            while let Some(result) = tasks.join_next().await {
                Self::reap(&inner, result);
            }

            inner.running.store(false, Ordering::SeqCst);
            info!(scheduler = %inner.name, "Scheduler stopped");
        }));

        Ok(())
    }

    fn reap(inner: &SchedulerInner, result: Result<(), tokio::task::JoinError>) {
        if let Err(e) = result {
            error!(scheduler = %inner.name, error = %e, "Tick task failed");
        }
    }

    /// Stops ticking and waits for in-flight ticks to finish.
    ///
    /// Safe to call more than once and on a scheduler that never started.
    pub async fn stop(&self) {
        self.inner.running.store(false, Ordering::SeqCst);
        self.inner.shutdown.notify_one();

        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(scheduler = %self.inner.name, error = %e, "Scheduler loop failed");
            }
        }
    }

    /// Returns `true` while the scheduler loop is active.
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Returns `true` if any tick is currently executing.
    pub fn is_tick_running(&self) -> bool {
        self.in_flight() > 0
    }

    /// Returns the number of ticks currently executing.
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    /// Returns a snapshot of the counters.
    pub fn stats(&self) -> TickStats {
        TickStats {
            started: self.inner.started.load(Ordering::Relaxed),
            completed: self.inner.completed.load(Ordering::Relaxed),
            skipped: self.inner.skipped.load(Ordering::Relaxed),
            max_concurrent: self.inner.max_concurrent.load(Ordering::SeqCst),
        }
    }

    /// Returns the scheduler name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns the tick period.
    pub fn period(&self) -> Duration {
        self.inner.period
    }

    /// Returns the re-entrancy policy.
    pub fn policy(&self) -> TickPolicy {
        self.inner.policy
    }
}

impl fmt::Debug for TickScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TickScheduler")
            .field("name", &self.inner.name)
            .field("period", &self.inner.period)
            .field("policy", &self.inner.policy)
            .field("running", &self.is_running())
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slow_tick(
        counter: Arc<AtomicU64>,
        duration: Duration,
    ) -> impl Fn() -> std::pin::Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync + 'static {
        move || {
            let counter = counter.clone();
            Box::pin(async move {
                tokio::time::sleep(duration).await;
                counter.fetch_add(1, Ordering::SeqCst);
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_flight_skips_overlapping_ticks() {
        let counter = Arc::new(AtomicU64::new(0));
        let scheduler = TickScheduler::new("test", Duration::from_millis(100), TickPolicy::SingleFlight);
        scheduler
            .start(slow_tick(counter.clone(), Duration::from_millis(250)))
            .unwrap();

        tokio::time::sleep(Duration::from_millis(1_000)).await;
        scheduler.stop().await;

        let stats = scheduler.stats();
        assert_eq!(stats.max_concurrent, 1);
        assert!(stats.skipped > 0);
        assert_eq!(stats.started, stats.completed);
        assert_eq!(counter.load(Ordering::SeqCst), stats.completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_allows_concurrent_ticks() {
        let counter = Arc::new(AtomicU64::new(0));
        let scheduler = TickScheduler::new("test", Duration::from_millis(100), TickPolicy::Overlapping);
        scheduler
            .start(slow_tick(counter.clone(), Duration::from_millis(250)))
            .unwrap();

        tokio::time::sleep(Duration::from_millis(1_000)).await;
        scheduler.stop().await;

        let stats = scheduler.stats();
        assert!(stats.max_concurrent >= 2);
        assert_eq!(stats.skipped, 0);
        assert_eq!(stats.started, stats.completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_is_tick_running() {
        let counter = Arc::new(AtomicU64::new(0));
        let scheduler = TickScheduler::new("test", Duration::from_millis(100), TickPolicy::SingleFlight);
        assert!(!scheduler.is_tick_running());

        scheduler
            .start(slow_tick(counter, Duration::from_millis(500)))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert!(scheduler.is_running());
        assert!(scheduler.is_tick_running());
        assert_eq!(scheduler.in_flight(), 1);

        scheduler.stop().await;
        assert!(!scheduler.is_tick_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_waits_for_in_flight_tick() {
        let counter = Arc::new(AtomicU64::new(0));
        let scheduler = TickScheduler::new("test", Duration::from_millis(100), TickPolicy::SingleFlight);
        scheduler
            .start(slow_tick(counter.clone(), Duration::from_millis(300)))
            .unwrap();

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        scheduler.stop().await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(!scheduler.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_ticks_after_stop() {
        let counter = Arc::new(AtomicU64::new(0));
        let scheduler = TickScheduler::new("test", Duration::from_millis(100), TickPolicy::Overlapping);
        scheduler
            .start(slow_tick(counter.clone(), Duration::from_millis(10)))
            .unwrap();

        tokio::time::sleep(Duration::from_millis(350)).await;
        scheduler.stop().await;
        let after_stop = counter.load(Ordering::SeqCst);
        assert!(after_stop >= 3);

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(counter.load(Ordering::SeqCst), after_stop);
    }

    #[tokio::test]
    async fn test_start_errors() {
        let zero = TickScheduler::new("zero", Duration::ZERO, TickPolicy::SingleFlight);
        assert!(matches!(
            zero.start(|| async {}),
            Err(SchedulerError::InvalidPeriod { .. })
        ));

        let scheduler = TickScheduler::new("twice", Duration::from_secs(60), TickPolicy::SingleFlight);
        scheduler.start(|| async {}).unwrap();
        assert!(matches!(
            scheduler.start(|| async {}),
            Err(SchedulerError::AlreadyStarted { .. })
        ));
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn test_stop_without_start() {
        let scheduler = TickScheduler::new("idle", Duration::from_secs(1), TickPolicy::SingleFlight);
        scheduler.stop().await;
        scheduler.stop().await;
        assert!(!scheduler.is_running());
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!("single_flight".parse::<TickPolicy>().unwrap(), TickPolicy::SingleFlight);
        assert_eq!("single-flight".parse::<TickPolicy>().unwrap(), TickPolicy::SingleFlight);
        assert_eq!("overlapping".parse::<TickPolicy>().unwrap(), TickPolicy::Overlapping);
        assert!("sometimes".parse::<TickPolicy>().is_err());
        assert_eq!(TickPolicy::default(), TickPolicy::SingleFlight);
    }
}
