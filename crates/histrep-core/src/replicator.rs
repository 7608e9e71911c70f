// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Replicator orchestration.
//!
//! [`Replicator`] owns every process-scoped object (queues, point map,
//! dead-letter file, schedulers, lifecycle) and passes references to the
//! components that need them.
//!
//! # Startup
//!
//! 1. Locate both servers
//! 2. Reconcile point identities
//! 3. Start the dispatch scheduler
//! 4. Realtime: subscribe and start the pump scheduler.
//!    Historical: plan ranges and spawn one worker per range.
//!
//! # Shutdown
//!
//! 1. Lifecycle to `Stopping`
//! 2. Stop the pump scheduler
//! 3. Close the subscription
//! 4. Stop the dispatch scheduler, letting in-flight ticks finish
//! 5. Final dispatch drain
//! 6. Lifecycle to `Stopped`
//!
//! Historical workers are never aborted.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{error, info, warn};

use crate::deadletter::{DeadLetterFile, DEFAULT_DEAD_LETTER_FILE};
use crate::dispatch::{DispatchEngine, DispatchStats};
use crate::error::{PlanError, ReplicatorError, ReplicatorResult};
use crate::historian::HistorianClient;
use crate::lifecycle::{Lifecycle, LifecycleState};
use crate::planner::{PlannerConfig, RangePlanner};
use crate::queue::{RangeQueue, SendQueue};
use crate::realtime::{RealtimeIngestor, DEFAULT_MAX_EVENTS_PER_PUMP};
use crate::reconcile::{PointMap, PointReconciler, ReconcileReport};
use crate::recovery::{HistoricalRecovery, RecoveryHandle, DEFAULT_PAGE_SIZE};
use crate::scheduler::{TickPolicy, TickScheduler};
use crate::types::{DataCollectionMode, PointName, RecoveryPlan, TimeRange};

// =============================================================================
// Settings
// =============================================================================

/// Everything the replicator needs to run.
#[derive(Debug, Clone)]
pub struct ReplicatorSettings {
    /// Collection mode.
    pub mode: DataCollectionMode,
    /// Source server name.
    pub source_server: String,
    /// Destination server name.
    pub destination_server: String,
    /// Configured point names.
    pub points: Vec<PointName>,
    /// Create missing destination points.
    pub allow_create: bool,
    /// Dispatch period.
    pub send_period: Duration,
    /// Dispatch re-entrancy policy.
    pub dispatch_policy: TickPolicy,
    /// Real-time pump period.
    pub read_period: Duration,
    /// Real-time pump re-entrancy policy.
    pub pump_policy: TickPolicy,
    /// Maximum events per pump call.
    pub max_events_per_pump: usize,
    /// Recovery window (historical mode).
    pub window: Option<TimeRange>,
    /// Planner parameters.
    pub planner: PlannerConfig,
    /// Bulk read page size.
    pub page_size: usize,
    /// Dead-letter file path.
    pub dead_letter_path: PathBuf,
}

impl ReplicatorSettings {
    /// Real-time settings with defaults.
    pub fn realtime(
        source_server: impl Into<String>,
        destination_server: impl Into<String>,
        points: Vec<PointName>,
    ) -> Self {
        Self {
            mode: DataCollectionMode::Realtime,
            source_server: source_server.into(),
            destination_server: destination_server.into(),
            points,
            allow_create: false,
            send_period: Duration::from_secs(1),
            dispatch_policy: TickPolicy::default(),
            read_period: Duration::from_secs(1),
            pump_policy: TickPolicy::default(),
            max_events_per_pump: DEFAULT_MAX_EVENTS_PER_PUMP,
            window: None,
            planner: PlannerConfig::default(),
            page_size: DEFAULT_PAGE_SIZE,
            dead_letter_path: PathBuf::from(DEFAULT_DEAD_LETTER_FILE),
        }
    }

    /// Historical settings with defaults.
    pub fn historical(
        source_server: impl Into<String>,
        destination_server: impl Into<String>,
        points: Vec<PointName>,
        window: TimeRange,
    ) -> Self {
        Self {
            mode: DataCollectionMode::Historical,
            window: Some(window),
            ..Self::realtime(source_server, destination_server, points)
        }
    }

    /// Sets the dead-letter path.
    pub fn with_dead_letter_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.dead_letter_path = path.into();
        self
    }

    /// Sets both periods.
    pub fn with_periods(mut self, send_period: Duration, read_period: Duration) -> Self {
        self.send_period = send_period;
        self.read_period = read_period;
        self
    }

    /// Enables destination point creation.
    pub fn with_point_creation(mut self, allow: bool) -> Self {
        self.allow_create = allow;
        self
    }

    /// Checks settings the replicator depends on.
    pub fn validate(&self) -> ReplicatorResult<()> {
        if self.mode == DataCollectionMode::Historical && self.window.is_none() {
            return Err(PlanError::invalid_parameter("window", "required in historical mode").into());
        }
        if self.send_period.is_zero() {
            return Err(PlanError::invalid_parameter("send_period", "must be greater than zero").into());
        }
        if self.read_period.is_zero() {
            return Err(PlanError::invalid_parameter("read_period", "must be greater than zero").into());
        }
        if self.page_size == 0 {
            return Err(PlanError::invalid_parameter("page_size", "must be at least 1").into());
        }
        if self.max_events_per_pump == 0 {
            return Err(PlanError::invalid_parameter("max_events_per_pump", "must be at least 1").into());
        }
        self.planner.validate()?;
        Ok(())
    }
}

/// What startup produced.
#[derive(Debug, Clone)]
pub struct StartupSummary {
    /// Collection mode.
    pub mode: DataCollectionMode,
    /// Number of mapped points.
    pub mapped_points: usize,
    /// Reconciliation outcomes.
    pub reconcile: ReconcileReport,
    /// The recovery plan (historical mode).
    pub plan: Option<RecoveryPlan>,
}

// =============================================================================
// Replicator
// =============================================================================

#[derive(Default)]
struct Components {
    points: Option<Arc<PointMap>>,
    dispatch: Option<Arc<DispatchEngine>>,
    ingestor: Option<Arc<RealtimeIngestor>>,
    recovery: Option<RecoveryHandle>,
}

/// Replicates data from a source historian to a destination historian.
pub struct Replicator {
    settings: ReplicatorSettings,
    source: Arc<dyn HistorianClient>,
    destination: Arc<dyn HistorianClient>,
    lifecycle: Arc<Lifecycle>,
    send_queue: Arc<SendQueue>,
    range_queue: Arc<RangeQueue>,
    dead_letter: Arc<DeadLetterFile>,
    dispatch_scheduler: TickScheduler,
    pump_scheduler: TickScheduler,
    components: Mutex<Components>,
}

impl Replicator {
    /// Creates a replicator over the given clients.
    pub fn new(
        settings: ReplicatorSettings,
        source: Arc<dyn HistorianClient>,
        destination: Arc<dyn HistorianClient>,
    ) -> Self {
        let dispatch_scheduler =
            TickScheduler::new("dispatch", settings.send_period, settings.dispatch_policy);
        let pump_scheduler =
            TickScheduler::new("realtime-pump", settings.read_period, settings.pump_policy);
        let dead_letter = Arc::new(DeadLetterFile::new(&settings.dead_letter_path));

        Self {
            settings,
            source,
            destination,
            lifecycle: Arc::new(Lifecycle::new()),
            send_queue: Arc::new(SendQueue::new()),
            range_queue: Arc::new(RangeQueue::new()),
            dead_letter,
            dispatch_scheduler,
            pump_scheduler,
            components: Mutex::new(Components::default()),
        }
    }

    /// Starts replication.
    ///
    /// On failure everything already started is stopped and the lifecycle
    /// ends in `Stopped`.
    pub async fn start(&self) -> ReplicatorResult<StartupSummary> {
        self.settings.validate()?;
        self.launch().await
    }

    async fn launch(&self) -> ReplicatorResult<StartupSummary> {
        self.lifecycle.start()?;

        info!(
            mode = %self.settings.mode,
            source = %self.settings.source_server,
            destination = %self.settings.destination_server,
            points = self.settings.points.len(),
            "Starting replicator"
        );

        match self.start_inner().await {
            Ok(summary) => {
                info!(
                    mode = %summary.mode,
                    mapped = summary.mapped_points,
                    "Replicator started"
                );
                Ok(summary)
            }
            Err(e) => {
                error!(error = %e, error_type = e.error_type(), "Replicator startup failed");
                self.abort_start().await;
                Err(e)
            }
        }
    }

    async fn abort_start(&self) {
        self.lifecycle.begin_stop();
        self.pump_scheduler.stop().await;

        let ingestor = self.components.lock().ingestor.take();
        if let Some(ingestor) = ingestor {
            if let Err(e) = ingestor.close().await {
                warn!(error = %e, "Failed to close source subscription");
            }
        }

        self.dispatch_scheduler.stop().await;
        self.lifecycle.finish_stop();
    }

    async fn start_inner(&self) -> ReplicatorResult<StartupSummary> {
        let source_server = self
            .source
            .find_server(&self.settings.source_server)
            .await
            .map_err(|e| ReplicatorError::bad_source_server(&self.settings.source_server, e.to_string()))?;
        let destination_server = self
            .destination
            .find_server(&self.settings.destination_server)
            .await
            .map_err(|e| {
                ReplicatorError::bad_destination_server(&self.settings.destination_server, e.to_string())
            })?;

        let reconciliation = PointReconciler::new(
            self.source.clone(),
            self.destination.clone(),
            self.settings.allow_create,
        )
        .reconcile(&source_server, &destination_server, &self.settings.points)
        .await?;
        let points = Arc::new(reconciliation.map);

        let dispatch = Arc::new(DispatchEngine::new(
            self.destination.clone(),
            points.clone(),
            self.send_queue.clone(),
            self.dead_letter.clone(),
        ));
        {
            let mut components = self.components.lock();
            components.points = Some(points.clone());
            components.dispatch = Some(dispatch.clone());
        }

        let tick_engine = dispatch.clone();
        self.dispatch_scheduler.start(move || {
            let engine = tick_engine.clone();
            async move {
                engine.dispatch_once().await;
            }
        })?;

        let mut plan = None;
        match self.settings.mode {
            DataCollectionMode::Realtime => {
                let ingestor = Arc::new(
                    RealtimeIngestor::subscribe(
                        self.source.as_ref(),
                        &source_server,
                        &points,
                        self.send_queue.clone(),
                        self.lifecycle.clone(),
                        self.settings.max_events_per_pump,
                    )
                    .await?,
                );
                self.components.lock().ingestor = Some(ingestor.clone());

                self.pump_scheduler.start(move || {
                    let ingestor = ingestor.clone();
                    async move {
                        if let Err(e) = ingestor.pump_once().await {
                            error!(code = e.code(), error = %e, "Real-time pump failed");
                        }
                    }
                })?;
            }
            DataCollectionMode::Historical => {
                let window = self.settings.window.ok_or_else(|| {
                    PlanError::invalid_parameter("window", "required in historical mode")
                })?;
                let handles = points.source_handles();

                let planned = RangePlanner::new(self.source.clone(), self.settings.planner.clone())
                    .plan_into(window, &handles, &self.range_queue)
                    .await?;

                let recovery = Arc::new(HistoricalRecovery::new(
                    self.source.clone(),
                    handles,
                    self.range_queue.clone(),
                    self.send_queue.clone(),
                    self.settings.page_size,
                ));
                self.components.lock().recovery = Some(recovery.spawn_workers());
                plan = Some(planned);
            }
        }

        Ok(StartupSummary {
            mode: self.settings.mode,
            mapped_points: points.len(),
            reconcile: reconciliation.report,
            plan,
        })
    }

    /// Stops replication.
    ///
    /// Safe to call more than once; only the first call does the work.
    pub async fn stop(&self) -> ReplicatorResult<()> {
        if !self.lifecycle.begin_stop() {
            return Ok(());
        }
        info!("Stopping replicator");

        self.pump_scheduler.stop().await;

        let (ingestor, dispatch) = {
            let components = self.components.lock();
            (components.ingestor.clone(), components.dispatch.clone())
        };

        if let Some(ingestor) = ingestor {
            if let Err(e) = ingestor.close().await {
                warn!(error = %e, "Failed to close source subscription");
            }
        }

        self.dispatch_scheduler.stop().await;

        if let Some(dispatch) = dispatch {
            let outcome = dispatch.dispatch_once().await;
            if !outcome.is_idle() {
                info!(
                    drained = outcome.drained,
                    written = outcome.written,
                    failed = outcome.failures.len(),
                    "Final dispatch drain complete"
                );
            }
        }

        let recovering = self
            .components
            .lock()
            .recovery
            .as_ref()
            .map(|r| !r.is_finished())
            .unwrap_or(false);
        if recovering {
            warn!("Historical recovery workers are still running and will finish independently");
        }

        self.lifecycle.finish_stop();
        info!("Replicator stopped");
        Ok(())
    }

    /// Takes the handle to the historical recovery workers.
    pub fn take_recovery(&self) -> Option<RecoveryHandle> {
        self.components.lock().recovery.take()
    }

    /// Returns the lifecycle state.
    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    /// Returns the settings.
    pub fn settings(&self) -> &ReplicatorSettings {
        &self.settings
    }

    /// Returns the send queue.
    pub fn send_queue(&self) -> &Arc<SendQueue> {
        &self.send_queue
    }

    /// Returns the point map once reconciled.
    pub fn point_map(&self) -> Option<Arc<PointMap>> {
        self.components.lock().points.clone()
    }

    /// Returns dispatch counters once started.
    pub fn dispatch_stats(&self) -> Option<DispatchStats> {
        self.components.lock().dispatch.as_ref().map(|d| d.stats())
    }

    /// Returns `true` while a dispatch tick is executing.
    pub fn is_dispatch_tick_running(&self) -> bool {
        self.dispatch_scheduler.is_tick_running()
    }

    /// Returns `true` while a pump tick is executing.
    pub fn is_pump_tick_running(&self) -> bool {
        self.pump_scheduler.is_tick_running()
    }

    /// Returns the dead-letter file.
    pub fn dead_letter(&self) -> &DeadLetterFile {
        &self.dead_letter
    }
}

impl std::fmt::Debug for Replicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Replicator")
            .field("mode", &self.settings.mode)
            .field("state", &self.state())
            .field("source", &self.source.name())
            .field("destination", &self.destination.name())
            .field("queued", &self.send_queue.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SchedulerError;
    use crate::memory::InMemoryHistorian;
    use crate::types::SampleItem;
    use chrono::{DateTime, TimeZone, Utc};
    use tempfile::TempDir;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).single().unwrap()
    }

    fn names(list: &[&str]) -> Vec<PointName> {
        list.iter().map(|n| PointName::new(*n)).collect()
    }

    fn historians(points: &[&str]) -> (Arc<InMemoryHistorian>, Arc<InMemoryHistorian>) {
        let source = Arc::new(InMemoryHistorian::new());
        let destination = Arc::new(InMemoryHistorian::new());
        source.add_server("src");
        destination.add_server("dst");
        for name in points {
            source.add_point("src", PointName::new(*name));
            destination.add_point("dst", PointName::new(*name));
        }
        (source, destination)
    }

    #[tokio::test(start_paused = true)]
    async fn test_realtime_replication() {
        let dir = TempDir::new().unwrap();
        let (source, destination) = historians(&["A", "B"]);
        let settings = ReplicatorSettings::realtime("src", "dst", names(&["A", "B"]))
            .with_periods(Duration::from_millis(100), Duration::from_millis(50))
            .with_dead_letter_path(dir.path().join("dead.txt"));
        let replicator = Replicator::new(settings, source.clone(), destination.clone());

        let summary = replicator.start().await.unwrap();
        assert_eq!(summary.mapped_points, 2);
        assert_eq!(replicator.state(), LifecycleState::Running);

        for i in 0..3 {
            source.publish("src", SampleItem::good("A", i as f64, at(i)));
        }
        source.publish("src", SampleItem::good("B", 9.0, at(0)));
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert_eq!(destination.samples("dst", &PointName::new("A")).len(), 3);
        assert_eq!(destination.samples("dst", &PointName::new("B")).len(), 1);

        replicator.stop().await.unwrap();
        assert_eq!(replicator.state(), LifecycleState::Stopped);
        assert_eq!(source.open_subscriptions(), 0);
        assert!(!replicator.is_pump_tick_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_drains_pending_items() {
        let dir = TempDir::new().unwrap();
        let (source, destination) = historians(&["A"]);
        let settings = ReplicatorSettings::realtime("src", "dst", names(&["A"]))
            .with_periods(Duration::from_secs(3600), Duration::from_secs(3600))
            .with_dead_letter_path(dir.path().join("dead.txt"));
        let replicator = Replicator::new(settings, source, destination.clone());
        replicator.start().await.unwrap();

        replicator
            .send_queue()
            .push(SampleItem::good("A", 1.0, at(0)));
        replicator.stop().await.unwrap();

        assert_eq!(destination.samples("dst", &PointName::new("A")).len(), 1);
        assert!(replicator.send_queue().is_empty());
    }

    #[tokio::test]
    async fn test_historical_replication() {
        let dir = TempDir::new().unwrap();
        let (source, destination) = historians(&["A", "B"]);
        for name in ["A", "B"] {
            source.insert_samples("src", (0..100).map(|s| SampleItem::good(name, s as f64, at(s))));
        }
        let window = TimeRange::new(at(0), at(100)).unwrap();
        let mut settings = ReplicatorSettings::historical("src", "dst", names(&["A", "B"]), window)
            .with_periods(Duration::from_secs(3600), Duration::from_secs(3600))
            .with_dead_letter_path(dir.path().join("dead.txt"));
        settings.planner = PlannerConfig {
            source_max_rate: 1.0,
            max_range_secs: 40.0,
            ..PlannerConfig::default()
        }
        .with_seed(5);

        let replicator = Replicator::new(settings, source, destination.clone());
        let summary = replicator.start().await.unwrap();
        // 100 events per point, 2 points, 1 event/s over 40s ranges.
        assert_eq!(summary.plan.as_ref().map(RecoveryPlan::len), Some(5));

        let report = replicator.take_recovery().unwrap().wait().await;
        assert_eq!(report.succeeded(), 5);
        assert_eq!(report.items(), 200);

        replicator.stop().await.unwrap();
        assert_eq!(destination.sample_count("dst"), 200);
    }

    #[tokio::test]
    async fn test_bad_servers() {
        let (source, destination) = historians(&["A"]);
        let replicator = Replicator::new(
            ReplicatorSettings::realtime("nowhere", "dst", names(&["A"])),
            source.clone(),
            destination.clone(),
        );
        assert!(matches!(
            replicator.start().await,
            Err(ReplicatorError::BadSourceServer { .. })
        ));
        assert_eq!(replicator.state(), LifecycleState::Stopped);

        let replicator = Replicator::new(
            ReplicatorSettings::realtime("src", "nowhere", names(&["A"])),
            source,
            destination,
        );
        assert!(matches!(
            replicator.start().await,
            Err(ReplicatorError::BadDestinationServer { .. })
        ));
    }

    #[tokio::test]
    async fn test_zero_points_is_fatal() {
        let (source, destination) = historians(&[]);
        let replicator = Replicator::new(
            ReplicatorSettings::realtime("src", "dst", names(&["A"])),
            source,
            destination,
        );
        let err = replicator.start().await.unwrap_err();
        assert!(err.is_configuration());
        assert_eq!(replicator.state(), LifecycleState::Stopped);
        assert!(replicator.point_map().is_none());
    }

    #[tokio::test]
    async fn test_start_twice_and_stop_idempotent() {
        let dir = TempDir::new().unwrap();
        let (source, destination) = historians(&["A"]);
        let settings = ReplicatorSettings::realtime("src", "dst", names(&["A"]))
            .with_dead_letter_path(dir.path().join("dead.txt"));
        let replicator = Replicator::new(settings, source, destination);

        replicator.stop().await.unwrap();
        assert_eq!(replicator.state(), LifecycleState::Created);

        replicator.start().await.unwrap();
        assert!(matches!(
            replicator.start().await,
            Err(ReplicatorError::InvalidState { .. })
        ));

        replicator.stop().await.unwrap();
        replicator.stop().await.unwrap();
        assert_eq!(replicator.state(), LifecycleState::Stopped);
    }

    #[tokio::test]
    async fn test_zero_period_rejected_before_subscribing() {
        let (source, destination) = historians(&["A"]);
        let settings = ReplicatorSettings::realtime("src", "dst", names(&["A"]))
            .with_periods(Duration::from_millis(100), Duration::ZERO);
        let replicator = Replicator::new(settings, source.clone(), destination);

        assert!(matches!(
            replicator.start().await,
            Err(ReplicatorError::Plan(PlanError::InvalidParameter { parameter: "read_period", .. }))
        ));
        assert_eq!(source.open_subscriptions(), 0);
        assert_eq!(replicator.state(), LifecycleState::Created);

        let mut settings = ReplicatorSettings::realtime("src", "dst", names(&["A"]));
        settings.send_period = Duration::ZERO;
        assert!(matches!(
            settings.validate(),
            Err(ReplicatorError::Plan(PlanError::InvalidParameter { parameter: "send_period", .. }))
        ));
    }

    #[tokio::test]
    async fn test_failed_start_closes_subscription() {
        let dir = TempDir::new().unwrap();
        let (source, destination) = historians(&["A"]);
        let settings = ReplicatorSettings::realtime("src", "dst", names(&["A"]))
            .with_periods(Duration::from_millis(100), Duration::ZERO)
            .with_dead_letter_path(dir.path().join("dead.txt"));
        let replicator = Replicator::new(settings, source.clone(), destination);

        // Skips validation so the pump scheduler fails after subscribing.
        let err = replicator.launch().await.unwrap_err();
        assert!(matches!(err, ReplicatorError::Scheduler(SchedulerError::InvalidPeriod { .. })));
        assert_eq!(replicator.state(), LifecycleState::Stopped);
        assert_eq!(source.open_subscriptions(), 0);
        assert!(!replicator.is_dispatch_tick_running());
    }

    #[test]
    fn test_historical_requires_window() {
        let mut settings = ReplicatorSettings::realtime("src", "dst", names(&["A"]));
        settings.mode = DataCollectionMode::Historical;
        assert!(matches!(
            settings.validate(),
            Err(ReplicatorError::Plan(PlanError::InvalidParameter { parameter: "window", .. }))
        ));
    }
}
