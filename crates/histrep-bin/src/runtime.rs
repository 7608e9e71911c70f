// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Replicator runtime orchestration.
//!
//! The runtime owns everything the process needs for one run:
//!
//! - Configuration and the loaded point list
//! - The historian registry used to build both clients
//! - The [`Replicator`] itself
//! - Graceful shutdown coordination

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{error, info, warn};

use histrep_config::{load_config, load_points, HistrepConfig};
use histrep_core::{
    DispatchStats, HistorianClient, HistorianRegistry, PointName, RecoveryReport, Replicator,
    StartupSummary,
};

use crate::error::{BinError, BinResult};
use crate::shutdown::ShutdownCoordinator;

// =============================================================================
// RunReport
// =============================================================================

/// What one run produced.
#[derive(Debug)]
pub struct RunReport {
    /// Startup outcome.
    pub startup: StartupSummary,
    /// Historical recovery results, when recovery finished during the run.
    pub recovery: Option<RecoveryReport>,
    /// Dispatch counters at shutdown.
    pub dispatch: Option<DispatchStats>,
}

// =============================================================================
// ReplicatorRuntime
// =============================================================================

/// The main runtime that drives one replicator until shutdown.
pub struct ReplicatorRuntime {
    config: Arc<HistrepConfig>,
    points: Vec<PointName>,
    registry: HistorianRegistry,
    shutdown: ShutdownCoordinator,
    exit_when_done: bool,
}

impl ReplicatorRuntime {
    /// Creates a new runtime.
    pub fn new(config: HistrepConfig, points: Vec<PointName>, registry: HistorianRegistry) -> Self {
        Self {
            config: Arc::new(config),
            points,
            registry,
            shutdown: ShutdownCoordinator::new(),
            exit_when_done: false,
        }
    }

    /// Returns after historical recovery finishes instead of waiting for a signal.
    pub fn with_exit_when_done(mut self, enabled: bool) -> Self {
        self.exit_when_done = enabled;
        self
    }

    /// Uses an externally owned shutdown coordinator.
    pub fn with_shutdown(mut self, shutdown: ShutdownCoordinator) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Returns the shutdown coordinator.
    pub fn shutdown(&self) -> &ShutdownCoordinator {
        &self.shutdown
    }

    /// Runs until shutdown is signaled, or until recovery finishes when
    /// `exit_when_done` is set.
    pub async fn run(self) -> BinResult<RunReport> {
        info!("Starting histrep v{}", histrep_core::VERSION);

        let replicator = self.build_replicator()?;
        let startup = replicator.start().await?;
        self.log_startup(&startup);

        let recovery = self.run_main_loop(&replicator).await;

        info!("Shutdown initiated, stopping replicator...");
        replicator.stop().await?;
        let dispatch = replicator.dispatch_stats();

        if let Some(stats) = &dispatch {
            info!(
                written = stats.written,
                failed = stats.failed,
                dead_lettered = stats.dead_lettered,
                "Dispatch totals"
            );
        }
        info!("histrep shutdown complete");

        Ok(RunReport {
            startup,
            recovery,
            dispatch,
        })
    }

    fn build_replicator(&self) -> BinResult<Replicator> {
        let settings = self.config.to_settings(self.points.clone())?;

        let source = self.create_client("source", &self.config.source.historian_config())?;
        let destination =
            self.create_client("destination", &self.config.destination.historian_config())?;

        Ok(Replicator::new(settings, source, destination))
    }

    fn create_client(
        &self,
        endpoint: &str,
        config: &histrep_core::HistorianConfig,
    ) -> BinResult<Arc<dyn HistorianClient>> {
        let client = self.registry.create(config).map_err(|e| {
            BinError::init(format!(
                "Failed to create {} client for backend '{}': {}",
                endpoint, config.backend, e
            ))
        })?;
        info!(endpoint, backend = %config.backend, server = %config.server, "Historian client ready");
        Ok(client)
    }

    fn log_startup(&self, startup: &StartupSummary) {
        let report = &startup.reconcile;
        info!(
            mode = %startup.mode,
            requested = report.requested,
            mapped = startup.mapped_points,
            created = report.created.len(),
            dropped = report.dropped(),
            "histrep is running"
        );
        if let Some(plan) = &startup.plan {
            info!(ranges = plan.len(), window = %plan.window(), "Historical recovery scheduled");
        }
    }

    async fn run_main_loop(&self, replicator: &Replicator) -> Option<RecoveryReport> {
        let Some(recovery) = replicator.take_recovery() else {
            self.shutdown.wait_for_shutdown().await;
            return None;
        };

        if self.exit_when_done {
            info!(workers = recovery.len(), "Waiting for historical recovery to finish");
            return tokio::select! {
                report = recovery.wait() => {
                    log_recovery(&report);
                    Some(report)
                }
                _ = self.shutdown.wait_for_shutdown() => {
                    warn!("Shutdown requested before historical recovery finished");
                    None
                }
            };
        }

        let monitor = tokio::spawn(async move {
            let report = recovery.wait().await;
            log_recovery(&report);
            report
        });

        self.shutdown.wait_for_shutdown().await;

        if monitor.is_finished() {
            monitor.await.ok()
        } else {
            warn!("Historical recovery workers are still running");
            None
        }
    }
}

fn log_recovery(report: &RecoveryReport) {
    if report.failed() > 0 {
        error!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            items = report.items(),
            "Historical recovery finished with failed ranges"
        );
    } else {
        info!(
            ranges = report.succeeded(),
            items = report.items(),
            "Historical recovery finished"
        );
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for constructing the runtime.
pub struct RuntimeBuilder {
    config_path: Option<PathBuf>,
    config: Option<HistrepConfig>,
    points: Option<Vec<PointName>>,
    registry: Option<HistorianRegistry>,
    shutdown: Option<ShutdownCoordinator>,
    exit_when_done: bool,
}

impl RuntimeBuilder {
    /// Creates a new runtime builder.
    pub fn new() -> Self {
        Self {
            config_path: None,
            config: None,
            points: None,
            registry: None,
            shutdown: None,
            exit_when_done: false,
        }
    }

    /// Sets the configuration file path.
    pub fn config_path(mut self, path: impl AsRef<Path>) -> Self {
        self.config_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Sets the configuration directly.
    pub fn config(mut self, config: HistrepConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Sets the point list directly instead of reading the points file.
    pub fn points(mut self, points: Vec<PointName>) -> Self {
        self.points = Some(points);
        self
    }

    /// Sets the historian registry; defaults to every built-in backend.
    pub fn registry(mut self, registry: HistorianRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Sets the shutdown coordinator.
    pub fn shutdown(mut self, shutdown: ShutdownCoordinator) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Returns after historical recovery finishes.
    pub fn exit_when_done(mut self, enabled: bool) -> Self {
        self.exit_when_done = enabled;
        self
    }

    /// Builds the runtime.
    pub fn build(self) -> BinResult<ReplicatorRuntime> {
        let config = match self.config {
            Some(cfg) => cfg,
            None => {
                let path = self
                    .config_path
                    .ok_or_else(|| BinError::config("No configuration provided"))?;

                load_config(&path).map_err(|e| {
                    BinError::from(e).with_context(format!("Failed to load config from {}", path.display()))
                })?
            }
        };

        let points = match self.points {
            Some(points) => points,
            None => load_points(&config.points.file)?,
        };

        let registry = self.registry.unwrap_or_else(HistorianRegistry::with_defaults);

        let mut runtime =
            ReplicatorRuntime::new(config, points, registry).with_exit_when_done(self.exit_when_done);
        if let Some(shutdown) = self.shutdown {
            runtime = runtime.with_shutdown(shutdown);
        }
        Ok(runtime)
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, Utc};
    use histrep_core::DataCollectionMode;
    use std::time::Duration;

    fn memory_config(mode: DataCollectionMode, dir: &Path) -> HistrepConfig {
        let mut config = HistrepConfig::new(mode, "src", "dst", dir.join("points.txt"));
        config.source.options = serde_json::json!({ "points": ["A", "B"] });
        config.destination.options = serde_json::json!({ "points": ["A", "B"] });
        config.dispatch.send_period_ms = 20;
        config.realtime.read_period_ms = 20;
        config.dead_letter.path = dir.join("ValuesInError.txt");
        config
    }

    fn points() -> Vec<PointName> {
        vec![PointName::new("A"), PointName::new("B")]
    }

    #[test]
    fn test_runtime_builder_requires_config() {
        let result = RuntimeBuilder::new().build();
        assert!(matches!(result, Err(BinError::Configuration(_))));
    }

    #[test]
    fn test_runtime_builder_reads_points_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("points.txt"), "A\nB\nA\n").unwrap();

        let runtime = RuntimeBuilder::new()
            .config(memory_config(DataCollectionMode::Realtime, dir.path()))
            .build()
            .unwrap();

        assert_eq!(runtime.points, points());
    }

    #[test]
    fn test_runtime_builder_missing_points_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = RuntimeBuilder::new()
            .config(memory_config(DataCollectionMode::Realtime, dir.path()))
            .build();
        assert!(matches!(result, Err(BinError::Config(_))));
    }

    #[tokio::test]
    async fn test_unknown_backend_is_initialization_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = memory_config(DataCollectionMode::Realtime, dir.path());
        config.source.backend = "pi".to_string();

        let runtime = RuntimeBuilder::new()
            .config(config)
            .points(points())
            .build()
            .unwrap();

        let err = runtime.run().await.unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }

    #[tokio::test]
    async fn test_realtime_run_until_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = RuntimeBuilder::new()
            .config(memory_config(DataCollectionMode::Realtime, dir.path()))
            .points(points())
            .build()
            .unwrap();

        let shutdown = runtime.shutdown().clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            shutdown.initiate_shutdown();
        });

        let report = runtime.run().await.unwrap();
        assert_eq!(report.startup.mode, DataCollectionMode::Realtime);
        assert_eq!(report.startup.mapped_points, 2);
        assert!(report.recovery.is_none());
        assert!(report.dispatch.is_some());
    }

    #[tokio::test]
    async fn test_historical_run_exits_when_done() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = memory_config(DataCollectionMode::Historical, dir.path());
        let end = Utc::now();
        config.historical.start = Some(end - ChronoDuration::hours(1));
        config.historical.end = Some(end);

        let runtime = RuntimeBuilder::new()
            .config(config)
            .points(points())
            .exit_when_done(true)
            .build()
            .unwrap();

        let report = tokio::time::timeout(Duration::from_secs(5), runtime.run())
            .await
            .unwrap()
            .unwrap();

        let plan = report.startup.plan.unwrap();
        assert_eq!(plan.len(), 1);
        let recovery = report.recovery.unwrap();
        assert_eq!(recovery.succeeded(), 1);
        assert_eq!(recovery.items(), 0);
    }

    #[tokio::test]
    async fn test_startup_failure_reports_core_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = memory_config(DataCollectionMode::Realtime, dir.path());
        config.source.options = serde_json::json!({ "points": ["Z"] });

        let runtime = RuntimeBuilder::new()
            .config(config)
            .points(points())
            .build()
            .unwrap();

        match runtime.run().await {
            Err(BinError::Core(e)) => assert!(e.is_configuration()),
            other => panic!("expected reconcile failure, got {:?}", other.map(|_| ())),
        }
    }
}
