// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Test Harness
//!
//! A source and a destination [`InMemoryHistorian`] sharing the same
//! point list, plus a temp directory for the dead-letter file.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use histrep_core::{InMemoryHistorian, PointName, Replicator, ReplicatorSettings, TimeRange};

use super::fixtures::PointFixtures;

/// Source server name used by the harness.
pub const SOURCE_SERVER: &str = "src";

/// Destination server name used by the harness.
pub const DESTINATION_SERVER: &str = "dst";

/// Two in-memory historians wired for replication tests.
pub struct ReplicationHarness {
    /// Source historian.
    pub source: Arc<InMemoryHistorian>,
    /// Destination historian.
    pub destination: Arc<InMemoryHistorian>,
    /// Configured point names.
    pub points: Vec<PointName>,
    temp_dir: TempDir,
}

impl ReplicationHarness {
    /// Create a harness where every point exists on both servers.
    pub fn new(points: &[&str]) -> Self {
        let harness = Self::empty(points);
        for name in &harness.points {
            harness.source.add_point(SOURCE_SERVER, name.clone());
            harness.destination.add_point(DESTINATION_SERVER, name.clone());
        }
        harness
    }

    /// Create a harness with both servers but no points.
    ///
    /// `points` only sets the configured list.
    pub fn empty(points: &[&str]) -> Self {
        let source = Arc::new(InMemoryHistorian::new());
        let destination = Arc::new(InMemoryHistorian::new());
        source.add_server(SOURCE_SERVER);
        destination.add_server(DESTINATION_SERVER);

        Self {
            source,
            destination,
            points: PointFixtures::names(points),
            temp_dir: super::temp_test_dir("histrep-harness"),
        }
    }

    /// Dead-letter file path inside the harness temp directory.
    pub fn dead_letter_path(&self) -> PathBuf {
        self.temp_dir.path().join("ValuesInError.txt")
    }

    /// Dead-letter file content, empty if it was never created.
    pub fn dead_letter_contents(&self) -> String {
        std::fs::read_to_string(self.dead_letter_path()).unwrap_or_default()
    }

    /// Realtime settings with short periods.
    pub fn realtime_settings(&self) -> ReplicatorSettings {
        ReplicatorSettings::realtime(SOURCE_SERVER, DESTINATION_SERVER, self.points.clone())
            .with_periods(Duration::from_millis(100), Duration::from_millis(50))
            .with_dead_letter_path(self.dead_letter_path())
    }

    /// Historical settings whose periodic ticks never fire on their own.
    pub fn historical_settings(&self, window: TimeRange) -> ReplicatorSettings {
        ReplicatorSettings::historical(
            SOURCE_SERVER,
            DESTINATION_SERVER,
            self.points.clone(),
            window,
        )
        .with_periods(Duration::from_secs(3600), Duration::from_secs(3600))
        .with_dead_letter_path(self.dead_letter_path())
    }

    /// Build a replicator over the harness historians.
    pub fn replicator(&self, settings: ReplicatorSettings) -> Replicator {
        Replicator::new(settings, self.source.clone(), self.destination.clone())
    }

    /// Archived sample count for one destination point.
    pub fn destination_count(&self, point: &str) -> usize {
        self.destination
            .samples(DESTINATION_SERVER, &PointName::new(point))
            .len()
    }
}
