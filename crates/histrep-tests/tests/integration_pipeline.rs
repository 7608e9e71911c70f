// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Pipeline Integration Tests
//!
//! End-to-end replication between two in-memory historians:
//!
//! - `test_realtime_*`: subscribe-and-forward
//! - `test_historical_*`: windowed backfill
//! - `test_reconcile_*`: startup point resolution
//! - `test_dead_letter_*`: failed sends

use std::time::Duration;

use tracing::Level;

use histrep_core::{
    DataCollectionMode, LifecycleState, PlannerConfig, PointName, Quality, RecoveryPlan,
    ReplicatorError, Value,
};
use histrep_tests::common::{
    fixtures::{PointFixtures, SampleFixtures, TimeFixtures},
    harness::{ReplicationHarness, DESTINATION_SERVER, SOURCE_SERVER},
    logs::LogCapture,
};

// =============================================================================
// Realtime
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_realtime_forwards_values_quality_and_order() {
    let harness = ReplicationHarness::new(&["FIC101.PV", "PUMP_A.STATUS"]);
    let replicator = harness.replicator(harness.realtime_settings());

    let summary = replicator.start().await.unwrap();
    assert_eq!(summary.mode, DataCollectionMode::Realtime);
    assert_eq!(summary.mapped_points, 2);
    assert!(summary.plan.is_none());

    let flow = PointName::new("FIC101.PV");
    let pump = PointName::new("PUMP_A.STATUS");
    for sample in SampleFixtures::per_second(&flow, 0, 5) {
        harness.source.publish(SOURCE_SERVER, sample);
    }
    harness
        .source
        .publish(SOURCE_SERVER, SampleFixtures::digital(&pump, "Running", 2));
    harness
        .source
        .publish(SOURCE_SERVER, SampleFixtures::questionable(&flow, 99.5, 10));

    tokio::time::sleep(Duration::from_millis(500)).await;
    replicator.stop().await.unwrap();

    let flows = harness.destination.samples(DESTINATION_SERVER, &flow);
    assert_eq!(flows.len(), 6);
    assert!(flows.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    assert_eq!(flows[0].value, Value::Float64(0.0));
    assert_eq!(flows[5].quality, Quality::Questionable);

    let states = harness.destination.samples(DESTINATION_SERVER, &pump);
    assert_eq!(states.len(), 1);
    assert_eq!(states[0].value.as_str(), Some("Running"));
    assert_eq!(states[0].timestamp, TimeFixtures::at(2));

    assert!(harness.dead_letter_contents().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_realtime_ignores_unconfigured_points() {
    let harness = ReplicationHarness::new(&["A"]);
    harness.source.add_point(SOURCE_SERVER, PointName::new("B"));
    harness.destination.add_point(DESTINATION_SERVER, PointName::new("B"));

    let replicator = harness.replicator(harness.realtime_settings());
    replicator.start().await.unwrap();

    for point in ["A", "B"] {
        let name = PointName::new(point);
        for sample in SampleFixtures::per_second(&name, 0, 3) {
            harness.source.publish(SOURCE_SERVER, sample);
        }
    }
    tokio::time::sleep(Duration::from_millis(300)).await;
    replicator.stop().await.unwrap();

    assert_eq!(harness.destination_count("A"), 3);
    assert_eq!(harness.destination_count("B"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_realtime_stop_releases_subscriptions() {
    let harness = ReplicationHarness::new(&["A", "B", "C"]);
    let replicator = harness.replicator(harness.realtime_settings());

    replicator.start().await.unwrap();
    assert_eq!(replicator.state(), LifecycleState::Running);
    assert!(harness.source.open_subscriptions() > 0);

    replicator.stop().await.unwrap();
    assert_eq!(replicator.state(), LifecycleState::Stopped);
    assert_eq!(harness.source.open_subscriptions(), 0);
    assert!(!replicator.is_dispatch_tick_running());
    assert!(!replicator.is_pump_tick_running());
}

// =============================================================================
// Historical
// =============================================================================

#[tokio::test]
async fn test_historical_backfills_window_only() {
    let harness = ReplicationHarness::new(&["A", "B", "C"]);
    for name in &harness.points {
        // Samples before and after the window must stay behind.
        harness
            .source
            .insert_samples(SOURCE_SERVER, SampleFixtures::per_second(name, -20, 160));
    }

    let mut settings = harness.historical_settings(TimeFixtures::window(0, 120));
    settings.planner = PlannerConfig {
        source_max_rate: 2.0,
        max_range_secs: 60.0,
        ..PlannerConfig::default()
    }
    .with_seed(11);

    let replicator = harness.replicator(settings);
    let summary = replicator.start().await.unwrap();
    let plan = summary.plan.clone().expect("historical mode has a plan");
    assert_eq!(plan.window(), TimeFixtures::window(0, 120));
    assert!(plan.len() >= 2);

    let report = replicator.take_recovery().unwrap().wait().await;
    assert_eq!(report.failed(), 0);
    assert_eq!(report.succeeded(), plan.len());
    assert_eq!(report.items(), 360);

    replicator.stop().await.unwrap();

    for name in ["A", "B", "C"] {
        let samples = harness
            .destination
            .samples(DESTINATION_SERVER, &PointName::new(name));
        assert_eq!(samples.len(), 120);
        assert_eq!(samples[0].timestamp, TimeFixtures::at(0));
        assert_eq!(samples[119].timestamp, TimeFixtures::at(119));
    }
}

#[tokio::test]
async fn test_historical_failed_range_does_not_stop_others() {
    let logs = LogCapture::new();
    let _guard = logs.set_default();

    let harness = ReplicationHarness::new(&["A"]);
    let point = PointName::new("A");
    harness
        .source
        .insert_samples(SOURCE_SERVER, SampleFixtures::per_second(&point, 0, 100));
    harness
        .source
        .fail_reads_overlapping(TimeFixtures::window(10, 11));

    let mut settings = harness.historical_settings(TimeFixtures::window(0, 100));
    settings.planner = PlannerConfig {
        source_max_rate: 1.0,
        max_range_secs: 25.0,
        ..PlannerConfig::default()
    }
    .with_seed(3);

    let replicator = harness.replicator(settings);
    let summary = replicator.start().await.unwrap();
    let planned = summary.plan.as_ref().map(RecoveryPlan::len).unwrap_or(0);
    assert!(planned >= 4);

    let report = replicator.take_recovery().unwrap().wait().await;
    replicator.stop().await.unwrap();

    assert!(report.failed() >= 1);
    assert_eq!(report.succeeded() + report.failed(), planned);

    let copied = harness.destination_count("A");
    assert!(copied > 0 && copied < 100);
    assert_eq!(copied, report.items());

    let failures = logs.matching(Level::ERROR, "Failed to recover range");
    assert_eq!(failures.len(), report.failed());
}

#[tokio::test]
async fn test_historical_empty_window_completes() {
    let harness = ReplicationHarness::new(&["A"]);
    let replicator = harness.replicator(harness.historical_settings(TimeFixtures::window(0, 60)));

    let summary = replicator.start().await.unwrap();
    let report = replicator.take_recovery().unwrap().wait().await;
    replicator.stop().await.unwrap();

    assert_eq!(summary.plan.map(|p| p.len()), Some(report.succeeded()));
    assert_eq!(report.items(), 0);
    assert_eq!(harness.destination.sample_count(DESTINATION_SERVER), 0);
}

// =============================================================================
// Reconciliation
// =============================================================================

#[tokio::test]
async fn test_reconcile_creates_missing_destination_points() {
    let harness = ReplicationHarness::empty(&["A", "B"]);
    harness.source.add_point(SOURCE_SERVER, PointName::new("A"));
    harness.source.add_point(SOURCE_SERVER, PointName::new("B"));
    harness.destination.add_point(DESTINATION_SERVER, PointName::new("A"));

    let settings = harness
        .historical_settings(TimeFixtures::window(0, 10))
        .with_point_creation(true);
    let replicator = harness.replicator(settings);

    let summary = replicator.start().await.unwrap();
    replicator.take_recovery().unwrap().wait().await;
    replicator.stop().await.unwrap();

    assert_eq!(summary.mapped_points, 2);
    assert_eq!(summary.reconcile.created, vec![PointName::new("B")]);
    assert_eq!(summary.reconcile.dropped(), 0);
    assert_eq!(harness.destination.point_count(DESTINATION_SERVER), 2);
}

#[tokio::test]
async fn test_reconcile_logs_failures_and_creations_per_endpoint() {
    let logs = LogCapture::new();
    let _guard = logs.set_default();

    let harness = ReplicationHarness::empty(&["A", "B", "C", "TYPO"]);
    for name in ["A", "B", "C"] {
        harness.source.add_point(SOURCE_SERVER, PointName::new(name));
    }
    for name in ["A", "B"] {
        harness.destination.add_point(DESTINATION_SERVER, PointName::new(name));
    }
    harness.source.fail_lookup(PointName::new("B"), "access denied");

    let settings = harness
        .historical_settings(TimeFixtures::window(0, 10))
        .with_point_creation(true);
    let replicator = harness.replicator(settings);
    let summary = replicator.start().await.unwrap();
    replicator.take_recovery().unwrap().wait().await;
    replicator.stop().await.unwrap();

    assert_eq!(summary.mapped_points, 2);
    assert_eq!(summary.reconcile.created, vec![PointName::new("C")]);
    assert_eq!(
        harness.destination.point_names(DESTINATION_SERVER),
        vec![PointName::new("A"), PointName::new("B"), PointName::new("C")]
    );

    let load_failures = logs.matching(Level::ERROR, "Failed to load point");
    let source_failed: Vec<_> = load_failures
        .iter()
        .filter(|e| e.field("endpoint") == Some("source"))
        .filter_map(|e| e.field("point"))
        .collect();
    assert_eq!(source_failed, vec!["B", "TYPO"]);
    assert!(load_failures
        .iter()
        .all(|e| e.field("endpoint") == Some("source")));

    let created = logs.matching(Level::INFO, "Created destination point");
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].field("endpoint"), Some("destination"));
    let destination = format!("\\\\{}", DESTINATION_SERVER);
    assert_eq!(created[0].field("server"), Some(destination.as_str()));
}

#[tokio::test]
async fn test_reconcile_drops_points_missing_on_either_side() {
    let harness = ReplicationHarness::empty(&["A", "B", "C", "A"]);
    for name in ["A", "B"] {
        harness.source.add_point(SOURCE_SERVER, PointName::new(name));
    }
    for name in ["A", "C"] {
        harness.destination.add_point(DESTINATION_SERVER, PointName::new(name));
    }

    let replicator = harness.replicator(harness.historical_settings(TimeFixtures::window(0, 10)));
    let summary = replicator.start().await.unwrap();
    replicator.take_recovery().unwrap().wait().await;
    replicator.stop().await.unwrap();

    assert_eq!(summary.reconcile.requested, 3);
    assert_eq!(summary.mapped_points, 1);
    assert_eq!(summary.reconcile.dropped(), 2);
    assert!(summary.reconcile.created.is_empty());
    // Nothing was created without permission.
    assert_eq!(harness.destination.point_count(DESTINATION_SERVER), 2);
}

#[tokio::test]
async fn test_reconcile_no_common_points_is_fatal() {
    let harness = ReplicationHarness::empty(&["A", "B"]);
    harness.source.add_point(SOURCE_SERVER, PointName::new("A"));
    harness.destination.add_point(DESTINATION_SERVER, PointName::new("B"));

    let replicator = harness.replicator(harness.realtime_settings());
    let err = replicator.start().await.unwrap_err();

    assert!(err.is_configuration());
    assert!(matches!(err, ReplicatorError::Reconcile(_)));
    assert_eq!(replicator.state(), LifecycleState::Stopped);
    assert_eq!(harness.source.open_subscriptions(), 0);
}

#[tokio::test]
async fn test_reconcile_large_point_list() {
    let names = PointFixtures::batch(250);
    let refs: Vec<&str> = names.iter().map(PointName::as_str).collect();
    let harness = ReplicationHarness::new(&refs);

    let replicator = harness.replicator(harness.historical_settings(TimeFixtures::window(0, 10)));
    let summary = replicator.start().await.unwrap();
    replicator.take_recovery().unwrap().wait().await;
    replicator.stop().await.unwrap();

    assert_eq!(summary.mapped_points, 250);
}

// =============================================================================
// Dead letters
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_dead_letter_logs_once_per_failed_item() {
    let logs = LogCapture::new();
    let _guard = logs.set_default();

    let harness = ReplicationHarness::new(&["A", "B"]);
    harness
        .destination
        .reject_writes(PointName::new("A"), -11049, "Value out of range");

    let replicator = harness.replicator(harness.realtime_settings());
    replicator.start().await.unwrap();

    for point in ["A", "B"] {
        let name = PointName::new(point);
        for sample in SampleFixtures::per_second(&name, 0, 3) {
            harness.source.publish(SOURCE_SERVER, sample);
        }
    }
    tokio::time::sleep(Duration::from_millis(500)).await;
    replicator.stop().await.unwrap();

    assert_eq!(harness.destination_count("A"), 0);
    assert_eq!(harness.destination_count("B"), 3);
    assert_eq!(harness.dead_letter_contents(), "A:0\n\nA:1\n\nA:2\n\n");

    let failures = logs.matching(Level::ERROR, "Failed to send value");
    assert_eq!(failures.len(), 3);
    assert!(failures.iter().all(|e| e.field("point") == Some("A")));

    let stats = replicator.dispatch_stats().unwrap();
    assert_eq!(stats.failed, 3);
    assert_eq!(stats.dead_lettered, 3);
    assert_eq!(stats.written, 3);
}

#[tokio::test(start_paused = true)]
async fn test_dead_letter_failed_write_call() {
    let harness = ReplicationHarness::new(&["A"]);
    harness.destination.fail_write_calls(PointName::new("A"));

    let replicator = harness.replicator(harness.realtime_settings());
    replicator.start().await.unwrap();

    harness.source.publish(
        SOURCE_SERVER,
        SampleFixtures::digital(&PointName::new("A"), "Open", 0),
    );
    tokio::time::sleep(Duration::from_millis(300)).await;
    replicator.stop().await.unwrap();

    assert_eq!(harness.dead_letter_contents(), "A:Open\n\n");
    assert_eq!(harness.destination_count("A"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_dead_letter_appends_across_runs() {
    let harness = ReplicationHarness::new(&["A"]);
    harness
        .destination
        .reject_writes(PointName::new("A"), -1, "rejected");

    for run in 0..2 {
        let replicator = harness.replicator(harness.realtime_settings());
        replicator.start().await.unwrap();
        harness.source.publish(
            SOURCE_SERVER,
            SampleFixtures::per_second(&PointName::new("A"), run, 1).remove(0),
        );
        tokio::time::sleep(Duration::from_millis(300)).await;
        replicator.stop().await.unwrap();
    }

    assert_eq!(harness.dead_letter_contents(), "A:0\n\nA:1\n\n");
}
