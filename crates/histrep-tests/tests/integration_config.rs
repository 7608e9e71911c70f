// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Configuration Integration Tests
//!
//! Loading configuration and points files from disk and turning them into
//! replicator settings.
//!
//! - `test_load_*`: file loading and path resolution
//! - `test_points_*`: points file handling
//! - `test_settings_*`: conversion to replicator settings
//! - `test_invalid_*`: rejected configurations

use std::time::Duration;

use histrep_config::{load_config, load_points, ConfigError, ConfigLoader, LogFormat, LogLevel};
use histrep_core::{DataCollectionMode, PointName, TickPolicy};
use histrep_tests::common::{
    builders::ConfigFileBuilder,
    fixtures::{PointFixtures, TimeFixtures},
    init_test_logging, temp_test_dir,
};

// =============================================================================
// Loading
// =============================================================================

#[test]
fn test_load_resolves_paths_against_config_dir() {
    init_test_logging();
    let dir = temp_test_dir("histrep-config");
    let path = ConfigFileBuilder::new()
        .points(PointFixtures::plant())
        .write_to(dir.path());

    let config = load_config(&path).unwrap();

    assert_eq!(config.points.file, dir.path().join("points.txt"));
    assert_eq!(config.dead_letter.path, dir.path().join("ValuesInError.txt"));
    assert_eq!(load_points(&config.points.file).unwrap(), PointFixtures::plant());
}

#[test]
fn test_load_toml_file() {
    let dir = temp_test_dir("histrep-config");
    std::fs::write(dir.path().join("points.txt"), "A\n").unwrap();
    let path = dir.path().join("histrep.toml");
    std::fs::write(
        &path,
        r#"
mode = "historical"

[source]
server = "plant-a"

[destination]
server = "central"

[historical]
start = "2024-03-01T00:00:00Z"
end = "2024-03-02T00:00:00Z"
source_max_rate = 5000.0

[points]
file = "points.txt"

[logging]
level = "debug"
format = "json"
"#,
    )
    .unwrap();

    let config = load_config(&path).unwrap();
    assert_eq!(config.mode, DataCollectionMode::Historical);
    assert_eq!(config.source.server, "plant-a");
    assert_eq!(config.logging.level, LogLevel::Debug);
    assert_eq!(config.logging.format, LogFormat::Json);

    let window = config.window().unwrap().unwrap();
    assert_eq!(window.duration(), chrono::Duration::hours(24));
}

#[test]
fn test_load_expands_placeholders() {
    let dir = temp_test_dir("histrep-config");
    std::env::set_var("HRIT_PLACEHOLDER_SOURCE", "plant-b");
    let path = ConfigFileBuilder::new()
        .source("${HRIT_PLACEHOLDER_SOURCE}")
        .destination("${HRIT_PLACEHOLDER_UNSET:central}")
        .points(PointFixtures::names(&["A"]))
        .write_to(dir.path());

    let config = load_config(&path).unwrap();
    assert_eq!(config.source.server, "plant-b");
    assert_eq!(config.destination.server, "central");
}

#[test]
fn test_load_env_overrides() {
    let dir = temp_test_dir("histrep-config");
    let path = ConfigFileBuilder::new()
        .points(PointFixtures::names(&["A"]))
        .write_to(dir.path());

    std::env::set_var("HRIT_ENV_SEND_PERIOD_MS", "250");
    std::env::set_var("HRIT_ENV_DISPATCH_TICK_POLICY", "overlap");

    let config = ConfigLoader::new()
        .with_env_prefix("HRIT_ENV")
        .load(&path)
        .unwrap();

    assert_eq!(config.dispatch.send_period(), Duration::from_millis(250));
    assert_eq!(config.dispatch.tick_policy, TickPolicy::Overlapping);
}

// =============================================================================
// Points
// =============================================================================

#[test]
fn test_points_file_comments_and_duplicates() {
    let dir = temp_test_dir("histrep-points");
    let path = dir.path().join("points.txt");
    std::fs::write(&path, "# header\nA\n\n  B  \nA\n# trailing\nC\n").unwrap();

    let points = load_points(&path).unwrap();
    assert_eq!(points, PointFixtures::names(&["A", "B", "C"]));
}

#[test]
fn test_points_file_missing() {
    let err = load_points("/nonexistent/histrep/points.txt").unwrap_err();
    assert!(matches!(err, ConfigError::FileNotFound { .. }));
}

#[test]
fn test_points_file_without_names() {
    let dir = temp_test_dir("histrep-points");
    let path = dir.path().join("points.txt");
    std::fs::write(&path, "# nothing yet\n\n").unwrap();

    let err = load_points(&path).unwrap_err();
    assert!(matches!(err, ConfigError::EmptyPointList { .. }));
}

// =============================================================================
// Settings
// =============================================================================

#[test]
fn test_settings_realtime() {
    init_test_logging();
    let dir = temp_test_dir("histrep-settings");
    let path = ConfigFileBuilder::new()
        .source(" plant-a ")
        .periods_ms(500, 200)
        .allow_create(true)
        .points(PointFixtures::names(&["A", "B"]))
        .write_to(dir.path());

    let config = load_config(&path).unwrap();
    let points = load_points(&config.points.file).unwrap();
    let settings = config.to_settings(points).unwrap();

    assert_eq!(settings.mode, DataCollectionMode::Realtime);
    assert_eq!(settings.source_server, "plant-a");
    assert_eq!(settings.points, vec![PointName::new("A"), PointName::new("B")]);
    assert_eq!(settings.send_period, Duration::from_millis(500));
    assert_eq!(settings.read_period, Duration::from_millis(200));
    assert!(settings.allow_create);
    assert!(settings.window.is_none());
    assert_eq!(settings.dead_letter_path, dir.path().join("ValuesInError.txt"));
    assert!(settings.validate().is_ok());
}

#[test]
fn test_settings_historical_window() {
    let dir = temp_test_dir("histrep-settings");
    let path = ConfigFileBuilder::new()
        .window(TimeFixtures::at(0), TimeFixtures::at(3600))
        .points(PointFixtures::names(&["A"]))
        .extra("logging:\n  level: warn\n")
        .write_to(dir.path());

    let config = load_config(&path).unwrap();
    let settings = config.to_settings(PointFixtures::names(&["A"])).unwrap();

    assert_eq!(settings.mode, DataCollectionMode::Historical);
    assert_eq!(settings.window, Some(TimeFixtures::window(0, 3600)));
    assert_eq!(config.logging.level, LogLevel::Warn);
    assert!(settings.validate().is_ok());
}

// =============================================================================
// Invalid configurations
// =============================================================================

#[test]
fn test_invalid_window_order() {
    init_test_logging();
    let dir = temp_test_dir("histrep-invalid");
    let path = ConfigFileBuilder::new()
        .window(TimeFixtures::at(60), TimeFixtures::at(0))
        .points(PointFixtures::names(&["A"]))
        .write_to(dir.path());

    let err = load_config(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Validation { .. }));
    assert!(err
        .user_message()
        .starts_with("An incorrect start time was supplied for history recovery"));
}

#[test]
fn test_invalid_historical_without_window() {
    let dir = temp_test_dir("histrep-invalid");
    let path = ConfigFileBuilder::new()
        .mode(DataCollectionMode::Historical)
        .points(PointFixtures::names(&["A"]))
        .write_to(dir.path());

    let err = load_config(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "historical.start"));
}

#[test]
fn test_invalid_period() {
    let dir = temp_test_dir("histrep-invalid");
    let path = ConfigFileBuilder::new()
        .periods_ms(0, 1000)
        .points(PointFixtures::names(&["A"]))
        .write_to(dir.path());

    let err = load_config(&path).unwrap_err();
    assert!(matches!(err, ConfigError::OutOfRange { .. }));
}

#[test]
fn test_invalid_unknown_section() {
    let dir = temp_test_dir("histrep-invalid");
    let path = ConfigFileBuilder::new()
        .points(PointFixtures::names(&["A"]))
        .extra("archive:\n  retention_days: 30\n")
        .write_to(dir.path());

    let err = load_config(&path).unwrap_err();
    assert!(!err.is_io_error());
}

#[test]
fn test_invalid_missing_config_file() {
    let err = load_config("/nonexistent/histrep/histrep.yaml").unwrap_err();
    assert!(err.is_io_error());
}
