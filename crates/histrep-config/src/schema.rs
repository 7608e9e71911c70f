// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Configuration schema definitions for histrep.
//!
//! # Schema Structure
//!
//! ```text
//! HistrepConfig
//! ├── mode: DataCollectionMode
//! ├── source: EndpointConfig
//! ├── destination: EndpointConfig
//! ├── dispatch: DispatchConfig
//! ├── realtime: RealtimeConfig
//! ├── historical: HistoricalConfig
//! ├── points: PointsConfig
//! ├── dead_letter: DeadLetterConfig
//! └── logging: LoggingConfig
//! ```

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use histrep_core::deadletter::DEFAULT_DEAD_LETTER_FILE;
use histrep_core::planner::{
    DEFAULT_MAX_RANGE_SECS, DEFAULT_MIN_SAMPLE, DEFAULT_SOURCE_MAX_RATE,
};
use histrep_core::realtime::DEFAULT_MAX_EVENTS_PER_PUMP;
use histrep_core::recovery::DEFAULT_PAGE_SIZE;
use histrep_core::{
    DataCollectionMode, HistorianConfig, PlannerConfig, PointName, ReplicatorSettings,
    TickPolicy, TimeRange,
};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

// =============================================================================
// Constants
// =============================================================================

/// Default backend for both endpoints.
pub const DEFAULT_BACKEND: &str = "memory";

/// Default destination send period in milliseconds.
pub const DEFAULT_SEND_PERIOD_MS: u64 = 1000;

/// Default source pump period in milliseconds.
pub const DEFAULT_READ_PERIOD_MS: u64 = 1000;

/// Minimum timer period in milliseconds.
pub const MIN_PERIOD_MS: u64 = 1;

/// Maximum timer period in milliseconds (1 hour).
pub const MAX_PERIOD_MS: u64 = 3_600_000;

// =============================================================================
// Top-Level Configuration
// =============================================================================

/// The root configuration structure for histrep.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HistrepConfig {
    /// Data collection mode.
    pub mode: DataCollectionMode,

    /// Source historian.
    pub source: EndpointConfig,

    /// Destination historian.
    pub destination: EndpointConfig,

    /// Dispatch engine settings.
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Real-time ingestion settings.
    #[serde(default)]
    pub realtime: RealtimeConfig,

    /// Historical recovery settings.
    #[serde(default)]
    pub historical: HistoricalConfig,

    /// Point list settings.
    pub points: PointsConfig,

    /// Dead-letter file settings.
    #[serde(default)]
    pub dead_letter: DeadLetterConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl HistrepConfig {
    /// Creates a configuration with every optional section at its default.
    pub fn new(
        mode: DataCollectionMode,
        source_server: impl Into<String>,
        destination_server: impl Into<String>,
        points_file: impl Into<PathBuf>,
    ) -> Self {
        Self {
            mode,
            source: EndpointConfig::memory(source_server),
            destination: EndpointConfig::memory(destination_server),
            dispatch: DispatchConfig::default(),
            realtime: RealtimeConfig::default(),
            historical: HistoricalConfig::default(),
            points: PointsConfig {
                file: points_file.into(),
                allow_create: false,
            },
            dead_letter: DeadLetterConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Validates the entire configuration.
    ///
    /// The points file itself is checked when it is loaded.
    pub fn validate(&self) -> ConfigResult<()> {
        self.source.validate("source")?;
        self.destination.validate("destination")?;
        self.dispatch.validate()?;
        self.realtime.validate()?;
        self.historical.validate(self.mode)?;
        self.points.validate()?;
        self.dead_letter.validate()?;
        Ok(())
    }

    /// Returns the recovery window; `None` in real-time mode.
    pub fn window(&self) -> ConfigResult<Option<TimeRange>> {
        if self.mode != DataCollectionMode::Historical {
            return Ok(None);
        }
        self.historical.window().map(Some)
    }

    /// Builds replicator settings for the given point list.
    pub fn to_settings(&self, points: Vec<PointName>) -> ConfigResult<ReplicatorSettings> {
        let mut settings = ReplicatorSettings::realtime(
            self.source.server.trim(),
            self.destination.server.trim(),
            points,
        );
        settings.mode = self.mode;
        settings.allow_create = self.points.allow_create;
        settings.send_period = self.dispatch.send_period();
        settings.dispatch_policy = self.dispatch.tick_policy;
        settings.read_period = self.realtime.read_period();
        settings.pump_policy = self.realtime.tick_policy;
        settings.max_events_per_pump = self.realtime.max_events_per_pump;
        settings.window = self.window()?;
        settings.planner = self.historical.planner();
        settings.page_size = self.historical.page_size;
        settings.dead_letter_path = self.dead_letter.path.clone();
        Ok(settings)
    }
}

// =============================================================================
// Endpoint Configuration
// =============================================================================

/// One historian endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EndpointConfig {
    /// Server name on the backend.
    pub server: String,

    /// Client backend.
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Backend-specific options.
    #[serde(default = "default_options")]
    pub options: serde_json::Value,
}

fn default_backend() -> String {
    DEFAULT_BACKEND.to_string()
}

fn default_options() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

impl EndpointConfig {
    /// An endpoint on the in-memory backend with no options.
    pub fn memory(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            backend: default_backend(),
            options: default_options(),
        }
    }

    fn validate(&self, section: &str) -> ConfigResult<()> {
        if self.server.trim().is_empty() {
            return Err(ConfigError::missing_field(format!("{}.server", section)));
        }
        if self.backend.trim().is_empty() {
            return Err(ConfigError::missing_field(format!("{}.backend", section)));
        }
        Ok(())
    }

    /// Converts to a historian client configuration.
    pub fn historian_config(&self) -> HistorianConfig {
        HistorianConfig::new(self.backend.trim(), self.server.trim())
            .with_options(self.options.clone())
    }
}

// =============================================================================
// Dispatch Configuration
// =============================================================================

/// Dispatch engine settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DispatchConfig {
    /// Destination send period in milliseconds.
    #[serde(default = "default_send_period")]
    pub send_period_ms: u64,

    /// Re-entrancy policy for dispatch ticks.
    #[serde(default)]
    pub tick_policy: TickPolicy,
}

fn default_send_period() -> u64 {
    DEFAULT_SEND_PERIOD_MS
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            send_period_ms: DEFAULT_SEND_PERIOD_MS,
            tick_policy: TickPolicy::default(),
        }
    }
}

impl DispatchConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_period("dispatch.send_period_ms", self.send_period_ms)
    }

    /// Returns the send period as a Duration.
    pub fn send_period(&self) -> Duration {
        Duration::from_millis(self.send_period_ms)
    }
}

// =============================================================================
// Real-Time Configuration
// =============================================================================

/// Real-time ingestion settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RealtimeConfig {
    /// Source pump period in milliseconds.
    #[serde(default = "default_read_period")]
    pub read_period_ms: u64,

    /// Maximum events per pump call.
    #[serde(default = "default_max_events")]
    pub max_events_per_pump: usize,

    /// Re-entrancy policy for pump ticks.
    #[serde(default)]
    pub tick_policy: TickPolicy,
}

fn default_read_period() -> u64 {
    DEFAULT_READ_PERIOD_MS
}

fn default_max_events() -> usize {
    DEFAULT_MAX_EVENTS_PER_PUMP
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            read_period_ms: DEFAULT_READ_PERIOD_MS,
            max_events_per_pump: DEFAULT_MAX_EVENTS_PER_PUMP,
            tick_policy: TickPolicy::default(),
        }
    }
}

impl RealtimeConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_period("realtime.read_period_ms", self.read_period_ms)?;
        if self.max_events_per_pump == 0 {
            return Err(ConfigError::validation(
                "realtime.max_events_per_pump",
                "must be at least 1",
            ));
        }
        Ok(())
    }

    /// Returns the pump period as a Duration.
    pub fn read_period(&self) -> Duration {
        Duration::from_millis(self.read_period_ms)
    }
}

// =============================================================================
// Historical Configuration
// =============================================================================

/// Historical recovery settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HistoricalConfig {
    /// Recovery window start (UTC).
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,

    /// Recovery window end (UTC).
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,

    /// Source read-rate budget, events per second.
    #[serde(default = "default_source_max_rate")]
    pub source_max_rate: f64,

    /// Maximum duration per range, seconds.
    #[serde(default = "default_max_range_secs")]
    pub max_range_secs: f64,

    /// Bulk read page size.
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Minimum number of sampled points.
    #[serde(default = "default_min_sample")]
    pub min_sample: usize,

    /// Fixed sampling seed.
    #[serde(default)]
    pub sample_seed: Option<u64>,
}

fn default_source_max_rate() -> f64 {
    DEFAULT_SOURCE_MAX_RATE
}

fn default_max_range_secs() -> f64 {
    DEFAULT_MAX_RANGE_SECS
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_min_sample() -> usize {
    DEFAULT_MIN_SAMPLE
}

impl Default for HistoricalConfig {
    fn default() -> Self {
        Self {
            start: None,
            end: None,
            source_max_rate: DEFAULT_SOURCE_MAX_RATE,
            max_range_secs: DEFAULT_MAX_RANGE_SECS,
            page_size: DEFAULT_PAGE_SIZE,
            min_sample: DEFAULT_MIN_SAMPLE,
            sample_seed: None,
        }
    }
}

impl HistoricalConfig {
    fn validate(&self, mode: DataCollectionMode) -> ConfigResult<()> {
        if !(self.source_max_rate.is_finite() && self.source_max_rate > 0.0) {
            return Err(ConfigError::validation(
                "historical.source_max_rate",
                format!("must be a positive number, got {}", self.source_max_rate),
            ));
        }
        if !(self.max_range_secs.is_finite() && self.max_range_secs > 0.0) {
            return Err(ConfigError::validation(
                "historical.max_range_secs",
                format!("must be a positive number, got {}", self.max_range_secs),
            ));
        }
        if self.page_size == 0 {
            return Err(ConfigError::validation("historical.page_size", "must be at least 1"));
        }
        if self.min_sample == 0 {
            return Err(ConfigError::validation("historical.min_sample", "must be at least 1"));
        }

        if mode == DataCollectionMode::Historical {
            self.window()?;
        }
        Ok(())
    }

    /// Returns the recovery window.
    pub fn window(&self) -> ConfigResult<TimeRange> {
        let start = self
            .start
            .ok_or_else(|| ConfigError::validation("historical.start", "required in historical mode"))?;
        let end = self
            .end
            .ok_or_else(|| ConfigError::validation("historical.end", "required in historical mode"))?;

        TimeRange::new(start, end).map_err(|_| {
            ConfigError::validation(
                "historical.start",
                format!("start {} must precede end {}", start.to_rfc3339(), end.to_rfc3339()),
            )
        })
    }

    /// Returns the planner parameters.
    pub fn planner(&self) -> PlannerConfig {
        PlannerConfig {
            source_max_rate: self.source_max_rate,
            max_range_secs: self.max_range_secs,
            min_sample: self.min_sample,
            seed: self.sample_seed,
        }
    }
}

// =============================================================================
// Points Configuration
// =============================================================================

/// Point list settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PointsConfig {
    /// Path to the point-name list.
    pub file: PathBuf,

    /// Create destination points that do not exist.
    #[serde(default)]
    pub allow_create: bool,
}

impl PointsConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.file.as_os_str().is_empty() {
            return Err(ConfigError::missing_field("points.file"));
        }
        Ok(())
    }
}

// =============================================================================
// Dead-Letter Configuration
// =============================================================================

/// Dead-letter file settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeadLetterConfig {
    /// Path of the failed-values file.
    #[serde(default = "default_dead_letter_path")]
    pub path: PathBuf,
}

fn default_dead_letter_path() -> PathBuf {
    PathBuf::from(DEFAULT_DEAD_LETTER_FILE)
}

impl Default for DeadLetterConfig {
    fn default() -> Self {
        Self {
            path: default_dead_letter_path(),
        }
    }
}

impl DeadLetterConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.path.as_os_str().is_empty() {
            return Err(ConfigError::missing_field("dead_letter.path"));
        }
        Ok(())
    }
}

// =============================================================================
// Logging Configuration
// =============================================================================

/// Logging configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level.
    #[serde(default)]
    pub level: LogLevel,

    /// Log format.
    #[serde(default)]
    pub format: LogFormat,
}

/// Log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level.
    Trace,
    /// Debug level.
    Debug,
    /// Info level.
    #[default]
    Info,
    /// Warning level.
    #[serde(alias = "warning")]
    Warn,
    /// Error level.
    Error,
}

impl LogLevel {
    /// Returns the level as a filter directive.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    /// Parses a level name, case-insensitively.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "trace" => Some(LogLevel::Trace),
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warn" | "warning" => Some(LogLevel::Warn),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }
}

/// Log format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable multi-field lines.
    #[default]
    #[serde(alias = "text")]
    Pretty,
    /// Compact single lines.
    Compact,
    /// JSON lines.
    Json,
}

impl LogFormat {
    /// Returns the format name.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogFormat::Pretty => "pretty",
            LogFormat::Compact => "compact",
            LogFormat::Json => "json",
        }
    }

    /// Parses a format name, case-insensitively.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "pretty" | "text" => Some(LogFormat::Pretty),
            "compact" => Some(LogFormat::Compact),
            "json" => Some(LogFormat::Json),
            _ => None,
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn validate_period(field: &str, value: u64) -> ConfigResult<()> {
    if !(MIN_PERIOD_MS..=MAX_PERIOD_MS).contains(&value) {
        return Err(ConfigError::out_of_range(field, value, MIN_PERIOD_MS, MAX_PERIOD_MS));
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
