// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # histrep-config
//!
//! Configuration management for the histrep historian replicator.
//!
//! ## Features
//!
//! - **Schema Definition**: typed sections with serde defaults and validation
//! - **Multi-Format Support**: YAML, TOML and JSON configuration files
//! - **Environment Overrides**: `HISTREP_*` variables and `${VAR:default}` placeholders
//! - **Point Lists**: one-name-per-line point files
//!
//! ## Quick Start
//!
//! ```no_run
//! use histrep_config::{load_config, load_points};
//!
//! let config = load_config("histrep.yaml").unwrap();
//! let points = load_points(&config.points.file).unwrap();
//! let settings = config.to_settings(points).unwrap();
//!
//! println!("Mode: {}", settings.mode);
//! ```
//!
//! ## Example
//!
//! ```yaml
//! mode: historical
//! source:
//!   server: plant-a
//! destination:
//!   server: plant-b
//! historical:
//!   start: "${HISTORY_START:2024-01-01T00:00:00Z}"
//!   end: "2024-01-02T00:00:00Z"
//! points:
//!   file: points.txt
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

// =============================================================================
// Modules
// =============================================================================

pub mod error;
pub mod loader;
pub mod points;
pub mod schema;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{ConfigError, ConfigResult};
pub use schema::{
    DeadLetterConfig, DispatchConfig, EndpointConfig, HistoricalConfig, HistrepConfig,
    LogFormat, LogLevel, LoggingConfig, PointsConfig, RealtimeConfig,
};

pub use loader::{load_config, load_config_str, ConfigFormat, ConfigLoader, ConfigLoaderBuilder};
pub use points::{load_points, parse_points};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Convenience re-exports for common use cases.
pub mod prelude {
    pub use crate::error::{ConfigError, ConfigResult};
    pub use crate::loader::{load_config, ConfigLoader};
    pub use crate::points::load_points;
    pub use crate::schema::HistrepConfig;
}
