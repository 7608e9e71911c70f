// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Configuration loading and processing for histrep.
//!
//! # Loading Pipeline
//!
//! 1. Resolve `${VAR}` / `${VAR:default}` placeholders in the raw text
//! 2. Parse YAML/TOML/JSON by file extension
//! 3. Apply `HISTREP_*` environment overrides
//! 4. Resolve relative paths against the config file directory
//! 5. Validate
//!
//! # Environment Variable Override
//!
//! ```text
//! HISTREP_MODE=historical
//! HISTREP_SEND_PERIOD_MS=500
//! HISTREP_HISTORY_START=2024-01-01T00:00:00Z
//! HISTREP_LOG_LEVEL=debug
//! ```

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use histrep_core::{DataCollectionMode, TickPolicy};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::error::{ConfigError, ConfigResult};
use crate::schema::{HistrepConfig, LogFormat, LogLevel};

/// Default environment variable prefix.
pub const DEFAULT_ENV_PREFIX: &str = "HISTREP";

// =============================================================================
// ConfigLoader
// =============================================================================

/// Configuration loader for histrep.
///
/// # Examples
///
/// ```no_run
/// use histrep_config::loader::ConfigLoader;
///
/// let loader = ConfigLoader::new();
/// let config = loader.load("histrep.yaml").unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Base directory for resolving relative paths.
    base_path: Option<PathBuf>,

    /// Environment variable prefix.
    env_prefix: String,

    /// Whether to resolve environment variables in values.
    resolve_env_vars: bool,

    /// Whether to resolve relative paths.
    resolve_paths: bool,
}

impl ConfigLoader {
    /// Creates a new configuration loader with default settings.
    pub fn new() -> Self {
        Self {
            base_path: None,
            env_prefix: DEFAULT_ENV_PREFIX.to_string(),
            resolve_env_vars: true,
            resolve_paths: true,
        }
    }

    /// Creates a builder for configuring the loader.
    pub fn builder() -> ConfigLoaderBuilder {
        ConfigLoaderBuilder::new()
    }

    /// Sets the base path for resolving relative paths.
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Sets the environment variable prefix.
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Enables or disables environment variable resolution.
    pub fn with_env_vars(mut self, enabled: bool) -> Self {
        self.resolve_env_vars = enabled;
        self
    }

    /// Enables or disables relative path resolution.
    pub fn with_path_resolution(mut self, enabled: bool) -> Self {
        self.resolve_paths = enabled;
        self
    }

    /// Loads configuration from a file.
    ///
    /// The format follows the extension: `.yaml`/`.yml`, `.toml` or `.json`.
    pub fn load(&self, path: impl AsRef<Path>) -> ConfigResult<HistrepConfig> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        let base_path = self.base_path.clone().unwrap_or_else(|| {
            path.parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| PathBuf::from("."))
        });

        let content = self.read_file(path)?;

        let format = ConfigFormat::from_path(path)?;
        let mut config = self.parse_content(&content, format, path)?;

        if self.resolve_env_vars {
            self.apply_env_overrides(&mut config)?;
        }

        if self.resolve_paths {
            self.resolve_relative_paths(&mut config, &base_path);
        }

        config.validate()?;

        info!(mode = %config.mode, "Configuration loaded successfully");
        debug!(
            source = %config.source.server,
            destination = %config.destination.server,
            points_file = %config.points.file.display(),
            "Configuration endpoints"
        );

        Ok(config)
    }

    /// Loads configuration from a string.
    ///
    /// Relative paths are resolved only when a base path is set.
    pub fn load_from_str(&self, content: &str, format: ConfigFormat) -> ConfigResult<HistrepConfig> {
        let content = if self.resolve_env_vars {
            self.resolve_env_placeholders(content)?
        } else {
            content.to_string()
        };
        let mut config = parse_str(&content, format)?;

        if self.resolve_env_vars {
            self.apply_env_overrides(&mut config)?;
        }

        if self.resolve_paths {
            if let Some(base_path) = self.base_path.clone() {
                self.resolve_relative_paths(&mut config, &base_path);
            }
        }

        config.validate()?;

        Ok(config)
    }

    fn read_file(&self, path: &Path) -> ConfigResult<String> {
        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }

        fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))
    }

    fn parse_content(
        &self,
        content: &str,
        format: ConfigFormat,
        path: &Path,
    ) -> ConfigResult<HistrepConfig> {
        let content = if self.resolve_env_vars {
            self.resolve_env_placeholders(content)?
        } else {
            content.to_string()
        };

        parse_str(&content, format).map_err(|e| match e {
            ConfigError::Serialization { message } => ConfigError::parse(path, message),
            other => other,
        })
    }

    /// Resolves environment variable placeholders in content.
    ///
    /// Supports `${VAR_NAME}` and `${VAR_NAME:default}`.
    fn resolve_env_placeholders(&self, content: &str) -> ConfigResult<String> {
        let mut result = String::with_capacity(content.len());
        let mut chars = content.chars().peekable();

        while let Some(c) = chars.next() {
            if c != '$' || chars.peek() != Some(&'{') {
                result.push(c);
                continue;
            }
            chars.next();

            let mut var_content = String::new();
            let mut found_close = false;
            for c in chars.by_ref() {
                if c == '}' {
                    found_close = true;
                    break;
                }
                var_content.push(c);
            }

            if !found_close {
                result.push_str("${");
                result.push_str(&var_content);
                continue;
            }

            let (var_name, default_value) = match var_content.split_once(':') {
                Some((name, default)) => (name, Some(default)),
                None => (var_content.as_str(), None),
            };

            match (env::var(var_name), default_value) {
                (Ok(value), _) => result.push_str(&value),
                (Err(_), Some(default)) => result.push_str(default),
                (Err(_), None) => {
                    warn!("Environment variable '{}' not found", var_name);
                    result.push_str(&format!("${{{}}}", var_name));
                }
            }
        }

        Ok(result)
    }

    fn env_var(&self, suffix: &str) -> Option<(String, String)> {
        let name = format!("{}_{}", self.env_prefix, suffix);
        env::var(&name).ok().map(|value| (name, value))
    }

    /// Applies `<PREFIX>_*` environment overrides.
    fn apply_env_overrides(&self, config: &mut HistrepConfig) -> ConfigResult<()> {
        if let Some((name, value)) = self.env_var("MODE") {
            config.mode = value
                .parse::<DataCollectionMode>()
                .map_err(|e| ConfigError::invalid_env_var(name, e))?;
        }
        if let Some((_, value)) = self.env_var("SOURCE_SERVER") {
            config.source.server = value;
        }
        if let Some((_, value)) = self.env_var("DESTINATION_SERVER") {
            config.destination.server = value;
        }

        if let Some((name, value)) = self.env_var("SEND_PERIOD_MS") {
            config.dispatch.send_period_ms = parse_number(&name, &value)?;
        }
        if let Some((name, value)) = self.env_var("DISPATCH_TICK_POLICY") {
            config.dispatch.tick_policy = parse_policy(&name, &value)?;
        }
        if let Some((name, value)) = self.env_var("READ_PERIOD_MS") {
            config.realtime.read_period_ms = parse_number(&name, &value)?;
        }
        if let Some((name, value)) = self.env_var("MAX_EVENTS_PER_PUMP") {
            config.realtime.max_events_per_pump = parse_number(&name, &value)?;
        }
        if let Some((name, value)) = self.env_var("PUMP_TICK_POLICY") {
            config.realtime.tick_policy = parse_policy(&name, &value)?;
        }

        if let Some((name, value)) = self.env_var("HISTORY_START") {
            config.historical.start = Some(parse_time(&name, &value)?);
        }
        if let Some((name, value)) = self.env_var("HISTORY_END") {
            config.historical.end = Some(parse_time(&name, &value)?);
        }
        if let Some((name, value)) = self.env_var("SOURCE_MAX_RATE") {
            config.historical.source_max_rate = parse_number(&name, &value)?;
        }
        if let Some((name, value)) = self.env_var("MAX_RANGE_SECS") {
            config.historical.max_range_secs = parse_number(&name, &value)?;
        }

        if let Some((_, value)) = self.env_var("POINTS_FILE") {
            config.points.file = PathBuf::from(value);
        }
        if let Some((_, value)) = self.env_var("ALLOW_CREATE") {
            config.points.allow_create = parse_bool(&value);
        }
        if let Some((_, value)) = self.env_var("DEAD_LETTER_PATH") {
            config.dead_letter.path = PathBuf::from(value);
        }

        if let Some((name, value)) = self.env_var("LOG_LEVEL") {
            config.logging.level = LogLevel::parse(&value)
                .ok_or_else(|| ConfigError::invalid_env_var(name, "expected a log level"))?;
        }
        if let Some((name, value)) = self.env_var("LOG_FORMAT") {
            config.logging.format = LogFormat::parse(&value)
                .ok_or_else(|| ConfigError::invalid_env_var(name, "expected pretty, compact or json"))?;
        }

        Ok(())
    }

    fn resolve_relative_paths(&self, config: &mut HistrepConfig, base_path: &Path) {
        if config.points.file.is_relative() {
            config.points.file = base_path.join(&config.points.file);
        }
        if config.dead_letter.path.is_relative() {
            config.dead_letter.path = base_path.join(&config.dead_letter.path);
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// ConfigLoaderBuilder
// =============================================================================

/// Builder for ConfigLoader.
#[derive(Debug, Default)]
pub struct ConfigLoaderBuilder {
    base_path: Option<PathBuf>,
    env_prefix: Option<String>,
    resolve_env_vars: Option<bool>,
    resolve_paths: Option<bool>,
}

impl ConfigLoaderBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the base path.
    pub fn base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Sets the environment prefix.
    pub fn env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = Some(prefix.into());
        self
    }

    /// Enables or disables environment variable resolution.
    pub fn resolve_env_vars(mut self, enabled: bool) -> Self {
        self.resolve_env_vars = Some(enabled);
        self
    }

    /// Enables or disables path resolution.
    pub fn resolve_paths(mut self, enabled: bool) -> Self {
        self.resolve_paths = Some(enabled);
        self
    }

    /// Builds the ConfigLoader.
    pub fn build(self) -> ConfigLoader {
        let mut loader = ConfigLoader::new();

        if let Some(base_path) = self.base_path {
            loader.base_path = Some(base_path);
        }
        if let Some(prefix) = self.env_prefix {
            loader.env_prefix = prefix;
        }
        if let Some(resolve_env_vars) = self.resolve_env_vars {
            loader.resolve_env_vars = resolve_env_vars;
        }
        if let Some(resolve_paths) = self.resolve_paths {
            loader.resolve_paths = resolve_paths;
        }

        loader
    }
}

// =============================================================================
// ConfigFormat
// =============================================================================

/// Supported configuration file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// YAML format.
    Yaml,
    /// TOML format.
    Toml,
    /// JSON format.
    Json,
}

impl ConfigFormat {
    /// Determines the format from a file path.
    pub fn from_path(path: &Path) -> ConfigResult<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());

        match ext.as_deref() {
            Some("yaml") | Some("yml") => Ok(ConfigFormat::Yaml),
            Some("toml") => Ok(ConfigFormat::Toml),
            Some("json") => Ok(ConfigFormat::Json),
            Some(other) => Err(ConfigError::unsupported_format(other)),
            None => Err(ConfigError::unsupported_format("(no extension)")),
        }
    }

    /// Returns the file extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            ConfigFormat::Yaml => "yaml",
            ConfigFormat::Toml => "toml",
            ConfigFormat::Json => "json",
        }
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

fn parse_str(content: &str, format: ConfigFormat) -> ConfigResult<HistrepConfig> {
    match format {
        ConfigFormat::Yaml => yaml_parse(content),
        ConfigFormat::Toml => {
            toml::from_str(content).map_err(|e| ConfigError::serialization(e.to_string()))
        }
        ConfigFormat::Json => {
            serde_json::from_str(content).map_err(|e| ConfigError::serialization(e.to_string()))
        }
    }
}

/// YAML parsing through the `config` crate.
fn yaml_parse<T: DeserializeOwned>(content: &str) -> ConfigResult<T> {
    let config = config::Config::builder()
        .add_source(config::File::from_str(content, config::FileFormat::Yaml))
        .build()
        .map_err(|e| ConfigError::serialization(e.to_string()))?;

    config
        .try_deserialize()
        .map_err(|e| ConfigError::serialization(e.to_string()))
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.to_lowercase().as_str(),
        "true" | "1" | "yes" | "on" | "enabled"
    )
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> ConfigResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::invalid_env_var(name, "expected a valid number"))
}

fn parse_policy(name: &str, value: &str) -> ConfigResult<TickPolicy> {
    value
        .parse::<TickPolicy>()
        .map_err(|_| ConfigError::invalid_env_var(name, "expected single_flight or overlapping"))
}

fn parse_time(name: &str, value: &str) -> ConfigResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| ConfigError::invalid_env_var(name, format!("expected an RFC 3339 time: {}", e)))
}

// =============================================================================
// Convenience Functions
// =============================================================================

/// Loads configuration from a file with default settings.
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<HistrepConfig> {
    ConfigLoader::new().load(path)
}

/// Loads configuration from a string with the specified format.
pub fn load_config_str(content: &str, format: ConfigFormat) -> ConfigResult<HistrepConfig> {
    ConfigLoader::new().load_from_str(content, format)
}

// =============================================================================
// Tests
// =============================================================================
