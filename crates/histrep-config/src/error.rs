// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Configuration error types for histrep-config.
//!
//! Every variant is a startup configuration failure: the replicator never
//! starts with a configuration that produced one of these.

use std::path::PathBuf;
use thiserror::Error;

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to parse configuration file.
    #[error("Failed to parse config file '{path}': {message}")]
    Parse {
        /// Path to the configuration file.
        path: PathBuf,
        /// Error message.
        message: String,
        /// Line number (if available).
        line: Option<usize>,
    },

    /// Configuration validation failed.
    #[error("Validation failed for '{field}': {message}")]
    Validation {
        /// The field that failed validation.
        field: String,
        /// Error message.
        message: String,
    },

    /// Required field is missing.
    #[error("Missing required field: {field}")]
    MissingField {
        /// The missing field name.
        field: String,
    },

    /// File I/O error.
    #[error("Failed to read file '{path}': {source}")]
    Io {
        /// Path to the file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// File not found.
    #[error("File not found: {path}")]
    FileNotFound {
        /// The path that was not found.
        path: PathBuf,
    },

    /// Invalid environment variable value.
    #[error("Invalid environment variable value for '{name}': {message}")]
    InvalidEnvVar {
        /// The environment variable name.
        name: String,
        /// Error message.
        message: String,
    },

    /// Value out of range.
    #[error("Value out of range for '{field}': {value} (expected {min}..{max})")]
    OutOfRange {
        /// The field name.
        field: String,
        /// The actual value.
        value: String,
        /// Minimum value.
        min: String,
        /// Maximum value.
        max: String,
    },

    /// Unsupported configuration format.
    #[error("Unsupported configuration format: {format}")]
    UnsupportedFormat {
        /// The unsupported format.
        format: String,
    },

    /// Serialization error.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error message.
        message: String,
    },

    /// The points file holds no point names.
    #[error("Points file '{path}' contains no point names")]
    EmptyPointList {
        /// Path to the points file.
        path: PathBuf,
    },
}

impl ConfigError {
    /// Creates a parse error.
    pub fn parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.into(),
            line: None,
        }
    }

    /// Creates a parse error with line number.
    pub fn parse_at_line(
        path: impl Into<PathBuf>,
        message: impl Into<String>,
        line: usize,
    ) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.into(),
            line: Some(line),
        }
    }

    /// Creates a validation error.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates a missing field error.
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField { field: field.into() }
    }

    /// Creates an I/O error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a file not found error.
    pub fn file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    /// Creates an invalid environment variable error.
    pub fn invalid_env_var(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidEnvVar {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Creates an out of range error.
    pub fn out_of_range<T: std::fmt::Display>(
        field: impl Into<String>,
        value: T,
        min: T,
        max: T,
    ) -> Self {
        Self::OutOfRange {
            field: field.into(),
            value: value.to_string(),
            min: min.to_string(),
            max: max.to_string(),
        }
    }

    /// Creates an unsupported format error.
    pub fn unsupported_format(format: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            format: format.into(),
        }
    }

    /// Creates a serialization error.
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Creates an empty point list error.
    pub fn empty_point_list(path: impl Into<PathBuf>) -> Self {
        Self::EmptyPointList { path: path.into() }
    }

    /// Returns the operator-facing message for this error.
    pub fn user_message(&self) -> String {
        match self {
            ConfigError::Parse { path, message, line } => match line {
                Some(line) => format!(
                    "The configuration file could not be read ({}, line {}): {}",
                    path.display(),
                    line,
                    message
                ),
                None => format!(
                    "The configuration file could not be read ({}): {}",
                    path.display(),
                    message
                ),
            },
            ConfigError::Validation { field, message } => match field.as_str() {
                "mode" => {
                    "An incorrect data collection mode was supplied in the configuration file."
                        .to_string()
                }
                "historical.start" => format!(
                    "An incorrect start time was supplied for history recovery: {}",
                    message
                ),
                "historical.end" => format!(
                    "An incorrect end time was supplied for history recovery: {}",
                    message
                ),
                "realtime.max_events_per_pump" => {
                    format!("The argument for max_events_per_pump is not valid: {}", message)
                }
                _ => format!("Invalid configuration value for '{}': {}", field, message),
            },
            ConfigError::MissingField { field } => format!(
                "The configuration parameter '{}' was empty. All required parameters must have a value.",
                field
            ),
            ConfigError::Io { path, .. } => {
                format!("Failed to read file: {}", path.display())
            }
            ConfigError::FileNotFound { path } => {
                format!("File not found: {}", path.display())
            }
            ConfigError::InvalidEnvVar { name, message } => {
                format!("Invalid value in environment variable {}: {}", name, message)
            }
            ConfigError::OutOfRange { field, value, min, max } => format!(
                "Value for '{}' is out of range: {} (allowed {}..{})",
                field, value, min, max
            ),
            ConfigError::UnsupportedFormat { format } => {
                format!("Unsupported configuration format: {}", format)
            }
            ConfigError::Serialization { message } => {
                format!("Configuration could not be serialized: {}", message)
            }
            ConfigError::EmptyPointList { path } => format!(
                "An error occurred while loading the points from {}: the list is empty.",
                path.display()
            ),
        }
    }

    /// Returns `true` if this error is related to file I/O.
    pub fn is_io_error(&self) -> bool {
        matches!(
            self,
            ConfigError::Io { .. } | ConfigError::FileNotFound { .. }
        )
    }

    /// Returns the error type as a string for logging.
    pub fn error_type(&self) -> &'static str {
        match self {
            ConfigError::Parse { .. } => "parse",
            ConfigError::Validation { .. } => "validation",
            ConfigError::MissingField { .. } => "missing_field",
            ConfigError::Io { .. } => "io",
            ConfigError::FileNotFound { .. } => "file_not_found",
            ConfigError::InvalidEnvVar { .. } => "invalid_env_var",
            ConfigError::OutOfRange { .. } => "out_of_range",
            ConfigError::UnsupportedFormat { .. } => "unsupported_format",
            ConfigError::Serialization { .. } => "serialization",
            ConfigError::EmptyPointList { .. } => "empty_point_list",
        }
    }
}

/// A Result type with ConfigError.
pub type ConfigResult<T> = Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_creation() {
        let error = ConfigError::validation("dispatch.send_period_ms", "must be positive");
        assert!(matches!(error, ConfigError::Validation { .. }));
        assert_eq!(error.error_type(), "validation");

        let error = ConfigError::missing_field("source.server");
        assert!(matches!(error, ConfigError::MissingField { .. }));
        assert_eq!(error.error_type(), "missing_field");
    }

    #[test]
    fn test_user_message_catalog() {
        let msg = ConfigError::validation("mode", "unknown").user_message();
        assert!(msg.contains("incorrect data collection mode"));

        let msg = ConfigError::validation("historical.start", "must precede end").user_message();
        assert!(msg.contains("incorrect start time"));

        let msg = ConfigError::validation("historical.end", "missing").user_message();
        assert!(msg.contains("incorrect end time"));

        let msg = ConfigError::empty_point_list("points.txt").user_message();
        assert!(msg.contains("loading the points"));
    }

    #[test]
    fn test_is_io_error() {
        let error = ConfigError::io(
            "histrep.yaml",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(error.is_io_error());
        assert!(ConfigError::file_not_found("histrep.yaml").is_io_error());
        assert!(!ConfigError::missing_field("mode").is_io_error());
    }

    #[test]
    fn test_parse_at_line() {
        let error = ConfigError::parse_at_line("histrep.yaml", "invalid syntax", 42);
        match error {
            ConfigError::Parse { line, .. } => assert_eq!(line, Some(42)),
            _ => panic!("Expected Parse error"),
        }
    }

    #[test]
    fn test_out_of_range() {
        let error = ConfigError::out_of_range("historical.page_size", 0, 1, 10_000_000);
        assert!(error.user_message().contains("historical.page_size"));
        assert_eq!(error.error_type(), "out_of_range");
    }
}
