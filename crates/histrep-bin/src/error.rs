// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Error types for the histrep binary.

use thiserror::Error;
use tracing::error;

/// Result type alias for histrep-bin operations.
pub type BinResult<T> = Result<T, BinError>;

/// Errors that can occur in the histrep binary.
#[derive(Debug, Error)]
pub enum BinError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Initialization error.
    #[error("Initialization error: {0}")]
    Initialization(String),

    /// Runtime error.
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(String),

    /// Config loading error.
    #[error("Config error: {0}")]
    Config(#[from] histrep_config::ConfigError),

    /// Replicator error.
    #[error("Replicator error: {0}")]
    Core(#[from] histrep_core::ReplicatorError),

    /// Generic error with context.
    #[error("{context}: {source}")]
    WithContext {
        /// The context description.
        context: String,
        /// The underlying error.
        #[source]
        source: Box<BinError>,
    },
}

impl BinError {
    /// Creates a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Creates an initialization error.
    pub fn init(msg: impl Into<String>) -> Self {
        Self::Initialization(msg.into())
    }

    /// Creates a runtime error.
    pub fn runtime(msg: impl Into<String>) -> Self {
        Self::Runtime(msg.into())
    }

    /// Creates an I/O error.
    pub fn io(msg: impl Into<String>) -> Self {
        Self::Io(msg.into())
    }

    /// Adds context to an error.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Returns the process exit code for this error.
    ///
    /// 1 runtime, 2 configuration, 3 initialization, 4 I/O.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Runtime(_) => 1,
            Self::Configuration(_) => 2,
            Self::Config(e) if e.is_io_error() => 4,
            Self::Config(_) => 2,
            Self::Initialization(_) => 3,
            Self::Core(e) if e.is_configuration() => 3,
            Self::Core(_) => 1,
            Self::Io(_) => 4,
            Self::WithContext { source, .. } => source.exit_code(),
        }
    }

    /// Returns the operator-facing message when one exists.
    pub fn user_message(&self) -> String {
        match self {
            Self::Config(e) => e.user_message(),
            Self::Core(e) => e.user_message(),
            Self::WithContext { context, source } => {
                format!("{}: {}", context, source.user_message())
            }
            other => other.to_string(),
        }
    }
}

impl From<std::io::Error> for BinError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<anyhow::Error> for BinError {
    fn from(err: anyhow::Error) -> Self {
        Self::Runtime(err.to_string())
    }
}

// =============================================================================
// Error Reporting
// =============================================================================

/// Reports an error through the log and on stderr.
pub fn report_error(error: &BinError) {
    error!(exit_code = error.exit_code(), "{}", error);

    eprintln!("Error: {}", error.user_message());

    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        eprintln!("  Caused by: {}", cause);
        source = cause.source();
    }
}

/// Reports an error and exits with the appropriate code.
pub fn report_error_and_exit(error: BinError) -> ! {
    report_error(&error);
    std::process::exit(error.exit_code())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use histrep_config::ConfigError;
    use histrep_core::{ReconcileError, ReplicatorError};

    #[test]
    fn test_error_creation() {
        let err = BinError::config("test error");
        assert_eq!(err.to_string(), "Configuration error: test error");
    }

    #[test]
    fn test_error_with_context() {
        let err = BinError::config("inner error").with_context("outer context");
        assert_eq!(err.to_string(), "outer context: Configuration error: inner error");
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(BinError::runtime("test").exit_code(), 1);
        assert_eq!(BinError::config("test").exit_code(), 2);
        assert_eq!(BinError::init("test").exit_code(), 3);
        assert_eq!(BinError::io("test").exit_code(), 4);
    }

    #[test]
    fn test_wrapped_exit_codes() {
        let err: BinError = ConfigError::missing_field("mode").into();
        assert_eq!(err.exit_code(), 2);

        let err: BinError = ConfigError::file_not_found("histrep.yaml").into();
        assert_eq!(err.exit_code(), 4);

        let err: BinError = ReplicatorError::bad_source_server("src", "not found").into();
        assert_eq!(err.exit_code(), 3);

        let err: BinError = ReplicatorError::from(ReconcileError::EmptyPointList).into();
        assert_eq!(err.exit_code(), 3);

        let err: BinError = ReplicatorError::NotStarted.into();
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_from_anyhow() {
        let err: BinError = anyhow::anyhow!("monitor task panicked").into();
        assert!(matches!(err, BinError::Runtime(_)));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_user_message_uses_catalog() {
        let err: BinError = ConfigError::validation("mode", "unknown").into();
        assert!(err.user_message().contains("incorrect data collection mode"));
    }
}
