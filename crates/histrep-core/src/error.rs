// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Unified error hierarchy for histrep.
//!
//! Errors are scoped to the smallest unit that can absorb them: per point
//! during reconciliation, per item during dispatch, per range during
//! recovery. Only whole-category failures surface as [`ReplicatorError`].
//!
//! # Error Hierarchy
//!
//! ```text
//! ReplicatorError (root)
//! ├── HistorianError  - Historian client transport and lookup
//! ├── ReconcileError  - Point identity reconciliation
//! ├── PlanError       - Historical range planning
//! ├── DispatchError   - Dead-letter side file
//! └── SchedulerError  - Tick scheduling
//! ```
//!
//! # Examples
//!
//! ```
//! use histrep_core::error::{HistorianError, ReplicatorError};
//! use std::time::Duration;
//!
//! let error = HistorianError::timeout(Duration::from_secs(5));
//! assert!(error.is_retryable());
//!
//! let root: ReplicatorError = error.into();
//! assert_eq!(root.error_type(), "historian");
//! ```

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// ReplicatorError - Root Error Type
// =============================================================================

/// The root error type for histrep.
///
/// Every variant is fatal to startup or to the replicator as a whole.
#[derive(Debug, Error)]
pub enum ReplicatorError {
    /// Historian client error.
    #[error("Historian error: {0}")]
    Historian(#[from] HistorianError),

    /// Point reconciliation error.
    #[error("Reconciliation error: {0}")]
    Reconcile(#[from] ReconcileError),

    /// Range planning error.
    #[error("Planning error: {0}")]
    Plan(#[from] PlanError),

    /// Dispatch error.
    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    /// Scheduler error.
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    /// The source server could not be located.
    #[error("Source server '{server}' could not be located: {message}")]
    BadSourceServer {
        /// Configured server name.
        server: String,
        /// Underlying reason.
        message: String,
    },

    /// The destination server could not be located.
    #[error("Destination server '{server}' could not be located: {message}")]
    BadDestinationServer {
        /// Configured server name.
        server: String,
        /// Underlying reason.
        message: String,
    },

    /// An operation that requires a started replicator was called too early.
    #[error("Replicator has not been started")]
    NotStarted,

    /// The replicator is in the wrong lifecycle state for the operation.
    #[error("Invalid replicator state: expected {expected}, found {actual}")]
    InvalidState {
        /// Expected lifecycle state.
        expected: String,
        /// Actual lifecycle state.
        actual: String,
    },
}

impl ReplicatorError {
    /// Creates a bad source server error.
    pub fn bad_source_server(server: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BadSourceServer {
            server: server.into(),
            message: message.into(),
        }
    }

    /// Creates a bad destination server error.
    pub fn bad_destination_server(server: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BadDestinationServer {
            server: server.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid state error.
    pub fn invalid_state(expected: impl fmt::Display, actual: impl fmt::Display) -> Self {
        Self::InvalidState {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Returns `true` if this error is a startup configuration defect.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ReplicatorError::Reconcile(_)
                | ReplicatorError::Plan(_)
                | ReplicatorError::BadSourceServer { .. }
                | ReplicatorError::BadDestinationServer { .. }
        )
    }

    /// Returns the error type as a string for logging.
    pub fn error_type(&self) -> &'static str {
        match self {
            ReplicatorError::Historian(_) => "historian",
            ReplicatorError::Reconcile(_) => "reconcile",
            ReplicatorError::Plan(_) => "plan",
            ReplicatorError::Dispatch(_) => "dispatch",
            ReplicatorError::Scheduler(_) => "scheduler",
            ReplicatorError::BadSourceServer { .. } => "bad_source_server",
            ReplicatorError::BadDestinationServer { .. } => "bad_destination_server",
            ReplicatorError::NotStarted => "not_started",
            ReplicatorError::InvalidState { .. } => "invalid_state",
        }
    }

    /// Returns an operator-facing error message.
    pub fn user_message(&self) -> String {
        match self {
            ReplicatorError::Historian(e) => e.user_message(),
            ReplicatorError::Reconcile(e) => e.to_string(),
            ReplicatorError::Plan(e) => e.to_string(),
            ReplicatorError::Dispatch(e) => e.to_string(),
            ReplicatorError::Scheduler(e) => e.to_string(),
            ReplicatorError::BadSourceServer { .. } => {
                "There was an issue locating the supplied source historian.".to_string()
            }
            ReplicatorError::BadDestinationServer { .. } => {
                "There was an issue locating the supplied destination historian.".to_string()
            }
            other => other.to_string(),
        }
    }
}

// =============================================================================
// HistorianError
// =============================================================================

/// Historian client errors.
#[derive(Debug, Error)]
pub enum HistorianError {
    /// Server lookup failed.
    #[error("Server not found: {server}")]
    ServerNotFound {
        /// The server name.
        server: String,
    },

    /// Point lookup failed.
    #[error("Point not found: {point}")]
    PointNotFound {
        /// The point path.
        point: String,
    },

    /// The subscription was already closed.
    #[error("Subscription {subscription} is already closed")]
    SubscriptionClosed {
        /// Subscription identifier.
        subscription: String,
    },

    /// The change pipe was torn down while the operation was in flight.
    #[error("Change pipe torn down: {message}")]
    PipeTornDown {
        /// Error message.
        message: String,
    },

    /// Transport-level failure.
    #[error("Transport error ({code}): {message}")]
    Transport {
        /// Transport error code.
        code: i32,
        /// Error message.
        message: String,
        /// Underlying error.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Operation timed out.
    #[error("Operation timed out after {duration:?}")]
    Timeout {
        /// The timeout duration.
        duration: Duration,
    },

    /// The backend does not support the operation.
    #[error("Unsupported operation: {message}")]
    Unsupported {
        /// Error message.
        message: String,
    },
}

impl HistorianError {
    /// Creates a server not found error.
    pub fn server_not_found(server: impl Into<String>) -> Self {
        Self::ServerNotFound {
            server: server.into(),
        }
    }

    /// Creates a point not found error.
    pub fn point_not_found(point: impl Into<String>) -> Self {
        Self::PointNotFound {
            point: point.into(),
        }
    }

    /// Creates a subscription closed error.
    pub fn subscription_closed(subscription: impl fmt::Display) -> Self {
        Self::SubscriptionClosed {
            subscription: subscription.to_string(),
        }
    }

    /// Creates a pipe torn down error.
    pub fn pipe_torn_down(message: impl Into<String>) -> Self {
        Self::PipeTornDown {
            message: message.into(),
        }
    }

    /// Creates a transport error.
    pub fn transport(code: i32, message: impl Into<String>) -> Self {
        Self::Transport {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// Creates a transport error with a source.
    pub fn transport_with<E>(code: i32, message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Transport {
            code,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a timeout error.
    pub fn timeout(duration: Duration) -> Self {
        Self::Timeout { duration }
    }

    /// Creates an unsupported operation error.
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported {
            message: message.into(),
        }
    }

    /// Returns `true` for the two conditions that only occur while a
    /// subscription is being torn down.
    pub fn is_shutdown_race(&self) -> bool {
        matches!(
            self,
            HistorianError::SubscriptionClosed { .. } | HistorianError::PipeTornDown { .. }
        )
    }

    /// Returns `true` if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            HistorianError::Timeout { .. } | HistorianError::Transport { .. }
        )
    }

    /// Returns a numeric failure code suitable for structured logs.
    pub fn code(&self) -> i32 {
        match self {
            HistorianError::Transport { code, .. } => *code,
            HistorianError::ServerNotFound { .. } => -1,
            HistorianError::PointNotFound { .. } => -2,
            HistorianError::SubscriptionClosed { .. } => -3,
            HistorianError::PipeTornDown { .. } => -4,
            HistorianError::Timeout { .. } => -5,
            HistorianError::Unsupported { .. } => -6,
        }
    }

    /// Returns an operator-facing error message.
    pub fn user_message(&self) -> String {
        match self {
            HistorianError::ServerNotFound { server } => {
                format!("The historian server '{}' could not be found", server)
            }
            HistorianError::PointNotFound { point } => {
                format!("The point '{}' could not be found", point)
            }
            HistorianError::SubscriptionClosed { .. } | HistorianError::PipeTornDown { .. } => {
                "The change subscription is shutting down".to_string()
            }
            HistorianError::Transport { message, .. } => {
                format!("Communication with the historian failed: {}", message)
            }
            HistorianError::Timeout { duration } => {
                format!("The historian did not respond within {:.1}s", duration.as_secs_f64())
            }
            HistorianError::Unsupported { message } => message.clone(),
        }
    }

    /// Returns the error type for logging.
    pub fn error_type(&self) -> &'static str {
        match self {
            HistorianError::ServerNotFound { .. } => "server_not_found",
            HistorianError::PointNotFound { .. } => "point_not_found",
            HistorianError::SubscriptionClosed { .. } => "subscription_closed",
            HistorianError::PipeTornDown { .. } => "pipe_torn_down",
            HistorianError::Transport { .. } => "transport",
            HistorianError::Timeout { .. } => "timeout",
            HistorianError::Unsupported { .. } => "unsupported",
        }
    }
}

impl Clone for HistorianError {
    fn clone(&self) -> Self {
        match self {
            HistorianError::ServerNotFound { server } => HistorianError::ServerNotFound {
                server: server.clone(),
            },
            HistorianError::PointNotFound { point } => HistorianError::PointNotFound {
                point: point.clone(),
            },
            HistorianError::SubscriptionClosed { subscription } => {
                HistorianError::SubscriptionClosed {
                    subscription: subscription.clone(),
                }
            }
            HistorianError::PipeTornDown { message } => HistorianError::PipeTornDown {
                message: message.clone(),
            },
            HistorianError::Transport { code, message, .. } => HistorianError::Transport {
                code: *code,
                message: message.clone(),
                source: None,
            },
            HistorianError::Timeout { duration } => HistorianError::Timeout {
                duration: *duration,
            },
            HistorianError::Unsupported { message } => HistorianError::Unsupported {
                message: message.clone(),
            },
        }
    }
}

// =============================================================================
// ReconcileError
// =============================================================================

/// Point reconciliation errors.
///
/// Per-point failures are logged and never produce one of these; only an
/// endpoint that yields no usable points at all does.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The configured point list is empty.
    #[error("No point names were supplied")]
    EmptyPointList,

    /// No point resolved on the source.
    #[error("No points were successfully loaded from the source historian ({requested} requested)")]
    NoSourcePoints {
        /// Number of names requested.
        requested: usize,
    },

    /// No point resolved on the destination.
    #[error("No points were successfully loaded from the destination historian ({requested} requested)")]
    NoDestinationPoints {
        /// Number of names requested.
        requested: usize,
    },

    /// Both endpoints resolved points, but no name resolved on both.
    #[error("No point resolved on both the source and the destination historian ({requested} requested)")]
    NoCommonPoints {
        /// Number of names requested.
        requested: usize,
    },

    /// A batched lookup call failed as a whole.
    #[error("Point lookup on {endpoint} failed: {source}")]
    Lookup {
        /// Endpoint label.
        endpoint: &'static str,
        /// Underlying error.
        #[source]
        source: HistorianError,
    },
}

// =============================================================================
// PlanError
// =============================================================================

/// Historical range planning errors.
#[derive(Debug, Error)]
pub enum PlanError {
    /// Window start is not strictly before its end.
    #[error("Invalid recovery window: start {start} is not before end {end}")]
    InvalidWindow {
        /// Window start (RFC 3339).
        start: String,
        /// Window end (RFC 3339).
        end: String,
    },

    /// There are no active points to sample.
    #[error("Cannot plan recovery without active points")]
    NoActivePoints,

    /// A numeric planner parameter is out of range.
    #[error("Invalid planner parameter '{parameter}': {message}")]
    InvalidParameter {
        /// Parameter name.
        parameter: &'static str,
        /// Error message.
        message: String,
    },

    /// Event count sampling failed.
    #[error("Event count for '{point}' failed: {source}")]
    EventCount {
        /// Point path.
        point: String,
        /// Underlying error.
        #[source]
        source: HistorianError,
    },
}

impl PlanError {
    /// Creates an invalid parameter error.
    pub fn invalid_parameter(parameter: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            parameter,
            message: message.into(),
        }
    }
}

// =============================================================================
// DispatchError
// =============================================================================

/// Dispatch engine errors.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The dead-letter file could not be written.
    #[error("Failed to write dead-letter file '{path}': {source}")]
    DeadLetterIo {
        /// File path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl DispatchError {
    /// Creates a dead-letter I/O error.
    pub fn dead_letter_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::DeadLetterIo {
            path: path.into(),
            source,
        }
    }
}

// =============================================================================
// SchedulerError
// =============================================================================

/// Tick scheduler errors.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The scheduler was started twice.
    #[error("Scheduler '{name}' is already started")]
    AlreadyStarted {
        /// Scheduler name.
        name: String,
    },

    /// The tick period is zero.
    #[error("Scheduler '{name}' has an invalid period of {period:?}")]
    InvalidPeriod {
        /// Scheduler name.
        name: String,
        /// Configured period.
        period: Duration,
    },
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type alias for [`ReplicatorError`].
pub type ReplicatorResult<T> = Result<T, ReplicatorError>;

/// Result type alias for [`HistorianError`].
pub type HistorianResult<T> = Result<T, HistorianError>;

/// Result type alias for [`ReconcileError`].
pub type ReconcileResult<T> = Result<T, ReconcileError>;

/// Result type alias for [`PlanError`].
pub type PlanResult<T> = Result<T, PlanError>;

/// Result type alias for [`DispatchError`].
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Result type alias for [`SchedulerError`].
pub type SchedulerResult<T> = Result<T, SchedulerError>;

// =============================================================================
// Tests
// =============================================================================
