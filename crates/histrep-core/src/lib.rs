// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # histrep-core
//!
//! Core of the histrep historian replicator.
//!
//! This crate moves time-series data from a source historian to a
//! destination historian, either by forwarding live changes or by backfilling
//! a past window:
//!
//! - **Types**: `PointName`, `PointHandle`, `SampleItem`, `TimeRange`, `Value`
//! - **Queue**: thread-safe FIFO work queues between pipeline stages
//! - **Historian**: the client interface and backend registry
//! - **Memory**: an in-process historian backend
//! - **Reconcile**: point identity resolution across both historians
//! - **Planner**: historical range planning against a read-rate budget
//! - **Realtime / Recovery**: the two producers feeding the send queue
//! - **Dispatch**: the timer-driven writer with dead-letter isolation
//! - **Scheduler / Lifecycle**: periodic ticks and shutdown state
//! - **Replicator**: orchestration of all of the above
//!
//! ## Example
//!
//! ```rust,ignore
//! use histrep_core::historian::{HistorianConfig, HistorianRegistry};
//! use histrep_core::replicator::{Replicator, ReplicatorSettings};
//! use histrep_core::types::PointName;
//!
//! let registry = HistorianRegistry::with_defaults();
//! let source = registry.create(&HistorianConfig::new("memory", "archive-a"))?;
//! let destination = registry.create(&HistorianConfig::new("memory", "archive-b"))?;
//!
//! let settings = ReplicatorSettings::realtime("archive-a", "archive-b", vec![PointName::new("SINUSOID")]);
//! let replicator = Replicator::new(settings, source, destination);
//! replicator.start().await?;
//! // ...
//! replicator.stop().await?;
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

// =============================================================================
// Core Modules
// =============================================================================

pub mod error;
pub mod queue;
pub mod types;

// =============================================================================
// Historian Modules
// =============================================================================

pub mod historian;
pub mod memory;

// =============================================================================
// Pipeline Modules
// =============================================================================

pub mod deadletter;
pub mod dispatch;
pub mod planner;
pub mod realtime;
pub mod reconcile;
pub mod recovery;

// =============================================================================
// Runtime Modules
// =============================================================================

pub mod lifecycle;
pub mod replicator;
pub mod scheduler;

// =============================================================================
// Re-exports for convenience
// =============================================================================

pub use error::*;
pub use types::*;

pub use queue::{QueueStats, RangeQueue, SendQueue, WorkQueue};

// Re-export historian types
pub use historian::{
    BufferOption, ChangeEvent, ChangeSubscription, HistorianClient, HistorianConfig,
    HistorianFactory, HistorianRegistry, ItemFailure, LookupFailure, LookupFailureKind,
    PageStream, PointLookup, PumpResult, SubscriptionId, UpdateOption, WriteOptions, WriteOutcome,
};
pub use memory::{InMemoryHistorian, InMemoryHistorianFactory};

// Re-export pipeline types
pub use deadletter::{DeadLetterEntry, DeadLetterFile};
pub use dispatch::{DispatchEngine, DispatchOutcome, DispatchStats, FailureCode, SendFailure};
pub use planner::{PlannerConfig, RangePlanner, MAX_RANGES};
pub use realtime::{PumpSummary, RealtimeIngestor};
pub use reconcile::{PointIdentity, PointMap, PointReconciler, ReconcileReport, Reconciliation};
pub use recovery::{HistoricalRecovery, RangeOutcome, RecoveryHandle, RecoveryReport};

// Re-export runtime types
pub use lifecycle::{Lifecycle, LifecycleState};
pub use replicator::{Replicator, ReplicatorSettings, StartupSummary};
pub use scheduler::{TickPolicy, TickScheduler, TickStats};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
