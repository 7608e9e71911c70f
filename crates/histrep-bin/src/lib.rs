// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # histrep-bin
//!
//! CLI binary for the histrep historian replicator.
//!
//! This crate provides the main binary entry point, including:
//!
//! - CLI argument parsing with clap
//! - Replicator runtime orchestration
//! - Graceful shutdown handling
//! - Logging initialization
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         main.rs                              │
//! │                    (Entry Point)                             │
//! └─────────────────────────┬───────────────────────────────────┘
//!                           │
//!                    ┌──────▼──────┐
//!                    │    cli.rs   │
//!                    └──────┬──────┘
//!                           │
//!               ┌───────────┼───────────┐
//!               ▼           ▼           ▼
//!        ┌──────────┐ ┌──────────┐ ┌──────────┐
//!        │ commands │ │ runtime  │ │ logging  │
//!        └──────────┘ └────┬─────┘ └──────────┘
//!                          │
//!                   ┌──────▼──────┐
//!                   │  shutdown   │
//!                   └──────┬──────┘
//!                          │
//!               ┌──────────▼──────────┐
//!               │ histrep-core        │
//!               │ (Replicator)        │
//!               └─────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Start replicating (default command)
//! histrep
//!
//! # Backfill a window and exit when done
//! histrep -c /etc/histrep/backfill.yaml run --exit-when-done
//!
//! # Validate configuration
//! histrep validate --strict
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

// =============================================================================
// Modules
// =============================================================================

pub mod cli;
pub mod commands;
pub mod error;
pub mod logging;
pub mod runtime;
pub mod shutdown;

// =============================================================================
// Re-exports
// =============================================================================

pub use cli::{Cli, Commands};
pub use error::{BinError, BinResult};
pub use logging::init_logging;
pub use runtime::{ReplicatorRuntime, RunReport, RuntimeBuilder};
pub use shutdown::{ShutdownCoordinator, ShutdownSignal};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
