// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # histrep Integration Tests
//!
//! Integration tests for the histrep historian replicator, plus the
//! utilities they share.
//!
//! ## Module Structure
//!
//! - [`common`]: Shared test utilities
//!   - `fixtures`: Point names, timestamps and sample series
//!   - `builders`: Configuration and points files on disk
//!   - `harness`: A source/destination pair of in-memory historians
//!   - `logs`: A tracing layer that records events for assertions
//!
//! ## Running Tests
//!
//! ```bash
//! # Run all integration tests
//! cargo test -p histrep-tests
//!
//! # Run specific test suite
//! cargo test -p histrep-tests --test integration_pipeline
//! cargo test -p histrep-tests --test integration_config
//! ```
//!
//! ## Writing New Tests
//!
//! ```rust,ignore
//! use histrep_tests::common::harness::ReplicationHarness;
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let harness = ReplicationHarness::new(&["A", "B"]);
//!     let replicator = harness.replicator(harness.realtime_settings());
//!     // ... test logic
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod common;

/// Re-export commonly used items for convenience.
pub mod prelude {
    pub use crate::common::builders::*;
    pub use crate::common::fixtures::*;
    pub use crate::common::harness::*;
    pub use crate::common::logs::*;
}
