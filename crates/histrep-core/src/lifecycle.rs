// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Replicator lifecycle state.
//!
//! A [`Lifecycle`] is shared by the replicator and every component that does
//! periodic work. Components check it before starting work so nothing new is
//! pulled once shutdown has begun.
//!
//! ```text
//! Created ──start()──▶ Running ──begin_stop()──▶ Stopping ──finish_stop()──▶ Stopped
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ReplicatorError, ReplicatorResult};

/// Lifecycle state of a replicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Constructed but not started.
    #[default]
    Created,
    /// Replication is active.
    Running,
    /// Shutdown has begun; no new work is started.
    Stopping,
    /// Shutdown is complete.
    Stopped,
}

impl LifecycleState {
    /// Returns the numeric representation.
    pub fn as_u8(&self) -> u8 {
        match self {
            LifecycleState::Created => 0,
            LifecycleState::Running => 1,
            LifecycleState::Stopping => 2,
            LifecycleState::Stopped => 3,
        }
    }
}

impl From<u8> for LifecycleState {
    fn from(v: u8) -> Self {
        match v {
            0 => LifecycleState::Created,
            1 => LifecycleState::Running,
            2 => LifecycleState::Stopping,
            _ => LifecycleState::Stopped,
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::Created => write!(f, "Created"),
            LifecycleState::Running => write!(f, "Running"),
            LifecycleState::Stopping => write!(f, "Stopping"),
            LifecycleState::Stopped => write!(f, "Stopped"),
        }
    }
}

/// Lock-free lifecycle cell.
#[derive(Debug, Default)]
pub struct Lifecycle {
    state: AtomicU8,
}

impl Lifecycle {
    /// Creates a lifecycle in the `Created` state.
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(LifecycleState::Created.as_u8()),
        }
    }

    /// Returns the current state.
    #[inline]
    pub fn state(&self) -> LifecycleState {
        LifecycleState::from(self.state.load(Ordering::SeqCst))
    }

    /// Returns `true` while replication is active.
    #[inline]
    pub fn is_running(&self) -> bool {
        self.state() == LifecycleState::Running
    }

    /// Moves `Created` to `Running`.
    ///
    /// # Errors
    ///
    /// Returns `ReplicatorError::InvalidState` from any other state.
    pub fn start(&self) -> ReplicatorResult<()> {
        self.transition(LifecycleState::Created, LifecycleState::Running)
            .map_err(|actual| ReplicatorError::invalid_state(LifecycleState::Created, actual))
    }

    /// Moves `Running` to `Stopping`.
    ///
    /// Returns `false` if the lifecycle was not running, so concurrent
    /// callers agree on exactly one stopper.
    pub fn begin_stop(&self) -> bool {
        self.transition(LifecycleState::Running, LifecycleState::Stopping)
            .is_ok()
    }

    /// Marks shutdown complete.
    pub fn finish_stop(&self) {
        let previous = LifecycleState::from(
            self.state
                .swap(LifecycleState::Stopped.as_u8(), Ordering::SeqCst),
        );
        debug!(from = %previous, "Lifecycle stopped");
    }

    fn transition(&self, from: LifecycleState, to: LifecycleState) -> Result<(), LifecycleState> {
        self.state
            .compare_exchange(from.as_u8(), to.as_u8(), Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| debug!(from = %from, to = %to, "Lifecycle transition"))
            .map_err(LifecycleState::from)
    }
}
