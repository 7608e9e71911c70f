// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Dispatch engine.
//!
//! Each tick drains the send queue in one call, groups the items by
//! destination point, issues one write per group and awaits them all. Items
//! the destination rejects are logged and appended to the dead-letter file;
//! they are never re-sent.
//!
//! ```text
//!  SendQueue ──drain_all──▶ group by destination ──▶ write_values × N (concurrent)
//!                                                         │
//!                                   immutable failure list ◀┘
//!                                          │
//!                              error! per item + dead-letter file
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, error};

use crate::deadletter::{DeadLetterEntry, DeadLetterFile};
use crate::historian::{HistorianClient, WriteOptions};
use crate::queue::SendQueue;
use crate::reconcile::PointMap;
use crate::types::{PointHandle, SampleItem};

// =============================================================================
// Failures
// =============================================================================

/// Why an item was not delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCode {
    /// Code reported by the destination, per item or for the whole call.
    Destination(i32),
    /// The item's point is not in the point map.
    Unmapped,
}

impl fmt::Display for FailureCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureCode::Destination(code) => write!(f, "{}", code),
            FailureCode::Unmapped => f.write_str("unmapped"),
        }
    }
}

/// An item that was not delivered.
#[derive(Debug, Clone, PartialEq)]
pub struct SendFailure {
    /// The undelivered item.
    pub item: SampleItem,
    /// Failure code.
    pub code: FailureCode,
    /// Failure message.
    pub message: String,
}

impl SendFailure {
    fn dead_letter(&self) -> DeadLetterEntry {
        DeadLetterEntry::new(self.item.point.clone(), self.item.value.clone())
    }
}

// =============================================================================
// Outcome & Stats
// =============================================================================

/// The result of one dispatch tick.
#[derive(Debug, Clone, Default)]
pub struct DispatchOutcome {
    /// Items drained from the send queue.
    pub drained: usize,
    /// Write calls issued.
    pub write_calls: usize,
    /// Items accepted by the destination.
    pub written: usize,
    /// Items not delivered.
    pub failures: Vec<SendFailure>,
}

impl DispatchOutcome {
    /// Returns `true` if the tick found nothing to send.
    pub fn is_idle(&self) -> bool {
        self.drained == 0
    }
}

/// Cumulative dispatch counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    /// Ticks that drained at least one item.
    pub active_ticks: u64,
    /// Items drained.
    pub drained: u64,
    /// Items written.
    pub written: u64,
    /// Items failed.
    pub failed: u64,
    /// Items dead-lettered.
    pub dead_lettered: u64,
}

#[derive(Debug, Default)]
struct StatsInner {
    active_ticks: AtomicU64,
    drained: AtomicU64,
    written: AtomicU64,
    failed: AtomicU64,
    dead_lettered: AtomicU64,
}

// =============================================================================
// Dispatch Engine
// =============================================================================

/// Drains the send queue and writes to the destination.
pub struct DispatchEngine {
    destination: Arc<dyn HistorianClient>,
    points: Arc<PointMap>,
    queue: Arc<SendQueue>,
    dead_letter: Arc<DeadLetterFile>,
    options: WriteOptions,
    stats: StatsInner,
}

impl DispatchEngine {
    /// Creates an engine writing with insert/buffer-if-unreachable options.
    pub fn new(
        destination: Arc<dyn HistorianClient>,
        points: Arc<PointMap>,
        queue: Arc<SendQueue>,
        dead_letter: Arc<DeadLetterFile>,
    ) -> Self {
        Self {
            destination,
            points,
            queue,
            dead_letter,
            options: WriteOptions::insert_buffered(),
            stats: StatsInner::default(),
        }
    }

    /// Overrides the write options.
    pub fn with_options(mut self, options: WriteOptions) -> Self {
        self.options = options;
        self
    }

    /// Returns the send queue.
    pub fn queue(&self) -> &Arc<SendQueue> {
        &self.queue
    }

    /// Runs one dispatch tick.
    pub async fn dispatch_once(&self) -> DispatchOutcome {
        let items = self.queue.drain_all();
        if items.is_empty() {
            return DispatchOutcome::default();
        }

        let drained = items.len();
        let mut failures = Vec::new();
        let mut groups: BTreeMap<PointHandle, Vec<SampleItem>> = BTreeMap::new();
        for item in items {
            match self.points.destination(&item.point) {
                Some(handle) => groups.entry(handle.clone()).or_default().push(item),
                None => failures.push(SendFailure {
                    message: format!("point '{}' is not in the point map", item.point),
                    item,
                    code: FailureCode::Unmapped,
                }),
            }
        }

        let write_calls = groups.len();
        let results = join_all(groups.iter().map(|(handle, values)| async move {
            (values, self.destination.write_values(handle, values, self.options).await)
        }))
        .await;

        let mut written = 0;
        for (values, result) in results {
            match result {
                Ok(outcome) => {
                    written += outcome.written;
                    failures.extend(outcome.failures.into_iter().map(|f| SendFailure {
                        item: f.item,
                        code: FailureCode::Destination(f.code),
                        message: f.message,
                    }));
                }
                Err(e) => {
                    let code = FailureCode::Destination(e.code());
                    let message = e.to_string();
                    failures.extend(values.iter().map(|item| SendFailure {
                        item: item.clone(),
                        code,
                        message: message.clone(),
                    }));
                }
            }
        }

        self.report_failures(&failures);

        self.stats.active_ticks.fetch_add(1, Ordering::Relaxed);
        self.stats.drained.fetch_add(drained as u64, Ordering::Relaxed);
        self.stats.written.fetch_add(written as u64, Ordering::Relaxed);
        self.stats
            .failed
            .fetch_add(failures.len() as u64, Ordering::Relaxed);

        debug!(
            drained,
            write_calls,
            written,
            failed = failures.len(),
            "Dispatch tick complete"
        );

        DispatchOutcome {
            drained,
            write_calls,
            written,
            failures,
        }
    }

    /// Logs every failure and appends it to the dead-letter file.
    fn report_failures(&self, failures: &[SendFailure]) {
        if failures.is_empty() {
            return;
        }

        for failure in failures {
            error!(
                point = %failure.item.point,
                value = %failure.item.value,
                timestamp = %failure.item.timestamp.to_rfc3339(),
                code = %failure.code,
                message = %failure.message,
                "Failed to send value"
            );
        }

        let entries: Vec<DeadLetterEntry> = failures.iter().map(SendFailure::dead_letter).collect();
        match self.dead_letter.append_all(&entries) {
            Ok(()) => {
                self.stats
                    .dead_lettered
                    .fetch_add(entries.len() as u64, Ordering::Relaxed);
            }
            Err(e) => {
                error!(
                    path = %self.dead_letter.path().display(),
                    count = entries.len(),
                    error = %e,
                    "Failed to record values in the dead-letter file"
                );
            }
        }
    }

    /// Returns cumulative counters.
    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            active_ticks: self.stats.active_ticks.load(Ordering::Relaxed),
            drained: self.stats.drained.load(Ordering::Relaxed),
            written: self.stats.written.load(Ordering::Relaxed),
            failed: self.stats.failed.load(Ordering::Relaxed),
            dead_lettered: self.stats.dead_lettered.load(Ordering::Relaxed),
        }
    }
}

impl fmt::Debug for DispatchEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchEngine")
            .field("destination", &self.destination.name())
            .field("points", &self.points.len())
            .field("queued", &self.queue.len())
            .field("options", &self.options)
            .finish()
    }
}
