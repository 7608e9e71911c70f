// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Historical recovery workers.
//!
//! Once the plan is queued, one worker task is spawned per range. Each worker
//! pops exactly one range, reads it page by page across every active source
//! point and pushes each page onto the send queue. Workers are independent:
//! a failed read is logged, is not retried and does not affect siblings.
//! Workers are never aborted; dropping a [`RecoveryHandle`] detaches them.

use std::fmt;
use std::sync::Arc;

use futures::future::join_all;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::error::HistorianResult;
use crate::historian::HistorianClient;
use crate::queue::{RangeQueue, SendQueue};
use crate::types::{PointHandle, TimeRange};

/// Default number of events per bulk read page.
pub const DEFAULT_PAGE_SIZE: usize = 100_000;

/// What a single worker did.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeOutcome {
    /// The range the worker popped, if any.
    pub range: Option<TimeRange>,
    /// Pages pushed to the send queue.
    pub pages: usize,
    /// Items pushed to the send queue.
    pub items: usize,
    /// Failure message, if the worker failed.
    pub error: Option<String>,
}

impl RangeOutcome {
    /// Returns `true` if the range was read completely.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Aggregate result of every worker.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecoveryReport {
    /// Worker outcomes in spawn order.
    pub outcomes: Vec<RangeOutcome>,
}

impl RecoveryReport {
    /// Returns the number of ranges read completely.
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    /// Returns the number of failed workers.
    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    /// Returns the number of items pushed by all workers.
    pub fn items(&self) -> usize {
        self.outcomes.iter().map(|o| o.items).sum()
    }
}

// =============================================================================
// Historical Recovery
// =============================================================================

/// Shared state for recovery workers.
pub struct HistoricalRecovery {
    source: Arc<dyn HistorianClient>,
    points: Arc<[PointHandle]>,
    ranges: Arc<RangeQueue>,
    queue: Arc<SendQueue>,
    page_size: usize,
}

impl HistoricalRecovery {
    /// Creates the recovery context.
    pub fn new(
        source: Arc<dyn HistorianClient>,
        points: Vec<PointHandle>,
        ranges: Arc<RangeQueue>,
        queue: Arc<SendQueue>,
        page_size: usize,
    ) -> Self {
        Self {
            source,
            points: points.into(),
            ranges,
            queue,
            page_size: page_size.max(1),
        }
    }

    /// Spawns one worker per queued range.
    pub fn spawn_workers(self: &Arc<Self>) -> RecoveryHandle {
        let count = self.ranges.len();
        info!(workers = count, page_size = self.page_size, "Starting historical recovery");

        let handles = (0..count)
            .map(|worker| {
                let recovery = Arc::clone(self);
                tokio::spawn(async move { recovery.run_worker(worker).await })
            })
            .collect();
        RecoveryHandle { handles }
    }

    /// Pops one range and recovers it.
    pub async fn run_worker(&self, worker: usize) -> RangeOutcome {
        let Some(range) = self.ranges.pop() else {
            error!(worker, "Recovery worker found no range to recover");
            return RangeOutcome {
                range: None,
                pages: 0,
                items: 0,
                error: Some("range queue was empty".to_string()),
            };
        };

        let mut pages = 0;
        let mut items = 0;
        let result = self.recover_range(&range, &mut pages, &mut items).await;

        match result {
            Ok(()) => {
                info!(worker, range = %range, pages, items, "Recovered range");
                RangeOutcome {
                    range: Some(range),
                    pages,
                    items,
                    error: None,
                }
            }
            Err(e) => {
                error!(
                    worker,
                    range = %range,
                    pages,
                    items,
                    code = e.code(),
                    error = %e,
                    "Failed to recover range"
                );
                RangeOutcome {
                    range: Some(range),
                    pages,
                    items,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    async fn recover_range(&self, range: &TimeRange, pages: &mut usize, items: &mut usize) -> HistorianResult<()> {
        let mut stream = self
            .source
            .read_bulk(&self.points, range, self.page_size)
            .await?;

        while let Some(page) = stream.next().await {
            let page = page?;
            *items += self.queue.push_many(page);
            *pages += 1;
            debug!(range = %range, page = *pages, "Queued page");
        }
        Ok(())
    }
}

impl fmt::Debug for HistoricalRecovery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HistoricalRecovery")
            .field("source", &self.source.name())
            .field("points", &self.points.len())
            .field("ranges", &self.ranges.len())
            .field("page_size", &self.page_size)
            .finish()
    }
}

/// Handles to running recovery workers.
#[derive(Debug)]
pub struct RecoveryHandle {
    handles: Vec<JoinHandle<RangeOutcome>>,
}

impl RecoveryHandle {
    /// Returns the number of workers spawned.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Returns `true` if no worker was spawned.
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Returns `true` once every worker has finished.
    pub fn is_finished(&self) -> bool {
        self.handles.iter().all(JoinHandle::is_finished)
    }

    /// Waits for every worker.
    pub async fn wait(self) -> RecoveryReport {
        let outcomes = join_all(self.handles)
            .await
            .into_iter()
            .map(|joined| {
                joined.unwrap_or_else(|e| {
                    error!(error = %e, "Recovery worker panicked");
                    RangeOutcome {
                        range: None,
                        pages: 0,
                        items: 0,
                        error: Some(e.to_string()),
                    }
                })
            })
            .collect();

        let report = RecoveryReport { outcomes };
        info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            items = report.items(),
            "Historical recovery finished"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryHistorian;
    use crate::planner::split_window;
    use crate::types::{PointName, SampleItem};
    use chrono::{DateTime, TimeZone, Utc};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).single().unwrap()
    }

    /// Two points with one sample per second over [0, 300).
    fn source() -> (Arc<InMemoryHistorian>, Vec<PointHandle>) {
        let historian = Arc::new(InMemoryHistorian::new());
        let mut handles = Vec::new();
        for name in ["A", "B"] {
            handles.push(historian.add_point("src", PointName::new(name)));
            historian.insert_samples("src", (0..300).map(|s| SampleItem::good(name, s as f64, at(s))));
        }
        (historian, handles)
    }

    fn recovery(
        historian: Arc<InMemoryHistorian>,
        handles: Vec<PointHandle>,
        ranges: usize,
        page_size: usize,
    ) -> Arc<HistoricalRecovery> {
        let window = TimeRange::new(at(0), at(300)).unwrap();
        let queue = Arc::new(RangeQueue::new());
        queue.push_many(split_window(&window, ranges));
        Arc::new(HistoricalRecovery::new(
            historian,
            handles,
            queue,
            Arc::new(SendQueue::new()),
            page_size,
        ))
    }

    #[tokio::test]
    async fn test_one_worker_per_range() {
        let (historian, handles) = source();
        let recovery = recovery(historian, handles, 3, 1000);

        let handle = recovery.spawn_workers();
        assert_eq!(handle.len(), 3);
        let report = handle.wait().await;

        assert_eq!(report.succeeded(), 3);
        assert_eq!(report.items(), 600);
        assert_eq!(recovery.queue.len(), 600);
        assert!(recovery.ranges.is_empty());
    }

    #[tokio::test]
    async fn test_pages_are_bounded() {
        let (historian, handles) = source();
        let recovery = recovery(historian, handles, 1, 64);

        let outcome = recovery.run_worker(0).await;

        assert!(outcome.is_success());
        assert_eq!(outcome.items, 600);
        assert_eq!(outcome.pages, 10);
    }

    #[tokio::test]
    async fn test_failed_range_does_not_affect_siblings() {
        let (historian, handles) = source();
        historian.fail_reads_overlapping(TimeRange::new(at(120), at(130)).unwrap());
        let recovery = recovery(historian, handles, 3, 1000);

        let report = recovery.spawn_workers().wait().await;

        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.items(), 400);
        let failed = report.outcomes.iter().find(|o| !o.is_success()).unwrap();
        assert_eq!(failed.range.unwrap().start(), at(100));
    }

    #[tokio::test]
    async fn test_worker_on_empty_queue() {
        let (historian, handles) = source();
        let recovery = recovery(historian, handles, 1, 1000);
        assert!(recovery.run_worker(0).await.is_success());

        let outcome = recovery.run_worker(1).await;
        assert!(outcome.range.is_none());
        assert!(!outcome.is_success());
    }
}
