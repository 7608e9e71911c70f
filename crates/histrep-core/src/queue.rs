// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Thread-safe FIFO work queue.
//!
//! [`WorkQueue`] is the only hand-off structure between pipeline stages. The
//! send queue carries [`SampleItem`](crate::types::SampleItem)s from every
//! producer to the dispatch engine; the range queue carries planned
//! [`TimeRange`](crate::types::TimeRange)s to the recovery workers.
//!
//! # Guarantees
//!
//! - **Single critical section**: every operation takes the same lock once.
//! - **Never blocks**: `pop` and `drain_all` on an empty queue return
//!   immediately.
//! - **Snapshot drains**: `drain_all` returns exactly the items present when
//!   the lock was taken; later pushes stay queued for the next drain.
//! - **Per-producer FIFO**: items pushed by one producer come out in push
//!   order. No ordering is promised across producers.
//!
//! # Example
//!
//! ```
//! use histrep_core::queue::WorkQueue;
//!
//! let queue = WorkQueue::new();
//! queue.push(1);
//! queue.push_many([2, 3]);
//!
//! assert_eq!(queue.pop(), Some(1));
//! assert_eq!(queue.drain_all(), vec![2, 3]);
//! assert!(queue.is_empty());
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::types::{SampleItem, TimeRange};

/// Queue of samples awaiting dispatch.
pub type SendQueue = WorkQueue<SampleItem>;

/// Queue of planned recovery ranges.
pub type RangeQueue = WorkQueue<TimeRange>;

// =============================================================================
// Work Queue
// =============================================================================

/// A mutex-protected FIFO queue safe for concurrent producers and consumers.
///
/// Queues are explicitly constructed and shared by `Arc`; there is no global
/// instance.
pub struct WorkQueue<T> {
    /// The queued items (FIFO).
    items: Mutex<VecDeque<T>>,

    /// Total items ever pushed.
    pushed: AtomicU64,

    /// Total items ever removed by `pop` or `drain_all`.
    removed: AtomicU64,
}

impl<T> WorkQueue<T> {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            pushed: AtomicU64::new(0),
            removed: AtomicU64::new(0),
        }
    }

    /// Creates an empty queue with preallocated capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            pushed: AtomicU64::new(0),
            removed: AtomicU64::new(0),
        }
    }

    /// Appends one item.
    pub fn push(&self, item: T) {
        self.items.lock().push_back(item);
        self.pushed.fetch_add(1, Ordering::Relaxed);
    }

    /// Appends several items under a single lock acquisition.
    ///
    /// The items stay contiguous and in iteration order relative to each
    /// other; returns the number of items pushed.
    pub fn push_many<I>(&self, items: I) -> usize
    where
        I: IntoIterator<Item = T>,
    {
        let mut queue = self.items.lock();
        let before = queue.len();
        queue.extend(items);
        let count = queue.len() - before;
        drop(queue);

        self.pushed.fetch_add(count as u64, Ordering::Relaxed);
        count
    }

    /// Removes and returns the oldest item, or `None` if the queue is empty.
    pub fn pop(&self) -> Option<T> {
        let item = self.items.lock().pop_front();
        if item.is_some() {
            self.removed.fetch_add(1, Ordering::Relaxed);
        }
        item
    }

    /// Atomically removes and returns every queued item in FIFO order.
    pub fn drain_all(&self) -> Vec<T> {
        let drained = std::mem::take(&mut *self.items.lock());
        self.removed.fetch_add(drained.len() as u64, Ordering::Relaxed);
        Vec::from(drained)
    }

    /// Returns the current number of queued items.
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// Returns `true` if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Discards every queued item and returns how many were dropped.
    pub fn clear(&self) -> usize {
        let mut queue = self.items.lock();
        let count = queue.len();
        queue.clear();
        count
    }

    /// Returns queue counters.
    pub fn stats(&self) -> QueueStats {
        QueueStats {
            queued: self.len(),
            pushed: self.pushed.load(Ordering::Relaxed),
            removed: self.removed.load(Ordering::Relaxed),
        }
    }
}

impl<T> Default for WorkQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for WorkQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkQueue")
            .field("len", &self.len())
            .field("pushed", &self.pushed.load(Ordering::Relaxed))
            .field("removed", &self.removed.load(Ordering::Relaxed))
            .finish()
    }
}

/// Point-in-time queue counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Items currently queued.
    pub queued: usize,
    /// Items pushed since creation.
    pub pushed: u64,
    /// Items removed since creation.
    pub removed: u64,
}

// =============================================================================
// Tests
// =============================================================================
