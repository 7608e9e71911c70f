// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! In-memory historian backend.
//!
//! [`InMemoryHistorian`] is a complete in-process historian: it hosts one or
//! more servers with points and archived samples, serves change
//! subscriptions, event counts, paged bulk reads and writes. It backs the
//! `memory` backend of the [`HistorianRegistry`](crate::historian::HistorianRegistry)
//! and is the historian used throughout the test suites.
//!
//! # Features
//!
//! - **Subscriptions**: [`InMemoryHistorian::publish`] archives a sample and
//!   fans it out to every open subscription that covers the point
//! - **Bounded pending buffers**: a slow consumer loses the oldest events
//!   rather than growing without limit
//! - **Failure injection**: lookup, creation, write and read failures can be
//!   armed per point or per range
//! - **Signal generator**: optionally publishes a ramp value for every point
//!   on a fixed period
//!
//! # Example
//!
//! ```
//! use histrep_core::memory::InMemoryHistorian;
//! use histrep_core::types::PointName;
//!
//! let historian = InMemoryHistorian::new();
//! historian.add_server("archive-a");
//! historian.add_point("archive-a", PointName::new("SINUSOID"));
//!
//! assert_eq!(historian.point_count("archive-a"), 1);
//! ```

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use parking_lot::{Mutex, RwLock};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{HistorianError, HistorianResult};
use crate::historian::{
    ChangeEvent, ChangeSubscription, HistorianClient, HistorianConfig, HistorianFactory,
    ItemFailure, LookupFailure, PageStream, PointLookup, PumpResult, SubscriptionId,
    UpdateOption, WriteOptions, WriteOutcome,
};
use crate::types::{PointHandle, PointName, Quality, SampleItem, ServerHandle, TimeRange, Value};

/// Default number of events a subscription buffers before dropping the oldest.
pub const DEFAULT_SUBSCRIPTION_CAPACITY: usize = 100_000;

/// Transport code reported for injected whole-call write failures.
pub const INJECTED_TRANSPORT_CODE: i32 = -10_722;

// =============================================================================
// Internal State
// =============================================================================

#[derive(Debug)]
struct PointRecord {
    handle: PointHandle,
    /// Archived samples, sorted by timestamp.
    samples: Vec<SampleItem>,
}

#[derive(Debug)]
struct ServerState {
    id: u64,
    points: BTreeMap<PointName, PointRecord>,
}

#[derive(Debug, Default)]
struct Faults {
    lookup: HashMap<PointName, String>,
    creation: HashMap<PointName, String>,
    rejected_writes: HashMap<PointName, (i32, String)>,
    failed_write_calls: HashSet<PointName>,
    failed_reads: Vec<TimeRange>,
    write_latency: Option<Duration>,
}

#[derive(Debug)]
struct SubscriptionShared {
    id: SubscriptionId,
    points: HashSet<PointHandle>,
    pending: Mutex<VecDeque<ChangeEvent>>,
    capacity: usize,
    dropped: AtomicU64,
    closed: AtomicBool,
}

impl SubscriptionShared {
    fn enqueue(&self, event: ChangeEvent) {
        let mut pending = self.pending.lock();
        if pending.len() >= self.capacity {
            pending.pop_front();
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        pending.push_back(event);
    }
}

// =============================================================================
// In-Memory Historian
// =============================================================================

/// An in-process historian hosting any number of named servers.
#[derive(Debug)]
pub struct InMemoryHistorian {
    servers: RwLock<HashMap<String, ServerState>>,
    subscriptions: Mutex<Vec<Weak<SubscriptionShared>>>,
    faults: Mutex<Faults>,
    next_id: AtomicU64,
    subscription_capacity: usize,
    write_calls: AtomicU64,
    items_written: AtomicU64,
}

impl InMemoryHistorian {
    /// Creates an empty historian with no servers.
    pub fn new() -> Self {
        Self::with_subscription_capacity(DEFAULT_SUBSCRIPTION_CAPACITY)
    }

    /// Creates an empty historian whose subscriptions buffer at most
    /// `capacity` events.
    pub fn with_subscription_capacity(capacity: usize) -> Self {
        Self {
            servers: RwLock::new(HashMap::new()),
            subscriptions: Mutex::new(Vec::new()),
            faults: Mutex::new(Faults::default()),
            next_id: AtomicU64::new(1),
            subscription_capacity: capacity.max(1),
            write_calls: AtomicU64::new(0),
            items_written: AtomicU64::new(0),
        }
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    // =========================================================================
    // Setup
    // =========================================================================

    /// Adds a server. Adding an existing server is a no-op.
    pub fn add_server(&self, name: impl Into<String>) -> ServerHandle {
        let name = name.into();
        let mut servers = self.servers.write();
        let id = match servers.get(&name) {
            Some(state) => state.id,
            None => {
                let id = self.next_id();
                servers.insert(
                    name.clone(),
                    ServerState {
                        id,
                        points: BTreeMap::new(),
                    },
                );
                id
            }
        };
        ServerHandle::new(name, id)
    }

    /// Adds a point to a server, creating the server if needed.
    pub fn add_point(&self, server: &str, name: PointName) -> PointHandle {
        self.add_server(server);
        let id = self.next_id();
        let mut servers = self.servers.write();
        match servers.get_mut(server) {
            Some(state) => state
                .points
                .entry(name.clone())
                .or_insert_with(|| PointRecord {
                    handle: PointHandle::new(server, name, id),
                    samples: Vec::new(),
                })
                .handle
                .clone(),
            None => PointHandle::new(server, name, id),
        }
    }

    /// Archives samples on a server without notifying subscribers.
    ///
    /// Samples for unknown points are ignored; returns the number archived.
    pub fn insert_samples(&self, server: &str, samples: impl IntoIterator<Item = SampleItem>) -> usize {
        let mut servers = self.servers.write();
        let Some(state) = servers.get_mut(server) else {
            return 0;
        };

        let mut archived = 0;
        for sample in samples {
            if let Some(record) = state.points.get_mut(&sample.point) {
                insert_sorted(&mut record.samples, sample, UpdateOption::Insert);
                archived += 1;
            }
        }
        archived
    }

    /// Archives a new sample and delivers it to every open subscription on
    /// the point.
    ///
    /// Returns `false` if the point does not exist.
    pub fn publish(&self, server: &str, sample: SampleItem) -> bool {
        let handle = {
            let mut servers = self.servers.write();
            let Some(record) = servers
                .get_mut(server)
                .and_then(|state| state.points.get_mut(&sample.point))
            else {
                return false;
            };
            insert_sorted(&mut record.samples, sample.clone(), UpdateOption::Insert);
            record.handle.clone()
        };

        let event = ChangeEvent {
            point: handle,
            value: sample.value,
            timestamp: sample.timestamp,
            quality: sample.quality,
        };

        let mut subscriptions = self.subscriptions.lock();
        subscriptions.retain(|weak| weak.strong_count() > 0);
        for shared in subscriptions.iter().filter_map(Weak::upgrade) {
            if !shared.closed.load(Ordering::SeqCst) && shared.points.contains(&event.point) {
                shared.enqueue(event.clone());
            }
        }
        true
    }

    // =========================================================================
    // Failure Injection
    // =========================================================================

    /// Makes lookups of `name` fail with a non-"not found" reason.
    pub fn fail_lookup(&self, name: PointName, message: impl Into<String>) {
        self.faults.lock().lookup.insert(name, message.into());
    }

    /// Makes creation of `name` fail.
    pub fn fail_creation(&self, name: PointName, message: impl Into<String>) {
        self.faults.lock().creation.insert(name, message.into());
    }

    /// Makes every written item for `name` be rejected with `code`.
    pub fn reject_writes(&self, name: PointName, code: i32, message: impl Into<String>) {
        self.faults
            .lock()
            .rejected_writes
            .insert(name, (code, message.into()));
    }

    /// Makes write calls for `name` fail as a whole.
    pub fn fail_write_calls(&self, name: PointName) {
        self.faults.lock().failed_write_calls.insert(name);
    }

    /// Makes bulk reads whose range overlaps `range` fail.
    pub fn fail_reads_overlapping(&self, range: TimeRange) {
        self.faults.lock().failed_reads.push(range);
    }

    /// Delays every write call by `latency`.
    pub fn set_write_latency(&self, latency: Duration) {
        self.faults.lock().write_latency = Some(latency);
    }

    /// Disarms every injected failure.
    pub fn clear_faults(&self) {
        *self.faults.lock() = Faults::default();
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    /// Returns archived samples for a point, in timestamp order.
    pub fn samples(&self, server: &str, name: &PointName) -> Vec<SampleItem> {
        self.servers
            .read()
            .get(server)
            .and_then(|state| state.points.get(name))
            .map(|record| record.samples.clone())
            .unwrap_or_default()
    }

    /// Returns the number of archived samples on a server.
    pub fn sample_count(&self, server: &str) -> usize {
        self.servers
            .read()
            .get(server)
            .map(|state| state.points.values().map(|r| r.samples.len()).sum())
            .unwrap_or(0)
    }

    /// Returns the number of points on a server.
    pub fn point_count(&self, server: &str) -> usize {
        self.servers
            .read()
            .get(server)
            .map(|state| state.points.len())
            .unwrap_or(0)
    }

    /// Returns the point names on a server.
    pub fn point_names(&self, server: &str) -> Vec<PointName> {
        self.servers
            .read()
            .get(server)
            .map(|state| state.points.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns the number of `write_values` calls served.
    pub fn write_calls(&self) -> u64 {
        self.write_calls.load(Ordering::Relaxed)
    }

    /// Returns the number of items accepted by `write_values`.
    pub fn items_written(&self) -> u64 {
        self.items_written.load(Ordering::Relaxed)
    }

    /// Returns the number of subscriptions that are still open.
    pub fn open_subscriptions(&self) -> usize {
        self.subscriptions
            .lock()
            .iter()
            .filter_map(Weak::upgrade)
            .filter(|s| !s.closed.load(Ordering::SeqCst))
            .count()
    }

    fn resolve(&self, server: &ServerHandle) -> HistorianResult<()> {
        if self.servers.read().contains_key(server.name()) {
            Ok(())
        } else {
            Err(HistorianError::server_not_found(server.name()))
        }
    }
}

impl Default for InMemoryHistorian {
    fn default() -> Self {
        Self::new()
    }
}

fn insert_sorted(samples: &mut Vec<SampleItem>, sample: SampleItem, update: UpdateOption) {
    let upper = samples.partition_point(|s| s.timestamp <= sample.timestamp);
    match update {
        UpdateOption::Replace if upper > 0 && samples[upper - 1].timestamp == sample.timestamp => {
            samples[upper - 1] = sample;
        }
        _ => samples.insert(upper, sample),
    }
}

// =============================================================================
// HistorianClient Implementation
// =============================================================================

#[async_trait]
impl HistorianClient for InMemoryHistorian {
    fn name(&self) -> &str {
        "memory"
    }

    async fn find_server(&self, name: &str) -> HistorianResult<ServerHandle> {
        self.servers
            .read()
            .get(name)
            .map(|state| ServerHandle::new(name, state.id))
            .ok_or_else(|| HistorianError::server_not_found(name))
    }

    async fn find_points(
        &self,
        server: &ServerHandle,
        names: &[PointName],
    ) -> HistorianResult<PointLookup> {
        self.resolve(server)?;
        let faults = self.faults.lock();
        let servers = self.servers.read();
        let Some(state) = servers.get(server.name()) else {
            return Err(HistorianError::server_not_found(server.name()));
        };

        let mut lookup = PointLookup::default();
        for name in names {
            if let Some(message) = faults.lookup.get(name) {
                lookup.failures.push(LookupFailure::other(name.clone(), message.clone()));
                continue;
            }
            match state.points.get(name) {
                Some(record) => {
                    lookup.found.insert(name.clone(), record.handle.clone());
                }
                None => lookup.failures.push(LookupFailure::not_found(name.clone())),
            }
        }
        Ok(lookup)
    }

    async fn create_points(
        &self,
        server: &ServerHandle,
        names: &[PointName],
    ) -> HistorianResult<PointLookup> {
        self.resolve(server)?;
        let creation_faults = self.faults.lock().creation.clone();

        let mut lookup = PointLookup::default();
        for name in names {
            if let Some(message) = creation_faults.get(name) {
                lookup.failures.push(LookupFailure::other(name.clone(), message.clone()));
                continue;
            }
            let handle = self.add_point(server.name(), name.clone());
            debug!(point = %handle, "Created point");
            lookup.found.insert(name.clone(), handle);
        }
        Ok(lookup)
    }

    async fn subscribe_changes(
        &self,
        server: &ServerHandle,
        points: &[PointHandle],
    ) -> HistorianResult<Box<dyn ChangeSubscription>> {
        self.resolve(server)?;
        let shared = Arc::new(SubscriptionShared {
            id: SubscriptionId::new(self.next_id()),
            points: points.iter().cloned().collect(),
            pending: Mutex::new(VecDeque::new()),
            capacity: self.subscription_capacity,
            dropped: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        });
        self.subscriptions.lock().push(Arc::downgrade(&shared));
        debug!(subscription = %shared.id, points = points.len(), "Opened change subscription");
        Ok(Box::new(MemorySubscription { shared }))
    }

    async fn event_count(&self, point: &PointHandle, range: &TimeRange) -> HistorianResult<u64> {
        let servers = self.servers.read();
        let record = servers
            .get(point.server())
            .and_then(|state| state.points.get(point.name()))
            .ok_or_else(|| HistorianError::point_not_found(point.path()))?;

        Ok(record
            .samples
            .iter()
            .filter(|s| range.contains(s.timestamp))
            .count() as u64)
    }

    async fn read_bulk(
        &self,
        points: &[PointHandle],
        range: &TimeRange,
        page_size: usize,
    ) -> HistorianResult<PageStream> {
        if page_size == 0 {
            return Err(HistorianError::unsupported("page size must be positive"));
        }
        let failing = self
            .faults
            .lock()
            .failed_reads
            .iter()
            .any(|r| r.start() < range.end() && range.start() < r.end());
        if failing {
            return Err(HistorianError::transport(
                INJECTED_TRANSPORT_CODE,
                format!("bulk read failed for range {}", range),
            ));
        }

        let servers = self.servers.read();
        let mut values = Vec::new();
        for point in points {
            let record = servers
                .get(point.server())
                .and_then(|state| state.points.get(point.name()))
                .ok_or_else(|| HistorianError::point_not_found(point.path()))?;
            values.extend(
                record
                    .samples
                    .iter()
                    .filter(|s| range.contains(s.timestamp))
                    .cloned(),
            );
        }
        drop(servers);

        let pages: Vec<HistorianResult<Vec<SampleItem>>> = values
            .chunks(page_size)
            .map(|chunk| Ok(chunk.to_vec()))
            .collect();
        Ok(futures::stream::iter(pages).boxed())
    }

    async fn write_values(
        &self,
        point: &PointHandle,
        values: &[SampleItem],
        options: WriteOptions,
    ) -> HistorianResult<WriteOutcome> {
        self.write_calls.fetch_add(1, Ordering::Relaxed);

        let (latency, call_fails, rejection) = {
            let faults = self.faults.lock();
            (
                faults.write_latency,
                faults.failed_write_calls.contains(point.name()),
                faults.rejected_writes.get(point.name()).cloned(),
            )
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if call_fails {
            return Err(HistorianError::transport(
                INJECTED_TRANSPORT_CODE,
                format!("write call failed for {}", point),
            ));
        }

        let mut servers = self.servers.write();
        let record = servers
            .get_mut(point.server())
            .and_then(|state| state.points.get_mut(point.name()))
            .ok_or_else(|| HistorianError::point_not_found(point.path()))?;

        let mut outcome = WriteOutcome::default();
        for item in values {
            if let Some((code, message)) = &rejection {
                outcome.failures.push(ItemFailure {
                    item: item.clone(),
                    code: *code,
                    message: message.clone(),
                });
                continue;
            }
            // Values are archived under the destination point name.
            let mut stored = item.clone();
            stored.point = point.name().clone();
            insert_sorted(&mut record.samples, stored, options.update);
            outcome.written += 1;
        }

        self.items_written
            .fetch_add(outcome.written as u64, Ordering::Relaxed);
        Ok(outcome)
    }
}

// =============================================================================
// Memory Subscription
// =============================================================================

/// A change subscription served by [`InMemoryHistorian`].
#[derive(Debug)]
pub struct MemorySubscription {
    shared: Arc<SubscriptionShared>,
}

impl MemorySubscription {
    /// Returns the number of events currently buffered.
    pub fn pending(&self) -> usize {
        self.shared.pending.lock().len()
    }

    /// Returns the number of events dropped because the buffer was full.
    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ChangeSubscription for MemorySubscription {
    fn id(&self) -> SubscriptionId {
        self.shared.id
    }

    async fn pump(&self, max_items: usize) -> HistorianResult<PumpResult> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(HistorianError::subscription_closed(self.shared.id));
        }

        let mut pending = self.shared.pending.lock();
        let take = max_items.min(pending.len());
        let events: Vec<ChangeEvent> = pending.drain(..take).collect();
        Ok(PumpResult {
            events,
            more_available: !pending.is_empty(),
        })
    }

    async fn close(&self) -> HistorianResult<()> {
        if !self.shared.closed.swap(true, Ordering::SeqCst) {
            let discarded = {
                let mut pending = self.shared.pending.lock();
                let n = pending.len();
                pending.clear();
                n
            };
            debug!(subscription = %self.shared.id, discarded, "Closed change subscription");
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }
}

// =============================================================================
// Factory
// =============================================================================

/// Options accepted by the `memory` backend.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct MemoryOptions {
    /// Points to create on the server up front.
    #[serde(default)]
    points: Vec<PointName>,

    /// If set, publish a ramp value for every point on this period.
    #[serde(default)]
    generate_period_ms: Option<u64>,

    /// Subscription pending-event capacity.
    #[serde(default = "default_subscription_capacity")]
    subscription_capacity: usize,
}

fn default_subscription_capacity() -> usize {
    DEFAULT_SUBSCRIPTION_CAPACITY
}

/// Factory for the `memory` backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct InMemoryHistorianFactory;

impl HistorianFactory for InMemoryHistorianFactory {
    fn backend(&self) -> &'static str {
        "memory"
    }

    fn create(&self, config: &HistorianConfig) -> HistorianResult<Arc<dyn HistorianClient>> {
        let options: MemoryOptions = if config.options.is_null() {
            MemoryOptions {
                points: Vec::new(),
                generate_period_ms: None,
                subscription_capacity: DEFAULT_SUBSCRIPTION_CAPACITY,
            }
        } else {
            serde_json::from_value(config.options.clone()).map_err(|e| {
                HistorianError::unsupported(format!("invalid memory backend options: {}", e))
            })?
        };

        let historian = Arc::new(InMemoryHistorian::with_subscription_capacity(
            options.subscription_capacity,
        ));
        historian.add_server(&config.server);
        for name in options.points {
            historian.add_point(&config.server, name);
        }

        if let Some(period_ms) = options.generate_period_ms.filter(|p| *p > 0) {
            spawn_generator(&historian, &config.server, Duration::from_millis(period_ms));
        }

        Ok(historian)
    }
}

/// Publishes a ramp value for every point on `server` each `period`.
///
/// The task holds only a weak reference and ends once the historian is
/// dropped. Requires a running tokio runtime; otherwise nothing is spawned.
pub fn spawn_generator(historian: &Arc<InMemoryHistorian>, server: &str, period: Duration) {
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        warn!(server, "No async runtime available; signal generator not started");
        return;
    };

    let weak = Arc::downgrade(historian);
    let server = server.to_string();
    runtime.spawn(async move {
        let mut interval = tokio::time::interval(period);
        let mut step: u64 = 0;
        loop {
            interval.tick().await;
            let Some(historian) = weak.upgrade() else {
                break;
            };
            let now = Utc::now();
            for (offset, name) in historian.point_names(&server).into_iter().enumerate() {
                let value = ((step + offset as u64) % 100) as f64;
                historian.publish(
                    &server,
                    SampleItem::new(name, Value::Float64(value), now, Quality::Good),
                );
            }
            step += 1;
        }
        debug!(server = %server, "Signal generator stopped");
    });
}

// =============================================================================
// Tests
// =============================================================================
