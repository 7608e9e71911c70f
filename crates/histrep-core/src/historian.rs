// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Historian client abstraction layer.
//!
//! The replication pipeline never talks to a historian directly. Everything
//! it needs from a server, whether source or destination, goes through
//! [`HistorianClient`], so backends can be swapped without touching the
//! pipeline.
//!
//! # Design Principles
//!
//! - **Batched lookups**: point resolution and creation take the whole name
//!   list in one call.
//! - **Partial failure**: batched calls report per-point and per-item
//!   failures in their result instead of failing as a whole.
//! - **Async first**: every network call is an awaited future.
//!
//! # Example
//!
//! ```rust,ignore
//! use histrep_core::historian::{HistorianConfig, HistorianRegistry};
//!
//! let registry = HistorianRegistry::with_defaults();
//! let client = registry.create(&HistorianConfig::new("memory", "archive-a"))?;
//! let server = client.find_server("archive-a").await?;
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::{HistorianError, HistorianResult};
use crate::types::{PointHandle, PointName, Quality, SampleItem, ServerHandle, TimeRange, Value};

// =============================================================================
// HistorianClient Trait
// =============================================================================

/// The operations the replicator needs from a historian server.
///
/// # Thread Safety
///
/// Implementations are `Send + Sync`; the dispatch engine and every recovery
/// worker call into the same client concurrently.
#[async_trait]
pub trait HistorianClient: Send + Sync {
    /// Returns the backend name of this client, for logging.
    fn name(&self) -> &str;

    /// Locates a server by name.
    ///
    /// # Errors
    ///
    /// Returns `HistorianError::ServerNotFound` if no such server exists.
    async fn find_server(&self, name: &str) -> HistorianResult<ServerHandle>;

    /// Resolves point names on a server in one batched call.
    ///
    /// Names that fail to resolve are listed in [`PointLookup::failures`].
    async fn find_points(
        &self,
        server: &ServerHandle,
        names: &[PointName],
    ) -> HistorianResult<PointLookup>;

    /// Creates points on a server in one batched call.
    ///
    /// Successfully created points are returned in [`PointLookup::found`].
    async fn create_points(
        &self,
        server: &ServerHandle,
        names: &[PointName],
    ) -> HistorianResult<PointLookup>;

    /// Opens a change subscription for the given points.
    async fn subscribe_changes(
        &self,
        server: &ServerHandle,
        points: &[PointHandle],
    ) -> HistorianResult<Box<dyn ChangeSubscription>>;

    /// Returns the number of recorded events for a point over a range.
    async fn event_count(&self, point: &PointHandle, range: &TimeRange) -> HistorianResult<u64>;

    /// Starts a paged bulk read of recorded values.
    ///
    /// The returned stream is lazy; each element is one page of at most
    /// `page_size` samples.
    async fn read_bulk(
        &self,
        points: &[PointHandle],
        range: &TimeRange,
        page_size: usize,
    ) -> HistorianResult<PageStream>;

    /// Writes values for one point.
    ///
    /// Per-item rejections are reported in [`WriteOutcome::failures`]; an
    /// `Err` means the call failed as a whole.
    async fn write_values(
        &self,
        point: &PointHandle,
        values: &[SampleItem],
        options: WriteOptions,
    ) -> HistorianResult<WriteOutcome>;
}

// =============================================================================
// Change Subscription
// =============================================================================

/// A server-side change subscription whose events are pulled by pumping.
#[async_trait]
pub trait ChangeSubscription: Send + Sync {
    /// Returns the subscription identifier.
    fn id(&self) -> SubscriptionId;

    /// Pulls at most `max_items` buffered events.
    ///
    /// Never waits for new events to arrive.
    ///
    /// # Errors
    ///
    /// - `HistorianError::SubscriptionClosed` - the subscription was closed
    /// - `HistorianError::PipeTornDown` - the pipe was torn down mid-call
    async fn pump(&self, max_items: usize) -> HistorianResult<PumpResult>;

    /// Closes the subscription and releases server-side resources.
    async fn close(&self) -> HistorianResult<()>;

    /// Returns `true` once the subscription has been closed.
    fn is_closed(&self) -> bool;
}

/// A unique identifier for a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(pub u64);

impl SubscriptionId {
    /// Creates a new subscription ID.
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// A change notification delivered by a subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    /// The source point.
    pub point: PointHandle,
    /// New value.
    pub value: Value,
    /// Value timestamp.
    pub timestamp: DateTime<Utc>,
    /// Value quality.
    pub quality: Quality,
}

impl ChangeEvent {
    /// Converts the event into a send-ready sample.
    pub fn into_sample(self) -> SampleItem {
        let point = self.point.name().clone();
        SampleItem::new(point, self.value, self.timestamp, self.quality)
    }
}

/// The result of one pump call.
#[derive(Debug, Clone, Default)]
pub struct PumpResult {
    /// Events pulled by this call.
    pub events: Vec<ChangeEvent>,
    /// `true` if more events are buffered on the server.
    pub more_available: bool,
}

/// A lazy sequence of value pages.
pub type PageStream = BoxStream<'static, HistorianResult<Vec<SampleItem>>>;

// =============================================================================
// Partial-Failure Results
// =============================================================================

/// Why a point failed to resolve or to be created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupFailureKind {
    /// The point does not exist on the server.
    NotFound,
    /// Any other failure (permissions, invalid name, server error).
    Other,
}

/// A per-point lookup or creation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupFailure {
    /// The point name.
    pub name: PointName,
    /// Failure classification.
    pub kind: LookupFailureKind,
    /// Server-provided message.
    pub message: String,
}

impl LookupFailure {
    /// Creates a not-found failure.
    pub fn not_found(name: PointName) -> Self {
        let message = format!("point '{}' was not found", name);
        Self {
            name,
            kind: LookupFailureKind::NotFound,
            message,
        }
    }

    /// Creates a failure of any other kind.
    pub fn other(name: PointName, message: impl Into<String>) -> Self {
        Self {
            name,
            kind: LookupFailureKind::Other,
            message: message.into(),
        }
    }

    /// Returns `true` if the point simply does not exist.
    #[inline]
    pub fn is_not_found(&self) -> bool {
        self.kind == LookupFailureKind::NotFound
    }
}

/// The result of a batched lookup or creation call.
#[derive(Debug, Clone, Default)]
pub struct PointLookup {
    /// Resolved points keyed by name.
    pub found: BTreeMap<PointName, PointHandle>,
    /// Names that failed, with reasons.
    pub failures: Vec<LookupFailure>,
}

impl PointLookup {
    /// Returns `true` if any name failed.
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// A single item rejected by the destination.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemFailure {
    /// The rejected sample.
    pub item: SampleItem,
    /// Failure code reported by the destination.
    pub code: i32,
    /// Failure message reported by the destination.
    pub message: String,
}

/// The result of one write call.
#[derive(Debug, Clone, Default)]
pub struct WriteOutcome {
    /// Number of items accepted.
    pub written: usize,
    /// Items the destination rejected.
    pub failures: Vec<ItemFailure>,
}

impl WriteOutcome {
    /// Returns `true` if every item was accepted.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

// =============================================================================
// Write Options
// =============================================================================

/// How written values interact with values already archived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateOption {
    /// Add the value, keeping any existing value at the same timestamp.
    #[default]
    Insert,
    /// Replace an existing value at the same timestamp.
    Replace,
}

/// What the client does when the destination is unreachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferOption {
    /// Fail the call.
    DoNotBuffer,
    /// Queue at the transport layer and deliver later.
    #[default]
    BufferIfUnreachable,
}

/// Options for [`HistorianClient::write_values`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WriteOptions {
    /// Update policy.
    pub update: UpdateOption,
    /// Buffering policy.
    pub buffer: BufferOption,
}

impl WriteOptions {
    /// Insert, buffering if the destination is temporarily unreachable.
    pub fn insert_buffered() -> Self {
        Self {
            update: UpdateOption::Insert,
            buffer: BufferOption::BufferIfUnreachable,
        }
    }
}

// =============================================================================
// Historian Factory
// =============================================================================

/// Configuration for creating a historian client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistorianConfig {
    /// Backend name (e.g. `memory`).
    pub backend: String,
    /// Server the client will connect to.
    pub server: String,
    /// Backend-specific options.
    #[serde(default)]
    pub options: serde_json::Value,
}

impl HistorianConfig {
    /// Creates a configuration with empty options.
    pub fn new(backend: impl Into<String>, server: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            server: server.into(),
            options: serde_json::Value::Null,
        }
    }

    /// Sets backend-specific options.
    pub fn with_options(mut self, options: serde_json::Value) -> Self {
        self.options = options;
        self
    }
}

/// A factory for creating historian clients of one backend.
pub trait HistorianFactory: Send + Sync {
    /// Returns the backend name this factory creates clients for.
    fn backend(&self) -> &'static str;

    /// Creates a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns `HistorianError` if the options are invalid.
    fn create(&self, config: &HistorianConfig) -> HistorianResult<Arc<dyn HistorianClient>>;
}

// =============================================================================
// Historian Registry
// =============================================================================

/// A registry of historian factories keyed by backend name.
///
/// The registry is an explicitly constructed value passed to whoever needs
/// to build clients.
pub struct HistorianRegistry {
    factories: HashMap<&'static str, Box<dyn HistorianFactory>>,
}

impl HistorianRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Creates a registry with every built-in backend registered.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(crate::memory::InMemoryHistorianFactory));
        registry
    }

    /// Registers a factory, replacing any factory for the same backend.
    pub fn register(&mut self, factory: Box<dyn HistorianFactory>) {
        let backend = factory.backend();
        self.factories.insert(backend, factory);
        tracing::debug!(backend, "Registered historian factory");
    }

    /// Creates a client from configuration.
    ///
    /// # Errors
    ///
    /// - `HistorianError::Unsupported` - no factory for the backend
    /// - Other errors from the factory
    pub fn create(&self, config: &HistorianConfig) -> HistorianResult<Arc<dyn HistorianClient>> {
        let factory = self.factories.get(config.backend.as_str()).ok_or_else(|| {
            HistorianError::unsupported(format!(
                "No historian backend registered for '{}'",
                config.backend
            ))
        })?;

        factory.create(config)
    }

    /// Returns the registered backend names, sorted.
    pub fn supported_backends(&self) -> Vec<&'static str> {
        let mut backends: Vec<_> = self.factories.keys().copied().collect();
        backends.sort_unstable();
        backends
    }

    /// Returns `true` if a factory is registered for the backend.
    pub fn supports(&self, backend: &str) -> bool {
        self.factories.contains_key(backend)
    }

    /// Returns the number of registered factories.
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Returns `true` if no factories are registered.
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl Default for HistorianRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for HistorianRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HistorianRegistry")
            .field("backends", &self.supported_backends())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscription_id() {
        let id = SubscriptionId::new(123);
        assert_eq!(id.0, 123);
        assert_eq!(format!("{}", id), "sub-123");
    }

    #[test]
    fn test_lookup_failure_kinds() {
        assert!(LookupFailure::not_found(PointName::new("A")).is_not_found());
        assert!(!LookupFailure::other(PointName::new("A"), "denied").is_not_found());
    }

    #[test]
    fn test_write_options_default() {
        let options = WriteOptions::default();
        assert_eq!(options, WriteOptions::insert_buffered());
    }

    #[test]
    fn test_empty_registry() {
        let registry = HistorianRegistry::new();
        assert!(registry.is_empty());
        assert!(!registry.supports("memory"));

        let result = registry.create(&HistorianConfig::new("memory", "src"));
        assert!(matches!(result, Err(HistorianError::Unsupported { .. })));
    }

    #[test]
    fn test_default_registry_has_memory_backend() {
        let registry = HistorianRegistry::with_defaults();
        assert_eq!(registry.supported_backends(), vec!["memory"]);

        let client = registry.create(&HistorianConfig::new("memory", "src")).unwrap();
        assert_eq!(client.name(), "memory");
    }

    #[test]
    fn test_change_event_into_sample() {
        let event = ChangeEvent {
            point: PointHandle::new("src", PointName::new("A"), 1),
            value: Value::Float64(1.5),
            timestamp: Utc::now(),
            quality: Quality::Good,
        };

        let sample = event.clone().into_sample();
        assert_eq!(sample.point, PointName::new("A"));
        assert_eq!(sample.value, event.value);
    }
}
