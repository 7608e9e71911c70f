// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Real-time ingestion.
//!
//! The subscription is opened once at startup over every mapped source
//! point. Each tick pumps buffered change events until the source reports
//! none remain, converting each event into a [`SampleItem`] on the send
//! queue.
//!
//! # Shutdown
//!
//! The lifecycle is checked before every pump call, so no pump is issued
//! once stopping has begun. A closed-subscription or torn-down-pipe error
//! that still races past that check is swallowed only when the lifecycle is
//! no longer running; while running, every error propagates.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::HistorianResult;
use crate::historian::{ChangeEvent, ChangeSubscription, HistorianClient, SubscriptionId};
use crate::lifecycle::Lifecycle;
use crate::queue::SendQueue;
use crate::reconcile::PointMap;
use crate::types::{SampleItem, ServerHandle};

/// Default maximum events per pump call.
pub const DEFAULT_MAX_EVENTS_PER_PUMP: usize = 1000;

/// What one tick of the ingestor did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpSummary {
    /// Pump calls issued.
    pub calls: usize,
    /// Events pushed to the send queue.
    pub events: usize,
    /// `true` if the tick stopped early because the lifecycle left `Running`.
    pub interrupted: bool,
}

/// Forwards change events from a source subscription to the send queue.
pub struct RealtimeIngestor {
    subscription: Box<dyn ChangeSubscription>,
    queue: Arc<SendQueue>,
    lifecycle: Arc<Lifecycle>,
    max_events: usize,
    events_forwarded: AtomicU64,
    pump_calls: AtomicU64,
}

impl RealtimeIngestor {
    /// Wraps an existing subscription.
    pub fn new(
        subscription: Box<dyn ChangeSubscription>,
        queue: Arc<SendQueue>,
        lifecycle: Arc<Lifecycle>,
        max_events: usize,
    ) -> Self {
        Self {
            subscription,
            queue,
            lifecycle,
            max_events: max_events.max(1),
            events_forwarded: AtomicU64::new(0),
            pump_calls: AtomicU64::new(0),
        }
    }

    /// Subscribes to every mapped source point.
    pub async fn subscribe(
        source: &dyn HistorianClient,
        server: &ServerHandle,
        points: &PointMap,
        queue: Arc<SendQueue>,
        lifecycle: Arc<Lifecycle>,
        max_events: usize,
    ) -> HistorianResult<Self> {
        let handles = points.source_handles();
        let subscription = source.subscribe_changes(server, &handles).await?;
        info!(
            subscription = %subscription.id(),
            server = %server,
            points = handles.len(),
            "Subscribed to source changes"
        );
        Ok(Self::new(subscription, queue, lifecycle, max_events))
    }

    /// Returns the subscription id.
    pub fn subscription_id(&self) -> SubscriptionId {
        self.subscription.id()
    }

    /// Pumps until the source reports no more buffered events.
    ///
    /// Never waits for new events; with nothing buffered it returns after a
    /// single empty pump.
    pub async fn pump_once(&self) -> HistorianResult<PumpSummary> {
        let mut summary = PumpSummary::default();

        loop {
            if !self.lifecycle.is_running() {
                summary.interrupted = true;
                break;
            }

            let result = match self.subscription.pump(self.max_events).await {
                Ok(result) => result,
                Err(e) if e.is_shutdown_race() && !self.lifecycle.is_running() => {
                    debug!(
                        subscription = %self.subscription.id(),
                        error = %e,
                        "Pump raced with shutdown"
                    );
                    summary.interrupted = true;
                    break;
                }
                Err(e) => return Err(e),
            };

            summary.calls += 1;
            summary.events += self.queue.push_many(events_to_samples(result.events));

            if !result.more_available {
                break;
            }
        }

        self.pump_calls
            .fetch_add(summary.calls as u64, Ordering::Relaxed);
        self.events_forwarded
            .fetch_add(summary.events as u64, Ordering::Relaxed);
        if summary.events > 0 {
            debug!(events = summary.events, calls = summary.calls, "Forwarded change events");
        }
        Ok(summary)
    }

    /// Closes the subscription.
    pub async fn close(&self) -> HistorianResult<()> {
        if self.subscription.is_closed() {
            return Ok(());
        }
        self.subscription.close().await?;
        info!(subscription = %self.subscription.id(), "Closed source subscription");
        Ok(())
    }

    /// Returns `true` once the subscription is closed.
    pub fn is_closed(&self) -> bool {
        self.subscription.is_closed()
    }

    /// Returns the total number of events forwarded.
    pub fn events_forwarded(&self) -> u64 {
        self.events_forwarded.load(Ordering::Relaxed)
    }

    /// Returns the total number of pump calls issued.
    pub fn pump_calls(&self) -> u64 {
        self.pump_calls.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for RealtimeIngestor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RealtimeIngestor")
            .field("subscription", &self.subscription.id())
            .field("max_events", &self.max_events)
            .field("events_forwarded", &self.events_forwarded())
            .finish()
    }
}

/// Converts a batch of change events into send-ready samples.
pub fn events_to_samples(events: Vec<ChangeEvent>) -> Vec<SampleItem> {
    events.into_iter().map(ChangeEvent::into_sample).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HistorianError;
    use crate::historian::PumpResult;
    use crate::memory::InMemoryHistorian;
    use crate::reconcile::PointIdentity;
    use crate::types::{PointHandle, PointName};
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};
    use std::time::Duration;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).single().unwrap()
    }

    async fn setup(max_events: usize) -> (Arc<InMemoryHistorian>, RealtimeIngestor, Arc<Lifecycle>) {
        let source = Arc::new(InMemoryHistorian::new());
        let server = source.add_server("src");
        let a = source.add_point("src", PointName::new("A"));
        let map = PointMap::from_identities(vec![PointIdentity::new(
            PointName::new("A"),
            a.clone(),
            PointHandle::new("dst", PointName::new("A"), 1),
        )]);

        let lifecycle = Arc::new(Lifecycle::new());
        lifecycle.start().unwrap();
        let ingestor = RealtimeIngestor::subscribe(
            source.as_ref(),
            &server,
            &map,
            Arc::new(SendQueue::new()),
            lifecycle.clone(),
            max_events,
        )
        .await
        .unwrap();
        (source, ingestor, lifecycle)
    }

    #[tokio::test]
    async fn test_pump_drains_across_calls() {
        let (source, ingestor, _) = setup(2).await;
        for i in 0..5 {
            source.publish("src", SampleItem::good("A", i as f64, at(i)));
        }

        let summary = ingestor.pump_once().await.unwrap();

        assert_eq!(summary.events, 5);
        assert_eq!(summary.calls, 3);
        let queued = ingestor.queue.drain_all();
        let timestamps: Vec<_> = queued.iter().map(|s| s.timestamp).collect();
        assert_eq!(timestamps, (0..5).map(at).collect::<Vec<_>>());
        assert_eq!(queued[0].point, PointName::new("A"));
    }

    #[tokio::test]
    async fn test_two_empty_pumps_return_immediately() {
        let (_, ingestor, _) = setup(10).await;

        for _ in 0..2 {
            let summary = tokio::time::timeout(Duration::from_secs(1), ingestor.pump_once())
                .await
                .expect("pump blocked")
                .unwrap();
            assert_eq!(summary.events, 0);
            assert_eq!(summary.calls, 1);
        }
        assert!(ingestor.queue.is_empty());
    }

    #[tokio::test]
    async fn test_no_pump_once_stopping() {
        let (source, ingestor, lifecycle) = setup(10).await;
        source.publish("src", SampleItem::good("A", 1.0, at(0)));
        lifecycle.begin_stop();

        let summary = ingestor.pump_once().await.unwrap();

        assert!(summary.interrupted);
        assert_eq!(summary.calls, 0);
        assert!(ingestor.queue.is_empty());
    }

    #[tokio::test]
    async fn test_closed_subscription_while_running_propagates() {
        let (_, ingestor, _) = setup(10).await;
        ingestor.close().await.unwrap();
        assert!(ingestor.is_closed());

        assert!(matches!(
            ingestor.pump_once().await,
            Err(HistorianError::SubscriptionClosed { .. })
        ));
        // Closing twice is fine.
        ingestor.close().await.unwrap();
    }

    /// Begins shutdown and fails the pump, as a transport would mid-teardown.
    struct RacingSubscription {
        lifecycle: Arc<Lifecycle>,
        error: HistorianError,
    }

    #[async_trait]
    impl ChangeSubscription for RacingSubscription {
        fn id(&self) -> SubscriptionId {
            SubscriptionId::new(7)
        }

        async fn pump(&self, _max_items: usize) -> HistorianResult<PumpResult> {
            self.lifecycle.begin_stop();
            Err(self.error.clone())
        }

        async fn close(&self) -> HistorianResult<()> {
            Ok(())
        }

        fn is_closed(&self) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn test_shutdown_race_is_swallowed() {
        for error in [
            HistorianError::pipe_torn_down("pipe disposed"),
            HistorianError::subscription_closed(SubscriptionId::new(7)),
        ] {
            let lifecycle = Arc::new(Lifecycle::new());
            lifecycle.start().unwrap();
            let ingestor = RealtimeIngestor::new(
                Box::new(RacingSubscription {
                    lifecycle: lifecycle.clone(),
                    error,
                }),
                Arc::new(SendQueue::new()),
                lifecycle,
                10,
            );

            let summary = ingestor.pump_once().await.unwrap();
            assert!(summary.interrupted);
            assert_eq!(summary.calls, 0);
        }
    }

    #[tokio::test]
    async fn test_other_errors_propagate_during_shutdown() {
        let lifecycle = Arc::new(Lifecycle::new());
        lifecycle.start().unwrap();
        let ingestor = RealtimeIngestor::new(
            Box::new(RacingSubscription {
                lifecycle: lifecycle.clone(),
                error: HistorianError::transport(-1, "socket reset"),
            }),
            Arc::new(SendQueue::new()),
            lifecycle,
            10,
        );

        assert!(matches!(
            ingestor.pump_once().await,
            Err(HistorianError::Transport { .. })
        ));
    }

    #[test]
    fn test_events_to_samples() {
        let handle = PointHandle::new("src", PointName::new("A"), 1);
        let samples = events_to_samples(vec![ChangeEvent {
            point: handle,
            value: 3.0.into(),
            timestamp: at(0),
            quality: crate::types::Quality::Good,
        }]);
        assert_eq!(samples, vec![SampleItem::good("A", 3.0, at(0))]);
    }
}
