// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Historical range planning.
//!
//! The planner partitions a recovery window into consecutive ranges sized to
//! the source's read-rate budget:
//!
//! ```text
//! sample   = max(min_sample, ceil(N / 10)) random points
//! density  = mean(event_count(p, window) for p in sample)
//! required = density * N / rate_budget          (seconds of reading)
//! ranges   = max(1, floor(required / max_range_secs))
//! ```
//!
//! The window is split into `ranges` equal-width ranges; the last range ends
//! exactly at the window end. Sampling without a seed uses entropy; with a
//! seed the plan is reproducible.

use std::sync::Arc;

use futures::future::join_all;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{PlanError, PlanResult};
use crate::historian::HistorianClient;
use crate::queue::RangeQueue;
use crate::types::{PointHandle, RecoveryPlan, TimeRange};

/// Default source read-rate budget in events per second.
pub const DEFAULT_SOURCE_MAX_RATE: f64 = 1_000_000.0;

/// Default maximum range duration in seconds.
pub const DEFAULT_MAX_RANGE_SECS: f64 = 600.0;

/// Default minimum sample size.
pub const DEFAULT_MIN_SAMPLE: usize = 10;

/// Upper bound on the number of ranges in one plan.
///
/// Each range gets its own recovery worker.
pub const MAX_RANGES: usize = 10_000;

// =============================================================================
// Configuration
// =============================================================================

/// Planner parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Source read-rate budget, events per second.
    #[serde(default = "default_source_max_rate")]
    pub source_max_rate: f64,

    /// Maximum duration of a single range, seconds.
    #[serde(default = "default_max_range_secs")]
    pub max_range_secs: f64,

    /// Minimum number of points sampled for the density estimate.
    #[serde(default = "default_min_sample")]
    pub min_sample: usize,

    /// Fixed sampling seed; `None` seeds from entropy.
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_source_max_rate() -> f64 {
    DEFAULT_SOURCE_MAX_RATE
}

fn default_max_range_secs() -> f64 {
    DEFAULT_MAX_RANGE_SECS
}

fn default_min_sample() -> usize {
    DEFAULT_MIN_SAMPLE
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            source_max_rate: DEFAULT_SOURCE_MAX_RATE,
            max_range_secs: DEFAULT_MAX_RANGE_SECS,
            min_sample: DEFAULT_MIN_SAMPLE,
            seed: None,
        }
    }
}

impl PlannerConfig {
    /// Sets a fixed sampling seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Validates the parameters.
    pub fn validate(&self) -> PlanResult<()> {
        if !(self.source_max_rate.is_finite() && self.source_max_rate > 0.0) {
            return Err(PlanError::invalid_parameter(
                "source_max_rate",
                format!("must be a positive number, got {}", self.source_max_rate),
            ));
        }
        if !(self.max_range_secs.is_finite() && self.max_range_secs > 0.0) {
            return Err(PlanError::invalid_parameter(
                "max_range_secs",
                format!("must be a positive number, got {}", self.max_range_secs),
            ));
        }
        if self.min_sample == 0 {
            return Err(PlanError::invalid_parameter("min_sample", "must be at least 1"));
        }
        Ok(())
    }
}

// =============================================================================
// Pure Planning Functions
// =============================================================================

/// Returns the number of points to sample out of `active`.
pub fn sample_size(active: usize, min_sample: usize) -> usize {
    min_sample.max(active.div_ceil(10))
}

/// Returns the number of ranges for the estimated load.
///
/// Between 1 and [`MAX_RANGES`]; non-finite estimates yield 1.
pub fn range_count(average_events: f64, active_points: usize, rate_budget: f64, max_range_secs: f64) -> usize {
    let total_events = average_events * active_points as f64;
    let required_secs = total_events / rate_budget;
    let ranges = (required_secs / max_range_secs).trunc();

    if !ranges.is_finite() || ranges < 1.0 {
        1
    } else if ranges >= MAX_RANGES as f64 {
        warn!(required = ranges, capped = MAX_RANGES, "Range count capped");
        MAX_RANGES
    } else {
        ranges as usize
    }
}

/// Splits `window` into `count` consecutive equal-width ranges.
///
/// Boundaries are computed in nanoseconds from the window start, and the
/// last range ends exactly at the window end. `count` is capped at
/// [`MAX_RANGES`] and so every range is at least one nanosecond wide.
pub fn split_window(window: &TimeRange, count: usize) -> Vec<TimeRange> {
    let duration = window.duration();
    let total_ns: i128 = duration
        .num_nanoseconds()
        .map(i128::from)
        .unwrap_or_else(|| i128::from(duration.num_milliseconds()) * 1_000_000);

    let count = (count.clamp(1, MAX_RANGES) as i128).min(total_ns.max(1));
    let boundary = |i: i128| {
        let offset = (total_ns * i / count) as i64;
        window.start() + chrono::Duration::nanoseconds(offset)
    };

    let mut ranges = Vec::with_capacity(count as usize);
    let mut start = window.start();
    for i in 1..=count {
        let end = if i == count { window.end() } else { boundary(i) };
        // Boundaries are strictly increasing, so construction cannot fail.
        if let Ok(range) = TimeRange::new(start, end) {
            ranges.push(range);
        }
        start = end;
    }
    ranges
}

fn sample_points<'a, R: Rng>(points: &'a [PointHandle], size: usize, rng: &mut R) -> Vec<&'a PointHandle> {
    if points.len() >= size {
        points.choose_multiple(rng, size).collect()
    } else {
        (0..size).map(|_| &points[rng.gen_range(0..points.len())]).collect()
    }
}

// =============================================================================
// Range Planner
// =============================================================================

/// Plans historical recovery ranges against a source historian.
pub struct RangePlanner {
    source: Arc<dyn HistorianClient>,
    config: PlannerConfig,
}

impl RangePlanner {
    /// Creates a planner.
    pub fn new(source: Arc<dyn HistorianClient>, config: PlannerConfig) -> Self {
        Self { source, config }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Estimates the average per-point event count over `window`.
    ///
    /// Points whose count fails are logged and excluded from the average.
    pub async fn estimate_density(&self, window: &TimeRange, points: &[PointHandle]) -> PlanResult<f64> {
        if points.is_empty() {
            return Err(PlanError::NoActivePoints);
        }

        let size = sample_size(points.len(), self.config.min_sample);
        let sample = match self.config.seed {
            Some(seed) => sample_points(points, size, &mut StdRng::seed_from_u64(seed)),
            None => sample_points(points, size, &mut StdRng::from_entropy()),
        };
        debug!(sampled = sample.len(), active = points.len(), "Sampling event counts");

        let counts = join_all(sample.iter().map(|p| self.source.event_count(p, window))).await;

        let mut total = 0u64;
        let mut succeeded = 0usize;
        let mut first_error = None;
        for (point, count) in sample.iter().zip(counts) {
            match count {
                Ok(count) => {
                    total += count;
                    succeeded += 1;
                }
                Err(e) => {
                    warn!(point = %point, range = %window, error = %e, "Event count failed, excluded from estimate");
                    first_error.get_or_insert((point.path(), e));
                }
            }
        }

        if succeeded == 0 {
            return match first_error {
                Some((point, source)) => Err(PlanError::EventCount { point, source }),
                None => Err(PlanError::NoActivePoints),
            };
        }
        Ok(total as f64 / succeeded as f64)
    }

    /// Builds the recovery plan for `window`.
    ///
    /// # Errors
    ///
    /// - `PlanError::InvalidParameter` for a bad configuration
    /// - `PlanError::NoActivePoints` if `points` is empty
    /// - `PlanError::EventCount` if every sampled count failed
    pub async fn plan(&self, window: TimeRange, points: &[PointHandle]) -> PlanResult<RecoveryPlan> {
        self.config.validate()?;

        info!(
            window = %window,
            points = points.len(),
            "Calculating time ranges for historical recovery"
        );

        let density = self.estimate_density(&window, points).await?;
        let count = range_count(
            density,
            points.len(),
            self.config.source_max_rate,
            self.config.max_range_secs,
        );
        let ranges = split_window(&window, count);

        info!(
            average_events = density,
            ranges = ranges.len(),
            "Historical recovery plan computed"
        );
        for (index, range) in ranges.iter().enumerate() {
            info!(index, range = %range, "Planned recovery range");
        }

        Ok(RecoveryPlan::new(window, ranges))
    }

    /// Builds the plan and pushes every range onto `queue` in order.
    pub async fn plan_into(
        &self,
        window: TimeRange,
        points: &[PointHandle],
        queue: &RangeQueue,
    ) -> PlanResult<RecoveryPlan> {
        let plan = self.plan(window, points).await?;
        queue.push_many(plan.ranges().iter().copied());
        Ok(plan)
    }
}

impl std::fmt::Debug for RangePlanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RangePlanner")
            .field("source", &self.source.name())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryHistorian;
    use crate::types::{PointName, SampleItem};
    use chrono::{DateTime, TimeZone, Utc};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).single().unwrap()
    }

    fn window(secs: i64) -> TimeRange {
        TimeRange::new(at(0), at(secs)).unwrap()
    }

    /// Source with `points` points; point `i` has `(i % 7 + 1) * per_point` samples.
    fn source(points: usize, per_point: i64, span: i64) -> (Arc<InMemoryHistorian>, Vec<PointHandle>) {
        let historian = Arc::new(InMemoryHistorian::new());
        let mut handles = Vec::new();
        for i in 0..points {
            let name = format!("P{:03}", i);
            handles.push(historian.add_point("src", PointName::new(name.as_str())));
            let n = (i as i64 % 7 + 1) * per_point;
            historian.insert_samples(
                "src",
                (0..n).map(|k| SampleItem::good(name.as_str(), k as f64, at(k * span / n))),
            );
        }
        (historian, handles)
    }

    #[test]
    fn test_range_count_single_range() {
        // D=3600s, rho=10, N=1000, R=100000/s, M=600s: 0.1s of reading.
        assert_eq!(range_count(10.0, 1000, 100_000.0, 600.0), 1);
    }

    #[test]
    fn test_range_count_truncates() {
        // 1e9 events at 1e5/s is 10000s; 10000 / 600 = 16.67.
        assert_eq!(range_count(1_000_000.0, 1000, 100_000.0, 600.0), 16);
        assert_eq!(range_count(0.0, 1000, 100_000.0, 600.0), 1);
        assert_eq!(range_count(f64::NAN, 10, 1.0, 1.0), 1);
    }

    #[test]
    fn test_range_count_capped() {
        assert_eq!(range_count(1e12, 1000, 1.0, 1.0), MAX_RANGES);
        assert_eq!(range_count(1e6, 10, 1.0, 1.0), MAX_RANGES);
    }

    #[test]
    fn test_split_window_capped() {
        let w = window(3600);
        let ranges = split_window(&w, usize::MAX);
        assert_eq!(ranges.len(), MAX_RANGES);
        assert_eq!(ranges[MAX_RANGES - 1].end(), w.end());
    }

    #[test]
    fn test_sample_size() {
        assert_eq!(sample_size(3, 10), 10);
        assert_eq!(sample_size(100, 10), 10);
        assert_eq!(sample_size(101, 10), 11);
        assert_eq!(sample_size(5000, 10), 500);
    }

    #[test]
    fn test_split_window_covers_exactly() {
        let w = window(1000);
        let ranges = split_window(&w, 3);

        assert_eq!(ranges.len(), 3);
        assert_eq!(ranges[0].start(), w.start());
        assert_eq!(ranges[2].end(), w.end());
        for pair in ranges.windows(2) {
            assert_eq!(pair[0].end(), pair[1].start());
            assert!(pair[0].start() < pair[1].start());
        }
        let total: chrono::Duration = ranges.iter().map(TimeRange::duration).sum();
        assert_eq!(total, w.duration());
    }

    #[test]
    fn test_split_single_range() {
        let w = window(3600);
        let ranges = split_window(&w, 1);
        assert_eq!(ranges, vec![w]);
    }

    #[test]
    fn test_split_caps_at_nanosecond_width() {
        let w = TimeRange::new(at(0), at(0) + chrono::Duration::nanoseconds(3)).unwrap();
        assert_eq!(split_window(&w, 10).len(), 3);
    }

    #[test]
    fn test_sampling_with_and_without_replacement() {
        let handles: Vec<_> = (0..3)
            .map(|i| PointHandle::new("src", PointName::new(format!("P{}", i)), i))
            .collect();
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(sample_points(&handles, 10, &mut rng).len(), 10);

        let many: Vec<_> = (0..200)
            .map(|i| PointHandle::new("src", PointName::new(format!("P{}", i)), i))
            .collect();
        let sample = sample_points(&many, 20, &mut rng);
        let distinct: std::collections::HashSet<_> = sample.iter().map(|p| p.id()).collect();
        assert_eq!(distinct.len(), 20);
    }

    #[tokio::test]
    async fn test_plan_with_seed_is_reproducible() {
        let (historian, handles) = source(40, 20, 1000);
        let config = PlannerConfig {
            source_max_rate: 1.0,
            max_range_secs: 100.0,
            min_sample: 10,
            seed: Some(42),
        };
        let planner = RangePlanner::new(historian, config);

        let first = planner.plan(window(1000), &handles).await.unwrap();
        let second = planner.plan(window(1000), &handles).await.unwrap();

        assert!(first.len() > 1);
        assert_eq!(first, second);
        assert_eq!(first.ranges().last().unwrap().end(), at(1000));
    }

    #[tokio::test]
    async fn test_plan_into_queues_in_order() {
        let (historian, handles) = source(10, 50, 600);
        let config = PlannerConfig {
            source_max_rate: 1.0,
            max_range_secs: 60.0,
            ..PlannerConfig::default()
        }
        .with_seed(1);
        let planner = RangePlanner::new(historian, config);
        let queue = RangeQueue::new();

        let plan = planner.plan_into(window(600), &handles, &queue).await.unwrap();

        assert_eq!(queue.len(), plan.len());
        let queued = queue.drain_all();
        assert_eq!(queued, plan.ranges());
        for pair in queued.windows(2) {
            assert!(pair[0].end() <= pair[1].start());
        }
    }

    #[tokio::test]
    async fn test_plan_rejects_empty_points_and_bad_config() {
        let (historian, _) = source(1, 1, 10);
        let planner = RangePlanner::new(historian.clone(), PlannerConfig::default());
        assert!(matches!(
            planner.plan(window(10), &[]).await,
            Err(PlanError::NoActivePoints)
        ));

        let bad = RangePlanner::new(
            historian,
            PlannerConfig {
                source_max_rate: 0.0,
                ..PlannerConfig::default()
            },
        );
        let handle = PointHandle::new("src", PointName::new("P000"), 1);
        assert!(matches!(
            bad.plan(window(10), &[handle]).await,
            Err(PlanError::InvalidParameter { parameter: "source_max_rate", .. })
        ));
    }

    #[tokio::test]
    async fn test_all_event_counts_failing() {
        let historian = Arc::new(InMemoryHistorian::new());
        historian.add_server("src");
        let ghost = PointHandle::new("src", PointName::new("GHOST"), 1);
        let planner = RangePlanner::new(historian, PlannerConfig::default().with_seed(3));

        assert!(matches!(
            planner.plan(window(10), &[ghost]).await,
            Err(PlanError::EventCount { .. })
        ));
    }
}
