// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Test Fixtures
//!
//! Pre-built test data for consistent and reproducible testing.

use chrono::{DateTime, Duration, TimeZone, Utc};
use histrep_core::{PointName, Quality, SampleItem, TimeRange, Value};

// =============================================================================
// Time Fixtures
// =============================================================================

/// Fixture providing fixed timestamps.
pub struct TimeFixtures;

impl TimeFixtures {
    /// Base instant all fixtures are relative to: 2023-11-14T22:13:20Z.
    pub fn base() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0)
            .single()
            .expect("valid timestamp")
    }

    /// `secs` seconds after [`TimeFixtures::base`].
    pub fn at(secs: i64) -> DateTime<Utc> {
        Self::base() + Duration::seconds(secs)
    }

    /// The window `[at(start), at(end))`.
    pub fn window(start: i64, end: i64) -> TimeRange {
        TimeRange::new(Self::at(start), Self::at(end)).expect("valid window")
    }
}

// =============================================================================
// Point Fixtures
// =============================================================================

/// Fixture providing point names.
pub struct PointFixtures;

impl PointFixtures {
    /// Builds names from string slices.
    pub fn names(list: &[&str]) -> Vec<PointName> {
        list.iter().map(|n| PointName::new(*n)).collect()
    }

    /// A typical plant tag list.
    pub fn plant() -> Vec<PointName> {
        Self::names(&["FIC101.PV", "TIC202.PV", "LIC303.PV", "PUMP_A.STATUS"])
    }

    /// `count` numbered points.
    pub fn batch(count: usize) -> Vec<PointName> {
        (0..count)
            .map(|i| PointName::new(format!("TAG{:04}", i)))
            .collect()
    }

    /// Points file content for `names`, with a comment header.
    pub fn file_content(names: &[PointName]) -> String {
        let mut content = String::from("# replicated points\n");
        for name in names {
            content.push_str(name.as_str());
            content.push('\n');
        }
        content
    }
}

// =============================================================================
// Sample Fixtures
// =============================================================================

/// Fixture providing sample series.
pub struct SampleFixtures;

impl SampleFixtures {
    /// One good sample per second for `secs` seconds starting at `at(start)`.
    ///
    /// The value is the offset in seconds.
    pub fn per_second(point: &PointName, start: i64, secs: i64) -> Vec<SampleItem> {
        (start..start + secs)
            .map(|s| SampleItem::good(point.clone(), s as f64, TimeFixtures::at(s)))
            .collect()
    }

    /// A sample carrying a digital state.
    pub fn digital(point: &PointName, state: &str, secs: i64) -> SampleItem {
        SampleItem::new(
            point.clone(),
            Value::Digital(state.to_string()),
            TimeFixtures::at(secs),
            Quality::Good,
        )
    }

    /// A sample with questionable quality.
    pub fn questionable(point: &PointName, value: f64, secs: i64) -> SampleItem {
        SampleItem::new(
            point.clone(),
            Value::Float64(value),
            TimeFixtures::at(secs),
            Quality::Questionable,
        )
    }
}
