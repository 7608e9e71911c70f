// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Core data types for histrep.
//!
//! This module provides the backend-agnostic data model shared by every
//! stage of the replication pipeline: point names and handles, sample values,
//! time ranges and recovery plans.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hash;

use crate::error::{PlanError, PlanResult};

// =============================================================================
// Identifiers
// =============================================================================

/// The logical name of a point (tag), as listed in the point file.
///
/// Point names are the join key between the source and the destination
/// historian; they are unique within a run.
///
/// # Examples
///
/// ```
/// use histrep_core::types::PointName;
///
/// let name = PointName::new("SINUSOID");
/// assert_eq!(name.as_str(), "SINUSOID");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PointName(String);

impl PointName {
    /// Creates a new point name.
    #[inline]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the name as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the name and returns the inner string.
    #[inline]
    pub fn into_inner(self) -> String {
        self.0
    }

    /// Returns the full path of this point on the given server.
    pub fn path_on(&self, server: &str) -> String {
        format!("\\\\{}\\{}", server, self.0)
    }
}

impl fmt::Display for PointName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for PointName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for PointName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for PointName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// An opaque handle to a connected historian server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServerHandle {
    name: String,
    id: u64,
}

impl ServerHandle {
    /// Creates a new server handle.
    pub fn new(name: impl Into<String>, id: u64) -> Self {
        Self {
            name: name.into(),
            id,
        }
    }

    /// Returns the server name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the backend-assigned identifier.
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl fmt::Display for ServerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\\\\{}", self.name)
    }
}

/// An opaque handle to a point on a specific server.
///
/// Handles are only ever produced by a historian client and are stable for
/// the lifetime of that client.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PointHandle {
    server: String,
    name: PointName,
    id: u64,
}

impl PointHandle {
    /// Creates a new point handle.
    pub fn new(server: impl Into<String>, name: PointName, id: u64) -> Self {
        Self {
            server: server.into(),
            name,
            id,
        }
    }

    /// Returns the server this point lives on.
    #[inline]
    pub fn server(&self) -> &str {
        &self.server
    }

    /// Returns the logical point name.
    #[inline]
    pub fn name(&self) -> &PointName {
        &self.name
    }

    /// Returns the backend-assigned point identifier.
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns the full point path, `\\server\name`.
    pub fn path(&self) -> String {
        self.name.path_on(&self.server)
    }
}

impl fmt::Display for PointHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\\\\{}\\{}", self.server, self.name)
    }
}

// =============================================================================
// Value Types
// =============================================================================

/// A historian sample value.
///
/// # Examples
///
/// ```
/// use histrep_core::types::Value;
///
/// let flow = Value::Float64(12.5);
/// assert_eq!(flow.as_f64(), Some(12.5));
/// assert_eq!(flow.to_string(), "12.5");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Value {
    /// Boolean value
    Bool(bool),

    /// Signed 32-bit integer
    Int32(i32),

    /// Signed 64-bit integer
    Int64(i64),

    /// 32-bit floating point
    Float32(f32),

    /// 64-bit floating point
    Float64(f64),

    /// UTF-8 string
    String(String),

    /// Named digital state
    Digital(String),

    /// Timestamp value
    DateTime(DateTime<Utc>),

    /// No value recorded
    Null,
}

impl Value {
    /// Returns the type name of this value.
    #[inline]
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int32(_) => "int32",
            Value::Int64(_) => "int64",
            Value::Float32(_) => "float32",
            Value::Float64(_) => "float64",
            Value::String(_) => "string",
            Value::Digital(_) => "digital",
            Value::DateTime(_) => "datetime",
            Value::Null => "null",
        }
    }

    /// Returns `true` if this is a numeric value.
    #[inline]
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Value::Int32(_) | Value::Int64(_) | Value::Float32(_) | Value::Float64(_)
        )
    }

    /// Converts numeric values to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int32(v) => Some(*v as f64),
            Value::Int64(v) => Some(*v as f64),
            Value::Float32(v) => Some(*v as f64),
            Value::Float64(v) => Some(*v),
            Value::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    /// Returns the string payload of string and digital values.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) | Value::Digital(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(v) => write!(f, "{}", v),
            Value::Int32(v) => write!(f, "{}", v),
            Value::Int64(v) => write!(f, "{}", v),
            Value::Float32(v) => write!(f, "{}", v),
            Value::Float64(v) => write!(f, "{}", v),
            Value::String(v) => write!(f, "{}", v),
            Value::Digital(v) => write!(f, "{}", v),
            Value::DateTime(v) => write!(f, "{}", v.to_rfc3339()),
            Value::Null => write!(f, "null"),
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

macro_rules! impl_from_for_value {
    ($variant:ident, $type:ty) => {
        impl From<$type> for Value {
            fn from(v: $type) -> Self {
                Value::$variant(v)
            }
        }
    };
}

impl_from_for_value!(Bool, bool);
impl_from_for_value!(Int32, i32);
impl_from_for_value!(Int64, i64);
impl_from_for_value!(Float32, f32);
impl_from_for_value!(Float64, f64);
impl_from_for_value!(String, String);

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

// =============================================================================
// Quality
// =============================================================================

/// The quality status attached to a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    /// The value is good.
    #[default]
    Good,

    /// The value is questionable.
    Questionable,

    /// The value was substituted by an operator or a calculation.
    Substituted,

    /// The value is bad.
    Bad,
}

impl Quality {
    /// Returns `true` if the quality is good.
    #[inline]
    pub fn is_good(&self) -> bool {
        matches!(self, Quality::Good)
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Quality::Good => write!(f, "Good"),
            Quality::Questionable => write!(f, "Questionable"),
            Quality::Substituted => write!(f, "Substituted"),
            Quality::Bad => write!(f, "Bad"),
        }
    }
}

// =============================================================================
// Sample Item
// =============================================================================

/// A single send-ready sample.
///
/// Produced by either ingestion path and owned by the dispatch engine once
/// it has been pushed onto the send queue.
///
/// # Examples
///
/// ```
/// use histrep_core::types::{PointName, Quality, SampleItem, Value};
/// use chrono::Utc;
///
/// let item = SampleItem::new(PointName::new("FLOW"), Value::Float64(4.2), Utc::now(), Quality::Good);
/// assert_eq!(item.point.as_str(), "FLOW");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleItem {
    /// Logical point name.
    pub point: PointName,

    /// The sample value.
    pub value: Value,

    /// Sample timestamp.
    pub timestamp: DateTime<Utc>,

    /// Sample quality.
    pub quality: Quality,
}

impl SampleItem {
    /// Creates a new sample item.
    pub fn new(point: PointName, value: Value, timestamp: DateTime<Utc>, quality: Quality) -> Self {
        Self {
            point,
            value,
            timestamp,
            quality,
        }
    }

    /// Creates a good-quality sample.
    pub fn good(point: impl Into<PointName>, value: impl Into<Value>, timestamp: DateTime<Utc>) -> Self {
        Self::new(point.into(), value.into(), timestamp, Quality::Good)
    }
}

impl fmt::Display for SampleItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} @ {} [{}]",
            self.point,
            self.value,
            self.timestamp.to_rfc3339(),
            self.quality
        )
    }
}

// =============================================================================
// Time Range
// =============================================================================

/// A half-open time interval `[start, end)` with `start < end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawTimeRange")]
pub struct TimeRange {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

#[derive(Deserialize)]
struct RawTimeRange {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TryFrom<RawTimeRange> for TimeRange {
    type Error = PlanError;

    fn try_from(raw: RawTimeRange) -> PlanResult<Self> {
        Self::new(raw.start, raw.end)
    }
}

impl TimeRange {
    /// Creates a new range.
    ///
    /// # Errors
    ///
    /// Returns `PlanError::InvalidWindow` if `start >= end`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> PlanResult<Self> {
        if start >= end {
            return Err(PlanError::InvalidWindow {
                start: start.to_rfc3339(),
                end: end.to_rfc3339(),
            });
        }
        Ok(Self { start, end })
    }

    /// Returns the inclusive start.
    #[inline]
    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// Returns the exclusive end.
    #[inline]
    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Returns the width of the range.
    pub fn duration(&self) -> chrono::Duration {
        self.end - self.start
    }

    /// Returns the width of the range in (fractional) seconds.
    pub fn duration_secs_f64(&self) -> f64 {
        let d = self.duration();
        match d.num_nanoseconds() {
            Some(ns) => ns as f64 / 1e9,
            None => d.num_milliseconds() as f64 / 1e3,
        }
    }

    /// Returns `true` if `at` lies within `[start, end)`.
    #[inline]
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at < self.end
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}

// =============================================================================
// Recovery Plan
// =============================================================================

/// An ordered, gap-free partition of a recovery window.
///
/// Only the planner builds plans; they serialize for reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecoveryPlan {
    window: TimeRange,
    ranges: Vec<TimeRange>,
}

impl RecoveryPlan {
    /// Creates a plan from already partitioned ranges.
    pub(crate) fn new(window: TimeRange, ranges: Vec<TimeRange>) -> Self {
        Self { window, ranges }
    }

    /// Returns the window the plan covers.
    pub fn window(&self) -> TimeRange {
        self.window
    }

    /// Returns the ranges in chronological order.
    pub fn ranges(&self) -> &[TimeRange] {
        &self.ranges
    }

    /// Returns the number of ranges.
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    /// Returns `true` if the plan has no ranges.
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Consumes the plan and returns the ranges.
    pub fn into_ranges(self) -> Vec<TimeRange> {
        self.ranges
    }
}

// =============================================================================
// Collection Mode
// =============================================================================

/// Which producer feeds the send queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataCollectionMode {
    /// Subscribe-and-forward of newly arriving samples.
    #[serde(alias = "real", alias = "real_time")]
    Realtime,

    /// Bulk backfill over a fixed past window.
    Historical,
}

impl DataCollectionMode {
    /// Returns the mode as a string slice.
    pub fn as_str(&self) -> &'static str {
        match self {
            DataCollectionMode::Realtime => "realtime",
            DataCollectionMode::Historical => "historical",
        }
    }
}

impl fmt::Display for DataCollectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DataCollectionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "realtime" | "real" | "real_time" | "real-time" | "snapshot" => Ok(Self::Realtime),
            "historical" | "history" => Ok(Self::Historical),
            other => Err(format!("unknown data collection mode '{}'", other)),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
