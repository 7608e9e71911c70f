// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Test Builders
//!
//! Builders that lay out a configuration file and its points file in a
//! directory, the way an operator would.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use histrep_core::{DataCollectionMode, PointName};

// =============================================================================
// Config File Builder
// =============================================================================

/// Builder for a YAML configuration file plus points file.
#[derive(Debug, Clone)]
pub struct ConfigFileBuilder {
    mode: DataCollectionMode,
    source: String,
    destination: String,
    points: Vec<PointName>,
    allow_create: bool,
    send_period_ms: u64,
    read_period_ms: u64,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    extra: Vec<String>,
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigFileBuilder {
    /// Create a new builder for a realtime `src` → `dst` configuration.
    pub fn new() -> Self {
        Self {
            mode: DataCollectionMode::Realtime,
            source: "src".to_string(),
            destination: "dst".to_string(),
            points: Vec::new(),
            allow_create: false,
            send_period_ms: 1000,
            read_period_ms: 1000,
            start: None,
            end: None,
            extra: Vec::new(),
        }
    }

    /// Set the collection mode.
    pub fn mode(mut self, mode: DataCollectionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the source server.
    pub fn source(mut self, server: impl Into<String>) -> Self {
        self.source = server.into();
        self
    }

    /// Set the destination server.
    pub fn destination(mut self, server: impl Into<String>) -> Self {
        self.destination = server.into();
        self
    }

    /// Set the points written to the points file.
    pub fn points(mut self, points: Vec<PointName>) -> Self {
        self.points = points;
        self
    }

    /// Allow destination point creation.
    pub fn allow_create(mut self, allow: bool) -> Self {
        self.allow_create = allow;
        self
    }

    /// Set both periods in milliseconds.
    pub fn periods_ms(mut self, send: u64, read: u64) -> Self {
        self.send_period_ms = send;
        self.read_period_ms = read;
        self
    }

    /// Set the historical window.
    pub fn window(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.mode = DataCollectionMode::Historical;
        self.start = Some(start);
        self.end = Some(end);
        self
    }

    /// Append a raw top-level YAML section.
    pub fn extra(mut self, yaml: impl Into<String>) -> Self {
        self.extra.push(yaml.into());
        self
    }

    /// Render the configuration YAML.
    pub fn to_yaml(&self) -> String {
        let mut yaml = format!(
            "mode: {}\n\
             source:\n  server: {}\n\
             destination:\n  server: {}\n\
             dispatch:\n  send_period_ms: {}\n\
             realtime:\n  read_period_ms: {}\n\
             points:\n  file: points.txt\n  allow_create: {}\n\
             dead_letter:\n  path: ValuesInError.txt\n",
            self.mode,
            self.source,
            self.destination,
            self.send_period_ms,
            self.read_period_ms,
            self.allow_create
        );
        if self.start.is_some() || self.end.is_some() {
            yaml.push_str("historical:\n");
            if let Some(start) = self.start {
                yaml.push_str(&format!("  start: \"{}\"\n", start.to_rfc3339()));
            }
            if let Some(end) = self.end {
                yaml.push_str(&format!("  end: \"{}\"\n", end.to_rfc3339()));
            }
        }
        for section in &self.extra {
            yaml.push_str(section);
            if !section.ends_with('\n') {
                yaml.push('\n');
            }
        }
        yaml
    }

    /// Write `histrep.yaml` and `points.txt` into `dir`; returns the config path.
    pub fn write_to(&self, dir: &Path) -> PathBuf {
        let mut points = String::new();
        for name in &self.points {
            points.push_str(name.as_str());
            points.push('\n');
        }
        std::fs::write(dir.join("points.txt"), points).expect("write points file");

        let path = dir.join("histrep.yaml");
        std::fs::write(&path, self.to_yaml()).expect("write config file");
        path
    }
}
