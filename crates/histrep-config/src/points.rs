// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Point-list file loading.
//!
//! One point name per line. Surrounding whitespace is trimmed, blank lines
//! and lines starting with `#` are skipped, and repeated names keep only
//! their first occurrence.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use histrep_core::PointName;
use tracing::{debug, info, warn};

use crate::error::{ConfigError, ConfigResult};

/// Parses point names from file content.
pub fn parse_points(content: &str) -> Vec<PointName> {
    let mut seen = HashSet::new();
    let mut points = Vec::new();

    for (index, line) in content.lines().enumerate() {
        let name = line.trim();
        if name.is_empty() || name.starts_with('#') {
            continue;
        }
        if !seen.insert(name) {
            debug!(point = name, line = index + 1, "Duplicate point name ignored");
            continue;
        }
        points.push(PointName::new(name));
    }

    points
}

/// Loads point names from a file.
///
/// # Errors
///
/// - `ConfigError::FileNotFound` if the file does not exist
/// - `ConfigError::Io` if it cannot be read
/// - `ConfigError::EmptyPointList` if it holds no names
pub fn load_points(path: impl AsRef<Path>) -> ConfigResult<Vec<PointName>> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(ConfigError::file_not_found(path));
    }

    let content = fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;
    let points = parse_points(&content);

    if points.is_empty() {
        warn!(path = %path.display(), "Points file contains no point names");
        return Err(ConfigError::empty_point_list(path));
    }

    info!(path = %path.display(), count = points.len(), "Loaded point list");
    Ok(points)
}
