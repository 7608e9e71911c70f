// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Dead-letter file for values the destination rejected.
//!
//! Append-only text, one value per entry:
//!
//! ```text
//! <point-name>:<value>
//!
//! ```
//!
//! The file is for manual review. Nothing reads it back.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::error::{DispatchError, DispatchResult};
use crate::types::{PointName, Value};

/// Default dead-letter file name.
pub const DEFAULT_DEAD_LETTER_FILE: &str = "ValuesInError.txt";

/// A value that could not be delivered.
#[derive(Debug, Clone, PartialEq)]
pub struct DeadLetterEntry {
    /// Logical point name.
    pub point: PointName,
    /// Raw value.
    pub value: Value,
}

impl DeadLetterEntry {
    /// Creates a new entry.
    pub fn new(point: PointName, value: Value) -> Self {
        Self { point, value }
    }

    /// Formats the entry as written to the file.
    pub fn to_line(&self) -> String {
        format!("{}:{}\n\n", self.point, self.value)
    }
}

/// Append-only dead-letter file.
///
/// The file is opened for every batch, so a file moved away for review is
/// recreated at the configured path on the next append.
#[derive(Debug)]
pub struct DeadLetterFile {
    path: PathBuf,
    write_lock: Mutex<()>,
    entries_written: AtomicU64,
}

impl DeadLetterFile {
    /// Creates a dead-letter file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
            entries_written: AtomicU64::new(0),
        }
    }

    /// Returns the file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the number of entries appended by this instance.
    pub fn entries_written(&self) -> u64 {
        self.entries_written.load(Ordering::Relaxed)
    }

    /// Appends one entry.
    pub fn append(&self, entry: &DeadLetterEntry) -> DispatchResult<()> {
        self.append_all(std::slice::from_ref(entry))
    }

    /// Appends entries and flushes.
    pub fn append_all(&self, entries: &[DeadLetterEntry]) -> DispatchResult<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let _guard = self.write_lock.lock();
        let mut writer = BufWriter::new(self.open()?);

        for entry in entries {
            writer
                .write_all(entry.to_line().as_bytes())
                .map_err(|e| DispatchError::dead_letter_io(&self.path, e))?;
        }
        writer
            .flush()
            .map_err(|e| DispatchError::dead_letter_io(&self.path, e))?;

        self.entries_written
            .fetch_add(entries.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    fn open(&self) -> DispatchResult<File> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| DispatchError::dead_letter_io(&self.path, e))?;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| DispatchError::dead_letter_io(&self.path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_entry_format() {
        let entry = DeadLetterEntry::new(PointName::new("FLOW"), Value::Float64(4.5));
        assert_eq!(entry.to_line(), "FLOW:4.5\n\n");
    }

    #[test]
    fn test_append_creates_and_appends() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("ValuesInError.txt");
        let file = DeadLetterFile::new(&path);
        assert!(!path.exists());

        file.append(&DeadLetterEntry::new(PointName::new("A"), Value::Int32(1)))
            .unwrap();
        file.append_all(&[
            DeadLetterEntry::new(PointName::new("B"), Value::from("on")),
            DeadLetterEntry::new(PointName::new("C"), Value::Bool(true)),
        ])
        .unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "A:1\n\nB:on\n\nC:true\n\n");
        assert_eq!(file.entries_written(), 3);
    }

    #[test]
    fn test_existing_content_preserved() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dead.txt");
        std::fs::write(&path, "OLD:0\n\n").unwrap();

        DeadLetterFile::new(&path)
            .append(&DeadLetterEntry::new(PointName::new("NEW"), Value::Int64(9)))
            .unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "OLD:0\n\nNEW:9\n\n");
    }

    #[test]
    fn test_empty_append_creates_nothing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dead.txt");
        DeadLetterFile::new(&path).append_all(&[]).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_moved_file_is_recreated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ValuesInError.txt");
        let reviewed = dir.path().join("reviewed.txt");
        let file = DeadLetterFile::new(&path);

        file.append(&DeadLetterEntry::new(PointName::new("A"), Value::Int32(1)))
            .unwrap();
        std::fs::rename(&path, &reviewed).unwrap();
        file.append(&DeadLetterEntry::new(PointName::new("B"), Value::Int32(2)))
            .unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "B:2\n\n");
        assert_eq!(std::fs::read_to_string(&reviewed).unwrap(), "A:1\n\n");
        assert_eq!(file.entries_written(), 2);
    }

    #[test]
    fn test_unwritable_path() {
        let dir = TempDir::new().unwrap();
        let file = DeadLetterFile::new(dir.path());
        let result = file.append(&DeadLetterEntry::new(PointName::new("A"), Value::Int32(1)));
        assert!(matches!(result, Err(DispatchError::DeadLetterIo { .. })));
    }
}
