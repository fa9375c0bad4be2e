//! Aggregation store: the authoritative, deduplicated, time-sorted record
//! set across all loaded files.
//!
//! The store is the single source of truth; consumers read from it, never
//! from the parser directly. Mutation is serialized by the session event
//! loop, so no internal locking happens here.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::model::{is_rotated_name, LoadedFile, ParsedLogRecord};

#[derive(Debug, Default)]
pub struct LogStore {
    /// Always sorted ascending by timestamp (stable, so equal timestamps
    /// keep arrival order).
    records: Vec<Arc<ParsedLogRecord>>,
    /// Dedup index over record ids.
    ids: HashSet<String>,
    files: HashMap<String, LoadedFile>,
    /// Process-wide running error total, kept separately from the per-file
    /// counts and cleared only by [`LogStore::clear`].
    total_parse_errors: u64,
}

impl LogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one chunk: drop records whose id is already present, append the
    /// rest, and restore the global time ordering.
    pub fn apply_chunk(&mut self, records: Vec<ParsedLogRecord>, parse_errors: u64) {
        self.total_parse_errors += parse_errors;

        let mut appended = false;
        for record in records {
            if self.ids.insert(record.id.clone()) {
                self.records.push(Arc::new(record));
                appended = true;
            }
        }
        if appended {
            self.records.sort_by_key(|r| r.timestamp);
        }
    }

    /// Register file metadata after the file's job completed.
    pub fn register_file(
        &mut self,
        name: String,
        byte_size: u64,
        record_count: u64,
        parse_errors: u64,
    ) {
        info!(
            "loaded {}: {} records, {} parse errors",
            name, record_count, parse_errors
        );
        let rotated = is_rotated_name(&name);
        self.files.insert(
            name.clone(),
            LoadedFile {
                name,
                byte_size,
                record_count,
                parse_errors,
                loaded_at: Utc::now(),
                rotated,
            },
        );
    }

    /// Remove a file's records and metadata in one step; readers never see a
    /// partially-removed file.
    pub fn remove_file(&mut self, name: &str) {
        let ids = &mut self.ids;
        self.records.retain(|record| {
            if record.source_file == name {
                ids.remove(&record.id);
                false
            } else {
                true
            }
        });
        if self.files.remove(name).is_some() {
            info!("removed {}", name);
        }
    }

    /// Drop all records, metadata, and error counters.
    pub fn clear(&mut self) {
        self.records.clear();
        self.ids.clear();
        self.files.clear();
        self.total_parse_errors = 0;
        info!("store cleared");
    }

    pub fn records(&self) -> &[Arc<ParsedLogRecord>] {
        &self.records
    }

    pub fn files(&self) -> Vec<LoadedFile> {
        let mut files: Vec<LoadedFile> = self.files.values().cloned().collect();
        files.sort_by(|a, b| a.name.cmp(&b.name));
        files
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn total_parse_errors(&self) -> u64 {
        self.total_parse_errors
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
