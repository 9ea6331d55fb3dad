//! Persistent ingest cache keyed by archive content hash.
//!
//! An archive whose hash is present with status "indexed" is never
//! re-extracted unless the caller explicitly bypasses the cache. A read
//! failure degrades to an empty cache with a warning; it never fails ingest.

use chrono::{DateTime, Utc};
use helpdex_core::fsio;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveState {
  Indexed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveRecord {
  pub status: ArchiveState,
  pub indexed_at: DateTime<Utc>,
  pub topic_count: usize,
  pub version: String,
  pub language: String,
}

pub struct IngestCache {
  path: PathBuf,
  entries: HashMap<String, ArchiveRecord>,
}

impl IngestCache {
  /// Open the cache file; missing or unreadable files degrade to an empty
  /// cache.
  pub fn open(path: PathBuf) -> Self {
    let entries = if path.exists() {
      match fsio::read_json::<HashMap<String, ArchiveRecord>>(&path) {
        Ok(map) => {
          debug!("Loaded ingest cache with {} entries from {:?}", map.len(), path);
          map
        }
        Err(e) => {
          warn!("Failed to read ingest cache {:?}: {}; continuing without cache", path, e);
          HashMap::new()
        }
      }
    } else {
      HashMap::new()
    };
    Self { path, entries }
  }

  pub fn lookup(&self, hash: &str) -> Option<&ArchiveRecord> {
    self.entries.get(hash)
  }

  pub fn is_indexed(&self, hash: &str) -> bool {
    self.lookup(hash).is_some_and(|r| r.status == ArchiveState::Indexed)
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// Record a successful ingest and persist via atomic rename.
  pub fn mark_indexed(&mut self, hash: &str, record: ArchiveRecord) -> std::io::Result<()> {
    self.entries.insert(hash.to_string(), record);
    self.persist()
  }

  /// Drop all records (forced re-ingest).
  pub fn erase_all(&mut self) -> std::io::Result<()> {
    self.entries.clear();
    self.persist()
  }

  /// Distinct `(version, language)` tags across indexed archives.
  pub fn tags(&self) -> (Vec<String>, Vec<String>) {
    let mut versions: Vec<String> = self.entries.values().map(|r| r.version.clone()).collect();
    let mut languages: Vec<String> = self.entries.values().map(|r| r.language.clone()).collect();
    versions.sort();
    versions.dedup();
    languages.sort();
    languages.dedup();
    (versions, languages)
  }

  fn persist(&self) -> std::io::Result<()> {
    fsio::atomic_write_json(&self.path, &self.entries)
  }
}
