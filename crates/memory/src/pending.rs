//! Pending-writes queue: on-disk list of long-tier writes deferred while
//! the embedding backend is unavailable. Rewritten atomically; draining is
//! idempotent because point ids are content-derived.

use helpdex_core::fsio;
use helpdex_core::{MemoryEvent, Snippet};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use store::Payload;
use tracing::warn;

/// One deferred long-tier write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingWrite {
  pub id: u64,
  /// Text to embed when the backend returns.
  pub text: String,
  pub payload: Payload,
}

impl PendingWrite {
  pub fn from_event(event: &MemoryEvent) -> Self {
    Self {
      id: event.point_id(),
      text: event.embed_text(),
      payload: Payload::from_event(event),
    }
  }

  pub fn from_snippet(snippet: &Snippet) -> Self {
    Self {
      id: snippet.point_id(),
      text: snippet.embed_text(),
      payload: Payload::from_snippet(snippet),
    }
  }
}

#[derive(Clone)]
pub struct PendingQueue {
  path: PathBuf,
}

impl PendingQueue {
  pub fn new(path: PathBuf) -> Self {
    Self { path }
  }

  /// Current queue contents; a missing or unreadable file is an empty
  /// queue (with a warning for the unreadable case).
  pub fn load(&self) -> Vec<PendingWrite> {
    if !self.path.exists() {
      return Vec::new();
    }
    match fsio::read_json(&self.path) {
      Ok(writes) => writes,
      Err(e) => {
        warn!("Failed to read pending queue {:?}: {}", self.path, e);
        Vec::new()
      }
    }
  }

  /// Replace the queue contents atomically.
  pub fn store(&self, writes: &[PendingWrite]) -> std::io::Result<()> {
    fsio::atomic_write_json(&self.path, &writes)
  }

  /// Append one deferred write.
  pub fn push(&self, write: PendingWrite) -> std::io::Result<()> {
    let mut writes = self.load();
    // Same content-derived id: refresh in place instead of duplicating
    writes.retain(|w| w.id != write.id);
    writes.push(write);
    self.store(&writes)
  }

  pub fn len(&self) -> usize {
    self.load().len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}
