//! Memory service: routes events through the three tiers and owns the
//! pending-writes queue.

use crate::journal::Journal;
use crate::pending::{PendingQueue, PendingWrite};
use crate::ring::EventRing;
use embedding::Dispatcher;
use helpdex_core::config::MemoryConfig;
use helpdex_core::{MemoryEvent, Snippet};
use std::sync::Arc;
use store::{Point, StoreClient};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum MemoryError {
  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct DrainReport {
  pub attempted: usize,
  pub drained: usize,
  pub remaining: usize,
}

pub struct MemoryService {
  enabled: bool,
  ring: EventRing,
  journal: Journal,
  pending: PendingQueue,
  dispatcher: Arc<Dispatcher>,
  store: Arc<StoreClient>,
}

impl MemoryService {
  pub fn new(config: &MemoryConfig, dispatcher: Arc<Dispatcher>, store: Arc<StoreClient>) -> Self {
    Self {
      enabled: config.enabled,
      ring: EventRing::new(config.ring_capacity),
      journal: Journal::new(config.base_dir.join("journal.ndjson"), config.journal_ttl_days),
      pending: PendingQueue::new(config.base_dir.join("pending.json")),
      dispatcher,
      store,
    }
  }

  pub fn enabled(&self) -> bool {
    self.enabled
  }

  pub fn recent_events(&self, n: usize) -> Vec<MemoryEvent> {
    self.ring.recent(n)
  }

  pub fn pending_len(&self) -> usize {
    self.pending.len()
  }

  /// Record an event: short tier synchronously, medium tier synchronously
  /// (I/O errors logged, not raised), long tier iff embedding succeeds —
  /// otherwise the event lands in the pending queue. Either way the event
  /// ends up in exactly one of long tier / pending queue.
  pub async fn record(&self, event: MemoryEvent) -> Result<(), MemoryError> {
    if !self.enabled {
      return Ok(());
    }

    self.ring.push(event.clone());

    if let Err(e) = self.journal.append(&event) {
      warn!("Journal append failed: {}", e);
    }

    let write = PendingWrite::from_event(&event);
    if let Err(e) = self.long_write(&write).await {
      debug!("Long-tier write deferred: {}", e);
      self.pending.push(write)?;
    }
    Ok(())
  }

  /// Upsert a snippet into the long tier, deferring when the backend is
  /// degraded. Returns whether the write was deferred.
  pub async fn save_snippet(&self, snippet: &Snippet) -> Result<bool, MemoryError> {
    let write = PendingWrite::from_snippet(snippet);
    match self.long_write(&write).await {
      Ok(()) => Ok(false),
      Err(e) => {
        debug!("Snippet write deferred: {}", e);
        self.pending.push(write)?;
        Ok(true)
      }
    }
  }

  /// Bulk-ingest loaded snippets (startup path). Failures defer like any
  /// other long-tier write.
  pub async fn ingest_snippets(&self, snippets: &[Snippet]) -> Result<usize, MemoryError> {
    let mut stored = 0;
    for snippet in snippets {
      if !self.save_snippet(snippet).await? {
        stored += 1;
      }
    }
    Ok(stored)
  }

  /// Drain the pending queue: each entry is attempted once; successes are
  /// removed, failures stay for the next cycle. Re-entry after a crash
  /// resumes from the queue; content-derived ids make re-upserts harmless.
  pub async fn drain_pending(&self) -> DrainReport {
    let writes = self.pending.load();
    let attempted = writes.len();
    if attempted == 0 {
      return DrainReport::default();
    }

    let mut survivors = Vec::new();
    for write in writes {
      match self.long_write(&write).await {
        Ok(()) => debug!("Drained pending write {}", write.id),
        Err(e) => {
          debug!("Pending write {} still failing: {}", write.id, e);
          survivors.push(write);
        }
      }
    }

    let remaining = survivors.len();
    if let Err(e) = self.pending.store(&survivors) {
      warn!("Failed to rewrite pending queue: {}", e);
    }

    DrainReport {
      attempted,
      drained: attempted - remaining,
      remaining,
    }
  }

  async fn long_write(&self, write: &PendingWrite) -> Result<(), String> {
    let vector = self.dispatcher.embed_one(&write.text).await.map_err(|e| e.to_string())?;
    let point = Point {
      id: write.id,
      vector,
      payload: write.payload.clone(),
    };
    self.store.upsert(&[point]).await.map_err(|e| e.to_string())
  }
}
