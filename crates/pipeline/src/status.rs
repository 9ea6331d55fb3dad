//! Shared ingest status record: single writer, many readers, best-effort
//! file mirror for split-mode deployments. Updates never block the
//! pipeline on readers.

use chrono::{DateTime, Utc};
use helpdex_core::fsio;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
  #[default]
  Idle,
  Discover,
  Extract,
  Embed,
  Upsert,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FolderProgress {
  pub total: usize,
  pub done: usize,
  pub failed: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IngestStatus {
  pub phase: Phase,
  pub archives_total: usize,
  pub archives_done: usize,
  pub archives_failed: usize,
  pub archives_skipped: usize,
  pub topics_seen: usize,
  pub topics_embedded: usize,
  pub topics_skipped: usize,
  /// Per-folder progress, keyed by the archive's parent directory.
  pub folders: BTreeMap<String, FolderProgress>,
  pub versions: BTreeSet<String>,
  pub languages: BTreeSet<String>,
  pub backend: String,
  pub degraded: bool,
  pub started_at: Option<DateTime<Utc>>,
  pub finished_at: Option<DateTime<Utc>>,
  /// Rolling embedding throughput, topics per second.
  pub throughput: f64,
  pub eta_secs: Option<u64>,
}

impl IngestStatus {
  fn recompute_derived(&mut self) {
    let elapsed = self
      .started_at
      .map(|t| (Utc::now() - t).num_milliseconds().max(1) as f64 / 1000.0)
      .unwrap_or(1.0);
    self.throughput = self.topics_embedded as f64 / elapsed;

    let remaining = self.archives_total.saturating_sub(self.archives_done + self.archives_failed);
    self.eta_secs = if self.archives_done > 0 && remaining > 0 {
      let per_archive = elapsed / self.archives_done as f64;
      Some((per_archive * remaining as f64) as u64)
    } else {
      None
    };
  }

  pub fn is_running(&self) -> bool {
    self.phase != Phase::Idle
  }
}

/// Handle to the process-wide status record. Cloneable; held by the root
/// service object and passed to components explicitly.
#[derive(Clone)]
pub struct StatusBoard {
  inner: Arc<RwLock<IngestStatus>>,
  mirror: Option<PathBuf>,
}

impl StatusBoard {
  pub fn new(mirror: Option<PathBuf>) -> Self {
    Self {
      inner: Arc::new(RwLock::new(IngestStatus::default())),
      mirror,
    }
  }

  /// Apply a mutation, recompute derived figures, and mirror to disk
  /// best-effort.
  pub async fn update<F: FnOnce(&mut IngestStatus)>(&self, f: F) {
    let snapshot = {
      let mut status = self.inner.write().await;
      f(&mut status);
      status.recompute_derived();
      status.clone()
    };
    if let Some(ref path) = self.mirror
      && let Err(e) = fsio::atomic_write_json(path, &snapshot)
    {
      debug!("Status mirror write failed: {}", e);
    }
  }

  pub async fn snapshot(&self) -> IngestStatus {
    self.inner.read().await.clone()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  #[tokio::test]
  async fn test_update_and_snapshot() {
    let board = StatusBoard::new(None);
    board
      .update(|s| {
        s.phase = Phase::Embed;
        s.topics_embedded = 42;
        s.started_at = Some(Utc::now());
      })
      .await;

    let snapshot = board.snapshot().await;
    assert_eq!(snapshot.phase, Phase::Embed);
    assert_eq!(snapshot.topics_embedded, 42);
    assert!(snapshot.throughput > 0.0);
    assert!(snapshot.is_running());
  }

  #[tokio::test]
  async fn test_mirror_file_written() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("status.json");
    let board = StatusBoard::new(Some(path.clone()));

    board.update(|s| s.archives_total = 3).await;

    let mirrored: IngestStatus = helpdex_core::read_json(&path).unwrap();
    assert_eq!(mirrored.archives_total, 3);
  }

  #[tokio::test]
  async fn test_eta_requires_progress() {
    let board = StatusBoard::new(None);
    board
      .update(|s| {
        s.started_at = Some(Utc::now());
        s.archives_total = 10;
      })
      .await;
    assert_eq!(board.snapshot().await.eta_secs, None);

    board.update(|s| s.archives_done = 5).await;
    assert!(board.snapshot().await.eta_secs.is_some());
  }
}
