//! Watcher: periodic archive rescans and pending-memory drains on two
//! independent intervals, plus explicit reindex requests from the tool
//! façade. The sole component that invokes ingest while serving.

use crate::state::AppState;
use pipeline::{IngestError, IngestOptions};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::interval;
use tracing::{debug, info, warn};

pub struct Watcher {
  state: Arc<AppState>,
  reindex_rx: mpsc::Receiver<()>,
  shutdown_rx: broadcast::Receiver<()>,
}

impl Watcher {
  pub fn new(state: Arc<AppState>, reindex_rx: mpsc::Receiver<()>, shutdown_rx: broadcast::Receiver<()>) -> Self {
    Self {
      state,
      reindex_rx,
      shutdown_rx,
    }
  }

  pub async fn run(mut self) {
    let config = &self.state.config.watcher;
    let rescan_enabled = config.enabled && !self.state.config.sources.roots.is_empty();

    let mut discover_timer = interval(Duration::from_secs(config.watch_interval_secs.max(1)));
    let mut drain_timer = interval(Duration::from_secs(config.drain_interval_secs.max(1)));

    // Skip the immediate ticks
    discover_timer.tick().await;
    drain_timer.tick().await;

    info!(
      "Watcher running (rescan: {}, drain every {}s)",
      if rescan_enabled {
        format!("every {}s", config.watch_interval_secs)
      } else {
        "off".to_string()
      },
      config.drain_interval_secs
    );

    loop {
      tokio::select! {
        _ = discover_timer.tick(), if rescan_enabled => {
          self.scan_and_ingest().await;
        }
        _ = drain_timer.tick() => {
          let report = self.state.memory.drain_pending().await;
          if report.attempted > 0 {
            info!(
              "Pending drain: {} attempted, {} drained, {} remaining",
              report.attempted, report.drained, report.remaining
            );
          }
        }
        request = self.reindex_rx.recv() => {
          match request {
            Some(()) => self.scan_and_ingest().await,
            None => {
              debug!("Reindex channel closed");
              break;
            }
          }
        }
        _ = self.shutdown_rx.recv() => {
          debug!("Watcher received shutdown signal");
          break;
        }
      }
    }
  }

  /// Rescan the source roots; the cache partition inside the orchestrator
  /// limits work to changed archives only.
  async fn scan_and_ingest(&self) {
    match self.state.ingestor.run(&IngestOptions::default()).await {
      Ok(report) => {
        if report.ingested > 0 || report.failed > 0 {
          info!(
            "Watcher ingest: {} ingested, {} failed, {} topics",
            report.ingested, report.failed, report.topics
          );
        }
      }
      Err(IngestError::AlreadyRunning) => debug!("Skipping rescan: ingest already running"),
      Err(IngestError::NoSources) => debug!("Skipping rescan: no source roots configured"),
      Err(e) => warn!("Watcher ingest failed: {}", e),
    }
  }
}

/// Spawn the watcher as a background task.
pub fn spawn_watcher(
  state: Arc<AppState>,
  reindex_rx: mpsc::Receiver<()>,
  shutdown_rx: broadcast::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
  let watcher = Watcher::new(state, reindex_rx, shutdown_rx);
  tokio::spawn(async move {
    watcher.run().await;
  })
}
