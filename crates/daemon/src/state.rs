//! Root service object. All process-wide state (status record, pending
//! queue, caches) hangs off this value and is passed to components
//! explicitly; there is no ambient module-level state.

use crate::limit::RateLimiter;
use embedding::Dispatcher;
use helpdex_core::Config;
use memory::MemoryService;
use pipeline::{Ingestor, StatusBoard};
use std::sync::Arc;
use store::StoreClient;
use tokio::sync::mpsc;

pub struct AppState {
  pub config: Config,
  pub store: Arc<StoreClient>,
  pub dispatcher: Arc<Dispatcher>,
  pub memory: Arc<MemoryService>,
  pub status: StatusBoard,
  pub ingestor: Arc<Ingestor>,
  pub limiter: RateLimiter,
  /// Reindex requests flow to the watcher through this channel.
  pub reindex_tx: mpsc::Sender<()>,
}

impl AppState {
  /// Assemble the service graph from configuration. Returns the receiver
  /// half of the reindex channel for the watcher.
  pub fn build(config: Config) -> (Arc<Self>, mpsc::Receiver<()>) {
    let dispatcher = Arc::new(embedding::create_dispatcher(&config.embedding));
    let store = Arc::new(StoreClient::new(&config.store.url, &config.store.collection));
    let status = StatusBoard::new(Some(config.status_file_path()));
    let memory = Arc::new(MemoryService::new(
      &config.memory,
      Arc::clone(&dispatcher),
      Arc::clone(&store),
    ));
    let ingestor = Arc::new(Ingestor::new(
      config.clone(),
      Arc::clone(&dispatcher),
      Arc::clone(&store),
      status.clone(),
    ));
    let limiter = RateLimiter::new(config.tools.rate_limit_rpm);
    let (reindex_tx, reindex_rx) = mpsc::channel(4);

    let state = Arc::new(Self {
      config,
      store,
      dispatcher,
      memory,
      status,
      ingestor,
      limiter,
      reindex_tx,
    });
    (state, reindex_rx)
  }
}
