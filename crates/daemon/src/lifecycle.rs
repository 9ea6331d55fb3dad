//! Process assembly for serve mode: build the service graph, prepare the
//! collection, load snippets, spawn the watcher, and run the transports.

use crate::http::run_http;
use crate::router::Router;
use crate::server::{ServerError, run_stdio};
use crate::state::AppState;
use crate::watcher::spawn_watcher;
use helpdex_core::Config;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct ServeOptions {
  /// Serve line-delimited requests on stdin/stdout.
  pub stdio: bool,
  /// Serve the HTTP transport.
  pub http: bool,
}

impl Default for ServeOptions {
  fn default() -> Self {
    Self { stdio: true, http: false }
  }
}

/// Run the daemon until stdin closes (stdio mode) or ctrl-c.
pub async fn serve(config: Config, opts: ServeOptions) -> Result<(), ServerError> {
  let (state, reindex_rx) = AppState::build(config);

  // Startup is tolerant: a missing store or backend degrades tools, it
  // does not prevent serving.
  let dimension = match state.dispatcher.probe_dimension().await {
    Ok(dim) => dim,
    Err(e) => {
      debug!("Dimension probe failed at startup ({}); using configured hint", e);
      state.dispatcher.dimension()
    }
  };
  if let Err(e) = state.store.ensure_collection(dimension, false).await {
    warn!("Collection not ready: {}; lexical and deferred operations keep working", e);
  }

  if let Some(dir) = state.config.memory.snippets_dir.clone() {
    let snippets = memory::load_snippets_dir(&dir);
    if !snippets.is_empty() {
      match state.memory.ingest_snippets(&snippets).await {
        Ok(stored) => info!("Loaded {} snippets from {:?} ({} stored now)", snippets.len(), dir, stored),
        Err(e) => warn!("Snippet ingest failed: {}", e),
      }
    }
  }

  let (shutdown_tx, _) = broadcast::channel(1);
  let watcher_handle = spawn_watcher(Arc::clone(&state), reindex_rx, shutdown_tx.subscribe());

  let router = Arc::new(Router::new(Arc::clone(&state)));

  let http_handle = if opts.http {
    let router = Arc::clone(&router);
    let http_config = state.config.http.clone();
    let shutdown = shutdown_tx.subscribe();
    Some(tokio::spawn(async move {
      if let Err(e) = run_http(router, &http_config, shutdown).await {
        warn!("HTTP transport failed: {}", e);
      }
    }))
  } else {
    None
  };

  if opts.stdio {
    run_stdio(router).await?;
  } else {
    tokio::signal::ctrl_c().await?;
    info!("Interrupt received, shutting down");
  }

  let _ = shutdown_tx.send(());
  let _ = watcher_handle.await;
  if let Some(handle) = http_handle {
    let _ = handle.await;
  }
  Ok(())
}
