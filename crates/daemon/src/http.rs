//! Streamable HTTP transport. Tool names, argument schemas, and result
//! schemas are identical to the stdio transport; only the framing differs.

use crate::router::{Request, Response, Router};
use crate::server::ServerError;
use axum::Json;
use axum::extract::State;
use axum::routing::post;
use helpdex_core::config::HttpConfig;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

/// Serve requests over HTTP until the shutdown signal fires.
pub async fn run_http(
  router: Arc<Router>,
  config: &HttpConfig,
  mut shutdown: broadcast::Receiver<()>,
) -> Result<(), ServerError> {
  let path = if config.path.starts_with('/') {
    config.path.clone()
  } else {
    format!("/{}", config.path)
  };

  let app = axum::Router::new().route(&path, post(handle)).with_state(router);

  let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port)).await?;
  info!("HTTP transport listening on {}:{}{}", config.host, config.port, path);

  axum::serve(listener, app)
    .with_graceful_shutdown(async move {
      let _ = shutdown.recv().await;
    })
    .await?;
  Ok(())
}

async fn handle(State(router): State<Arc<Router>>, Json(request): Json<Request>) -> Json<Response> {
  Json(router.handle(request).await)
}
