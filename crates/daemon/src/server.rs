//! Stdio transport: line-delimited JSON requests on stdin, one JSON
//! response per line on stdout.

use crate::router::{Request, Response, Router};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum ServerError {
  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),
  #[error("JSON error: {0}")]
  Json(#[from] serde_json::Error),
}

/// Serve requests from stdin until EOF.
pub async fn run_stdio(router: Arc<Router>) -> Result<(), ServerError> {
  let stdin = tokio::io::stdin();
  let mut lines = BufReader::new(stdin).lines();
  let mut stdout = tokio::io::stdout();

  while let Some(line) = lines.next_line().await? {
    let trimmed = line.trim();
    if trimmed.is_empty() {
      continue;
    }

    let response = handle_line(&router, trimmed).await;
    let json = serde_json::to_string(&response)?;
    stdout.write_all(json.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await?;
  }

  debug!("stdin closed, stdio transport exiting");
  Ok(())
}

/// Parse and dispatch one request line. Shared with tests.
pub async fn handle_line(router: &Router, line: &str) -> Response {
  let request: Request = match serde_json::from_str(line) {
    Ok(request) => request,
    Err(e) => {
      warn!("Invalid request JSON: {}", e);
      return Response::parse_error(&format!("Parse error: {}", e));
    }
  };
  router.handle(request).await
}
