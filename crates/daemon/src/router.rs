//! Request routing: an explicit table mapping operation names to typed
//! handlers, shared verbatim by both transports.

use crate::error::ToolError;
use crate::state::AppState;
use crate::tools::ToolHandler;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// JSON-RPC style request, identical over stdio and HTTP.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
  #[serde(default)]
  pub id: Option<serde_json::Value>,
  pub method: String,
  #[serde(default)]
  pub params: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub id: Option<serde_json::Value>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub result: Option<serde_json::Value>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<RpcError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
  pub code: i32,
  /// Stable machine-readable kind (`invalid_input`, `not_found`, ...).
  pub kind: String,
  pub message: String,
}

impl Response {
  pub fn success(id: Option<serde_json::Value>, result: serde_json::Value) -> Self {
    Self {
      id,
      result: Some(result),
      error: None,
    }
  }

  pub fn failure(id: Option<serde_json::Value>, error: RpcError) -> Self {
    Self {
      id,
      result: None,
      error: Some(error),
    }
  }

  pub fn parse_error(message: &str) -> Self {
    Self::failure(
      None,
      RpcError {
        code: -32700,
        kind: "invalid_input".to_string(),
        message: message.to_string(),
      },
    )
  }
}

pub struct Router {
  tools: ToolHandler,
  production: bool,
}

impl Router {
  pub fn new(state: Arc<AppState>) -> Self {
    let production = state.config.tools.production;
    Self {
      tools: ToolHandler::new(state),
      production,
    }
  }

  /// Dispatch one request through the operation table.
  pub async fn handle(&self, request: Request) -> Response {
    debug!("Handling request: {}", request.method);
    let Request { id, method, params } = request;

    let result = match method.as_str() {
      "ping" => Ok(serde_json::json!("pong")),

      "semantic_search" => self.tools.semantic_search(params).await,
      "keyword_search" => self.tools.keyword_search(params).await,
      "get_topic" => self.tools.get_topic(params).await,
      "get_function_info" => self.tools.get_function_info(params).await,
      "list_titles" => self.tools.list_titles(params).await,
      "index_status" => self.tools.index_status(params).await,
      "save_snippet" => self.tools.save_snippet(params).await,
      "trigger_reindex" => self.tools.trigger_reindex(params).await,

      _ => {
        warn!("Unknown method: {}", method);
        return Response::failure(
          id,
          RpcError {
            code: -32601,
            kind: "invalid_input".to_string(),
            message: format!("Method not found: {}", method),
          },
        );
      }
    };

    match result {
      Ok(value) => Response::success(id, value),
      Err(e) => {
        // The full error always reaches the log; the response text depends
        // on production mode
        warn!("{} failed: {}", method, e);
        Response::failure(id, self.rpc_error(&e))
      }
    }
  }

  fn rpc_error(&self, error: &ToolError) -> RpcError {
    RpcError {
      code: error.code(),
      kind: error.kind().to_string(),
      message: error.safe_message(self.production),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_request_defaults() {
    let request: Request = serde_json::from_str(r#"{"method": "ping"}"#).unwrap();
    assert_eq!(request.method, "ping");
    assert!(request.id.is_none());
    assert!(request.params.is_null());
  }

  #[test]
  fn test_response_shapes() {
    let ok = Response::success(Some(serde_json::json!(1)), serde_json::json!("pong"));
    assert!(ok.result.is_some());
    assert!(ok.error.is_none());

    let err = Response::parse_error("bad json");
    assert_eq!(err.error.as_ref().unwrap().code, -32700);
    assert_eq!(err.error.as_ref().unwrap().kind, "invalid_input");
  }

  #[test]
  fn test_error_serialization_omits_absent_fields() {
    let response = Response::success(None, serde_json::json!({}));
    let raw = serde_json::to_string(&response).unwrap();
    assert!(!raw.contains("error"));
    assert!(!raw.contains("\"id\""));
  }
}
