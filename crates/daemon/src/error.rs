use thiserror::Error;

/// Typed tool-level errors. Nothing below the façade raises through to the
/// transport layer; every failure becomes one of these kinds.
#[derive(Error, Debug)]
pub enum ToolError {
  #[error("Invalid input: {0}")]
  InvalidInput(String),
  #[error("Not found: {0}")]
  NotFound(String),
  #[error("Rate limited; retry in {retry_after_secs}s")]
  RateLimited { retry_after_secs: u64 },
  #[error("Embedding backend degraded: {0}")]
  BackendDegraded(String),
  #[error("Conflict: {0}")]
  Conflict(String),
  #[error("Internal error: {0}")]
  Internal(String),
}

impl ToolError {
  pub fn kind(&self) -> &'static str {
    match self {
      ToolError::InvalidInput(_) => "invalid_input",
      ToolError::NotFound(_) => "not_found",
      ToolError::RateLimited { .. } => "rate_limited",
      ToolError::BackendDegraded(_) => "backend_degraded",
      ToolError::Conflict(_) => "conflict",
      ToolError::Internal(_) => "internal",
    }
  }

  pub fn code(&self) -> i32 {
    match self {
      ToolError::InvalidInput(_) => -32602,
      ToolError::NotFound(_) => -32001,
      ToolError::RateLimited { .. } => -32002,
      ToolError::BackendDegraded(_) => -32003,
      ToolError::Conflict(_) => -32004,
      ToolError::Internal(_) => -32000,
    }
  }

  /// Message shown to the caller. In production mode only a stable short
  /// text is returned; the full error is logged by the router.
  pub fn safe_message(&self, production: bool) -> String {
    if !production {
      return self.to_string();
    }
    match self {
      ToolError::InvalidInput(_) => "invalid input".to_string(),
      ToolError::NotFound(_) => "not found".to_string(),
      ToolError::RateLimited { retry_after_secs } => format!("rate limited; retry in {}s", retry_after_secs),
      ToolError::BackendDegraded(_) => "embedding backend degraded".to_string(),
      ToolError::Conflict(_) => "conflict".to_string(),
      ToolError::Internal(_) => "internal error".to_string(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_kinds_are_stable() {
    assert_eq!(ToolError::InvalidInput("x".into()).kind(), "invalid_input");
    assert_eq!(ToolError::NotFound("x".into()).kind(), "not_found");
    assert_eq!(ToolError::RateLimited { retry_after_secs: 1 }.kind(), "rate_limited");
    assert_eq!(ToolError::BackendDegraded("x".into()).kind(), "backend_degraded");
    assert_eq!(ToolError::Conflict("x".into()).kind(), "conflict");
    assert_eq!(ToolError::Internal("x".into()).kind(), "internal");
  }

  #[test]
  fn test_production_mode_hides_detail() {
    let err = ToolError::Internal("/etc/secret/path exploded".into());
    assert!(err.safe_message(false).contains("/etc/secret/path"));
    assert!(!err.safe_message(true).contains("/etc/secret/path"));
  }
}
