use async_trait::async_trait;

/// A single embedding backend, free of cross-cutting concerns.
///
/// Sanitize, truncate, batching, retries, rate limiting, and the semaphore
/// all live in the [`crate::Dispatcher`] wrapper so backends stay simple.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
  fn name(&self) -> &'static str;
  fn model_id(&self) -> &str;
  /// Configured dimension hint; the dispatcher's probe takes precedence.
  fn dimensions(&self) -> usize;

  async fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbedError>;
  /// Must return one vector per input, in input order.
  async fn embed_many(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError>;
  async fn is_available(&self) -> bool;
}

#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
  #[error("Backend not available")]
  NotAvailable,
  #[error("Request failed: {0}")]
  Request(#[from] reqwest::Error),
  #[error("Backend error: {0}")]
  Backend(String),
  #[error("Rate limited")]
  RateLimited { retry_after_secs: Option<u64> },
  #[error("Request timed out")]
  Timeout,
  #[error("Semaphore acquire timed out")]
  AcquireTimeout,
  #[error("Vector count mismatch: expected {expected}, got {got}")]
  CountMismatch { expected: usize, got: usize },
  #[error("Embedding dimension changed: expected {expected}, got {got}")]
  DimensionChanged { expected: usize, got: usize },
  #[error("Invalid endpoint: {0}")]
  InvalidEndpoint(String),
}

impl EmbedError {
  /// Transient errors are retried inside the dispatcher and never surface
  /// to tool callers.
  pub fn is_transient(&self) -> bool {
    matches!(
      self,
      EmbedError::Request(_) | EmbedError::Timeout | EmbedError::RateLimited { .. }
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_transient_classification() {
    assert!(EmbedError::Timeout.is_transient());
    assert!(EmbedError::RateLimited { retry_after_secs: None }.is_transient());
    assert!(!EmbedError::NotAvailable.is_transient());
    assert!(!EmbedError::CountMismatch { expected: 4, got: 3 }.is_transient());
    assert!(!EmbedError::DimensionChanged { expected: 384, got: 768 }.is_transient());
  }
}
