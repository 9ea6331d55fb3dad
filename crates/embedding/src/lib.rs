pub mod dispatcher;
pub mod local;
pub mod offline;
pub mod openai;
pub mod provider;

pub use dispatcher::{Dispatcher, EmbedOutcome, clamp_retry_after, prepare};
pub use local::LocalBackend;
pub use offline::{DETERMINISTIC_DIMENSIONS, DeterministicBackend, PlaceholderBackend, placeholder_vector};
pub use openai::OpenAiBackend;
pub use provider::{EmbedError, EmbeddingBackend};

use helpdex_core::config::{BackendKind, EmbeddingConfig};
use std::sync::Arc;
use tracing::warn;

/// Build the configured backend. Falls back to the placeholder backend when
/// the selected one cannot be constructed, so the process still serves
/// lexical operations.
pub fn create_backend(config: &EmbeddingConfig) -> Arc<dyn EmbeddingBackend> {
  match config.backend {
    BackendKind::OpenAi => {
      let url = match config.url.as_deref() {
        Some(url) => url,
        None => {
          warn!("EMBEDDING_BACKEND=openai but EMBEDDING_URL is unset; using placeholder backend");
          return Arc::new(PlaceholderBackend::new(config.dimensions.unwrap_or(DETERMINISTIC_DIMENSIONS)));
        }
      };
      match OpenAiBackend::new(url, config.api_key.clone()) {
        Ok(backend) => {
          let backend = match (&config.model, config.dimensions) {
            (Some(model), Some(dim)) => backend.with_model(model, dim),
            (Some(model), None) => {
              let dim = backend.dimensions();
              backend.with_model(model, dim)
            }
            _ => backend,
          };
          Arc::new(backend)
        }
        Err(e) => {
          warn!("Rejected embedding endpoint: {}; using placeholder backend", e);
          Arc::new(PlaceholderBackend::new(config.dimensions.unwrap_or(DETERMINISTIC_DIMENSIONS)))
        }
      }
    }
    BackendKind::Local => match LocalBackend::load(config.model.as_deref(), config.dimensions) {
      Ok(backend) => Arc::new(backend),
      Err(e) => {
        warn!("Failed to load local model: {}; using placeholder backend", e);
        Arc::new(PlaceholderBackend::new(config.dimensions.unwrap_or(DETERMINISTIC_DIMENSIONS)))
      }
    },
    BackendKind::Deterministic => Arc::new(DeterministicBackend::new()),
    BackendKind::None => Arc::new(PlaceholderBackend::new(
      config.dimensions.unwrap_or(DETERMINISTIC_DIMENSIONS),
    )),
  }
}

/// Build a dispatcher around the configured backend.
pub fn create_dispatcher(config: &EmbeddingConfig) -> Dispatcher {
  Dispatcher::new(create_backend(config), config.clone())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_create_backend_deterministic() {
    let config = EmbeddingConfig {
      backend: BackendKind::Deterministic,
      ..Default::default()
    };
    assert_eq!(create_backend(&config).name(), "deterministic");
  }

  #[test]
  fn test_create_backend_none() {
    let config = EmbeddingConfig {
      backend: BackendKind::None,
      ..Default::default()
    };
    assert_eq!(create_backend(&config).name(), "none");
  }

  #[test]
  fn test_openai_without_url_degrades_to_placeholder() {
    let config = EmbeddingConfig {
      backend: BackendKind::OpenAi,
      url: None,
      ..Default::default()
    };
    assert_eq!(create_backend(&config).name(), "none");
  }

  #[test]
  fn test_openai_with_bad_scheme_degrades_to_placeholder() {
    let config = EmbeddingConfig {
      backend: BackendKind::OpenAi,
      url: Some("gopher://example".to_string()),
      ..Default::default()
    };
    assert_eq!(create_backend(&config).name(), "none");
  }

  #[test]
  fn test_openai_with_url() {
    let config = EmbeddingConfig {
      backend: BackendKind::OpenAi,
      url: Some("https://api.example.com/v1/embeddings".to_string()),
      model: Some("custom".to_string()),
      dimensions: Some(768),
      ..Default::default()
    };
    let backend = create_backend(&config);
    assert_eq!(backend.name(), "openai");
    assert_eq!(backend.dimensions(), 768);
  }
}
