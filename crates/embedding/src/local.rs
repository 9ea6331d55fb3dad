use crate::{EmbedError, EmbeddingBackend};
use async_trait::async_trait;
use model2vec_rs::model::StaticModel;
use tracing::info;

const DEFAULT_MODEL: &str = "minishlab/potion-base-8M";
const DEFAULT_DIMENSIONS: usize = 256;

/// In-process static embedding model. No network at inference time; errors
/// are terminal for the call.
pub struct LocalBackend {
  model: StaticModel,
  model_id: String,
  dimensions: usize,
}

impl LocalBackend {
  /// Load a static model by HF repo id or local path.
  pub fn load(model_id: Option<&str>, dimensions: Option<usize>) -> Result<Self, EmbedError> {
    let model_id = model_id.unwrap_or(DEFAULT_MODEL).to_string();
    info!("Loading local embedding model {}", model_id);
    let model = StaticModel::from_pretrained(&model_id, None, None, None)
      .map_err(|e| EmbedError::Backend(format!("failed to load {}: {}", model_id, e)))?;
    Ok(Self {
      model,
      model_id,
      dimensions: dimensions.unwrap_or(DEFAULT_DIMENSIONS),
    })
  }
}

#[async_trait]
impl EmbeddingBackend for LocalBackend {
  fn name(&self) -> &'static str {
    "local"
  }

  fn model_id(&self) -> &str {
    &self.model_id
  }

  fn dimensions(&self) -> usize {
    self.dimensions
  }

  async fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
    Ok(self.model.encode_single(text))
  }

  async fn embed_many(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError> {
    Ok(texts.iter().map(|t| self.model.encode_single(t)).collect())
  }

  async fn is_available(&self) -> bool {
    true
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  // Model download requires network; exercised only when explicitly requested.
  #[tokio::test]
  #[ignore = "downloads the model from HuggingFace Hub"]
  async fn test_embed_roundtrip() {
    let backend = LocalBackend::load(None, None).unwrap();
    let v = backend.embed_one("Hello, world!").await.unwrap();
    assert!(!v.is_empty());

    let batch = backend.embed_many(&["a", "b"]).await.unwrap();
    assert_eq!(batch.len(), 2);
  }
}
