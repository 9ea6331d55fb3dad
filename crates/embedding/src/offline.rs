//! Network-free backends: deterministic hash-derived vectors and the
//! placeholder backend used when no model is configured.

use crate::{EmbedError, EmbeddingBackend};
use async_trait::async_trait;
use sha2::{Digest, Sha256};

pub const DETERMINISTIC_DIMENSIONS: usize = 384;

/// The vector written for slots whose embedding failed after all retries,
/// and by the placeholder backend. Near-zero rather than zero so cosine
/// distance stays defined.
pub fn placeholder_vector(dimensions: usize) -> Vec<f32> {
  vec![1e-6; dimensions]
}

/// Reproducible hash-derived vectors. Builds a usable-but-shallow index
/// when no embedding model is available; the same text always maps to the
/// same vector, offline.
#[derive(Debug, Clone, Default)]
pub struct DeterministicBackend;

impl DeterministicBackend {
  pub fn new() -> Self {
    Self
  }

  fn vector(text: &str) -> Vec<f32> {
    let mut out = Vec::with_capacity(DETERMINISTIC_DIMENSIONS);
    let mut round: u32 = 0;
    while out.len() < DETERMINISTIC_DIMENSIONS {
      let mut hasher = Sha256::new();
      hasher.update(text.as_bytes());
      hasher.update(round.to_le_bytes());
      for byte in hasher.finalize() {
        if out.len() == DETERMINISTIC_DIMENSIONS {
          break;
        }
        out.push((byte as f32) / 127.5 - 1.0);
      }
      round += 1;
    }

    // Unit length keeps cosine scores comparable
    let norm = out.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
      for v in &mut out {
        *v /= norm;
      }
    }
    out
  }
}

#[async_trait]
impl EmbeddingBackend for DeterministicBackend {
  fn name(&self) -> &'static str {
    "deterministic"
  }

  fn model_id(&self) -> &str {
    "sha256-projection"
  }

  fn dimensions(&self) -> usize {
    DETERMINISTIC_DIMENSIONS
  }

  async fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
    Ok(Self::vector(text))
  }

  async fn embed_many(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError> {
    Ok(texts.iter().map(|t| Self::vector(t)).collect())
  }

  async fn is_available(&self) -> bool {
    true
  }
}

/// No-model backend. Batch calls yield placeholder vectors so the index
/// stays populated and lexical operations keep working; single-text calls
/// fail so callers defer instead of storing a meaningless vector.
#[derive(Debug, Clone)]
pub struct PlaceholderBackend {
  dimensions: usize,
}

impl PlaceholderBackend {
  pub fn new(dimensions: usize) -> Self {
    Self { dimensions }
  }
}

impl Default for PlaceholderBackend {
  fn default() -> Self {
    Self::new(DETERMINISTIC_DIMENSIONS)
  }
}

#[async_trait]
impl EmbeddingBackend for PlaceholderBackend {
  fn name(&self) -> &'static str {
    "none"
  }

  fn model_id(&self) -> &str {
    "placeholder"
  }

  fn dimensions(&self) -> usize {
    self.dimensions
  }

  async fn embed_one(&self, _text: &str) -> Result<Vec<f32>, EmbedError> {
    Err(EmbedError::NotAvailable)
  }

  async fn embed_many(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError> {
    Ok(texts.iter().map(|_| placeholder_vector(self.dimensions)).collect())
  }

  async fn is_available(&self) -> bool {
    false
  }
}
