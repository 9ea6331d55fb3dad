use crate::{EmbedError, EmbeddingBackend};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const DEFAULT_MODEL: &str = "text-embedding-3-small";
const DEFAULT_DIMENSIONS: usize = 1536;

/// OpenAI-compatible remote embedding endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiBackend {
  client: reqwest::Client,
  url: String,
  api_key: Option<String>,
  model: String,
  dimensions: usize,
}

impl OpenAiBackend {
  /// Only `http://` and `https://` endpoints are accepted; anything else is
  /// rejected before any call is made.
  pub fn new(url: impl Into<String>, api_key: Option<String>) -> Result<Self, EmbedError> {
    let url = url.into();
    if !url.starts_with("http://") && !url.starts_with("https://") {
      return Err(EmbedError::InvalidEndpoint(url));
    }
    Ok(Self {
      client: reqwest::Client::new(),
      url,
      api_key,
      model: DEFAULT_MODEL.to_string(),
      dimensions: DEFAULT_DIMENSIONS,
    })
  }

  pub fn with_model(mut self, model: impl Into<String>, dimensions: usize) -> Self {
    self.model = model.into();
    self.dimensions = dimensions;
    self
  }

  async fn post(&self, input: EmbeddingInput<'_>) -> Result<Vec<Vec<f32>>, EmbedError> {
    let request = EmbeddingRequest {
      model: &self.model,
      input,
    };

    let mut builder = self.client.post(&self.url).json(&request);
    if let Some(ref key) = self.api_key {
      builder = builder.bearer_auth(key);
    }

    let response = builder.send().await?;
    let status = response.status();

    if status.as_u16() == 429 {
      let retry_after_secs = response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok());
      warn!("Embedding endpoint rate limited (retry-after: {:?})", retry_after_secs);
      return Err(EmbedError::RateLimited { retry_after_secs });
    }

    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      warn!("Embedding endpoint failed: {} - {}", status, body);
      return Err(EmbedError::Backend(format!("endpoint returned {}: {}", status, body)));
    }

    let result: EmbeddingResponse = response.json().await?;
    Ok(result.data.into_iter().map(|d| d.embedding).collect())
  }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
  model: &'a str,
  input: EmbeddingInput<'a>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum EmbeddingInput<'a> {
  Single(&'a str),
  Batch(Vec<&'a str>),
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
  data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
  embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingBackend for OpenAiBackend {
  fn name(&self) -> &'static str {
    "openai"
  }

  fn model_id(&self) -> &str {
    &self.model
  }

  fn dimensions(&self) -> usize {
    self.dimensions
  }

  async fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
    debug!("Embedding one text: {} chars", text.len());
    let mut vectors = self.post(EmbeddingInput::Single(text)).await?;
    match vectors.pop() {
      Some(v) if vectors.is_empty() => Ok(v),
      _ => Err(EmbedError::Backend("no embedding in response".to_string())),
    }
  }

  async fn embed_many(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError> {
    if texts.is_empty() {
      return Ok(Vec::new());
    }
    debug!("Embedding batch of {} texts", texts.len());
    self.post(EmbeddingInput::Batch(texts.to_vec())).await
  }

  async fn is_available(&self) -> bool {
    true
  }
}
