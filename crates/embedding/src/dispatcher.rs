//! Cross-cutting wrapper around an embedding backend.
//!
//! The dispatcher owns sanitize/truncate, batching, the worker pool, the
//! global concurrency semaphore, transient retries, Retry-After handling,
//! the count-mismatch ladder, and dimension probing. Backends stay simple.

use crate::offline::placeholder_vector;
use crate::{EmbedError, EmbeddingBackend};
use futures::stream::{self, StreamExt};
use helpdex_core::config::{BackendKind, EmbeddingConfig};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

const TRANSIENT_RETRIES: u32 = 2;
const RATE_LIMIT_WAITS: u32 = 3;
const RETRY_AFTER_MIN_SECS: u64 = 1;
const RETRY_AFTER_MAX_SECS: u64 = 120;
const RETRY_AFTER_DEFAULT_SECS: u64 = 2;

/// Result of a batch embed. `vectors.len()` always equals the input length;
/// placeholder vectors fill positions where every retry failed.
#[derive(Debug)]
pub struct EmbedOutcome {
  pub vectors: Vec<Vec<f32>>,
  /// True when any position holds a placeholder or the backend is the
  /// no-model placeholder backend.
  pub degraded: bool,
  /// Number of inputs that were truncated to the character cap.
  pub truncated: usize,
}

pub struct Dispatcher {
  backend: Arc<dyn EmbeddingBackend>,
  config: EmbeddingConfig,
  semaphore: Arc<Semaphore>,
  /// Dimension discovered from the first successful call; 0 = unprobed.
  probed_dim: AtomicUsize,
  /// Sticky flag from the most recent call, consulted by the status tool.
  degraded: AtomicBool,
  truncations: AtomicU64,
}

impl Dispatcher {
  pub fn new(backend: Arc<dyn EmbeddingBackend>, config: EmbeddingConfig) -> Self {
    let semaphore = Arc::new(Semaphore::new(config.max_concurrent.max(1)));
    Self {
      backend,
      config,
      semaphore,
      probed_dim: AtomicUsize::new(0),
      degraded: AtomicBool::new(false),
      truncations: AtomicU64::new(0),
    }
  }

  pub fn backend_name(&self) -> &'static str {
    self.backend.name()
  }

  pub fn model_id(&self) -> String {
    self.backend.model_id().to_string()
  }

  fn is_placeholder_backend(&self) -> bool {
    self.config.backend == BackendKind::None
  }

  /// Probed dimension when known, else the configured hint, else the
  /// backend default.
  pub fn dimension(&self) -> usize {
    let probed = self.probed_dim.load(Ordering::Relaxed);
    if probed != 0 {
      return probed;
    }
    self.config.dimensions.unwrap_or_else(|| self.backend.dimensions())
  }

  /// Whether the most recent call was degraded.
  pub fn is_degraded(&self) -> bool {
    self.degraded.load(Ordering::Relaxed)
  }

  pub fn truncation_count(&self) -> u64 {
    self.truncations.load(Ordering::Relaxed)
  }

  pub async fn is_available(&self) -> bool {
    self.backend.is_available().await
  }

  /// Discover the backend's vector dimension with a probe call.
  pub async fn probe_dimension(&self) -> Result<usize, EmbedError> {
    let probed = self.probed_dim.load(Ordering::Relaxed);
    if probed != 0 {
      return Ok(probed);
    }
    let vectors = self.call_checked(&["dimension probe"]).await?;
    Ok(vectors.first().map(|v| v.len()).unwrap_or(0))
  }

  /// Embed a single text. No placeholder fallback: callers that can defer
  /// (memory writes) treat the error as "enqueue pending"; callers that
  /// cannot (semantic search) fall back to lexical.
  pub async fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
    let (prepared, was_truncated) = prepare(text, self.config.max_chars);
    if was_truncated {
      self.truncations.fetch_add(1, Ordering::Relaxed);
      debug!("Truncated embedding input to {} chars", self.config.max_chars);
    }

    let result = self.call_checked(&[prepared.as_str()]).await;
    self.degraded.store(result.is_err(), Ordering::Relaxed);
    let mut vectors = result?;
    vectors.pop().ok_or(EmbedError::CountMismatch { expected: 1, got: 0 })
  }

  /// Embed many texts. The result always has one vector per input, in
  /// input order; only a dimension change against the memoized dimension is
  /// surfaced as an error (the orchestrator converts it into a
  /// collection-recreate request).
  pub async fn embed_many(&self, texts: &[String]) -> Result<EmbedOutcome, EmbedError> {
    if texts.is_empty() {
      return Ok(EmbedOutcome {
        vectors: Vec::new(),
        degraded: self.is_placeholder_backend(),
        truncated: 0,
      });
    }

    let mut truncated = 0usize;
    let prepared: Vec<String> = texts
      .iter()
      .map(|t| {
        let (s, was) = prepare(t, self.config.max_chars);
        if was {
          truncated += 1;
        }
        s
      })
      .collect();
    self.truncations.fetch_add(truncated as u64, Ordering::Relaxed);

    let batch_size = self.config.effective_batch_size();
    let workers = self.config.effective_workers();
    let slices: Vec<Vec<String>> = prepared.chunks(batch_size).map(|c| c.to_vec()).collect();

    // buffered() preserves slice order, so output order equals input order
    let results: Vec<Result<Vec<Option<Vec<f32>>>, EmbedError>> = stream::iter(slices)
      .map(|slice| async move {
        let refs: Vec<&str> = slice.iter().map(String::as_str).collect();
        self.embed_slice(&refs).await
      })
      .buffered(workers)
      .collect()
      .await;

    let dimension = self.dimension();
    let mut vectors = Vec::with_capacity(texts.len());
    let mut degraded = self.is_placeholder_backend();
    for result in results {
      for slot in result? {
        match slot {
          Some(v) => vectors.push(v),
          None => {
            vectors.push(placeholder_vector(dimension));
            degraded = true;
          }
        }
      }
    }

    self.degraded.store(degraded, Ordering::Relaxed);
    Ok(EmbedOutcome {
      vectors,
      degraded,
      truncated,
    })
  }

  /// Count-mismatch ladder: retry the same batch once, then split in half,
  /// then one-by-one; positions that still fail become `None`.
  async fn embed_slice(&self, texts: &[&str]) -> Result<Vec<Option<Vec<f32>>>, EmbedError> {
    match self.call_checked(texts).await {
      Ok(vectors) => return Ok(vectors.into_iter().map(Some).collect()),
      Err(e @ EmbedError::DimensionChanged { .. }) => return Err(e),
      Err(EmbedError::CountMismatch { expected, got }) => {
        warn!(expected, got, "embedding_count_retry");
        match self.call_checked(texts).await {
          Ok(vectors) => return Ok(vectors.into_iter().map(Some).collect()),
          Err(e @ EmbedError::DimensionChanged { .. }) => return Err(e),
          Err(e) => debug!("Batch retry after count mismatch failed: {}", e),
        }
      }
      Err(e) => debug!("Batch embedding failed: {}", e),
    }

    let halves: Vec<&[&str]> = if texts.len() > 1 {
      let mid = texts.len() / 2;
      vec![&texts[..mid], &texts[mid..]]
    } else {
      vec![texts]
    };

    let mut out = Vec::with_capacity(texts.len());
    for half in halves {
      match self.call_checked(half).await {
        Ok(vectors) => out.extend(vectors.into_iter().map(Some)),
        Err(e @ EmbedError::DimensionChanged { .. }) => return Err(e),
        Err(_) => {
          for text in half {
            match self.call_checked(&[text]).await {
              Ok(mut vectors) => out.push(vectors.pop()),
              Err(e @ EmbedError::DimensionChanged { .. }) => return Err(e),
              Err(e) => {
                warn!("Embedding failed after all retries: {}", e);
                out.push(None);
              }
            }
          }
        }
      }
    }
    Ok(out)
  }

  /// One backend call with semaphore, timeout, transient retries, and
  /// Retry-After handling; verifies the vector count and memoizes the
  /// dimension.
  async fn call_checked(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError> {
    let vectors = self.call_backend(texts).await?;
    if vectors.len() != texts.len() {
      return Err(EmbedError::CountMismatch {
        expected: texts.len(),
        got: vectors.len(),
      });
    }
    if let Some(first) = vectors.first() {
      self.record_dimension(first.len())?;
    }
    Ok(vectors)
  }

  async fn call_backend(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError> {
    let deadline = self.request_timeout(texts.len());
    let acquire_timeout = Duration::from_secs(self.config.acquire_timeout_secs);
    let mut transient_attempts: u32 = 0;
    let mut rate_limit_waits: u32 = 0;

    loop {
      let permit = match timeout(acquire_timeout, self.semaphore.acquire()).await {
        Ok(Ok(permit)) => permit,
        Ok(Err(_)) => return Err(EmbedError::Backend("semaphore closed".to_string())),
        Err(_) => return Err(EmbedError::AcquireTimeout),
      };

      let call = async {
        if texts.len() == 1 {
          self.backend.embed_one(texts[0]).await.map(|v| vec![v])
        } else {
          self.backend.embed_many(texts).await
        }
      };
      let result = timeout(deadline, call).await;
      drop(permit);

      match result {
        Ok(Ok(vectors)) => return Ok(vectors),
        Ok(Err(EmbedError::RateLimited { retry_after_secs })) if rate_limit_waits < RATE_LIMIT_WAITS => {
          let wait = retry_after_secs
            .unwrap_or(RETRY_AFTER_DEFAULT_SECS)
            .clamp(RETRY_AFTER_MIN_SECS, RETRY_AFTER_MAX_SECS);
          debug!("Rate limited; waiting {}s", wait);
          rate_limit_waits += 1;
          sleep(Duration::from_secs(wait)).await;
        }
        Ok(Err(e)) if e.is_transient() && transient_attempts < TRANSIENT_RETRIES => {
          let backoff = Duration::from_millis(500 << transient_attempts);
          debug!("Transient embedding error, retrying in {:?}: {}", backoff, e);
          transient_attempts += 1;
          sleep(backoff).await;
        }
        Ok(Err(e)) => return Err(e),
        Err(_) if transient_attempts < TRANSIENT_RETRIES => {
          debug!("Embedding request timed out, retrying");
          transient_attempts += 1;
        }
        Err(_) => return Err(EmbedError::Timeout),
      }
    }
  }

  fn request_timeout(&self, batch_len: usize) -> Duration {
    let single = self.config.timeout_secs;
    if batch_len <= 1 {
      Duration::from_secs(single)
    } else {
      Duration::from_secs(single.max(30 + batch_len as u64 / 10))
    }
  }

  fn record_dimension(&self, dim: usize) -> Result<(), EmbedError> {
    match self
      .probed_dim
      .compare_exchange(0, dim, Ordering::Relaxed, Ordering::Relaxed)
    {
      Ok(_) => Ok(()),
      Err(existing) if existing == dim => Ok(()),
      Err(existing) => Err(EmbedError::DimensionChanged {
        expected: existing,
        got: dim,
      }),
    }
  }
}

/// Strip control bytes (0x00-0x1F except newline, carriage return, tab) and
/// truncate to the character cap. Returns the prepared text and whether
/// truncation happened.
pub fn prepare(text: &str, max_chars: usize) -> (String, bool) {
  let sanitized: String = text
    .chars()
    .filter(|c| !matches!(c, '\x00'..='\x1f') || matches!(c, '\n' | '\r' | '\t'))
    .collect();

  if sanitized.chars().count() > max_chars {
    (sanitized.chars().take(max_chars).collect(), true)
  } else {
    (sanitized, false)
  }
}

/// Clamp a Retry-After value to the allowed backoff window. Exposed for the
/// boundary test on `"0"`.
pub fn clamp_retry_after(secs: Option<u64>) -> u64 {
  secs
    .unwrap_or(RETRY_AFTER_DEFAULT_SECS)
    .clamp(RETRY_AFTER_MIN_SECS, RETRY_AFTER_MAX_SECS)
}

#[cfg(test)]
mod tests {
  use super::*;
  use async_trait::async_trait;
  use std::sync::Mutex;

  fn test_config() -> EmbeddingConfig {
    EmbeddingConfig {
      backend: BackendKind::OpenAi,
      batch_size: 4,
      workers: 2,
      timeout_secs: 5,
      acquire_timeout_secs: 5,
      max_chars: 2000,
      ..Default::default()
    }
  }

  /// Scripted backend: pops one behavior per call.
  struct ScriptedBackend {
    script: Mutex<Vec<Behavior>>,
    dimensions: usize,
  }

  enum Behavior {
    /// Return correct vectors; first component encodes the input's numeric value.
    Ok,
    /// Return one vector fewer than requested.
    Short,
    /// Fail with a non-transient error.
    Fail,
    /// Return vectors of the given dimension.
    WrongDim(usize),
  }

  impl ScriptedBackend {
    fn new(script: Vec<Behavior>) -> Self {
      Self {
        script: Mutex::new(script),
        dimensions: 4,
      }
    }

    fn vector_for(&self, text: &str, dim: usize) -> Vec<f32> {
      let mut v = vec![0.0; dim];
      v[0] = text.parse().unwrap_or(-1.0);
      v
    }
  }

  #[async_trait]
  impl EmbeddingBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
      "scripted"
    }
    fn model_id(&self) -> &str {
      "scripted"
    }
    fn dimensions(&self) -> usize {
      self.dimensions
    }

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
      self.embed_many(&[text]).await.map(|mut v| v.pop().unwrap())
    }

    async fn embed_many(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError> {
      let behavior = self.script.lock().unwrap().pop().unwrap_or(Behavior::Ok);
      match behavior {
        Behavior::Ok => Ok(texts.iter().map(|t| self.vector_for(t, self.dimensions)).collect()),
        Behavior::Short => Ok(
          texts
            .iter()
            .take(texts.len().saturating_sub(1))
            .map(|t| self.vector_for(t, self.dimensions))
            .collect(),
        ),
        Behavior::Fail => Err(EmbedError::Backend("scripted failure".to_string())),
        Behavior::WrongDim(dim) => Ok(texts.iter().map(|t| self.vector_for(t, dim)).collect()),
      }
    }

    async fn is_available(&self) -> bool {
      true
    }
  }

  fn dispatcher_with(script: Vec<Behavior>) -> Dispatcher {
    Dispatcher::new(Arc::new(ScriptedBackend::new(script)), test_config())
  }

  #[test]
  fn test_prepare_strips_control_bytes() {
    let (s, truncated) = prepare("a\x00b\x1fc\nd\te", 100);
    assert_eq!(s, "abc\nd\te");
    assert!(!truncated);
  }

  #[test]
  fn test_prepare_truncates_and_records() {
    let (s, truncated) = prepare(&"x".repeat(2500), 2000);
    assert_eq!(s.chars().count(), 2000);
    assert!(truncated);
  }

  #[test]
  fn test_prepare_at_cap_is_untouched() {
    let (s, truncated) = prepare(&"x".repeat(2000), 2000);
    assert_eq!(s.chars().count(), 2000);
    assert!(!truncated);
  }

  #[test]
  fn test_retry_after_zero_clamps_to_minimum() {
    assert_eq!(clamp_retry_after(Some(0)), RETRY_AFTER_MIN_SECS);
    assert_eq!(clamp_retry_after(Some(999)), RETRY_AFTER_MAX_SECS);
    assert_eq!(clamp_retry_after(None), RETRY_AFTER_DEFAULT_SECS);
  }

  #[tokio::test]
  async fn test_embed_many_preserves_order() {
    // 10 inputs across 3 batches with 2 workers
    let dispatcher = dispatcher_with(vec![]);
    let texts: Vec<String> = (0..10).map(|i| i.to_string()).collect();
    let outcome = dispatcher.embed_many(&texts).await.unwrap();
    assert_eq!(outcome.vectors.len(), 10);
    assert!(!outcome.degraded);
    for (i, v) in outcome.vectors.iter().enumerate() {
      assert_eq!(v[0], i as f32, "vector {} out of order", i);
    }
  }

  #[tokio::test]
  async fn test_count_mismatch_recovers_via_retry() {
    // First call short, retry succeeds. Script pops from the back.
    let dispatcher = dispatcher_with(vec![Behavior::Ok, Behavior::Short]);
    let texts: Vec<String> = (0..4).map(|i| i.to_string()).collect();
    let outcome = dispatcher.embed_many(&texts).await.unwrap();
    assert_eq!(outcome.vectors.len(), 4);
    assert!(!outcome.degraded);
    for (i, v) in outcome.vectors.iter().enumerate() {
      assert_eq!(v[0], i as f32);
    }
  }

  #[tokio::test]
  async fn test_count_mismatch_recovers_via_split() {
    // Both full-batch attempts short; the two halves succeed.
    let dispatcher = dispatcher_with(vec![Behavior::Ok, Behavior::Ok, Behavior::Short, Behavior::Short]);
    let texts: Vec<String> = (0..4).map(|i| i.to_string()).collect();
    let outcome = dispatcher.embed_many(&texts).await.unwrap();
    assert_eq!(outcome.vectors.len(), 4);
    assert!(!outcome.degraded);
    for (i, v) in outcome.vectors.iter().enumerate() {
      assert_eq!(v[0], i as f32);
    }
  }

  #[tokio::test]
  async fn test_placeholders_only_for_failed_slots() {
    // Everything fails: the result still has one vector per input.
    let script = std::iter::repeat_with(|| Behavior::Fail).take(16).collect();
    let dispatcher = dispatcher_with(script);
    let texts: Vec<String> = (0..4).map(|i| i.to_string()).collect();
    let outcome = dispatcher.embed_many(&texts).await.unwrap();
    assert_eq!(outcome.vectors.len(), 4);
    assert!(outcome.degraded);
    assert!(dispatcher.is_degraded());
  }

  #[tokio::test]
  async fn test_dimension_change_surfaces() {
    let dispatcher = dispatcher_with(vec![Behavior::WrongDim(8), Behavior::Ok]);
    let first: Vec<String> = vec!["1".to_string()];
    dispatcher.embed_many(&first).await.unwrap();

    let second: Vec<String> = vec!["2".to_string()];
    let err = dispatcher.embed_many(&second).await.unwrap_err();
    assert!(matches!(err, EmbedError::DimensionChanged { expected: 4, got: 8 }));
  }

  #[tokio::test]
  async fn test_dimension_probe_memoizes() {
    let dispatcher = dispatcher_with(vec![Behavior::Ok]);
    assert_eq!(dispatcher.probe_dimension().await.unwrap(), 4);
    assert_eq!(dispatcher.dimension(), 4);
    // Second probe answers from the memo without consuming script entries
    assert_eq!(dispatcher.probe_dimension().await.unwrap(), 4);
  }

  #[tokio::test]
  async fn test_embed_one_result_shape() {
    let dispatcher = dispatcher_with(vec![Behavior::Ok]);
    let v = dispatcher.embed_one("7").await.unwrap();
    assert_eq!(v[0], 7.0);
  }

  #[tokio::test]
  async fn test_placeholder_backend_marks_degraded() {
    let config = EmbeddingConfig {
      backend: BackendKind::None,
      ..test_config()
    };
    let dispatcher = Dispatcher::new(Arc::new(crate::offline::PlaceholderBackend::new(4)), config);
    let texts: Vec<String> = vec!["a".to_string(), "b".to_string()];
    let outcome = dispatcher.embed_many(&texts).await.unwrap();
    assert_eq!(outcome.vectors.len(), 2);
    assert!(outcome.degraded);
    assert!(dispatcher.embed_one("a").await.is_err());
  }
}
