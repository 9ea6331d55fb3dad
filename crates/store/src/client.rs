//! HTTP client for a Qdrant-compatible vector store.
//!
//! Collection recreation is the only destructive operation and happens only
//! on first ingest or under an explicit recreate request.

use crate::point::{Filter, Point, Record, ScoredPoint};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Upsert chunk bound.
pub const UPSERT_CHUNK: usize = 500;

const SCROLL_PAGE: usize = 256;

#[derive(Error, Debug)]
pub enum StoreError {
  #[error("Request failed: {0}")]
  Request(#[from] reqwest::Error),
  #[error("Store returned {status}: {body}")]
  Api { status: u16, body: String },
  #[error("Collection dimension is {existing} but the embedding backend produces {requested}; rerun with --recreate")]
  DimensionMismatch { existing: usize, requested: usize },
  #[error("Serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Client for one named collection.
#[derive(Debug, Clone)]
pub struct StoreClient {
  http: reqwest::Client,
  base: String,
  collection: String,
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
  result: T,
}

impl StoreClient {
  pub fn new(base_url: impl Into<String>, collection: impl Into<String>) -> Self {
    let mut base = base_url.into();
    while base.ends_with('/') {
      base.pop();
    }
    Self {
      http: reqwest::Client::new(),
      base,
      collection: collection.into(),
    }
  }

  pub fn collection(&self) -> &str {
    &self.collection
  }

  fn collection_url(&self, suffix: &str) -> String {
    format!("{}/collections/{}{}", self.base, self.collection, suffix)
  }

  async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
      Ok(response)
    } else {
      let body = response.text().await.unwrap_or_default();
      Err(StoreError::Api {
        status: status.as_u16(),
        body,
      })
    }
  }

  /// Dimension of the existing collection, or `None` when it does not exist.
  pub async fn collection_dimension(&self) -> Result<Option<usize>> {
    let response = self.http.get(self.collection_url("")).send().await?;
    if response.status().as_u16() == 404 {
      return Ok(None);
    }
    let response = Self::check(response).await?;

    #[derive(Deserialize)]
    struct Info {
      config: InfoConfig,
    }
    #[derive(Deserialize)]
    struct InfoConfig {
      params: InfoParams,
    }
    #[derive(Deserialize)]
    struct InfoParams {
      vectors: InfoVectors,
    }
    #[derive(Deserialize)]
    struct InfoVectors {
      size: usize,
    }

    let info: ApiEnvelope<Info> = response.json().await?;
    Ok(Some(info.result.config.params.vectors.size))
  }

  /// Create the collection if missing; on a dimension mismatch, recreate it
  /// only when `recreate` is set, otherwise fail with the destructive guard.
  pub async fn ensure_collection(&self, dimension: usize, recreate: bool) -> Result<()> {
    match self.collection_dimension().await? {
      None => {
        info!("Creating collection {} (dim {})", self.collection, dimension);
        self.create_collection(dimension).await
      }
      Some(existing) if existing == dimension && !recreate => Ok(()),
      Some(existing) if recreate => {
        warn!(
          "Recreating collection {} (dim {} -> {}), dropping contents",
          self.collection, existing, dimension
        );
        self.delete_collection().await?;
        self.create_collection(dimension).await
      }
      Some(existing) => Err(StoreError::DimensionMismatch {
        existing,
        requested: dimension,
      }),
    }
  }

  async fn create_collection(&self, dimension: usize) -> Result<()> {
    let body = json!({"vectors": {"size": dimension, "distance": "Cosine"}});
    let response = self.http.put(self.collection_url("")).json(&body).send().await?;
    Self::check(response).await?;
    Ok(())
  }

  pub async fn delete_collection(&self) -> Result<()> {
    let response = self.http.delete(self.collection_url("")).send().await?;
    Self::check(response).await?;
    Ok(())
  }

  /// Upsert points in bounded chunks.
  pub async fn upsert(&self, points: &[Point]) -> Result<()> {
    for chunk in points.chunks(UPSERT_CHUNK) {
      debug!("Upserting {} points into {}", chunk.len(), self.collection);
      let body = json!({"points": chunk});
      let response = self
        .http
        .put(self.collection_url("/points?wait=true"))
        .json(&body)
        .send()
        .await?;
      Self::check(response).await?;
    }
    Ok(())
  }

  /// Vector similarity search, descending score.
  pub async fn search(&self, vector: &[f32], k: usize, filter: Option<&Filter>) -> Result<Vec<ScoredPoint>> {
    let mut body = json!({
      "vector": vector,
      "limit": k,
      "with_payload": true,
    });
    if let Some(filter) = filter.filter(|f| !f.is_empty()) {
      body["filter"] = serde_json::to_value(filter)?;
    }

    let response = self
      .http
      .post(self.collection_url("/points/search"))
      .json(&body)
      .send()
      .await?;
    let response = Self::check(response).await?;
    let hits: ApiEnvelope<Vec<ScoredPoint>> = response.json().await?;
    Ok(hits.result)
  }

  /// Page through payloads matching `filter`, up to `max` records.
  pub async fn scroll(&self, filter: Option<&Filter>, max: usize) -> Result<Vec<Record>> {
    #[derive(Deserialize)]
    struct ScrollResult {
      points: Vec<Record>,
      #[serde(default)]
      next_page_offset: Option<serde_json::Value>,
    }

    let mut out = Vec::new();
    let mut offset: Option<serde_json::Value> = None;

    loop {
      let mut body = json!({
        "limit": SCROLL_PAGE.min(max.saturating_sub(out.len()).max(1)),
        "with_payload": true,
      });
      if let Some(filter) = filter.filter(|f| !f.is_empty()) {
        body["filter"] = serde_json::to_value(filter)?;
      }
      if let Some(ref cursor) = offset {
        body["offset"] = cursor.clone();
      }

      let response = self
        .http
        .post(self.collection_url("/points/scroll"))
        .json(&body)
        .send()
        .await?;
      let response = Self::check(response).await?;
      let page: ApiEnvelope<ScrollResult> = response.json().await?;

      out.extend(page.result.points);
      if out.len() >= max {
        out.truncate(max);
        return Ok(out);
      }
      match page.result.next_page_offset {
        Some(cursor) if !cursor.is_null() => offset = Some(cursor),
        _ => return Ok(out),
      }
    }
  }

  /// Exact point count.
  pub async fn count(&self) -> Result<usize> {
    #[derive(Deserialize)]
    struct CountResult {
      count: usize,
    }
    let response = self
      .http
      .post(self.collection_url("/points/count"))
      .json(&json!({"exact": true}))
      .send()
      .await?;
    let response = Self::check(response).await?;
    let count: ApiEnvelope<CountResult> = response.json().await?;
    Ok(count.result.count)
  }

  /// Create a collection snapshot; returns the snapshot name.
  pub async fn snapshot_create(&self) -> Result<String> {
    #[derive(Deserialize)]
    struct SnapshotInfo {
      name: String,
    }
    let response = self.http.post(self.collection_url("/snapshots")).send().await?;
    let response = Self::check(response).await?;
    let info: ApiEnvelope<SnapshotInfo> = response.json().await?;
    Ok(info.result.name)
  }

  /// Restore the collection from a snapshot location (URL or server path).
  pub async fn snapshot_restore(&self, location: &str) -> Result<()> {
    let body = json!({"location": location});
    let response = self
      .http
      .put(self.collection_url("/snapshots/recover"))
      .json(&body)
      .send()
      .await?;
    Self::check(response).await?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::point::Payload;

  #[test]
  fn test_base_url_trailing_slash_stripped() {
    let client = StoreClient::new("http://localhost:6333/", "helpdex");
    assert_eq!(client.collection_url(""), "http://localhost:6333/collections/helpdex");
    assert_eq!(
      client.collection_url("/points?wait=true"),
      "http://localhost:6333/collections/helpdex/points?wait=true"
    );
  }

  #[test]
  fn test_point_serialization_shape() {
    let point = Point {
      id: 42,
      vector: vec![0.5, 0.5],
      payload: Payload {
        title: "T".to_string(),
        path: "a.html".to_string(),
        version: "1.0".to_string(),
        language: "en".to_string(),
        domain: "help".to_string(),
        body: Some("b".to_string()),
        code: None,
        description: None,
      },
    };
    let json = serde_json::to_value(&point).unwrap();
    assert_eq!(json["id"], 42);
    assert_eq!(json["payload"]["domain"], "help");
    // Absent optionals are omitted, not null
    assert!(json["payload"].get("code").is_none());
  }

  #[test]
  fn test_scored_point_deserialization() {
    let raw = serde_json::json!({
      "id": 7,
      "score": 0.93,
      "payload": {"title": "T", "path": "p", "version": "1", "language": "en", "domain": "help"}
    });
    let hit: ScoredPoint = serde_json::from_value(raw).unwrap();
    assert_eq!(hit.id, 7);
    assert_eq!(hit.payload.title, "T");
  }

  // Integration tests require a running store
  #[tokio::test]
  #[ignore = "requires a vector store at localhost:6333"]
  async fn test_roundtrip_against_live_store() {
    let client = StoreClient::new("http://localhost:6333", "helpdex_test");
    client.ensure_collection(4, true).await.unwrap();

    let point = Point {
      id: 1,
      vector: vec![1.0, 0.0, 0.0, 0.0],
      payload: Payload {
        title: "T".to_string(),
        domain: "help".to_string(),
        ..Default::default()
      },
    };
    client.upsert(&[point]).await.unwrap();
    assert_eq!(client.count().await.unwrap(), 1);

    let hits = client.search(&[1.0, 0.0, 0.0, 0.0], 1, None).await.unwrap();
    assert_eq!(hits.len(), 1);
    client.delete_collection().await.unwrap();
  }
}
