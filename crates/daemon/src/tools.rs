//! Tool façade: the named operations exposed to agents. Each handler
//! parses its own typed arguments, enforces size caps and the per-op rate
//! limit, and maps every failure to a typed error.

use crate::error::ToolError;
use crate::state::AppState;
use helpdex_core::{Domain, EventKind, MemoryEvent, Snippet};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use store::{Filter, Record};
use tracing::{debug, warn};

/// Upper bound on records pulled for lexical operations.
const SCROLL_MAX: usize = 10_000;

/// Characters of body included in search summaries.
const SNIPPET_CHARS: usize = 400;

const K_DEFAULT: usize = 10;
const K_MAX: usize = 50;

pub struct ToolHandler {
  state: Arc<AppState>,
}

impl ToolHandler {
  pub fn new(state: Arc<AppState>) -> Self {
    Self { state }
  }

  fn parse_args<T: serde::de::DeserializeOwned>(params: Value) -> Result<T, ToolError> {
    serde_json::from_value(params).map_err(|e| ToolError::InvalidInput(format!("bad params: {}", e)))
  }

  /// Inputs exactly at the cap pass; one byte over is rejected.
  fn check_size(&self, what: &str, value: &str) -> Result<(), ToolError> {
    let cap = self.state.config.tools.max_input_bytes;
    if value.len() > cap {
      return Err(ToolError::InvalidInput(format!(
        "{} is {} bytes, cap is {}",
        what,
        value.len(),
        cap
      )));
    }
    Ok(())
  }

  fn parse_k(k: Option<usize>) -> Result<usize, ToolError> {
    let k = k.unwrap_or(K_DEFAULT);
    if !(1..=K_MAX).contains(&k) {
      return Err(ToolError::InvalidInput(format!("k must be in [1, {}], got {}", K_MAX, k)));
    }
    Ok(k)
  }

  // --- search ---

  pub async fn semantic_search(&self, params: Value) -> Result<Value, ToolError> {
    self.state.limiter.check("semantic_search")?;

    #[derive(Deserialize)]
    struct Args {
      query: String,
      #[serde(default)]
      k: Option<usize>,
      #[serde(default)]
      version: Option<String>,
      #[serde(default)]
      language: Option<String>,
      #[serde(default)]
      domain: Option<String>,
    }
    let args: Args = Self::parse_args(params)?;
    self.check_size("query", &args.query)?;
    let k = Self::parse_k(args.k)?;

    let mut filter = Filter::new();
    if let Some(ref v) = args.version {
      filter = filter.must_match("version", v);
    }
    if let Some(ref l) = args.language {
      filter = filter.must_match("language", l);
    }
    if let Some(ref d) = args.domain {
      filter = filter.must_match("domain", d);
    }

    match self.state.dispatcher.embed_one(&args.query).await {
      Ok(vector) => {
        let hits = self
          .state
          .store
          .search(&vector, k, Some(&filter))
          .await
          .map_err(|e| ToolError::Internal(e.to_string()))?;
        let results: Vec<Value> = hits.iter().map(|h| hit_summary(&h.payload, Some(h.score))).collect();
        Ok(json!({"results": results, "degraded": false}))
      }
      Err(e) => {
        // Degraded backend: results still flow, via the lexical path
        debug!("Semantic search degraded to lexical: {}", e);
        let records = self.scroll_filtered(Some(&filter)).await?;
        let ranked = rank_keyword(records, &args.query, None, k);
        let results: Vec<Value> = ranked.iter().map(|(r, _, _)| hit_summary(&r.payload, None)).collect();
        Ok(json!({"results": results, "degraded": true}))
      }
    }
  }

  pub async fn keyword_search(&self, params: Value) -> Result<Value, ToolError> {
    self.state.limiter.check("keyword_search")?;

    #[derive(Deserialize)]
    struct Args {
      query: String,
      #[serde(default)]
      path_prefix: Option<String>,
      #[serde(default)]
      k: Option<usize>,
    }
    let args: Args = Self::parse_args(params)?;
    self.check_size("query", &args.query)?;
    let k = Self::parse_k(args.k)?;

    let records = self.scroll_filtered(None).await?;
    let ranked = rank_keyword(records, &args.query, args.path_prefix.as_deref(), k);
    let results: Vec<Value> = ranked
      .iter()
      .map(|(r, title_hits, body_hits)| {
        let mut v = hit_summary(&r.payload, None);
        v["title_hits"] = json!(title_hits);
        v["body_hits"] = json!(body_hits);
        v
      })
      .collect();
    Ok(json!({"results": results}))
  }

  pub async fn get_topic(&self, params: Value) -> Result<Value, ToolError> {
    self.state.limiter.check("get_topic")?;

    #[derive(Deserialize)]
    struct Args {
      path: String,
    }
    let args: Args = Self::parse_args(params)?;
    self.check_size("path", &args.path)?;

    let filter = Filter::domain(Domain::Help).must_match("path", &args.path);
    let records = self
      .state
      .store
      .scroll(Some(&filter), 2)
      .await
      .map_err(|e| ToolError::Internal(e.to_string()))?;
    let record = records
      .into_iter()
      .next()
      .ok_or_else(|| ToolError::NotFound(format!("topic {}", args.path)))?;

    let event = MemoryEvent::new(EventKind::TopicView, json!({"path": args.path}));
    if let Err(e) = self.state.memory.record(event).await {
      warn!("Failed to record topic view: {}", e);
    }

    Ok(json!({
      "title": record.payload.title,
      "path": record.payload.path,
      "version": record.payload.version,
      "language": record.payload.language,
      "text": record.payload.body.unwrap_or_default(),
    }))
  }

  pub async fn get_function_info(&self, params: Value) -> Result<Value, ToolError> {
    self.state.limiter.check("get_function_info")?;

    #[derive(Deserialize)]
    struct Args {
      identifier: String,
      #[serde(default)]
      choose_index: Option<usize>,
    }
    let args: Args = Self::parse_args(params)?;
    self.check_size("identifier", &args.identifier)?;

    let records = self.scroll_filtered(Some(&Filter::domain(Domain::Help))).await?;
    let mut matches = rank_identifier(records, &args.identifier);

    // Semantic neighbors fill the tail band when the backend allows
    if let Ok(vector) = self.state.dispatcher.embed_one(&args.identifier).await {
      let filter = Filter::domain(Domain::Help);
      if let Ok(hits) = self.state.store.search(&vector, 5, Some(&filter)).await {
        for hit in hits {
          if !matches.iter().any(|m| m.payload.path == hit.payload.path) {
            matches.push(Record {
              id: hit.id,
              payload: hit.payload,
            });
          }
        }
      }
    }

    if matches.is_empty() {
      return Err(ToolError::NotFound(format!("function {}", args.identifier)));
    }

    if let Some(index) = args.choose_index {
      let chosen = matches
        .get(index)
        .ok_or_else(|| ToolError::InvalidInput(format!("choose_index {} out of range", index)))?;
      return Ok(json!({
        "title": chosen.payload.title,
        "path": chosen.payload.path,
        "version": chosen.payload.version,
        "language": chosen.payload.language,
        "text": chosen.payload.body.clone().unwrap_or_default(),
      }));
    }

    let listed: Vec<Value> = matches
      .iter()
      .enumerate()
      .map(|(choose_index, r)| {
        let mut v = hit_summary(&r.payload, None);
        v["choose_index"] = json!(choose_index);
        v
      })
      .collect();
    Ok(json!({"matches": listed}))
  }

  pub async fn list_titles(&self, params: Value) -> Result<Value, ToolError> {
    self.state.limiter.check("list_titles")?;

    #[derive(Deserialize)]
    struct Args {
      #[serde(default)]
      path_prefix: Option<String>,
      #[serde(default)]
      offset: Option<usize>,
      #[serde(default)]
      limit: Option<usize>,
    }
    let args: Args = Self::parse_args(params)?;
    if let Some(ref prefix) = args.path_prefix {
      self.check_size("path_prefix", prefix)?;
    }

    let mut records = self.scroll_filtered(Some(&Filter::domain(Domain::Help))).await?;
    if let Some(ref prefix) = args.path_prefix {
      records.retain(|r| r.payload.path.starts_with(prefix.as_str()));
    }
    records.sort_by(|a, b| a.payload.path.cmp(&b.payload.path));

    let total = records.len();
    let offset = args.offset.unwrap_or(0);
    let limit = args.limit.unwrap_or(100).clamp(1, 1000);
    let titles: Vec<Value> = records
      .iter()
      .skip(offset)
      .take(limit)
      .map(|r| json!({"title": r.payload.title, "path": r.payload.path}))
      .collect();

    Ok(json!({"titles": titles, "total": total, "offset": offset}))
  }

  // --- status & writes ---

  pub async fn index_status(&self, _params: Value) -> Result<Value, ToolError> {
    self.state.limiter.check("index_status")?;

    let status = self.state.status.snapshot().await;
    let points = self.state.store.count().await.ok();
    let available = self.state.dispatcher.is_available().await;

    Ok(json!({
      "ingest": status,
      "collection": {
        "name": self.state.store.collection(),
        "points": points,
      },
      "backend": {
        "name": self.state.dispatcher.backend_name(),
        "model": self.state.dispatcher.model_id(),
        "dimension": self.state.dispatcher.dimension(),
        "available": available,
        "degraded": self.state.dispatcher.is_degraded(),
      },
      "memory": {
        "enabled": self.state.memory.enabled(),
        "pending_writes": self.state.memory.pending_len(),
      },
      "running": self.state.ingestor.is_running(),
    }))
  }

  pub async fn save_snippet(&self, params: Value) -> Result<Value, ToolError> {
    self.state.limiter.check("save_snippet")?;

    #[derive(Deserialize)]
    struct Args {
      title: String,
      code: String,
      #[serde(default)]
      description: String,
    }
    let args: Args = Self::parse_args(params)?;
    if args.title.trim().is_empty() {
      return Err(ToolError::InvalidInput("title must not be empty".to_string()));
    }
    self.check_size("title", &args.title)?;
    self.check_size("code", &args.code)?;
    self.check_size("description", &args.description)?;

    let (domain, kind) = memory::classify(&args.code, None);
    let snippet = Snippet::new(args.title.clone(), args.code, args.description).with_domain(domain, kind);

    // Accepted even when the backend is degraded: the write is deferred
    let deferred = self
      .state
      .memory
      .save_snippet(&snippet)
      .await
      .map_err(|e| ToolError::Internal(e.to_string()))?;

    let event = MemoryEvent::new(EventKind::SnippetSave, json!({"title": args.title}));
    if let Err(e) = self.state.memory.record(event).await {
      warn!("Failed to record snippet save: {}", e);
    }

    Ok(json!({"saved": true, "deferred": deferred}))
  }

  pub async fn trigger_reindex(&self, _params: Value) -> Result<Value, ToolError> {
    self.state.limiter.check("trigger_reindex")?;

    if self.state.ingestor.is_running() {
      return Err(ToolError::Conflict("an ingest run is already in progress".to_string()));
    }

    match self.state.reindex_tx.try_send(()) {
      Ok(()) => Ok(json!({"queued": true})),
      Err(tokio::sync::mpsc::error::TrySendError::Full(_)) => Ok(json!({"queued": true})),
      Err(tokio::sync::mpsc::error::TrySendError::Closed(_)) => {
        Err(ToolError::Internal("watcher is not running".to_string()))
      }
    }
  }

  async fn scroll_filtered(&self, filter: Option<&Filter>) -> Result<Vec<Record>, ToolError> {
    self
      .state
      .store
      .scroll(filter, SCROLL_MAX)
      .await
      .map_err(|e| ToolError::Internal(e.to_string()))
  }
}

fn hit_summary(payload: &store::Payload, score: Option<f32>) -> Value {
  let snippet: String = payload
    .body
    .as_deref()
    .or(payload.description.as_deref())
    .or(payload.code.as_deref())
    .unwrap_or_default()
    .chars()
    .take(SNIPPET_CHARS)
    .collect();
  let mut v = json!({
    "title": payload.title,
    "path": payload.path,
    "version": payload.version,
    "language": payload.language,
    "domain": payload.domain,
    "snippet": snippet,
  });
  if let Some(score) = score {
    v["score"] = json!(score);
  }
  v
}

fn count_occurrences(haystack: &str, needle: &str) -> usize {
  if needle.is_empty() {
    return 0;
  }
  haystack.matches(needle).count()
}

/// Lexical ranking: records with the query in the title come first (by
/// occurrence count), then body-only matches. Every returned record
/// contains the query case-insensitively; ties keep scroll order.
pub(crate) fn rank_keyword(
  records: Vec<Record>,
  query: &str,
  path_prefix: Option<&str>,
  k: usize,
) -> Vec<(Record, usize, usize)> {
  let needle = query.to_lowercase();
  let mut scored: Vec<(Record, usize, usize)> = records
    .into_iter()
    .filter(|r| path_prefix.is_none_or(|p| r.payload.path.starts_with(p)))
    .filter_map(|r| {
      let title_hits = count_occurrences(&r.payload.title.to_lowercase(), &needle);
      let body_hits = count_occurrences(&r.payload.searchable_text().to_lowercase(), &needle);
      if title_hits + body_hits == 0 {
        None
      } else {
        Some((r, title_hits, body_hits))
      }
    })
    .collect();

  scored.sort_by(|a, b| {
    (b.1 > 0)
      .cmp(&(a.1 > 0))
      .then(b.1.cmp(&a.1))
      .then(b.2.cmp(&a.2))
  });
  scored.truncate(k);
  scored
}

/// Identifier matching bands: exact title, case-insensitive title, body
/// substring. Stable within each band.
pub(crate) fn rank_identifier(records: Vec<Record>, identifier: &str) -> Vec<Record> {
  let needle = identifier.to_lowercase();
  let mut banded: Vec<(u8, Record)> = records
    .into_iter()
    .filter_map(|r| {
      let band = if r.payload.title == identifier {
        0
      } else if r.payload.title.to_lowercase() == needle {
        1
      } else if r.payload.searchable_text().to_lowercase().contains(&needle) {
        2
      } else {
        return None;
      };
      Some((band, r))
    })
    .collect();
  banded.sort_by_key(|(band, _)| *band);
  banded.into_iter().map(|(_, r)| r).collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use store::Payload;

  fn record(id: u64, title: &str, path: &str, body: &str) -> Record {
    Record {
      id,
      payload: Payload {
        title: title.to_string(),
        path: path.to_string(),
        version: "1.0".to_string(),
        language: "en".to_string(),
        domain: "help".to_string(),
        body: Some(body.to_string()),
        code: None,
        description: None,
      },
    }
  }

  #[test]
  fn test_rank_keyword_title_band_first() {
    let records = vec![
      record(1, "Other", "a", "query appears in body"),
      record(2, "Query object", "b", "no relevant text"),
      record(3, "Nothing", "c", "irrelevant"),
    ];
    let ranked = rank_keyword(records, "query", None, 10);
    assert_eq!(ranked.len(), 2);
    assert_eq!(ranked[0].0.payload.path, "b"); // title match outranks body match
    assert_eq!(ranked[1].0.payload.path, "a");
  }

  #[test]
  fn test_rank_keyword_all_results_contain_query() {
    let records = vec![
      record(1, "A", "a", "has QUERY inside"),
      record(2, "B", "b", "nothing relevant"),
    ];
    let ranked = rank_keyword(records, "query", None, 10);
    assert!(
      ranked
        .iter()
        .all(|(r, t, b)| *t + *b > 0 && (r.payload.title.to_lowercase().contains("query")
          || r.payload.searchable_text().to_lowercase().contains("query")))
    );
    assert_eq!(ranked.len(), 1);
  }

  #[test]
  fn test_rank_keyword_path_prefix() {
    let records = vec![
      record(1, "Query", "objects/a.html", ""),
      record(2, "Query", "lang/b.html", ""),
    ];
    let ranked = rank_keyword(records, "query", Some("objects/"), 10);
    assert_eq!(ranked.len(), 1);
    assert_eq!(ranked[0].0.payload.path, "objects/a.html");
  }

  #[test]
  fn test_rank_keyword_truncates_to_k() {
    let records = (0..20).map(|i| record(i, "Query", &format!("p{}", i), "")).collect();
    let ranked = rank_keyword(records, "query", None, 5);
    assert_eq!(ranked.len(), 5);
    // Stable sort preserves scroll order inside the band
    assert_eq!(ranked[0].0.payload.path, "p0");
  }

  #[test]
  fn test_rank_identifier_bands() {
    let records = vec![
      record(1, "other", "body", "mentions WriteItems somewhere"),
      record(2, "writeitems", "ci", ""),
      record(3, "WriteItems", "exact", ""),
    ];
    let ranked = rank_identifier(records, "WriteItems");
    assert_eq!(ranked.len(), 3);
    assert_eq!(ranked[0].payload.path, "exact");
    assert_eq!(ranked[1].payload.path, "ci");
    assert_eq!(ranked[2].payload.path, "body");
  }

  #[test]
  fn test_rank_identifier_no_match() {
    let records = vec![record(1, "A", "a", "b")];
    assert!(rank_identifier(records, "Missing").is_empty());
  }

  #[test]
  fn test_count_occurrences() {
    assert_eq!(count_occurrences("a query about query", "query"), 2);
    assert_eq!(count_occurrences("abc", ""), 0);
  }
}
