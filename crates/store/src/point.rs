use helpdex_core::{Domain, MemoryEvent, Snippet, Topic};
use serde::{Deserialize, Serialize};

/// Payload attached to every point in the collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Payload {
  pub title: String,
  pub path: String,
  pub version: String,
  pub language: String,
  pub domain: String,
  /// Full topic text; present for help topics so lexical search and topic
  /// retrieval work without a second source of truth.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub body: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub code: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
}

impl Payload {
  pub fn from_topic(topic: &Topic) -> Self {
    Self {
      title: topic.title.clone(),
      path: topic.path.clone(),
      version: topic.version.clone(),
      language: topic.language.clone(),
      domain: Domain::Help.as_str().to_string(),
      body: Some(topic.body.clone()),
      code: None,
      description: None,
    }
  }

  pub fn from_snippet(snippet: &Snippet) -> Self {
    Self {
      title: snippet.title.clone(),
      path: format!("snippet://{:016x}", snippet.point_id()),
      version: String::new(),
      language: String::new(),
      domain: snippet.domain.as_str().to_string(),
      body: None,
      code: Some(snippet.code.clone()),
      description: if snippet.description.is_empty() {
        None
      } else {
        Some(snippet.description.clone())
      },
    }
  }

  pub fn from_event(event: &MemoryEvent) -> Self {
    Self {
      title: event.kind.as_str().to_string(),
      path: format!("session://{}", event.id),
      version: String::new(),
      language: String::new(),
      domain: Domain::Sessions.as_str().to_string(),
      body: Some(event.embed_text()),
      code: None,
      description: None,
    }
  }

  /// Text searched by the lexical path: title plus whichever of
  /// body/code/description are present.
  pub fn searchable_text(&self) -> String {
    let mut out = String::new();
    for part in [self.body.as_deref(), self.description.as_deref(), self.code.as_deref()]
      .into_iter()
      .flatten()
    {
      if !out.is_empty() {
        out.push('\n');
      }
      out.push_str(part);
    }
    out
  }
}

/// A point ready for upsert.
#[derive(Debug, Clone, Serialize)]
pub struct Point {
  pub id: u64,
  pub vector: Vec<f32>,
  pub payload: Payload,
}

/// A search hit.
#[derive(Debug, Clone, Deserialize)]
pub struct ScoredPoint {
  pub id: u64,
  #[serde(default)]
  pub score: f32,
  pub payload: Payload,
}

/// A scrolled record (no score).
#[derive(Debug, Clone, Deserialize)]
pub struct Record {
  pub id: u64,
  pub payload: Payload,
}

/// Exact-match payload filter, serialized into the store's filter grammar.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Filter {
  must: Vec<FieldMatch>,
}

#[derive(Debug, Clone, Serialize)]
struct FieldMatch {
  key: String,
  #[serde(rename = "match")]
  matches: MatchValue,
}

#[derive(Debug, Clone, Serialize)]
struct MatchValue {
  value: String,
}

impl Filter {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn must_match(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.must.push(FieldMatch {
      key: key.into(),
      matches: MatchValue { value: value.into() },
    });
    self
  }

  pub fn domain(domain: Domain) -> Self {
    Self::new().must_match("domain", domain.as_str())
  }

  pub fn is_empty(&self) -> bool {
    self.must.is_empty()
  }
}
