use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of a recorded session event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
  TopicView,
  SnippetSave,
  Exchange,
}

impl EventKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      EventKind::TopicView => "topic_view",
      EventKind::SnippetSave => "snippet_save",
      EventKind::Exchange => "exchange",
    }
  }
}

/// A session memory event. Created on tool invocation; written to the
/// short and medium tiers synchronously and to the long tier when the
/// embedding backend allows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEvent {
  pub id: Uuid,
  pub kind: EventKind,
  pub at: DateTime<Utc>,
  pub payload: serde_json::Value,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub summary: Option<String>,
}

impl MemoryEvent {
  pub fn new(kind: EventKind, payload: serde_json::Value) -> Self {
    Self {
      id: Uuid::now_v7(), // Time-ordered
      kind,
      at: Utc::now(),
      payload,
      summary: None,
    }
  }

  pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
    self.summary = Some(summary.into());
    self
  }

  /// Text handed to the embedding dispatcher for the long tier.
  pub fn embed_text(&self) -> String {
    match &self.summary {
      Some(s) => format!("{}: {}", self.kind.as_str(), s),
      None => format!("{}: {}", self.kind.as_str(), self.payload),
    }
  }

  /// Stable long-tier point id, so a crash between the long-tier write and
  /// the pending-queue removal cannot duplicate the event.
  pub fn point_id(&self) -> u64 {
    crate::hash::point_id(&self.id.to_string())
  }
}
