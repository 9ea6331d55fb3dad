use serde::{Deserialize, Serialize};

/// Payload field distinguishing kinds of points within the collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
  /// Converted help topics.
  Help,
  /// Executable code snippets.
  Snippets,
  /// Community-contributed prose references.
  CommunityHelp,
  /// Coding standards documents.
  Standards,
  /// Session memory events.
  Sessions,
}

impl Domain {
  pub fn as_str(&self) -> &'static str {
    match self {
      Domain::Help => "help",
      Domain::Snippets => "snippets",
      Domain::CommunityHelp => "community_help",
      Domain::Standards => "standards",
      Domain::Sessions => "sessions",
    }
  }
}

impl std::str::FromStr for Domain {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_lowercase().as_str() {
      "help" => Ok(Domain::Help),
      "snippets" => Ok(Domain::Snippets),
      "community_help" => Ok(Domain::CommunityHelp),
      "standards" => Ok(Domain::Standards),
      "sessions" => Ok(Domain::Sessions),
      _ => Err(format!("Unknown domain: {}", s)),
    }
  }
}

impl std::fmt::Display for Domain {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Classification of a community record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SnippetKind {
  /// Contains executable code.
  #[default]
  Snippet,
  /// Prose-only reference material.
  Reference,
}

/// A code+description pair contributed by a user or loaded from the
/// snippets directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snippet {
  pub title: String,
  pub code: String,
  #[serde(default)]
  pub description: String,
  pub domain: Domain,
  #[serde(default)]
  pub kind: SnippetKind,
}

impl Snippet {
  pub fn new(title: impl Into<String>, code: impl Into<String>, description: impl Into<String>) -> Self {
    Self {
      title: title.into(),
      code: code.into(),
      description: description.into(),
      domain: Domain::Snippets,
      kind: SnippetKind::Snippet,
    }
  }

  pub fn with_domain(mut self, domain: Domain, kind: SnippetKind) -> Self {
    self.domain = domain;
    self.kind = kind;
    self
  }

  /// Content-addressed id: re-ingesting the same snippet updates the same
  /// point instead of duplicating it.
  pub fn point_id(&self) -> u64 {
    crate::hash::point_id(&format!("{}\x1f{}", self.title, self.code))
  }

  /// Text handed to the embedding dispatcher.
  pub fn embed_text(&self) -> String {
    if self.description.is_empty() {
      format!("{}\n\n{}", self.title, self.code)
    } else {
      format!("{}\n\n{}\n\n{}", self.title, self.description, self.code)
    }
  }
}
