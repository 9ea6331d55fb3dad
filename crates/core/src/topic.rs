use serde::{Deserialize, Serialize};

/// Key that identifies a topic within the index.
///
/// The derived point id is a pure function of the key, so re-ingesting the
/// same source always lands on the same point.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TopicKey {
  pub version: String,
  pub language: String,
  /// Path of the document relative to its archive root.
  pub path: String,
}

impl TopicKey {
  pub fn new(version: impl Into<String>, language: impl Into<String>, path: impl Into<String>) -> Self {
    Self {
      version: version.into(),
      language: language.into(),
      path: path.into(),
    }
  }

  /// Stable numeric id for the vector store.
  pub fn point_id(&self) -> u64 {
    // \x1f keeps "a|b" + "c" from colliding with "a" + "b|c"
    crate::hash::point_id(&format!("{}\x1f{}\x1f{}", self.version, self.language, self.path))
  }
}

/// A unit of indexed text derived from one converted document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topic {
  pub id: u64,
  pub title: String,
  /// Markdown body, whitespace-normalized. Truncation to the embedding
  /// input cap happens at embed time, not here.
  pub body: String,
  pub path: String,
  pub version: String,
  pub language: String,
}

impl Topic {
  pub fn new(key: TopicKey, title: impl Into<String>, body: &str) -> Self {
    Self {
      id: key.point_id(),
      title: title.into(),
      body: normalize_whitespace(body),
      path: key.path,
      version: key.version,
      language: key.language,
    }
  }

  /// Text handed to the embedding dispatcher: title plus body.
  pub fn embed_text(&self) -> String {
    format!("{}\n\n{}", self.title, self.body)
  }
}

/// Collapse runs of blank lines and trailing whitespace without touching
/// heading or code-block structure.
pub fn normalize_whitespace(text: &str) -> String {
  let mut out = String::with_capacity(text.len());
  let mut blank_run = 0usize;
  for line in text.lines() {
    let trimmed = line.trim_end();
    if trimmed.is_empty() {
      blank_run += 1;
      if blank_run > 1 {
        continue;
      }
    } else {
      blank_run = 0;
    }
    out.push_str(trimmed);
    out.push('\n');
  }
  out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_point_id_pure_function_of_key() {
    let a = TopicKey::new("8.3.24", "ru", "objects/catalog.html");
    let b = TopicKey::new("8.3.24", "ru", "objects/catalog.html");
    assert_eq!(a.point_id(), b.point_id());
  }

  #[test]
  fn test_point_id_sensitive_to_each_component() {
    let base = TopicKey::new("8.3.24", "ru", "p.html");
    assert_ne!(base.point_id(), TopicKey::new("8.3.25", "ru", "p.html").point_id());
    assert_ne!(base.point_id(), TopicKey::new("8.3.24", "en", "p.html").point_id());
    assert_ne!(base.point_id(), TopicKey::new("8.3.24", "ru", "q.html").point_id());
  }

  #[test]
  fn test_key_components_do_not_bleed() {
    // "ab" + "c" must not collide with "a" + "bc"
    let a = TopicKey::new("ab", "c", "p");
    let b = TopicKey::new("a", "bc", "p");
    assert_ne!(a.point_id(), b.point_id());
  }

  #[test]
  fn test_normalize_whitespace_collapses_blank_runs() {
    let text = "# Title   \n\n\n\nbody line\n\n\ncode\n";
    assert_eq!(normalize_whitespace(text), "# Title\n\nbody line\n\ncode");
  }

  #[test]
  fn test_topic_body_is_normalized() {
    let key = TopicKey::new("1.0", "en", "a.html");
    let topic = Topic::new(key, "A", "x  \n\n\n\ny");
    assert_eq!(topic.body, "x\n\ny");
  }
}
