//! Snippet directory loader: JSON arrays, Markdown with front-matter, and
//! raw code files, deduplicated by content hash of title+code.

use helpdex_core::{Domain, Snippet, SnippetKind};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct RawSnippet {
  title: String,
  #[serde(default)]
  code: String,
  #[serde(default)]
  description: String,
  #[serde(default)]
  domain: Option<String>,
}

/// Load every snippet under `dir`. Unreadable or unparsable files are
/// skipped with a warning; loading never fails startup.
pub fn load_snippets_dir(dir: &Path) -> Vec<Snippet> {
  let mut seen: HashSet<u64> = HashSet::new();
  let mut snippets = Vec::new();

  let entries = match std::fs::read_dir(dir) {
    Ok(entries) => entries,
    Err(e) => {
      warn!("Cannot read snippets directory {:?}: {}", dir, e);
      return snippets;
    }
  };

  let mut paths: Vec<_> = entries.filter_map(|e| e.ok()).map(|e| e.path()).collect();
  paths.sort();

  for path in paths {
    if !path.is_file() {
      continue;
    }
    let loaded = match path.extension().and_then(|e| e.to_str()).map(|e| e.to_lowercase()) {
      Some(ext) if ext == "json" => load_json_file(&path),
      Some(ext) if ext == "md" => load_markdown_file(&path),
      _ => load_code_file(&path),
    };
    for snippet in loaded {
      if seen.insert(snippet.point_id()) {
        snippets.push(snippet);
      } else {
        debug!("Skipping duplicate snippet {:?}", snippet.title);
      }
    }
  }

  snippets
}

/// Classify a record: executable code makes it a snippet; prose-only
/// records are references. An explicit domain tag wins.
pub fn classify(code: &str, domain_tag: Option<&str>) -> (Domain, SnippetKind) {
  if let Some(tag) = domain_tag {
    match tag.parse::<Domain>() {
      Ok(Domain::Standards) => return (Domain::Standards, SnippetKind::Reference),
      Ok(Domain::CommunityHelp) => return (Domain::CommunityHelp, SnippetKind::Reference),
      Ok(Domain::Snippets) => return (Domain::Snippets, SnippetKind::Snippet),
      Ok(other) => debug!("Ignoring non-snippet domain tag {}", other),
      Err(e) => warn!("{}", e),
    }
  }
  if code.trim().is_empty() {
    (Domain::CommunityHelp, SnippetKind::Reference)
  } else {
    (Domain::Snippets, SnippetKind::Snippet)
  }
}

fn load_json_file(path: &Path) -> Vec<Snippet> {
  let content = match std::fs::read_to_string(path) {
    Ok(c) => c,
    Err(e) => {
      warn!("Cannot read {:?}: {}", path, e);
      return Vec::new();
    }
  };
  let raw: Vec<RawSnippet> = match serde_json::from_str(&content) {
    Ok(raw) => raw,
    Err(e) => {
      warn!("Cannot parse {:?} as a snippet array: {}", path, e);
      return Vec::new();
    }
  };
  raw
    .into_iter()
    .map(|r| {
      let (domain, kind) = classify(&r.code, r.domain.as_deref());
      Snippet::new(r.title, r.code, r.description).with_domain(domain, kind)
    })
    .collect()
}

/// Markdown: optional `---` front-matter with `title:`/`domain:` keys,
/// fenced blocks become code, the rest is the description.
fn load_markdown_file(path: &Path) -> Vec<Snippet> {
  let content = match std::fs::read_to_string(path) {
    Ok(c) => c,
    Err(e) => {
      warn!("Cannot read {:?}: {}", path, e);
      return Vec::new();
    }
  };

  let (front, body) = split_front_matter(&content);
  let title = front
    .as_ref()
    .and_then(|f| f.get("title").cloned())
    .unwrap_or_else(|| stem_title(path));
  let domain_tag = front.as_ref().and_then(|f| f.get("domain").cloned());

  let (code, prose) = split_fenced_code(body);
  let (domain, kind) = classify(&code, domain_tag.as_deref());
  vec![Snippet::new(title, code, prose.trim()).with_domain(domain, kind)]
}

fn load_code_file(path: &Path) -> Vec<Snippet> {
  let content = match std::fs::read_to_string(path) {
    Ok(c) => c,
    Err(e) => {
      warn!("Cannot read {:?}: {}", path, e);
      return Vec::new();
    }
  };
  if content.trim().is_empty() {
    return Vec::new();
  }
  vec![Snippet::new(stem_title(path), content, "")]
}

fn stem_title(path: &Path) -> String {
  path
    .file_stem()
    .map(|s| s.to_string_lossy().replace(['_', '-'], " "))
    .unwrap_or_else(|| "untitled".to_string())
}

fn split_front_matter(content: &str) -> (Option<std::collections::HashMap<String, String>>, &str) {
  let trimmed = content.trim_start();
  let Some(rest) = trimmed.strip_prefix("---") else {
    return (None, content);
  };
  let Some(end) = rest.find("\n---") else {
    return (None, content);
  };

  let mut map = std::collections::HashMap::new();
  for line in rest[..end].lines() {
    if let Some((key, value)) = line.split_once(':') {
      map.insert(key.trim().to_string(), value.trim().to_string());
    }
  }
  let body_start = &rest[end + 4..];
  (Some(map), body_start.trim_start_matches('-').trim_start())
}

/// Extract fenced code blocks; returns (code, remaining prose).
fn split_fenced_code(body: &str) -> (String, String) {
  let mut code = String::new();
  let mut prose = String::new();
  let mut in_fence = false;

  for line in body.lines() {
    if line.trim_start().starts_with("```") {
      in_fence = !in_fence;
      continue;
    }
    let target = if in_fence { &mut code } else { &mut prose };
    target.push_str(line);
    target.push('\n');
  }

  (code.trim().to_string(), prose.trim().to_string())
}
