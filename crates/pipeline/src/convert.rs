//! Document classification, HTML to Markdown conversion, and topic
//! assembly for one extracted archive.

use crate::discover::DiscoveredArchive;
use helpdex_core::{Topic, TopicKey};
use ignore::WalkBuilder;
use regex::Regex;
use std::io::Read;
use std::path::Path;
use std::sync::LazyLock;
use tracing::{debug, warn};

static HEADING_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)<h[12][^>]*>(.*?)</h[12]>").unwrap());
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());

const HTML_PEEK_BYTES: usize = 256;

/// Extension-based candidate check.
pub fn is_candidate_name(path: &Path) -> bool {
  path
    .extension()
    .and_then(|e| e.to_str())
    .is_some_and(|ext| matches!(ext.to_lowercase().as_str(), "html" | "htm" | "xml" | "xhtml" | "st"))
}

/// Extensionless files whose leading bytes look like HTML are candidates too.
pub fn looks_like_html(prefix: &[u8]) -> bool {
  let text = String::from_utf8_lossy(prefix);
  let trimmed = text.trim_start().to_lowercase();
  trimmed.starts_with("<!doctype") || trimmed.starts_with("<html") || trimmed.starts_with('<')
}

/// Pure HTML to Markdown conversion.
pub fn html_to_markdown(html: &str) -> String {
  html2md::parse_html(html, false)
}

/// Title: text of the first `<h1>`/`<h2>`, else `None` (callers fall back
/// to the file stem).
pub fn extract_title(html: &str) -> Option<String> {
  let captured = HEADING_RE.captures(html)?.get(1)?.as_str();
  let text = TAG_RE.replace_all(captured, "");
  let text = decode_entities(text.trim());
  if text.is_empty() { None } else { Some(text) }
}

fn decode_entities(text: &str) -> String {
  text
    .replace("&lt;", "<")
    .replace("&gt;", ">")
    .replace("&quot;", "\"")
    .replace("&#39;", "'")
    .replace("&nbsp;", " ")
    .replace("&amp;", "&")
}

/// Convert every candidate document under `extracted_root` into a topic
/// tagged with the archive's `(version, language)`.
pub fn topics_from_dir(extracted_root: &Path, archive: &DiscoveredArchive) -> Vec<Topic> {
  let mut topics = Vec::new();

  let walker = WalkBuilder::new(extracted_root).standard_filters(false).build();
  for entry in walker.filter_map(|e| e.ok()) {
    let path = entry.path();
    if entry.file_type().is_none_or(|ft| ft.is_dir()) {
      continue;
    }

    let candidate = if is_candidate_name(path) {
      true
    } else if path.extension().is_none() {
      peek_bytes(path, HTML_PEEK_BYTES).map(|b| looks_like_html(&b)).unwrap_or(false)
    } else {
      false
    };
    if !candidate {
      continue;
    }

    let html = match std::fs::read(path) {
      Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
      Err(e) => {
        warn!("Failed to read {:?}: {}", path, e);
        continue;
      }
    };

    let relative = path
      .strip_prefix(extracted_root)
      .unwrap_or(path)
      .to_string_lossy()
      .replace('\\', "/");

    let title = extract_title(&html).unwrap_or_else(|| {
      path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| relative.clone())
    });

    let body = html_to_markdown(&html);
    if body.trim().is_empty() {
      debug!("Skipping {:?}: empty after conversion", path);
      continue;
    }

    let key = TopicKey::new(archive.version.clone(), archive.language.clone(), relative);
    topics.push(Topic::new(key, title, &body));
  }

  topics
}

fn peek_bytes(path: &Path, n: usize) -> Option<Vec<u8>> {
  let mut file = std::fs::File::open(path).ok()?;
  let mut buffer = vec![0u8; n];
  let read = file.read(&mut buffer).ok()?;
  buffer.truncate(read);
  Some(buffer)
}
