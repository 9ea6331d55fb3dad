//! Append-only ingest failure log, newline-delimited JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::PathBuf;
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureRecord {
  pub path: String,
  pub reason: String,
  pub at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct FailureLog {
  path: PathBuf,
}

impl FailureLog {
  pub fn new(path: PathBuf) -> Self {
    Self { path }
  }

  /// Append one record. Logging must never fail ingest, so errors are
  /// reported and swallowed here.
  pub fn append(&self, archive_path: &std::path::Path, reason: &str) {
    let record = FailureRecord {
      path: archive_path.display().to_string(),
      reason: reason.to_string(),
      at: Utc::now(),
    };

    let result = (|| -> std::io::Result<()> {
      if let Some(parent) = self.path.parent() {
        std::fs::create_dir_all(parent)?;
      }
      let mut file = std::fs::OpenOptions::new().create(true).append(true).open(&self.path)?;
      let line = serde_json::to_string(&record).map_err(std::io::Error::other)?;
      writeln!(file, "{}", line)
    })();

    if let Err(e) = result {
      warn!("Failed to append to failure log {:?}: {}", self.path, e);
    }
  }

  /// All records, skipping unparsable lines.
  pub fn read_all(&self) -> Vec<FailureRecord> {
    let Ok(content) = std::fs::read_to_string(&self.path) else {
      return Vec::new();
    };
    content
      .lines()
      .filter(|l| !l.trim().is_empty())
      .filter_map(|l| serde_json::from_str(l).ok())
      .collect()
  }
}
