//! Medium tier: append-only newline-delimited journal with time-based
//! expiry. The source of truth between restarts.

use chrono::{Duration, Utc};
use helpdex_core::MemoryEvent;
use helpdex_core::fsio;
use std::io::Write;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum JournalError {
  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),
  #[error("Serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub struct Journal {
  path: PathBuf,
  ttl: Duration,
}

impl Journal {
  pub fn new(path: PathBuf, ttl_days: i64) -> Self {
    Self {
      path,
      ttl: Duration::days(ttl_days.max(1)),
    }
  }

  /// Append one event. Entries older than the TTL are compacted out first,
  /// via atomic rewrite, so the journal stays strictly time-ordered and
  /// bounded.
  pub fn append(&self, event: &MemoryEvent) -> Result<(), JournalError> {
    let cutoff = Utc::now() - self.ttl;
    let existing = self.load();
    let live: Vec<&MemoryEvent> = existing.iter().filter(|e| e.at >= cutoff).collect();

    if live.len() != existing.len() {
      debug!("Compacting journal: {} -> {} entries", existing.len(), live.len());
      let mut content = String::new();
      for entry in &live {
        content.push_str(&serde_json::to_string(entry)?);
        content.push('\n');
      }
      fsio::atomic_write(&self.path, content.as_bytes())?;
    }

    if let Some(parent) = self.path.parent() {
      std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::OpenOptions::new().create(true).append(true).open(&self.path)?;
    writeln!(file, "{}", serde_json::to_string(event)?)?;
    Ok(())
  }

  /// All parsable entries, in file (time) order. Unparsable lines are
  /// skipped with a warning.
  pub fn load(&self) -> Vec<MemoryEvent> {
    let Ok(content) = std::fs::read_to_string(&self.path) else {
      return Vec::new();
    };
    content
      .lines()
      .filter(|l| !l.trim().is_empty())
      .filter_map(|l| match serde_json::from_str(l) {
        Ok(event) => Some(event),
        Err(e) => {
          warn!("Skipping unparsable journal line: {}", e);
          None
        }
      })
      .collect()
  }
}
