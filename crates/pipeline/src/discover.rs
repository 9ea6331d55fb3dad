use ignore::WalkBuilder;
use rayon::prelude::*;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::UNIX_EPOCH;
use tracing::{debug, warn};

static VERSION_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+(\.\d+){1,3}$").unwrap());

/// A help archive found under a source root.
#[derive(Debug, Clone)]
pub struct DiscoveredArchive {
  pub path: PathBuf,
  /// Hex sha256 of the file bytes.
  pub hash: String,
  pub mtime: u64,
  pub size: u64,
  pub version: String,
  pub language: String,
}

/// Scans source roots for help archives, hashing each candidate.
pub struct ArchiveScanner {
  roots: Vec<PathBuf>,
  language_filter: Option<String>,
}

impl ArchiveScanner {
  pub fn new(roots: Vec<PathBuf>, language_filter: Option<String>) -> Self {
    Self { roots, language_filter }
  }

  /// Walk all roots and hash every archive. The language filter applies
  /// here, before any extraction work.
  pub fn scan(&self) -> Vec<DiscoveredArchive> {
    let mut candidates: Vec<(PathBuf, PathBuf)> = Vec::new();

    for root in &self.roots {
      if !root.exists() {
        warn!("Source root {:?} does not exist, skipping", root);
        continue;
      }
      let walker = WalkBuilder::new(root).standard_filters(false).build();
      for entry in walker.filter_map(|e| e.ok()) {
        let path = entry.path();
        if entry.file_type().is_none_or(|ft| ft.is_dir()) {
          continue;
        }
        if is_archive(path) {
          candidates.push((root.clone(), path.to_path_buf()));
        }
      }
    }

    // Hashing dominates scan time, so archives are hashed in parallel
    let mut archives: Vec<DiscoveredArchive> = candidates
      .par_iter()
      .filter_map(|(root, path)| {
        let language = derive_language(path);
        if let Some(ref filter) = self.language_filter
          && &language != filter
        {
          debug!("Skipping {:?}: language {} != filter {}", path, language, filter);
          return None;
        }

        let metadata = path.metadata().ok()?;
        let mtime = metadata.modified().ok()?.duration_since(UNIX_EPOCH).ok()?.as_secs();
        let hash = match file_sha256(path) {
          Ok(h) => h,
          Err(e) => {
            warn!("Failed to hash {:?}: {}", path, e);
            return None;
          }
        };

        Some(DiscoveredArchive {
          version: derive_version(path, root),
          language,
          path: path.to_path_buf(),
          hash,
          mtime,
          size: metadata.len(),
        })
      })
      .collect();

    archives.sort_by(|a, b| a.path.cmp(&b.path));
    archives
  }
}

fn is_archive(path: &Path) -> bool {
  path
    .extension()
    .and_then(|e| e.to_str())
    .is_some_and(|ext| matches!(ext.to_lowercase().as_str(), "hbk" | "zip"))
}

/// Version = nearest ancestor directory component (above the archive,
/// within the root) that looks like a version number.
pub fn derive_version(path: &Path, root: &Path) -> String {
  let mut current = path.parent();
  while let Some(dir) = current {
    if dir == root {
      break;
    }
    if let Some(name) = dir.file_name().and_then(|n| n.to_str())
      && VERSION_RE.is_match(name)
    {
      return name.to_string();
    }
    current = dir.parent();
  }
  "unknown".to_string()
}

/// Language is encoded in the archive file-stem suffix (`*_ru.hbk` -> `ru`).
pub fn derive_language(path: &Path) -> String {
  let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("");
  if let Some(idx) = stem.rfind('_') {
    let suffix = &stem[idx + 1..];
    if suffix.len() == 2 && suffix.chars().all(|c| c.is_ascii_lowercase()) {
      return suffix.to_string();
    }
  }
  "en".to_string()
}

/// Streaming sha256 of the full file contents.
pub fn file_sha256(path: &Path) -> Result<String, std::io::Error> {
  let mut file = File::open(path)?;
  let mut hasher = Sha256::new();
  let mut buffer = [0u8; 8192];
  loop {
    let n = file.read(&mut buffer)?;
    if n == 0 {
      break;
    }
    hasher.update(&buffer[..n]);
  }
  Ok(hex::encode(hasher.finalize()))
}
