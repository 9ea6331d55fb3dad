//! Ingest orchestrator: discovery, cache partition, extraction,
//! embedding, and upsert, with bounded per-archive concurrency.

use crate::cache::{ArchiveRecord, ArchiveState, IngestCache};
use crate::discover::{ArchiveScanner, DiscoveredArchive};
use crate::failures::FailureLog;
use crate::status::{Phase, StatusBoard};
use crate::{convert, unpack};
use chrono::Utc;
use embedding::{Dispatcher, EmbedError};
use futures::stream::{self, StreamExt};
use helpdex_core::Config;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use store::{Payload, Point, StoreClient, StoreError};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Topics fed to the dispatcher per group; the dispatcher batches further.
const EMBED_GROUP: usize = 256;

#[derive(Error, Debug)]
pub enum IngestError {
  #[error("An ingest run is already in progress")]
  AlreadyRunning,
  #[error("No source roots configured (set HELP_SOURCES_DIR)")]
  NoSources,
  #[error("Store error: {0}")]
  Store(#[from] StoreError),
  #[error("Embedding error: {0}")]
  Embed(#[from] EmbedError),
  #[error("Unpack error: {0}")]
  Unpack(#[from] unpack::UnpackError),
  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),
}

impl IngestError {
  /// Destructive-guard and dimension errors abort the whole run; everything
  /// else fails a single archive.
  fn is_fatal(&self) -> bool {
    matches!(
      self,
      IngestError::Store(StoreError::DimensionMismatch { .. }) | IngestError::Embed(EmbedError::DimensionChanged { .. })
    )
  }
}

#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
  /// Drop and recreate the collection (the only destructive operation).
  pub recreate: bool,
  /// Report counts without extracting or embedding anything.
  pub dry_run: bool,
  /// Cap on archives ingested in one run.
  pub max_tasks: Option<usize>,
  /// Ignore the ingest cache for this run.
  pub bypass_cache: bool,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct IngestReport {
  pub discovered: usize,
  pub skipped_cached: usize,
  pub ingested: usize,
  pub failed: usize,
  pub topics: usize,
  pub dry_run: bool,
}

/// Drives archives through the document pipeline, the embedding
/// dispatcher, and the index writer. Owned by the root service object.
pub struct Ingestor {
  config: Config,
  dispatcher: Arc<Dispatcher>,
  store: Arc<StoreClient>,
  cache: RwLock<IngestCache>,
  status: StatusBoard,
  failures: FailureLog,
  running: AtomicBool,
}

impl Ingestor {
  pub fn new(config: Config, dispatcher: Arc<Dispatcher>, store: Arc<StoreClient>, status: StatusBoard) -> Self {
    let cache = IngestCache::open(config.cache_path.clone());
    let failures = FailureLog::new(config.failure_log_path());
    Self {
      config,
      dispatcher,
      store,
      cache: RwLock::new(cache),
      status,
      failures,
      running: AtomicBool::new(false),
    }
  }

  pub fn is_running(&self) -> bool {
    self.running.load(Ordering::Relaxed)
  }

  pub fn failure_log(&self) -> &FailureLog {
    &self.failures
  }

  /// Distinct `(version, language)` tags currently indexed.
  pub async fn indexed_tags(&self) -> (Vec<String>, Vec<String>) {
    self.cache.read().await.tags()
  }

  pub async fn is_cached(&self, hash: &str) -> bool {
    self.cache.read().await.is_indexed(hash)
  }

  /// Discover archives under the configured roots and ingest the unknown
  /// ones.
  pub async fn run(&self, opts: &IngestOptions) -> Result<IngestReport, IngestError> {
    if self.config.sources.roots.is_empty() {
      return Err(IngestError::NoSources);
    }

    self.status.update(|s| s.phase = Phase::Discover).await;
    let scanner = ArchiveScanner::new(
      self.config.sources.roots.clone(),
      self.config.sources.language_filter.clone(),
    );
    let archives = match tokio::task::spawn_blocking(move || scanner.scan()).await {
      Ok(archives) => archives,
      Err(e) => {
        warn!("Archive discovery task failed: {}", e);
        Vec::new()
      }
    };

    self.ingest_archives(archives, opts).await
  }

  /// Ingest an explicit archive list (used by the watcher for targeted
  /// re-ingest). Only one run may be in flight at a time.
  pub async fn ingest_archives(
    &self,
    archives: Vec<DiscoveredArchive>,
    opts: &IngestOptions,
  ) -> Result<IngestReport, IngestError> {
    if self
      .running
      .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
      .is_err()
    {
      return Err(IngestError::AlreadyRunning);
    }

    let result = self.run_inner(archives, opts).await;
    self.running.store(false, Ordering::SeqCst);
    self
      .status
      .update(|s| {
        s.phase = Phase::Idle;
        s.finished_at = Some(Utc::now());
      })
      .await;
    result
  }

  async fn run_inner(&self, archives: Vec<DiscoveredArchive>, opts: &IngestOptions) -> Result<IngestReport, IngestError> {
    let discovered = archives.len();

    // Partition against the cache before any extraction work
    let (known, mut work): (Vec<_>, Vec<_>) = {
      let cache = self.cache.read().await;
      archives
        .into_iter()
        .partition(|a| !opts.bypass_cache && cache.is_indexed(&a.hash))
    };
    if let Some(cap) = opts.max_tasks {
      work.truncate(cap);
    }

    let mut report = IngestReport {
      discovered,
      skipped_cached: known.len(),
      dry_run: opts.dry_run,
      ..Default::default()
    };

    if opts.dry_run {
      info!(
        "Dry run: {} discovered, {} cached, {} to ingest",
        discovered,
        known.len(),
        work.len()
      );
      return Ok(report);
    }

    let backend = self.dispatcher.backend_name().to_string();
    self
      .status
      .update(|s| {
        *s = Default::default();
        s.phase = Phase::Discover;
        s.backend = backend;
        s.started_at = Some(Utc::now());
        s.archives_total = work.len();
        s.archives_skipped = known.len();
      })
      .await;

    // The probe discovers the real dimension before the collection is
    // touched; backends that cannot probe fall back to their hint.
    let dimension = match self.dispatcher.probe_dimension().await {
      Ok(dim) => dim,
      Err(e) => {
        debug!("Dimension probe failed ({}); using configured hint", e);
        self.dispatcher.dimension()
      }
    };
    self.store.ensure_collection(dimension, opts.recreate).await?;
    if opts.recreate {
      // The collection is empty now; stale cache records would hide work
      let mut cache = self.cache.write().await;
      if let Err(e) = cache.erase_all() {
        warn!("Failed to erase ingest cache after recreate: {}", e);
      }
    }

    let workers = self.config.sources.ingest_workers.max(1);
    let mut tasks = stream::iter(work.into_iter().map(|archive| async move {
      let result = self.ingest_one(&archive).await;
      (archive, result)
    }))
    .buffer_unordered(workers);

    while let Some((archive, result)) = tasks.next().await {
      let folder = archive
        .path
        .parent()
        .map(|p| p.display().to_string())
        .unwrap_or_default();
      match result {
        Ok(topic_count) => {
          report.ingested += 1;
          report.topics += topic_count;
          let record = ArchiveRecord {
            status: ArchiveState::Indexed,
            indexed_at: Utc::now(),
            topic_count,
            version: archive.version.clone(),
            language: archive.language.clone(),
          };
          {
            let mut cache = self.cache.write().await;
            if let Err(e) = cache.mark_indexed(&archive.hash, record) {
              warn!("Failed to persist ingest cache: {}", e);
            }
          }
          self
            .status
            .update(|s| {
              s.archives_done += 1;
              s.versions.insert(archive.version.clone());
              s.languages.insert(archive.language.clone());
              s.folders.entry(folder).or_default().done += 1;
            })
            .await;
        }
        Err(e) if e.is_fatal() => {
          warn!("Fatal ingest error on {:?}: {}", archive.path, e);
          return Err(e);
        }
        Err(e) => {
          warn!("Ingest failed for {:?}: {}", archive.path, e);
          self.failures.append(&archive.path, &e.to_string());
          report.failed += 1;
          self
            .status
            .update(|s| {
              s.archives_failed += 1;
              s.folders.entry(folder).or_default().failed += 1;
            })
            .await;
        }
      }
    }

    info!(
      "Ingest finished: {} ingested, {} cached, {} failed, {} topics",
      report.ingested, report.skipped_cached, report.failed, report.topics
    );
    Ok(report)
  }

  /// Extract one archive, convert its documents, embed, and upsert.
  /// Returns the topic count. A failing archive is never marked indexed.
  async fn ingest_one(&self, archive: &DiscoveredArchive) -> Result<usize, IngestError> {
    self.status.update(|s| s.phase = Phase::Extract).await;

    let scratch_root = self.config.sources.temp_dir.clone();
    let archive_for_blocking = archive.clone();
    let topics = tokio::task::spawn_blocking(move || -> Result<Vec<helpdex_core::Topic>, IngestError> {
      let scratch = unpack::extract_archive(&archive_for_blocking.path, scratch_root.as_deref())?;
      Ok(convert::topics_from_dir(scratch.path(), &archive_for_blocking))
      // scratch TempDir dropped here, removing the directory
    })
    .await
    .map_err(|e| IngestError::Io(std::io::Error::other(e)))??;

    let total = topics.len();
    self.status.update(|s| s.topics_seen += total).await;
    if topics.is_empty() {
      return Ok(0);
    }

    for group in topics.chunks(EMBED_GROUP) {
      self.status.update(|s| s.phase = Phase::Embed).await;
      let texts: Vec<String> = group.iter().map(|t| t.embed_text()).collect();
      let outcome = self.dispatcher.embed_many(&texts).await?;
      if outcome.degraded {
        debug!("Embedding degraded for {:?}; placeholder vectors written", archive.path);
      }

      let points: Vec<Point> = group
        .iter()
        .zip(outcome.vectors)
        .map(|(topic, vector)| Point {
          id: topic.id,
          vector,
          payload: Payload::from_topic(topic),
        })
        .collect();

      self.status.update(|s| s.phase = Phase::Upsert).await;
      self.store.upsert(&points).await?;
      let n = points.len();
      let degraded = outcome.degraded;
      self
        .status
        .update(|s| {
          s.topics_embedded += n;
          s.degraded |= degraded;
        })
        .await;
    }

    Ok(total)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use helpdex_core::config::BackendKind;
  use std::io::Write;
  use std::path::{Path, PathBuf};
  use tempfile::TempDir;

  fn make_zip(path: &Path, entries: &[(&str, &str)]) {
    let file = std::fs::File::create(path).unwrap();
    let mut writer = zip::ZipWriter::new(file);
    for (name, content) in entries {
      writer
        .start_file(*name, zip::write::SimpleFileOptions::default())
        .unwrap();
      writer.write_all(content.as_bytes()).unwrap();
    }
    writer.finish().unwrap();
  }

  fn test_config(dir: &TempDir, root: PathBuf) -> Config {
    let mut config = Config::default();
    config.sources.roots = vec![root];
    config.sources.ingest_workers = 2;
    config.cache_path = dir.path().join("cache.json");
    config.state_dir = dir.path().to_path_buf();
    config.embedding.backend = BackendKind::Deterministic;
    config
  }

  fn ingestor(config: &Config) -> Ingestor {
    let dispatcher = Arc::new(embedding::create_dispatcher(&config.embedding));
    // Points at nothing; only dry-run paths may be exercised
    let store = Arc::new(StoreClient::new("http://127.0.0.1:1", "helpdex_test"));
    Ingestor::new(config.clone(), dispatcher, store, StatusBoard::new(None))
  }

  #[tokio::test]
  async fn test_no_sources_is_fatal() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&dir, dir.path().join("src"));
    config.sources.roots.clear();
    let ingestor = ingestor(&config);
    assert!(matches!(
      ingestor.run(&IngestOptions::default()).await,
      Err(IngestError::NoSources)
    ));
  }

  #[tokio::test]
  async fn test_dry_run_reports_partition_without_work() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("sources");
    std::fs::create_dir_all(&root).unwrap();
    make_zip(&root.join("a_ru.hbk"), &[("doc.html", "<h1>A</h1><p>x</p>")]);
    make_zip(&root.join("b_ru.hbk"), &[("doc.html", "<h1>B</h1><p>y</p>")]);

    let config = test_config(&dir, root.clone());
    let ingestor = ingestor(&config);

    let opts = IngestOptions {
      dry_run: true,
      ..Default::default()
    };
    let report = ingestor.run(&opts).await.unwrap();
    assert_eq!(report.discovered, 2);
    assert_eq!(report.skipped_cached, 0);
    assert_eq!(report.ingested, 0);
    assert!(report.dry_run);
  }

  #[tokio::test]
  async fn test_dry_run_respects_cache_partition() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("sources");
    std::fs::create_dir_all(&root).unwrap();
    let archive = root.join("a_ru.hbk");
    make_zip(&archive, &[("doc.html", "<h1>A</h1><p>x</p>")]);

    let config = test_config(&dir, root.clone());
    let hash = crate::discover::file_sha256(&archive).unwrap();
    {
      let mut cache = IngestCache::open(config.cache_path.clone());
      cache
        .mark_indexed(
          &hash,
          ArchiveRecord {
            status: ArchiveState::Indexed,
            indexed_at: Utc::now(),
            topic_count: 1,
            version: "unknown".to_string(),
            language: "ru".to_string(),
          },
        )
        .unwrap();
    }

    let ingestor = ingestor(&config);
    let opts = IngestOptions {
      dry_run: true,
      ..Default::default()
    };
    let report = ingestor.run(&opts).await.unwrap();
    // The cached archive is partitioned out before any extraction
    assert_eq!(report.discovered, 1);
    assert_eq!(report.skipped_cached, 1);
  }

  #[tokio::test]
  async fn test_single_flight_guard() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir, dir.path().join("missing"));
    let ingestor = ingestor(&config);

    ingestor.running.store(true, Ordering::SeqCst);
    assert!(matches!(
      ingestor.ingest_archives(Vec::new(), &IngestOptions::default()).await,
      Err(IngestError::AlreadyRunning)
    ));
    assert!(ingestor.is_running());
  }

  #[test]
  fn test_fatal_classification() {
    assert!(IngestError::Store(StoreError::DimensionMismatch { existing: 384, requested: 768 }).is_fatal());
    assert!(IngestError::Embed(EmbedError::DimensionChanged { expected: 384, got: 768 }).is_fatal());
    assert!(!IngestError::Embed(EmbedError::Timeout).is_fatal());
  }
}
