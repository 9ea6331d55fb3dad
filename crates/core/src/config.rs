//! Environment-based configuration.
//!
//! Every tunable is an environment variable; unknown variables are ignored
//! and unparsable values fall back to the default with a warning.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use tracing::warn;

/// Embedding backend selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
  /// OpenAI-compatible remote HTTP endpoint.
  OpenAi,
  /// In-process static embedding model. No network.
  Local,
  /// Hash-derived reproducible vectors; usable offline.
  #[default]
  Deterministic,
  /// Placeholder vectors; semantic search degrades to lexical.
  None,
}

impl BackendKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      BackendKind::OpenAi => "openai",
      BackendKind::Local => "local",
      BackendKind::Deterministic => "deterministic",
      BackendKind::None => "none",
    }
  }
}

impl FromStr for BackendKind {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_lowercase().as_str() {
      "openai" => Ok(BackendKind::OpenAi),
      "local" => Ok(BackendKind::Local),
      "deterministic" => Ok(BackendKind::Deterministic),
      "none" => Ok(BackendKind::None),
      _ => Err(format!("Unknown embedding backend: {}", s)),
    }
  }
}

/// Vector store connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
  pub url: String,
  pub collection: String,
}

impl Default for StoreConfig {
  fn default() -> Self {
    Self {
      url: "http://localhost:6333".to_string(),
      collection: "helpdex".to_string(),
    }
  }
}

/// Source discovery and scratch-space settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SourceConfig {
  /// Roots scanned for help archives.
  pub roots: Vec<PathBuf>,
  /// Only ingest archives carrying this language tag.
  pub language_filter: Option<String>,
  /// Scratch root for extraction; system temp when unset.
  pub temp_dir: Option<PathBuf>,
  /// Per-archive ingest concurrency.
  pub ingest_workers: usize,
}

/// Embedding backend and dispatcher settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
  pub backend: BackendKind,
  /// Remote endpoint; http/https only.
  pub url: Option<String>,
  pub api_key: Option<String>,
  /// Model id; backend default when unset.
  pub model: Option<String>,
  /// Expected dimension hint; the probe overrides it.
  pub dimensions: Option<usize>,
  pub batch_size: usize,
  pub workers: usize,
  /// Raises the batch/worker ceilings (256 / 16).
  pub force_batch: bool,
  /// Input truncation cap in characters.
  pub max_chars: usize,
  /// Single-request timeout in seconds.
  pub timeout_secs: u64,
  /// Global in-flight request semaphore.
  pub max_concurrent: usize,
  /// Bound on semaphore acquire, so a stuck worker cannot wedge the
  /// dispatcher.
  pub acquire_timeout_secs: u64,
}

impl Default for EmbeddingConfig {
  fn default() -> Self {
    Self {
      backend: BackendKind::Deterministic,
      url: None,
      api_key: None,
      model: None,
      dimensions: None,
      batch_size: 64,
      workers: 4,
      force_batch: false,
      max_chars: 2000,
      timeout_secs: 60,
      max_concurrent: 8,
      acquire_timeout_secs: 300,
    }
  }
}

impl EmbeddingConfig {
  /// Batch size after applying the force-batch ceiling.
  pub fn effective_batch_size(&self) -> usize {
    let cap = if self.force_batch { 256 } else { 64 };
    self.batch_size.clamp(1, cap)
  }

  /// Worker count after applying the force-batch ceiling.
  pub fn effective_workers(&self) -> usize {
    let cap = if self.force_batch { 16 } else { 4 };
    self.workers.clamp(1, cap)
  }
}

/// Memory subsystem settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
  pub enabled: bool,
  pub base_dir: PathBuf,
  pub ring_capacity: usize,
  pub journal_ttl_days: i64,
  /// Directory of community snippets read at startup.
  pub snippets_dir: Option<PathBuf>,
}

impl Default for MemoryConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      base_dir: default_state_dir().join("memory"),
      ring_capacity: 256,
      journal_ttl_days: 7,
      snippets_dir: None,
    }
  }
}

/// Watcher settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
  pub enabled: bool,
  pub watch_interval_secs: u64,
  pub drain_interval_secs: u64,
}

impl Default for WatcherConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      watch_interval_secs: 600,
      drain_interval_secs: 600,
    }
  }
}

/// Tool façade settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolConfig {
  /// Per-operation requests per minute.
  pub rate_limit_rpm: usize,
  /// Input size cap in bytes.
  pub max_input_bytes: usize,
  /// Suppress detailed error text in responses.
  pub production: bool,
}

impl Default for ToolConfig {
  fn default() -> Self {
    Self {
      rate_limit_rpm: 120,
      max_input_bytes: 64 * 1024,
      production: false,
    }
  }
}

/// HTTP transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
  pub host: String,
  pub port: u16,
  pub path: String,
}

impl Default for HttpConfig {
  fn default() -> Self {
    Self {
      host: "127.0.0.1".to_string(),
      port: 8642,
      path: "/rpc".to_string(),
    }
  }
}

/// Root configuration, assembled from the environment.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
  pub store: StoreConfig,
  pub sources: SourceConfig,
  pub embedding: EmbeddingConfig,
  pub memory: MemoryConfig,
  pub watcher: WatcherConfig,
  pub tools: ToolConfig,
  pub http: HttpConfig,
  pub state_dir: PathBuf,
  pub cache_path: PathBuf,
}

/// State directory for the ingest cache, failure log, and status file.
///
/// `HELPDEX_STATE_DIR` overrides; otherwise the platform data dir.
pub fn default_state_dir() -> PathBuf {
  if let Ok(dir) = std::env::var("HELPDEX_STATE_DIR") {
    return PathBuf::from(dir);
  }
  dirs::data_local_dir()
    .unwrap_or_else(|| PathBuf::from("."))
    .join("helpdex")
}

fn env_string(name: &str) -> Option<String> {
  std::env::var(name).ok().filter(|s| !s.trim().is_empty())
}

fn env_parse<T: FromStr>(name: &str, default: T) -> T
where
  T::Err: std::fmt::Display,
{
  match env_string(name) {
    Some(raw) => match raw.parse() {
      Ok(v) => v,
      Err(e) => {
        warn!("Ignoring invalid {}={:?}: {}", name, raw, e);
        default
      }
    },
    None => default,
  }
}

fn env_flag(name: &str, default: bool) -> bool {
  match env_string(name) {
    Some(raw) => matches!(raw.to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
    None => default,
  }
}

impl Config {
  /// Assemble configuration from the environment. Never fails: bad values
  /// warn and fall back to defaults. Presence checks (e.g. source roots for
  /// ingest) are the caller's concern.
  pub fn from_env() -> Self {
    let state_dir = default_state_dir();

    // HELP_SOURCES_DIR is canonical; HELP_SOURCE_BASE is a deprecated alias
    // with identical behavior.
    let roots_raw = env_string("HELP_SOURCES_DIR").or_else(|| {
      let legacy = env_string("HELP_SOURCE_BASE");
      if legacy.is_some() {
        warn!("HELP_SOURCE_BASE is deprecated; use HELP_SOURCES_DIR");
      }
      legacy
    });
    let roots = roots_raw
      .map(|raw| raw.split(',').map(|p| PathBuf::from(p.trim())).collect())
      .unwrap_or_default();

    let embedding_defaults = EmbeddingConfig::default();
    let embedding = EmbeddingConfig {
      backend: env_parse("EMBEDDING_BACKEND", embedding_defaults.backend),
      url: env_string("EMBEDDING_URL"),
      api_key: env_string("EMBEDDING_API_KEY"),
      model: env_string("EMBEDDING_MODEL"),
      dimensions: env_string("EMBEDDING_DIM").and_then(|raw| match raw.parse() {
        Ok(v) => Some(v),
        Err(e) => {
          warn!("Ignoring invalid EMBEDDING_DIM={:?}: {}", raw, e);
          None
        }
      }),
      batch_size: env_parse("EMBEDDING_BATCH_SIZE", embedding_defaults.batch_size),
      workers: env_parse("EMBEDDING_WORKERS", embedding_defaults.workers),
      force_batch: env_flag("EMBEDDING_FORCE_BATCH", false),
      max_chars: env_parse("EMBEDDING_MAX_CHARS", embedding_defaults.max_chars),
      timeout_secs: env_parse("EMBEDDING_TIMEOUT_SECS", embedding_defaults.timeout_secs),
      max_concurrent: env_parse("EMBEDDING_MAX_CONCURRENT", embedding_defaults.max_concurrent),
      acquire_timeout_secs: env_parse("EMBEDDING_ACQUIRE_TIMEOUT_SECS", embedding_defaults.acquire_timeout_secs),
    };

    let memory_defaults = MemoryConfig::default();
    let memory = MemoryConfig {
      enabled: env_flag("MEMORY_ENABLED", true),
      base_dir: env_string("MEMORY_BASE_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| state_dir.join("memory")),
      ring_capacity: env_parse("MEMORY_RING_CAPACITY", memory_defaults.ring_capacity),
      journal_ttl_days: env_parse("MEMORY_JOURNAL_TTL_DAYS", memory_defaults.journal_ttl_days),
      snippets_dir: env_string("SNIPPETS_DIR").map(PathBuf::from),
    };

    let watcher_defaults = WatcherConfig::default();
    let tools_defaults = ToolConfig::default();
    let http_defaults = HttpConfig::default();
    let store_defaults = StoreConfig::default();

    Self {
      store: StoreConfig {
        url: env_string("QDRANT_URL").unwrap_or(store_defaults.url),
        collection: env_string("QDRANT_COLLECTION").unwrap_or(store_defaults.collection),
      },
      sources: SourceConfig {
        roots,
        language_filter: env_string("HELP_LANGUAGE_FILTER"),
        temp_dir: env_string("HELPDEX_TEMP_DIR").map(PathBuf::from),
        ingest_workers: env_parse("INGEST_WORKERS", 2),
      },
      embedding,
      memory,
      watcher: WatcherConfig {
        enabled: env_flag("WATCHER_ENABLED", true),
        watch_interval_secs: env_parse("WATCH_INTERVAL_SECS", watcher_defaults.watch_interval_secs),
        drain_interval_secs: env_parse("MEMORY_DRAIN_INTERVAL_SECS", watcher_defaults.drain_interval_secs),
      },
      tools: ToolConfig {
        rate_limit_rpm: env_parse("TOOL_RATE_LIMIT_RPM", tools_defaults.rate_limit_rpm),
        max_input_bytes: env_parse("TOOL_MAX_INPUT_BYTES", tools_defaults.max_input_bytes),
        production: env_flag("PRODUCTION_MODE", false),
      },
      http: HttpConfig {
        host: env_string("HTTP_HOST").unwrap_or(http_defaults.host),
        port: env_parse("HTTP_PORT", http_defaults.port),
        path: env_string("HTTP_PATH").unwrap_or(http_defaults.path),
      },
      cache_path: env_string("INGEST_CACHE_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|| state_dir.join("ingest_cache.json")),
      state_dir,
    }
  }

  pub fn failure_log_path(&self) -> PathBuf {
    self.state_dir.join("ingest_failures.ndjson")
  }

  pub fn status_file_path(&self) -> PathBuf {
    self.state_dir.join("ingest_status.json")
  }
}
