pub mod config;
pub mod event;
pub mod fsio;
pub mod hash;
pub mod snippet;
pub mod topic;

pub use config::{
  BackendKind, Config, EmbeddingConfig, HttpConfig, MemoryConfig, SourceConfig, StoreConfig, ToolConfig, WatcherConfig,
};
pub use event::{EventKind, MemoryEvent};
pub use fsio::{atomic_write, atomic_write_json, read_json};
pub use hash::{point_id, sha256_hex};
pub use snippet::{Domain, Snippet, SnippetKind};
pub use topic::{Topic, TopicKey, normalize_whitespace};
