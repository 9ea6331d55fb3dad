use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use daemon::ServeOptions;
use helpdex_core::Config;
use pipeline::{IngestOptions, Ingestor, StatusBoard};
use std::path::PathBuf;
use std::sync::Arc;
use store::StoreClient;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "helpdex")]
#[command(about = "Help-archive search index and agent tool server")]
struct Cli {
  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Run the tool server (stdio transport by default)
  Serve {
    /// Also serve the streamable HTTP transport
    #[arg(long)]
    http: bool,
    /// Disable the stdio transport (run until interrupted)
    #[arg(long)]
    no_stdio: bool,
  },
  /// Ingest help archives from the configured source roots
  Ingest {
    /// Drop and recreate the collection (destructive)
    #[arg(long)]
    recreate: bool,
    /// Report counts without extracting or embedding
    #[arg(long)]
    dry_run: bool,
    /// Cap on archives ingested in this run
    #[arg(long)]
    max_tasks: Option<usize>,
    /// Per-archive worker count (overrides INGEST_WORKERS)
    #[arg(long)]
    workers: Option<usize>,
    /// Language filter (overrides HELP_LANGUAGE_FILTER)
    #[arg(long)]
    lang: Option<String>,
    /// Source roots (overrides HELP_SOURCES_DIR)
    #[arg(long)]
    root: Vec<PathBuf>,
    /// Ignore the ingest cache for this run
    #[arg(long)]
    bypass_cache: bool,
  },
  /// Load community snippets from a directory into the index
  LoadSnippets {
    /// Snippets directory (overrides SNIPPETS_DIR)
    dir: Option<PathBuf>,
  },
  /// Show the last ingest status record
  Status,
}

fn init_logging(config: &Config) -> Option<WorkerGuard> {
  let filter = tracing_subscriber::EnvFilter::try_from_default_env()
    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

  // stdout carries the stdio protocol, so human logs go to stderr and the
  // full stream to a file under the state dir
  let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

  match std::fs::create_dir_all(&config.state_dir) {
    Ok(()) => {
      let appender = tracing_appender::rolling::never(&config.state_dir, "helpdex.log");
      let (writer, guard) = tracing_appender::non_blocking(appender);
      let file_layer = tracing_subscriber::fmt::layer().with_writer(writer).with_ansi(false);
      tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();
      Some(guard)
    }
    Err(_) => {
      tracing_subscriber::registry().with(filter).with(stderr_layer).init();
      None
    }
  }
}

#[tokio::main]
async fn main() -> Result<()> {
  let cli = Cli::parse();
  let mut config = Config::from_env();
  let _log_guard = init_logging(&config);

  match cli.command {
    Commands::Serve { http, no_stdio } => {
      let opts = ServeOptions {
        stdio: !no_stdio,
        http,
      };
      daemon::serve(config, opts).await.context("serve failed")?;
    }

    Commands::Ingest {
      recreate,
      dry_run,
      max_tasks,
      workers,
      lang,
      root,
      bypass_cache,
    } => {
      if !root.is_empty() {
        config.sources.roots = root;
      }
      if let Some(workers) = workers {
        config.sources.ingest_workers = workers;
      }
      if lang.is_some() {
        config.sources.language_filter = lang;
      }
      if config.sources.roots.is_empty() {
        bail!("no source roots configured; set HELP_SOURCES_DIR or pass --root");
      }

      let dispatcher = Arc::new(embedding::create_dispatcher(&config.embedding));
      let store = Arc::new(StoreClient::new(&config.store.url, &config.store.collection));
      let status = StatusBoard::new(Some(config.status_file_path()));
      let ingestor = Ingestor::new(config, dispatcher, store, status);

      let opts = IngestOptions {
        recreate,
        dry_run,
        max_tasks,
        bypass_cache,
      };
      let report = ingestor.run(&opts).await.context("ingest failed")?;
      println!("{}", serde_json::to_string_pretty(&report)?);
    }

    Commands::LoadSnippets { dir } => {
      let dir = dir
        .or_else(|| config.memory.snippets_dir.clone())
        .context("no snippets directory; set SNIPPETS_DIR or pass a path")?;

      let dispatcher = Arc::new(embedding::create_dispatcher(&config.embedding));
      let store = Arc::new(StoreClient::new(&config.store.url, &config.store.collection));
      let dimension = match dispatcher.probe_dimension().await {
        Ok(dim) => dim,
        Err(_) => dispatcher.dimension(),
      };
      store
        .ensure_collection(dimension, false)
        .await
        .context("store not ready")?;

      let service = memory::MemoryService::new(&config.memory, dispatcher, store);
      let snippets = memory::load_snippets_dir(&dir);
      let stored = service.ingest_snippets(&snippets).await?;
      info!("Loaded {} snippets, {} stored, {} deferred", snippets.len(), stored, snippets.len() - stored);
      println!("loaded={} stored={} deferred={}", snippets.len(), stored, snippets.len() - stored);
    }

    Commands::Status => {
      let path = config.status_file_path();
      match helpdex_core::read_json::<serde_json::Value>(&path) {
        Ok(status) => println!("{}", serde_json::to_string_pretty(&status)?),
        Err(_) => println!("no status recorded yet ({})", path.display()),
      }
    }
  }

  Ok(())
}
