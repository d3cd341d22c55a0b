use clap::{Parser, Subcommand};
use color_eyre::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use pitsync::cache::{CacheStorage, NoopStorage, SqliteStorage};
use pitsync::config::Config;
use pitsync::remote::HttpRemoteStore;
use pitsync::sync::SyncCoordinator;

#[derive(Parser, Debug)]
#[command(name = "pitsync")]
#[command(about = "Offline cache and sync companion for the setup-sheet client")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/pitsync/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Show cache and pending-queue counts
  Status,
  /// Replay queued mutations against the backend
  Sync,
  /// Remove every cache entry (the pending queue is kept)
  Clear,
  /// Delete expired cache entries
  Prune,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .with_writer(std::io::stderr)
    .init();

  let args = Args::parse();
  let config = Config::load(args.config.as_deref())?;

  let storage = open_storage(&config);

  match args.command {
    Command::Status => {
      println!("cache entries:      {}", storage.entry_count()?);

      let pending = storage.pending_operations()?;
      println!("pending operations: {}", pending.len());
      for op in pending {
        println!("  #{} {} {}", op.id, op.kind.as_str(), op.target);
      }
    }
    Command::Sync => {
      let remote = Arc::new(HttpRemoteStore::new(&config)?);
      let coordinator = SyncCoordinator::new(storage, remote);

      let report = coordinator.sync_pending_operations().await?;
      println!("committed {}, failed {}", report.committed, report.failed);
    }
    Command::Clear => {
      storage.clear()?;
      println!("cache cleared");
    }
    Command::Prune => {
      let pruned = storage.prune_expired()?;
      println!("pruned {} expired entries", pruned);
    }
  }

  Ok(())
}

/// Open the local database, falling back to disabled caching when storage
/// is unavailable so the CLI still works against the backend directly.
fn open_storage(config: &Config) -> Arc<dyn CacheStorage> {
  let opened = match &config.cache.path {
    Some(path) => SqliteStorage::open_at(path),
    None => SqliteStorage::open(),
  };

  match opened {
    Ok(storage) => Arc::new(storage),
    Err(err) => {
      tracing::warn!(error = %err, "local storage unavailable, offline caching disabled");
      Arc::new(NoopStorage)
    }
  }
}
