//! Replay of queued mutations against the remote store.

use color_eyre::{eyre::eyre, Result};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::cache::{CacheStorage, MutationKind, PendingOperation};
use crate::remote::RemoteStore;

/// Outcome of one replay pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
  pub committed: usize,
  pub failed: usize,
}

/// Drains the pending-operation queue against the remote store.
///
/// Replay is independent and non-transactional: a failing operation stays
/// queued for the next pass and does not block the operations behind it.
/// Concurrent triggers coalesce into one pass.
pub struct SyncCoordinator {
  storage: Arc<dyn CacheStorage>,
  remote: Arc<dyn RemoteStore>,
  in_flight: tokio::sync::Mutex<()>,
}

impl SyncCoordinator {
  pub fn new(storage: Arc<dyn CacheStorage>, remote: Arc<dyn RemoteStore>) -> Self {
    Self {
      storage,
      remote,
      in_flight: tokio::sync::Mutex::new(()),
    }
  }

  /// Replay every queued mutation in FIFO order. Committed operations
  /// leave the queue; failures are logged and stay for the next pass.
  /// Returns an empty report when another pass is already running.
  pub async fn sync_pending_operations(&self) -> Result<SyncReport> {
    let _guard = match self.in_flight.try_lock() {
      Ok(guard) => guard,
      Err(_) => {
        tracing::debug!("sync already in flight, coalescing trigger");
        return Ok(SyncReport::default());
      }
    };

    let operations = self.storage.pending_operations()?;
    if operations.is_empty() {
      return Ok(SyncReport::default());
    }

    tracing::debug!(count = operations.len(), "replaying pending operations");

    let mut report = SyncReport::default();
    for op in operations {
      match self.commit(&op).await {
        Ok(()) => {
          self.storage.remove_pending(op.id)?;
          report.committed += 1;
        }
        Err(err) => {
          tracing::warn!(
            id = op.id,
            target = %op.target,
            error = %err,
            "commit failed, operation stays queued"
          );
          report.failed += 1;
        }
      }
    }

    Ok(report)
  }

  async fn commit(&self, op: &PendingOperation) -> Result<()> {
    match op.kind {
      MutationKind::Insert => self.remote.insert(&op.target, &op.data).await,
      MutationKind::Update => {
        let id = record_id(op)?;
        self.remote.update(&op.target, &id, &op.data).await
      }
      MutationKind::Delete => {
        let id = record_id(op)?;
        self.remote.delete(&op.target, &id).await
      }
    }
  }
}

/// Pull the record id out of an operation payload. Updates and deletes
/// without one cannot be addressed remotely and count as failed commits.
fn record_id(op: &PendingOperation) -> Result<String> {
  match op.data.get("id") {
    Some(Value::String(s)) => Ok(s.clone()),
    Some(Value::Number(n)) => Ok(n.to_string()),
    _ => Err(eyre!("operation {} has no record id", op.id)),
  }
}

/// Watch a connectivity signal and trigger a replay on every
/// offline-to-online edge.
pub fn spawn_online_listener(
  coordinator: Arc<SyncCoordinator>,
  mut connectivity: watch::Receiver<bool>,
) -> JoinHandle<()> {
  tokio::spawn(async move {
    let mut online = *connectivity.borrow();
    while connectivity.changed().await.is_ok() {
      let now_online = *connectivity.borrow();
      if now_online && !online {
        if let Err(err) = coordinator.sync_pending_operations().await {
          tracing::warn!(error = %err, "sync after reconnect failed");
        }
      }
      online = now_online;
    }
  })
}
