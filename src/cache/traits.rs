//! Storage trait and queue types for the offline layer.

use color_eyre::Result;
use serde_json::Value;

use super::policy::PolicyOverride;

/// Kind of a queued remote mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
  Insert,
  Update,
  Delete,
}

impl MutationKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      MutationKind::Insert => "insert",
      MutationKind::Update => "update",
      MutationKind::Delete => "delete",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "insert" => Some(MutationKind::Insert),
      "update" => Some(MutationKind::Update),
      "delete" => Some(MutationKind::Delete),
      _ => None,
    }
  }
}

/// A remote mutation to be queued.
///
/// The payload is opaque to the queue. For updates and deletes it must
/// carry the record id, but that is the caller's contract with the remote
/// store, not something the queue checks.
#[derive(Debug, Clone)]
pub struct Mutation {
  pub kind: MutationKind,
  /// Target remote collection name.
  pub target: String,
  pub data: Value,
}

/// A queued mutation as stored. Ordered by `id`, which the store assigns
/// monotonically at enqueue time.
#[derive(Debug, Clone)]
pub struct PendingOperation {
  pub id: i64,
  pub kind: MutationKind,
  pub target: String,
  pub data: Value,
  /// Enqueue time, ms since epoch.
  pub timestamp: i64,
}

/// Storage backend for the offline cache and the pending-mutation queue.
///
/// Payloads are opaque JSON values; resource schemas belong to the callers.
/// Both logical tables share one service object so any component can hold
/// the same handle.
pub trait CacheStorage: Send + Sync {
  /// Write `data` under `key`, fully replacing any existing entry.
  /// Retention policy comes from the key's namespace unless overridden.
  /// Concurrent writers to the same key race on last-write-wins.
  fn set(&self, key: &str, data: &Value, overrides: Option<PolicyOverride>) -> Result<()>;

  /// Read a live entry. An expired entry is deleted on sight and reported
  /// as absent; absence is not an error.
  fn get(&self, key: &str) -> Result<Option<Value>>;

  /// Remove one entry unconditionally.
  fn delete(&self, key: &str) -> Result<()>;

  /// Remove every cache entry. The pending queue is untouched.
  fn clear(&self) -> Result<()>;

  /// Number of cache entries currently stored, expired or not.
  fn entry_count(&self) -> Result<u64>;

  /// Delete every expired entry now instead of waiting for reads to prune
  /// them one by one. Returns the number of removed entries.
  fn prune_expired(&self) -> Result<u64>;

  /// Append a mutation to the queue. Returns the assigned id.
  fn add_pending(&self, mutation: &Mutation) -> Result<i64>;

  /// All queued mutations in insertion order.
  fn pending_operations(&self) -> Result<Vec<PendingOperation>>;

  /// Remove a queued mutation. No-op if the id is unknown.
  fn remove_pending(&self, id: i64) -> Result<()>;

  /// Number of queued mutations.
  fn pending_count(&self) -> Result<u64>;
}

/// Storage used when the local database cannot be opened: reads always
/// miss and writes are discarded, so the app behaves as if offline caching
/// were disabled and falls through to the remote store.
pub struct NoopStorage;

impl CacheStorage for NoopStorage {
  fn set(&self, _key: &str, _data: &Value, _overrides: Option<PolicyOverride>) -> Result<()> {
    Ok(()) // Discard
  }

  fn get(&self, _key: &str) -> Result<Option<Value>> {
    Ok(None) // Always miss
  }

  fn delete(&self, _key: &str) -> Result<()> {
    Ok(())
  }

  fn clear(&self) -> Result<()> {
    Ok(())
  }

  fn entry_count(&self) -> Result<u64> {
    Ok(0)
  }

  fn prune_expired(&self) -> Result<u64> {
    Ok(0)
  }

  fn add_pending(&self, _mutation: &Mutation) -> Result<i64> {
    Ok(0) // Discard
  }

  fn pending_operations(&self) -> Result<Vec<PendingOperation>> {
    Ok(Vec::new())
  }

  fn remove_pending(&self, _id: i64) -> Result<()> {
    Ok(())
  }

  fn pending_count(&self) -> Result<u64> {
    Ok(0)
  }
}
