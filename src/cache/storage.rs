//! SQLite implementation of the offline storage service.

use chrono::Utc;
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use super::policy::{self, PolicyOverride};
use super::traits::{CacheStorage, Mutation, MutationKind, PendingOperation};

/// Bumped when the schema changes; migrations run when the stored
/// `user_version` is older.
const SCHEMA_VERSION: i32 = 1;

/// Schema for the cache and pending-operation tables.
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS cache (
    key        TEXT PRIMARY KEY,
    data       BLOB NOT NULL,
    timestamp  INTEGER NOT NULL,
    max_age    INTEGER NOT NULL,
    priority   TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_cache_timestamp ON cache(timestamp);
CREATE INDEX IF NOT EXISTS idx_cache_priority ON cache(priority);

CREATE TABLE IF NOT EXISTS pending_operations (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    op_type    TEXT NOT NULL,
    target     TEXT NOT NULL,
    data       BLOB NOT NULL,
    timestamp  INTEGER NOT NULL
);
"#;

/// SQLite-backed cache and queue storage.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open (or create) the database at the default location.
  pub fn open() -> Result<Self> {
    Self::open_at(&Self::default_path()?)
  }

  /// Open (or create) the database at an explicit path.
  pub fn open_at(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;

    Ok(storage)
  }

  /// Open a throwaway in-memory database.
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory cache database: {}", e))?;

    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;

    Ok(storage)
  }

  /// Get the default database path.
  fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("pitsync").join("cache.db"))
  }

  /// Create or upgrade the schema, gated on `PRAGMA user_version` so later
  /// versions can migrate in steps.
  fn run_migrations(&self) -> Result<()> {
    let conn = self.lock()?;

    let version: i32 = conn
      .query_row("PRAGMA user_version", [], |row| row.get(0))
      .map_err(|e| eyre!("Failed to read schema version: {}", e))?;

    if version < SCHEMA_VERSION {
      conn
        .execute_batch(SCHEMA)
        .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;
      conn
        .pragma_update(None, "user_version", SCHEMA_VERSION)
        .map_err(|e| eyre!("Failed to record schema version: {}", e))?;
    }

    Ok(())
  }

  fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
    self.conn.lock().map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

fn now_ms() -> i64 {
  Utc::now().timestamp_millis()
}

impl CacheStorage for SqliteStorage {
  fn set(&self, key: &str, data: &Value, overrides: Option<PolicyOverride>) -> Result<()> {
    let policy = policy::policy_for(key, overrides);
    let blob = serde_json::to_vec(data).map_err(|e| eyre!("Failed to serialize entry: {}", e))?;

    let conn = self.lock()?;
    conn
      .execute(
        "INSERT OR REPLACE INTO cache (key, data, timestamp, max_age, priority)
         VALUES (?, ?, ?, ?, ?)",
        params![
          key,
          blob,
          now_ms(),
          policy.max_age.as_millis() as i64,
          policy.priority.as_str()
        ],
      )
      .map_err(|e| eyre!("Failed to store entry {}: {}", key, e))?;

    Ok(())
  }

  fn get(&self, key: &str) -> Result<Option<Value>> {
    let conn = self.lock()?;

    let row: Option<(Vec<u8>, i64, i64)> = conn
      .query_row(
        "SELECT data, timestamp, max_age FROM cache WHERE key = ?",
        params![key],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read entry {}: {}", key, e))?;

    let (blob, timestamp, max_age) = match row {
      Some(row) => row,
      None => return Ok(None),
    };

    // Liveness is checked on read only; an expired entry is pruned here
    // rather than by a background sweep.
    if now_ms() - timestamp > max_age {
      conn
        .execute("DELETE FROM cache WHERE key = ?", params![key])
        .map_err(|e| eyre!("Failed to drop expired entry {}: {}", key, e))?;
      tracing::debug!(key, "cache entry expired");
      return Ok(None);
    }

    let value =
      serde_json::from_slice(&blob).map_err(|e| eyre!("Failed to deserialize entry {}: {}", key, e))?;

    Ok(Some(value))
  }

  fn delete(&self, key: &str) -> Result<()> {
    let conn = self.lock()?;
    conn
      .execute("DELETE FROM cache WHERE key = ?", params![key])
      .map_err(|e| eyre!("Failed to delete entry {}: {}", key, e))?;
    Ok(())
  }

  fn clear(&self) -> Result<()> {
    let conn = self.lock()?;
    conn
      .execute("DELETE FROM cache", [])
      .map_err(|e| eyre!("Failed to clear cache: {}", e))?;
    Ok(())
  }

  fn entry_count(&self) -> Result<u64> {
    let conn = self.lock()?;
    let count: i64 = conn
      .query_row("SELECT COUNT(*) FROM cache", [], |row| row.get(0))
      .map_err(|e| eyre!("Failed to count cache entries: {}", e))?;
    Ok(count as u64)
  }

  fn prune_expired(&self) -> Result<u64> {
    let conn = self.lock()?;
    let pruned = conn
      .execute(
        "DELETE FROM cache WHERE ? - timestamp > max_age",
        params![now_ms()],
      )
      .map_err(|e| eyre!("Failed to prune expired entries: {}", e))?;
    Ok(pruned as u64)
  }

  fn add_pending(&self, mutation: &Mutation) -> Result<i64> {
    let blob = serde_json::to_vec(&mutation.data)
      .map_err(|e| eyre!("Failed to serialize operation payload: {}", e))?;

    let conn = self.lock()?;
    conn
      .execute(
        "INSERT INTO pending_operations (op_type, target, data, timestamp)
         VALUES (?, ?, ?, ?)",
        params![mutation.kind.as_str(), mutation.target, blob, now_ms()],
      )
      .map_err(|e| eyre!("Failed to queue operation on {}: {}", mutation.target, e))?;

    Ok(conn.last_insert_rowid())
  }

  fn pending_operations(&self) -> Result<Vec<PendingOperation>> {
    let conn = self.lock()?;

    let mut stmt = conn
      .prepare(
        "SELECT id, op_type, target, data, timestamp
         FROM pending_operations ORDER BY id ASC",
      )
      .map_err(|e| eyre!("Failed to prepare queue query: {}", e))?;

    let rows: Vec<(i64, String, String, Vec<u8>, i64)> = stmt
      .query_map([], |row| {
        Ok((
          row.get(0)?,
          row.get(1)?,
          row.get(2)?,
          row.get(3)?,
          row.get(4)?,
        ))
      })
      .map_err(|e| eyre!("Failed to read pending operations: {}", e))?
      .filter_map(|r| r.ok())
      .collect();

    let mut operations = Vec::with_capacity(rows.len());
    for (id, op_type, target, blob, timestamp) in rows {
      let kind = MutationKind::parse(&op_type)
        .ok_or_else(|| eyre!("Unknown operation type {} for operation {}", op_type, id))?;
      let data = serde_json::from_slice(&blob)
        .map_err(|e| eyre!("Failed to deserialize operation {}: {}", id, e))?;

      operations.push(PendingOperation {
        id,
        kind,
        target,
        data,
        timestamp,
      });
    }

    Ok(operations)
  }

  fn remove_pending(&self, id: i64) -> Result<()> {
    let conn = self.lock()?;
    conn
      .execute("DELETE FROM pending_operations WHERE id = ?", params![id])
      .map_err(|e| eyre!("Failed to remove operation {}: {}", id, e))?;
    Ok(())
  }

  fn pending_count(&self) -> Result<u64> {
    let conn = self.lock()?;
    let count: i64 = conn
      .query_row("SELECT COUNT(*) FROM pending_operations", [], |row| row.get(0))
      .map_err(|e| eyre!("Failed to count pending operations: {}", e))?;
    Ok(count as u64)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;
  use std::time::Duration;

  fn storage() -> SqliteStorage {
    SqliteStorage::open_in_memory().unwrap()
  }

  fn short_ttl(ms: u64) -> Option<PolicyOverride> {
    Some(PolicyOverride {
      max_age: Some(Duration::from_millis(ms)),
      priority: None,
    })
  }

  #[test]
  fn test_set_then_get_round_trips() {
    let storage = storage();
    let data = json!({"front_wing": 7, "rear_wing": 4});

    storage.set("setups:user-1", &data, None).unwrap();

    assert_eq!(storage.get("setups:user-1").unwrap(), Some(data));
  }

  #[test]
  fn test_get_missing_key_is_none() {
    let storage = storage();
    assert_eq!(storage.get("setups:nobody").unwrap(), None);
  }

  #[test]
  fn test_set_replaces_existing_entry() {
    let storage = storage();

    storage.set("tracks:all", &json!(["old"]), None).unwrap();
    storage.set("tracks:all", &json!(["new"]), None).unwrap();

    assert_eq!(storage.get("tracks:all").unwrap(), Some(json!(["new"])));
    assert_eq!(storage.entry_count().unwrap(), 1);
  }

  #[test]
  fn test_expired_entry_is_deleted_on_read() {
    let storage = storage();

    storage
      .set("conditions:monza", &json!({"grip": "green"}), short_ttl(100))
      .unwrap();

    std::thread::sleep(Duration::from_millis(150));

    assert_eq!(storage.get("conditions:monza").unwrap(), None);
    // The read itself pruned the row
    assert_eq!(storage.entry_count().unwrap(), 0);
  }

  #[test]
  fn test_override_beats_namespace_default() {
    let storage = storage();

    // tracks would normally live for 30 days
    storage
      .set("tracks:all", &json!([{"id": 1, "name": "Track A"}]), short_ttl(50))
      .unwrap();

    std::thread::sleep(Duration::from_millis(100));

    assert_eq!(storage.get("tracks:all").unwrap(), None);
  }

  #[test]
  fn test_default_track_config_round_trips() {
    let storage = storage();
    let tracks = json!([{"id": 1, "name": "Track A"}]);

    storage.set("tracks:all", &tracks, None).unwrap();

    assert_eq!(storage.get("tracks:all").unwrap(), Some(tracks));
  }

  #[test]
  fn test_delete_and_clear() {
    let storage = storage();

    storage.set("setups:a", &json!(1), None).unwrap();
    storage.set("setups:b", &json!(2), None).unwrap();

    storage.delete("setups:a").unwrap();
    assert_eq!(storage.get("setups:a").unwrap(), None);
    assert_eq!(storage.get("setups:b").unwrap(), Some(json!(2)));

    storage.clear().unwrap();
    assert_eq!(storage.entry_count().unwrap(), 0);
  }

  #[test]
  fn test_clear_leaves_queue_intact() {
    let storage = storage();

    storage.set("setups:a", &json!(1), None).unwrap();
    storage
      .add_pending(&Mutation {
        kind: MutationKind::Insert,
        target: "setups".into(),
        data: json!({"name": "race trim"}),
      })
      .unwrap();

    storage.clear().unwrap();

    assert_eq!(storage.entry_count().unwrap(), 0);
    assert_eq!(storage.pending_count().unwrap(), 1);
  }

  #[test]
  fn test_prune_expired_removes_only_dead_entries() {
    let storage = storage();

    storage.set("conditions:a", &json!(1), short_ttl(10)).unwrap();
    storage.set("setups:keep", &json!(2), None).unwrap();

    std::thread::sleep(Duration::from_millis(50));

    assert_eq!(storage.prune_expired().unwrap(), 1);
    assert_eq!(storage.get("setups:keep").unwrap(), Some(json!(2)));
  }

  #[test]
  fn test_queue_is_fifo_and_removal_keeps_order() {
    let storage = storage();

    let mutation = |name: &str| Mutation {
      kind: MutationKind::Insert,
      target: "setups".into(),
      data: json!({ "name": name }),
    };

    let a = storage.add_pending(&mutation("a")).unwrap();
    let b = storage.add_pending(&mutation("b")).unwrap();
    let c = storage.add_pending(&mutation("c")).unwrap();
    assert!(a < b && b < c);

    let ops = storage.pending_operations().unwrap();
    let names: Vec<_> = ops.iter().map(|op| op.data["name"].clone()).collect();
    assert_eq!(names, vec![json!("a"), json!("b"), json!("c")]);

    storage.remove_pending(b).unwrap();

    let ops = storage.pending_operations().unwrap();
    let ids: Vec<_> = ops.iter().map(|op| op.id).collect();
    assert_eq!(ids, vec![a, c]);
  }

  #[test]
  fn test_remove_unknown_pending_id_is_noop() {
    let storage = storage();
    storage.remove_pending(42).unwrap();
    assert_eq!(storage.pending_count().unwrap(), 0);
  }

  #[test]
  fn test_reopen_is_idempotent() {
    // Running migrations twice against the same database must not fail
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.db");

    let first = SqliteStorage::open_at(&path).unwrap();
    first.set("setups:a", &json!(1), None).unwrap();
    drop(first);

    let second = SqliteStorage::open_at(&path).unwrap();
    assert_eq!(second.get("setups:a").unwrap(), Some(json!(1)));
  }
}
