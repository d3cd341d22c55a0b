//! Cached remote client: read-through population with stale fallback.

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

use crate::cache::CacheStorage;
use crate::retry::{RetryConfig, RetryExecutor};

use super::client::RemoteStore;
use super::types::{MaintenanceChecklist, Setup, TrackLocation};

/// Remote client with transparent caching.
///
/// Reads go to the backend first and are written through to the cache; if
/// the backend is unreachable the last cached value is served instead. The
/// return value does not distinguish fresh data from a stale fallback, and
/// `None` means the backend failed and nothing usable was cached.
pub struct CachedClient {
  remote: Arc<dyn RemoteStore>,
  storage: Arc<dyn CacheStorage>,
  retry: RetryExecutor,
}

impl CachedClient {
  pub fn new(remote: Arc<dyn RemoteStore>, storage: Arc<dyn CacheStorage>) -> Self {
    Self {
      remote,
      storage,
      retry: RetryExecutor::default(),
    }
  }

  /// Replace the default retry policy, mostly to shorten delays in tests.
  pub fn with_retry_config(mut self, config: RetryConfig) -> Self {
    self.retry = RetryExecutor::new(config);
    self
  }

  /// Fetch a user's setup sheets, cached under `setups:<user_id>`.
  pub async fn cache_user_setups(&self, user_id: &str) -> Option<Vec<Setup>> {
    self
      .fetch_through(
        &format!("setups:{}", user_id),
        "setups",
        &[("user_id", user_id)],
      )
      .await
  }

  /// Fetch the track location list, cached under `tracks:all`.
  pub async fn cache_track_locations(&self) -> Option<Vec<TrackLocation>> {
    self.fetch_through("tracks:all", "track_locations", &[]).await
  }

  /// Fetch maintenance checklists for a car class, cached under
  /// `maintenance:<car_class>`.
  pub async fn cache_maintenance_checklists(
    &self,
    car_class: &str,
  ) -> Option<Vec<MaintenanceChecklist>> {
    self
      .fetch_through(
        &format!("maintenance:{}", car_class),
        "maintenance_checklists",
        &[("car_class", car_class)],
      )
      .await
  }

  /// Warm the cache for a track visit: the user's setups there, current
  /// conditions and recorded lap times, fetched concurrently. A failure
  /// anywhere in the batch abandons the whole batch; there is no
  /// per-sub-fetch recovery.
  pub async fn prefetch_for_track(&self, track_id: &str, user_id: &str) {
    let setups_params = [("user_id", user_id), ("track_id", track_id)];
    let conditions_params = [("track_id", track_id)];
    let laps_params = [("track_id", track_id)];
    let setups = self.remote.select("setups", &setups_params);
    let conditions = self.remote.select("track_conditions", &conditions_params);
    let laps = self.remote.select("lap_times", &laps_params);

    match futures::try_join!(setups, conditions, laps) {
      Ok((setups, conditions, laps)) => {
        self.store(&format!("setups:{}:{}", user_id, track_id), Value::Array(setups));
        self.store(&format!("conditions:{}", track_id), Value::Array(conditions));
        self.store(&format!("laps:{}", track_id), Value::Array(laps));
      }
      Err(err) => {
        tracing::warn!(track_id, error = %err, "track prefetch failed");
      }
    }
  }

  /// Backend fetch with retry, write-through on success, cache fallback on
  /// definitive failure.
  async fn fetch_through<T>(
    &self,
    key: &str,
    table: &str,
    filters: &[(&str, &str)],
  ) -> Option<Vec<T>>
  where
    T: DeserializeOwned,
  {
    let fetched = self
      .retry
      .execute(|| {
        let remote = Arc::clone(&self.remote);
        async move { remote.select(table, filters).await }
      })
      .await;

    match fetched {
      Some(rows) => {
        self.store(key, Value::Array(rows.clone()));
        Some(parse_rows(rows))
      }
      None => self.cached_fallback(key),
    }
  }

  fn cached_fallback<T: DeserializeOwned>(&self, key: &str) -> Option<Vec<T>> {
    match self.storage.get(key) {
      Ok(Some(Value::Array(rows))) => {
        tracing::debug!(key, "backend unreachable, serving cached value");
        Some(parse_rows(rows))
      }
      Ok(_) => None,
      Err(err) => {
        tracing::warn!(key, error = %err, "cache fallback failed");
        None
      }
    }
  }

  fn store(&self, key: &str, data: Value) {
    if let Err(err) = self.storage.set(key, &data, None) {
      tracing::warn!(key, error = %err, "failed to cache fetched data");
    }
  }
}

/// Rows that no longer match the expected schema are dropped rather than
/// failing the whole result.
fn parse_rows<T: DeserializeOwned>(rows: Vec<Value>) -> Vec<T> {
  rows
    .into_iter()
    .filter_map(|row| serde_json::from_value(row).ok())
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::SqliteStorage;
  use async_trait::async_trait;
  use color_eyre::{eyre::eyre, Result};
  use serde_json::json;
  use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
  use std::time::Duration;

  struct FakeRemote {
    rows: Value,
    offline: AtomicBool,
    selects: AtomicU32,
  }

  impl FakeRemote {
    fn serving(rows: Value) -> Self {
      Self {
        rows,
        offline: AtomicBool::new(false),
        selects: AtomicU32::new(0),
      }
    }

    fn unreachable() -> Self {
      let remote = Self::serving(json!([]));
      remote.offline.store(true, Ordering::SeqCst);
      remote
    }
  }

  #[async_trait]
  impl RemoteStore for FakeRemote {
    async fn select(&self, _table: &str, _filters: &[(&str, &str)]) -> Result<Vec<Value>> {
      self.selects.fetch_add(1, Ordering::SeqCst);
      if self.offline.load(Ordering::SeqCst) {
        return Err(eyre!("connection refused"));
      }
      Ok(self.rows.as_array().cloned().unwrap_or_default())
    }

    async fn insert(&self, _table: &str, _record: &Value) -> Result<()> {
      Ok(())
    }

    async fn update(&self, _table: &str, _id: &str, _record: &Value) -> Result<()> {
      Ok(())
    }

    async fn delete(&self, _table: &str, _id: &str) -> Result<()> {
      Ok(())
    }
  }

  fn fast_retry() -> RetryConfig {
    RetryConfig {
      max_attempts: 2,
      initial_delay: Duration::from_millis(5),
      max_delay: Duration::from_millis(10),
      backoff_factor: 2,
    }
  }

  fn track_rows() -> Value {
    json!([
      {"id": "monza", "name": "Monza", "country": "IT", "length_km": 5.793},
      {"id": "spa", "name": "Spa-Francorchamps", "country": "BE", "length_km": 7.004}
    ])
  }

  #[tokio::test]
  async fn test_successful_fetch_writes_through_to_cache() {
    let storage = Arc::new(SqliteStorage::open_in_memory().unwrap());
    let remote = Arc::new(FakeRemote::serving(track_rows()));
    let client = CachedClient::new(remote, Arc::clone(&storage) as Arc<dyn CacheStorage>)
      .with_retry_config(fast_retry());

    let tracks = client.cache_track_locations().await.unwrap();

    assert_eq!(tracks.len(), 2);
    assert_eq!(tracks[0].name, "Monza");
    assert_eq!(storage.get("tracks:all").unwrap(), Some(track_rows()));
  }

  #[tokio::test]
  async fn test_fetch_failure_falls_back_to_cached_value() {
    let storage = Arc::new(SqliteStorage::open_in_memory().unwrap());
    storage.set("tracks:all", &track_rows(), None).unwrap();

    let remote = Arc::new(FakeRemote::unreachable());
    let client = CachedClient::new(
      Arc::clone(&remote) as Arc<dyn RemoteStore>,
      storage as Arc<dyn CacheStorage>,
    )
    .with_retry_config(fast_retry());

    let tracks = client.cache_track_locations().await.unwrap();

    assert_eq!(tracks.len(), 2);
    // Retry ran the configured number of attempts before falling back
    assert_eq!(remote.selects.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn test_fetch_failure_with_empty_cache_yields_none() {
    let storage = Arc::new(SqliteStorage::open_in_memory().unwrap());
    let remote = Arc::new(FakeRemote::unreachable());
    let client = CachedClient::new(remote, storage as Arc<dyn CacheStorage>)
      .with_retry_config(fast_retry());

    assert!(client.cache_user_setups("user-1").await.is_none());
  }

  #[tokio::test]
  async fn test_prefetch_writes_all_three_keys() {
    let storage = Arc::new(SqliteStorage::open_in_memory().unwrap());
    let remote = Arc::new(FakeRemote::serving(json!([{"id": "x"}])));
    let client = CachedClient::new(remote, Arc::clone(&storage) as Arc<dyn CacheStorage>);

    client.prefetch_for_track("monza", "user-1").await;

    assert!(storage.get("setups:user-1:monza").unwrap().is_some());
    assert!(storage.get("conditions:monza").unwrap().is_some());
    assert!(storage.get("laps:monza").unwrap().is_some());
  }

  #[tokio::test]
  async fn test_prefetch_failure_writes_nothing() {
    let storage = Arc::new(SqliteStorage::open_in_memory().unwrap());
    let remote = Arc::new(FakeRemote::unreachable());
    let client = CachedClient::new(remote, Arc::clone(&storage) as Arc<dyn CacheStorage>);

    client.prefetch_for_track("monza", "user-1").await;

    assert_eq!(storage.entry_count().unwrap(), 0);
  }
}
