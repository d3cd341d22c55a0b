//! Remote store trait and REST implementation.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use serde_json::Value;
use url::Url;

use crate::config::Config;

/// Query/mutation interface over named remote collections.
///
/// The backend is an opaque collaborator: a call either returns a result
/// set or an error, never partial success. Records are opaque JSON; their
/// schemas belong to the callers.
#[async_trait]
pub trait RemoteStore: Send + Sync {
  /// Select rows from `table`, optionally filtered by column equality.
  async fn select(&self, table: &str, filters: &[(&str, &str)]) -> Result<Vec<Value>>;

  /// Insert one record into `table`.
  async fn insert(&self, table: &str, record: &Value) -> Result<()>;

  /// Update the record in `table` identified by `id`.
  async fn update(&self, table: &str, id: &str, record: &Value) -> Result<()>;

  /// Delete the record in `table` identified by `id`.
  async fn delete(&self, table: &str, id: &str) -> Result<()>;
}

/// Client for the backend's PostgREST-style REST surface.
#[derive(Clone)]
pub struct HttpRemoteStore {
  client: reqwest::Client,
  base: Url,
  api_key: String,
}

impl HttpRemoteStore {
  pub fn new(config: &Config) -> Result<Self> {
    let api_key = Config::get_api_key()?;

    let base = Url::parse(&config.backend.url)
      .map_err(|e| eyre!("Invalid backend URL {}: {}", config.backend.url, e))?;

    let client = reqwest::Client::builder()
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      client,
      base,
      api_key,
    })
  }

  fn table_url(&self, table: &str) -> Result<Url> {
    self
      .base
      .join(&format!("rest/v1/{}", table))
      .map_err(|e| eyre!("Invalid table name {}: {}", table, e))
  }

  fn authed(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
    request
      .header("apikey", &self.api_key)
      .bearer_auth(&self.api_key)
  }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
  async fn select(&self, table: &str, filters: &[(&str, &str)]) -> Result<Vec<Value>> {
    let mut url = self.table_url(table)?;
    for (column, value) in filters {
      url
        .query_pairs_mut()
        .append_pair(column, &format!("eq.{}", value));
    }

    let response = self
      .authed(self.client.get(url))
      .send()
      .await
      .map_err(|e| eyre!("Failed to query {}: {}", table, e))?
      .error_for_status()
      .map_err(|e| eyre!("Query on {} rejected: {}", table, e))?;

    response
      .json()
      .await
      .map_err(|e| eyre!("Failed to parse rows from {}: {}", table, e))
  }

  async fn insert(&self, table: &str, record: &Value) -> Result<()> {
    let url = self.table_url(table)?;

    self
      .authed(self.client.post(url))
      .json(record)
      .send()
      .await
      .map_err(|e| eyre!("Failed to insert into {}: {}", table, e))?
      .error_for_status()
      .map_err(|e| eyre!("Insert into {} rejected: {}", table, e))?;

    Ok(())
  }

  async fn update(&self, table: &str, id: &str, record: &Value) -> Result<()> {
    let mut url = self.table_url(table)?;
    url
      .query_pairs_mut()
      .append_pair("id", &format!("eq.{}", id));

    self
      .authed(self.client.patch(url))
      .json(record)
      .send()
      .await
      .map_err(|e| eyre!("Failed to update {} in {}: {}", id, table, e))?
      .error_for_status()
      .map_err(|e| eyre!("Update of {} in {} rejected: {}", id, table, e))?;

    Ok(())
  }

  async fn delete(&self, table: &str, id: &str) -> Result<()> {
    let mut url = self.table_url(table)?;
    url
      .query_pairs_mut()
      .append_pair("id", &format!("eq.{}", id));

    self
      .authed(self.client.delete(url))
      .send()
      .await
      .map_err(|e| eyre!("Failed to delete {} from {}: {}", id, table, e))?
      .error_for_status()
      .map_err(|e| eyre!("Delete of {} from {} rejected: {}", id, table, e))?;

    Ok(())
  }
}
