//! Offline-first cache and mutation-replay layer for the pitsync client.
//!
//! Reads go through [`remote::CachedClient`], which writes fetched data into
//! the local cache and serves the last cached value when the backend is
//! unreachable. Writes made while offline are queued as pending operations
//! and replayed in FIFO order by [`sync::SyncCoordinator`] once connectivity
//! returns. Backend fetches are wrapped in [`retry::RetryExecutor`], which
//! every other network call in the app routes through as well.

pub mod cache;
pub mod config;
pub mod remote;
pub mod retry;
pub mod sync;

pub use cache::{
  CacheStorage, Mutation, MutationKind, NoopStorage, PendingOperation, PolicyOverride, Priority,
  SqliteStorage,
};
pub use config::Config;
pub use remote::{CachedClient, HttpRemoteStore, RemoteStore};
pub use retry::{RetryConfig, RetryExecutor};
pub use sync::{spawn_online_listener, SyncCoordinator, SyncReport};
