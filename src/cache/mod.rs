//! Offline cache and pending-mutation queue.
//!
//! A namespaced key-value cache with per-entry TTL, lazily expired on read,
//! plus a durable FIFO log of remote mutations awaiting replay. Both live in
//! one SQLite database behind a single service object, shared by reference
//! so tests can substitute an in-memory or no-op instance.

mod policy;
mod storage;
mod traits;

pub use policy::{policy_for, CachePolicy, PolicyOverride, Priority};
pub use storage::SqliteStorage;
pub use traits::{CacheStorage, Mutation, MutationKind, NoopStorage, PendingOperation};
