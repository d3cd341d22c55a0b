//! Remote store edge: wire client, record types and the cached client.

mod cached;
mod client;
mod types;

pub use cached::CachedClient;
pub use client::{HttpRemoteStore, RemoteStore};
pub use types::{LapTime, MaintenanceChecklist, Setup, TrackCondition, TrackLocation};
