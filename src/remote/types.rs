//! Record types for the remote collections this layer populates.
//!
//! These schemas belong to the calling side of the cache; the cache itself
//! only ever sees their JSON form.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A saved car setup sheet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Setup {
  pub id: String,
  pub user_id: String,
  pub track_id: String,
  pub name: String,
  pub car_class: String,
  #[serde(default)]
  pub notes: Option<String>,
  pub updated_at: DateTime<Utc>,
}

/// A track in the location reference list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackLocation {
  pub id: String,
  pub name: String,
  pub country: String,
  pub length_km: f64,
}

/// A maintenance checklist for a car class.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceChecklist {
  pub id: String,
  pub car_class: String,
  pub title: String,
  pub items: Vec<String>,
}

/// A track condition report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackCondition {
  pub id: String,
  pub track_id: String,
  pub surface_temp_c: f64,
  pub air_temp_c: f64,
  pub grip_level: String,
  pub recorded_at: DateTime<Utc>,
}

/// A recorded lap time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LapTime {
  pub id: String,
  pub track_id: String,
  pub user_id: String,
  pub lap_ms: i64,
  pub recorded_at: DateTime<Utc>,
}
