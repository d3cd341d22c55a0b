//! Per-namespace retention policy defaults.

use std::time::Duration;

/// Advisory eviction hint stored with every cache entry.
///
/// Nothing acts on this today; it is recorded so a future eviction pass can
/// rank entries without a schema change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
  High,
  Medium,
  Low,
}

impl Priority {
  pub fn as_str(&self) -> &'static str {
    match self {
      Priority::High => "high",
      Priority::Medium => "medium",
      Priority::Low => "low",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "high" => Some(Priority::High),
      "medium" => Some(Priority::Medium),
      "low" => Some(Priority::Low),
      _ => None,
    }
  }
}

/// Effective retention policy for a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
  pub max_age: Duration,
  pub priority: Priority,
}

/// Per-call overrides applied on top of the namespace default.
#[derive(Debug, Clone, Copy, Default)]
pub struct PolicyOverride {
  pub max_age: Option<Duration>,
  pub priority: Option<Priority>,
}

const HOUR: Duration = Duration::from_secs(60 * 60);
const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Resolve the retention policy for a key from its namespace (the prefix
/// before the first `:`), merged with any per-call override.
///
/// Setup sheets are the user's own work and change rarely away from the
/// track; track locations are near-static reference data. Conditions go
/// stale within a session.
pub fn policy_for(key: &str, overrides: Option<PolicyOverride>) -> CachePolicy {
  let namespace = key.split(':').next().unwrap_or(key);

  let base = match namespace {
    "setups" => CachePolicy {
      max_age: Duration::from_secs(7 * 24 * 60 * 60),
      priority: Priority::High,
    },
    "tracks" => CachePolicy {
      max_age: Duration::from_secs(30 * 24 * 60 * 60),
      priority: Priority::Medium,
    },
    "maintenance" => CachePolicy {
      max_age: Duration::from_secs(14 * 24 * 60 * 60),
      priority: Priority::Medium,
    },
    "conditions" => CachePolicy {
      max_age: HOUR,
      priority: Priority::Low,
    },
    "laps" => CachePolicy {
      max_age: DAY,
      priority: Priority::Low,
    },
    _ => CachePolicy {
      max_age: DAY,
      priority: Priority::Medium,
    },
  };

  match overrides {
    Some(o) => CachePolicy {
      max_age: o.max_age.unwrap_or(base.max_age),
      priority: o.priority.unwrap_or(base.priority),
    },
    None => base,
  }
}
