//! Bounded retry with exponential backoff for fallible async operations.

use color_eyre::eyre::Report;
use color_eyre::Result;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

/// Retry knobs. Defaults match the app-wide policy: three attempts, one
/// second initial delay, doubling up to a ten second cap.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
  pub max_attempts: u32,
  pub initial_delay: Duration,
  pub max_delay: Duration,
  pub backoff_factor: u32,
}

impl Default for RetryConfig {
  fn default() -> Self {
    Self {
      max_attempts: 3,
      initial_delay: Duration::from_millis(1000),
      max_delay: Duration::from_millis(10_000),
      backoff_factor: 2,
    }
  }
}

/// Retry wrapper around a fallible async operation.
///
/// The executor never propagates an error: a `None` return means every
/// attempt failed and the caller should treat the operation as definitively
/// failed. Attempt progress is observable through [`attempts`](Self::attempts)
/// and [`is_retrying`](Self::is_retrying) while an execution is in flight.
///
/// The wrapped operation is not time-boxed; only the attempt count bounds an
/// execution. Call sites that need a per-attempt timeout race their own.
pub struct RetryExecutor {
  config: RetryConfig,
  attempts: AtomicU32,
  retrying: AtomicBool,
}

impl RetryExecutor {
  pub fn new(config: RetryConfig) -> Self {
    Self {
      config,
      attempts: AtomicU32::new(0),
      retrying: AtomicBool::new(false),
    }
  }

  /// 1-indexed number of the current (or last) attempt.
  pub fn attempts(&self) -> u32 {
    self.attempts.load(Ordering::Relaxed)
  }

  /// True from the moment a second attempt is scheduled until the
  /// execution settles.
  pub fn is_retrying(&self) -> bool {
    self.retrying.load(Ordering::Relaxed)
  }

  /// Run `operation` with retries and no completion hooks.
  pub async fn execute<T, F, Fut>(&self, operation: F) -> Option<T>
  where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
  {
    self.execute_with_hooks(operation, |_| {}, |_| {}).await
  }

  /// Run `operation` with retries. `on_success` fires once with the result
  /// of the first successful attempt; `on_error` fires once with the last
  /// error after every attempt has failed.
  pub async fn execute_with_hooks<T, F, Fut, S, E>(
    &self,
    mut operation: F,
    on_success: S,
    on_error: E,
  ) -> Option<T>
  where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    S: FnOnce(&T),
    E: FnOnce(&Report),
  {
    let max_attempts = self.config.max_attempts.max(1);
    let mut delay = self.config.initial_delay;
    let mut last_error: Option<Report> = None;

    for attempt in 1..=max_attempts {
      self.attempts.store(attempt, Ordering::Relaxed);

      match operation().await {
        Ok(value) => {
          self.retrying.store(false, Ordering::Relaxed);
          on_success(&value);
          return Some(value);
        }
        Err(err) => {
          tracing::warn!(attempt, error = %err, "attempt failed");
          last_error = Some(err);

          if attempt < max_attempts {
            self.retrying.store(true, Ordering::Relaxed);
            tokio::time::sleep(delay).await;
            delay = (delay * self.config.backoff_factor).min(self.config.max_delay);
          }
        }
      }
    }

    self.retrying.store(false, Ordering::Relaxed);
    if let Some(err) = last_error.as_ref() {
      on_error(err);
    }
    None
  }
}

impl Default for RetryExecutor {
  fn default() -> Self {
    Self::new(RetryConfig::default())
  }
}
