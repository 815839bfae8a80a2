//! Bounded retry for optimistic version conflicts.
//!
//! Every mutation is a read-compute-commit cycle. When the commit loses the
//! version race the whole cycle is repeated from a fresh read, with an
//! exponentially growing, jittered pause in between. Once the attempt budget
//! is spent the caller gets [`Error::Busy`] instead of spinning on a hot
//! record.

use std::{future::Future, time::Duration};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{Error, Result};

// ─── Config ──────────────────────────────────────────────────────────────────

/// Deserialisable retry settings (the `[retry]` table of the settings file).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
  pub max_attempts:       u32,
  pub initial_delay_ms:   u64,
  pub max_delay_ms:       u64,
  pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
  fn default() -> Self {
    Self {
      max_attempts:       3,
      initial_delay_ms:   10,
      max_delay_ms:       200,
      backoff_multiplier: 2.0,
    }
  }
}

// ─── Policy ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RetryPolicy {
  /// Total attempts, including the first one. Always at least 1.
  max_attempts:       u32,
  initial_delay:      Duration,
  max_delay:          Duration,
  backoff_multiplier: f64,
}

impl RetryPolicy {
  /// Defaults: 3 attempts, 10ms initial delay, 200ms cap, doubling.
  pub fn new() -> Self { RetryConfig::default().into() }

  pub fn with_max_attempts(mut self, attempts: u32) -> Self {
    self.max_attempts = attempts.max(1);
    self
  }

  pub fn with_initial_delay(mut self, delay: Duration) -> Self {
    self.initial_delay = delay;
    self
  }

  pub fn with_max_delay(mut self, delay: Duration) -> Self {
    self.max_delay = delay;
    self
  }

  pub fn max_attempts(&self) -> u32 { self.max_attempts }

  /// Pause before retry number `retry` (0-indexed):
  /// `min(initial * multiplier^retry, max) * jitter`, jitter in `[0.5, 1.0]`.
  pub fn delay_for_retry(&self, retry: u32) -> Duration {
    use rand::Rng as _;

    let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
    let base_secs =
      self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
    let capped_secs = base_secs.min(self.max_delay.as_secs_f64());
    let jitter = rand::thread_rng().gen_range(0.5..=1.0);

    Duration::from_secs_f64((capped_secs * jitter).max(0.0))
  }

  /// Drive `attempt` until it returns anything other than
  /// [`Error::Conflict`], or the attempt budget runs out.
  ///
  /// `attempt` receives the 1-based attempt number and must re-read all
  /// state it depends on; nothing from a failed attempt is carried over.
  pub async fn run<T, F, Fut>(&self, mut attempt: F) -> Result<T>
  where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
  {
    let mut n = 0;
    loop {
      n += 1;
      match attempt(n).await {
        Err(err) if err.is_conflict() => {
          if n >= self.max_attempts {
            warn!(attempts = n, error = %err, "conflict retries exhausted");
            return Err(Error::Busy { attempts: n });
          }
          let delay = self.delay_for_retry(n - 1);
          debug!(attempt = n, ?delay, error = %err, "version conflict, retrying");
          tokio::time::sleep(delay).await;
        }
        other => return other,
      }
    }
  }
}

impl Default for RetryPolicy {
  fn default() -> Self { Self::new() }
}

impl From<RetryConfig> for RetryPolicy {
  fn from(config: RetryConfig) -> Self {
    Self {
      max_attempts:       config.max_attempts.max(1),
      initial_delay:      Duration::from_millis(config.initial_delay_ms),
      max_delay:          Duration::from_millis(config.max_delay_ms),
      backoff_multiplier: config.backoff_multiplier,
    }
  }
}
