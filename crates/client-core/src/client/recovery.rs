//! Connection retry schedule
//!
//! Session creation is retried with a linearly growing delay: the wait
//! after failed attempt `n` is `n × base_delay`. The schedule is data; the
//! connectivity reducer decides when to consult it.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the connection retry cascade
///
/// # Examples
///
/// ```rust
/// # use voxlink_client_core::client::recovery::ConnectRetryConfig;
/// # use std::time::Duration;
/// let config = ConnectRetryConfig::default();
/// assert_eq!(config.max_attempts, 10);
/// assert_eq!(config.delay_for_attempt(1), Duration::from_secs(10));
/// assert_eq!(config.delay_for_attempt(3), Duration::from_secs(30));
/// assert!(config.has_attempts_after(9));
/// assert!(!config.has_attempts_after(10));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectRetryConfig {
    /// Total session attempts per cascade, including the first
    pub max_attempts: u32,
    /// Delay increment between attempts
    pub base_delay_ms: u64,
}

impl Default for ConnectRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            base_delay_ms: 10_000,
        }
    }
}

impl ConnectRetryConfig {
    pub fn new(max_attempts: u32, base_delay_ms: u64) -> Self {
        Self {
            max_attempts,
            base_delay_ms,
        }
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    /// Wait after failed attempt `attempt` (1-based) before the next one
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.base_delay().saturating_mul(attempt)
    }

    pub fn has_attempts_after(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Sum of every delay in a fully failing cascade
    pub fn total_backoff(&self) -> Duration {
        (1..self.max_attempts).fold(Duration::ZERO, |total, attempt| {
            total.saturating_add(self.delay_for_attempt(attempt))
        })
    }
}
