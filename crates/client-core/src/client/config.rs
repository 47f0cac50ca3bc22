//! Client configuration
//!
//! [`ClientConfig`] can be built in code with the `with_*` methods or
//! loaded from TOML. Missing keys take their defaults.
//!
//! ```rust
//! use voxlink_client_core::client::config::ClientConfig;
//!
//! let config = ClientConfig::from_toml_str(r#"
//!     command_timeout_ms = 5000
//!     push_sandbox = false
//!
//!     [connect_retry]
//!     max_attempts = 3
//! "#).unwrap();
//!
//! assert_eq!(config.command_timeout_ms, 5000);
//! assert_eq!(config.connect_retry.max_attempts, 3);
//! assert_eq!(config.connect_retry.base_delay_ms, 10_000);
//! assert_eq!(config.event_capacity, 1000);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::recovery::ConnectRetryConfig;
use crate::error::{ClientError, ClientResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Bound on waiting for a command result before a failure is synthesized
    pub command_timeout_ms: u64,
    /// Buffer size of each bus channel
    pub event_capacity: usize,
    /// Buffer size of each per-call record stream
    pub call_stream_capacity: usize,
    /// Register push tokens against the sandbox environment
    pub push_sandbox: bool,
    /// Terminated call ids remembered for dropping late events
    pub finished_call_memory: usize,
    pub connect_retry: ConnectRetryConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            command_timeout_ms: 10_000,
            event_capacity: 1000,
            call_stream_capacity: 64,
            push_sandbox: true,
            finished_call_memory: 256,
            connect_retry: ConnectRetryConfig::default(),
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_toml_str(source: &str) -> ClientResult<Self> {
        let config: ClientConfig = toml::from_str(source)
            .map_err(|e| ClientError::config(format!("invalid TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> ClientResult<String> {
        toml::to_string(self).map_err(|e| ClientError::config(e.to_string()))
    }

    pub fn validate(&self) -> ClientResult<()> {
        if self.command_timeout_ms == 0 {
            return Err(ClientError::config("command_timeout_ms must be positive"));
        }
        if self.connect_retry.max_attempts == 0 {
            return Err(ClientError::config("connect_retry.max_attempts must be positive"));
        }
        if self.event_capacity == 0 || self.call_stream_capacity == 0 {
            return Err(ClientError::config("channel capacities must be positive"));
        }
        Ok(())
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout_ms = duration_millis(timeout);
        self
    }

    pub fn with_connect_retry(mut self, max_attempts: u32, base_delay: Duration) -> Self {
        self.connect_retry = ConnectRetryConfig::new(max_attempts, duration_millis(base_delay));
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    pub fn with_call_stream_capacity(mut self, capacity: usize) -> Self {
        self.call_stream_capacity = capacity;
        self
    }

    pub fn with_push_sandbox(mut self, sandbox: bool) -> Self {
        self.push_sandbox = sandbox;
        self
    }

    pub fn with_finished_call_memory(mut self, calls: usize) -> Self {
        self.finished_call_memory = calls;
        self
    }
}

/// Whole milliseconds in `duration`, saturating at `u64::MAX`
pub(crate) fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
