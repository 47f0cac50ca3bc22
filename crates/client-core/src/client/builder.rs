//! Client builder
//!
//! ```rust,no_run
//! # use std::sync::Arc;
//! # use std::time::Duration;
//! # use voxlink_client_core::{ClientBuilder, ClientConfig, VoiceBackend};
//! # async fn example(backend: Arc<dyn VoiceBackend>) {
//! let client = ClientBuilder::new()
//!     .with_config(ClientConfig::new().with_command_timeout(Duration::from_secs(5)))
//!     .with_backend(backend)
//!     .build()
//!     .expect("Failed to build client");
//! # }
//! ```

use std::sync::Arc;
use std::collections::HashMap;

use tokio::sync::{mpsc, watch};

use super::config::ClientConfig;
use super::coordinator::Coordinator;
use super::manager::ClientManager;
use crate::connectivity::Connection;
use crate::error::{ClientError, ClientResult};
use crate::events::EventBus;
use crate::sdk::VoiceBackend;

#[derive(Default)]
pub struct ClientBuilder {
    config: ClientConfig,
    backend: Option<Arc<dyn VoiceBackend>>,
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_backend(mut self, backend: Arc<dyn VoiceBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Validate the configuration and spawn the coordinator.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn build(self) -> ClientResult<ClientManager> {
        self.config.validate()?;
        let backend = self
            .backend
            .ok_or_else(|| ClientError::config("a voice backend is required"))?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| ClientError::config("ClientBuilder::build requires a Tokio runtime"))?;

        let bus = EventBus::new(self.config.event_capacity, self.config.command_timeout());
        let (tx, rx) = mpsc::unbounded_channel();
        let (connection_tx, connection_rx) = watch::channel(Connection::default());
        let (calls_tx, calls_rx) = watch::channel(Arc::new(HashMap::new()));

        let coordinator = Coordinator::new(
            self.config.clone(),
            backend,
            bus.clone(),
            rx,
            tx.downgrade(),
            connection_tx,
            calls_tx,
        );
        let task = runtime.spawn(coordinator.run());

        Ok(ClientManager::new(
            self.config,
            tx,
            bus,
            connection_rx,
            calls_rx,
            task,
        ))
    }
}
