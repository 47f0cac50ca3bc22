//! Client coordination layer
//!
//! [`ClientBuilder`] spawns the coordinator task and returns a
//! [`ClientManager`] handle to it.

pub mod builder;
pub mod config;
pub(crate) mod coordinator;
pub mod manager;
pub mod recovery;
pub mod stream;

pub use builder::ClientBuilder;
pub use config::ClientConfig;
pub use coordinator::ActiveCallMap;
pub use manager::{ClientManager, NewCallStream};
pub use recovery::ConnectRetryConfig;
pub use stream::CallStream;

#[cfg(test)]
mod tests;
