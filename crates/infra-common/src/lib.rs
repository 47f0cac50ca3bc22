//! Common infrastructure for the voxlink crates.
//!
//! Currently this is the logging layer: every crate logs through
//! `tracing`, and applications (or integration tests) install a subscriber
//! once through [`logging::setup_logging`] or [`logging::try_setup_logging`].

pub mod errors;
pub mod logging;

pub use errors::{InfraError, Result};
pub use logging::{LoggingConfig, log_welcome, parse_log_level, setup_logging, try_setup_logging};
