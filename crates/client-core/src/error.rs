//! Error types for client-core operations
//!
//! Backend failures never cross the event timeline as panics: they are
//! captured as [`ClientError`] values, wrapped in [`ClientError::CommandFailed`]
//! for the command that issued them, and delivered as action results.
//! `ClientError` is `Clone` so a single result can be fanned out to every
//! subscriber of the result stream.

use thiserror::Error;

use crate::call::{CallId, TransactionId};

/// Result type for client-core operations
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur while coordinating calls and connectivity
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// Push tokens could not be registered with the backend
    #[error("Push notifications are not registered")]
    PushNotRegistered,

    /// No valid service token for the current user
    #[error("User is not authorised")]
    Unauthorised,

    /// The backend session failed or could not be created
    #[error("Session error: {reason}")]
    SessionError { reason: String },

    /// A call command (answer, reject, hangup, outbound call) failed
    #[error("Command failed for call {}: {source}", display_call(.call_id))]
    CommandFailed {
        call_id: Option<CallId>,
        #[source]
        source: Box<ClientError>,
    },

    /// Cause could not be determined, or the call is not known
    #[error("Unknown error")]
    Unknown,

    /// No result arrived within the correlation bound
    #[error("Operation timed out after {millis} ms")]
    Timeout { millis: u64 },

    /// Failure reported by the backend SDK
    #[error("Backend error: {message}")]
    Backend { message: String },

    /// Transaction was never registered or its result was already consumed
    #[error("Unknown transaction: {transaction_id}")]
    UnknownTransaction { transaction_id: TransactionId },

    /// Invalid client configuration
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// The coordinator is no longer running
    #[error("Channel closed: {message}")]
    ChannelClosed { message: String },
}

fn display_call(call_id: &Option<CallId>) -> String {
    call_id
        .map(|id| id.to_string())
        .unwrap_or_else(|| "<none>".to_string())
}

impl ClientError {
    pub fn session(reason: impl Into<String>) -> Self {
        Self::SessionError {
            reason: reason.into(),
        }
    }

    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn channel_closed(message: impl Into<String>) -> Self {
        Self::ChannelClosed {
            message: message.into(),
        }
    }

    /// Wrap `cause` as the failure of a command against `call_id`.
    ///
    /// An already wrapped error keeps its original cause; only the call id
    /// is filled in when missing.
    pub fn command_failed(call_id: Option<CallId>, cause: ClientError) -> Self {
        match cause {
            ClientError::CommandFailed {
                call_id: inner_id,
                source,
            } => ClientError::CommandFailed {
                call_id: call_id.or(inner_id),
                source,
            },
            other => ClientError::CommandFailed {
                call_id,
                source: Box::new(other),
            },
        }
    }

    /// The error a command gets when its call id is not in the registry
    pub fn unknown_call(call_id: CallId) -> Self {
        Self::command_failed(Some(call_id), ClientError::Unknown)
    }

    /// Innermost cause, looking through `CommandFailed` wrappers
    pub fn root_cause(&self) -> &ClientError {
        match self {
            ClientError::CommandFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Call id attached to a command failure, if any
    pub fn call_id(&self) -> Option<CallId> {
        match self {
            ClientError::CommandFailed { call_id, .. } => *call_id,
            _ => None,
        }
    }

    /// Whether retrying the operation may succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            ClientError::SessionError { .. }
            | ClientError::Backend { .. }
            | ClientError::Timeout { .. } => true,
            ClientError::CommandFailed { source, .. } => source.is_recoverable(),
            _ => false,
        }
    }

    /// Short category name used in structured logs
    pub fn category(&self) -> &'static str {
        match self {
            ClientError::PushNotRegistered => "push",
            ClientError::Unauthorised => "auth",
            ClientError::SessionError { .. } => "session",
            ClientError::CommandFailed { .. } => "command",
            ClientError::Unknown => "unknown",
            ClientError::Timeout { .. } => "timeout",
            ClientError::Backend { .. } => "backend",
            ClientError::UnknownTransaction { .. } => "transaction",
            ClientError::Configuration { .. } => "config",
            ClientError::ChannelClosed { .. } => "internal",
        }
    }
}
