//! Backend SDK seam
//!
//! The voice backend is an external collaborator. [`VoiceBackend`],
//! [`Invite`] and [`CallHandle`] describe the commands the coordinator
//! issues against it; [`BackendEventAdapter`] is the single place that
//! knows the SDK's callback convention and turns each callback into one
//! event on the coordinator's inbox.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::call::{CallId, CallUpdate, LegId, LegStatus};
use crate::client::coordinator::CoreEvent;
use crate::error::ClientResult;
use crate::events::BackendEvent;

/// Identifier of an established backend session
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Authenticated user presence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    /// Backend service token; `None` when the login has not produced one
    pub token: Option<String>,
}

impl User {
    pub fn new(username: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            token: Some(token.into()),
        }
    }
}

/// Device push tokens required before a session counts as connected
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushTokens {
    pub voip: Vec<u8>,
    pub device: Vec<u8>,
}

/// Raw push notification payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushPayload(pub serde_json::Value);

/// Outbound call context handed to the backend
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CallContext {
    /// Callee
    pub to: String,
    #[serde(default)]
    pub custom: serde_json::Map<String, serde_json::Value>,
}

impl CallContext {
    pub fn to(callee: impl Into<String>) -> Self {
        Self {
            to: callee.into(),
            custom: serde_json::Map::new(),
        }
    }

    pub fn with_custom(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.custom.insert(key.into(), value);
        self
    }
}

/// Pending inbound call offer
#[async_trait]
pub trait Invite: fmt::Debug + Send + Sync {
    fn call_id(&self) -> CallId;

    /// Caller display string
    fn caller(&self) -> String;

    async fn answer(&self) -> ClientResult<Arc<dyn CallHandle>>;

    async fn reject(&self) -> ClientResult<()>;
}

/// Live call owned by the backend SDK
#[async_trait]
pub trait CallHandle: fmt::Debug + Send + Sync {
    fn call_id(&self) -> CallId;

    async fn hangup(&self) -> ClientResult<()>;
}

/// Commands issued against the voice backend
#[async_trait]
pub trait VoiceBackend: Send + Sync {
    async fn create_session(&self, token: &str) -> ClientResult<SessionId>;

    async fn register_device_push_token(
        &self,
        voip_token: &[u8],
        device_token: &[u8],
        sandbox: bool,
    ) -> ClientResult<()>;

    async fn start_outbound_call(&self, context: &CallContext) -> ClientResult<Arc<dyn CallHandle>>;

    /// Decode a push payload into an invite, if it carries one
    async fn decode_push_invite(
        &self,
        payload: &PushPayload,
        token: &str,
    ) -> Option<Arc<dyn Invite>>;
}

/// Translates SDK callbacks into coordinator events
///
/// Ids arrive as strings; callbacks with unparsable ids are logged and
/// dropped.
#[derive(Clone)]
pub struct BackendEventAdapter {
    tx: mpsc::UnboundedSender<CoreEvent>,
}

impl BackendEventAdapter {
    pub(crate) fn new(tx: mpsc::UnboundedSender<CoreEvent>) -> Self {
        Self { tx }
    }

    pub fn client_will_reconnect(&self) {
        self.send(BackendEvent::WillReconnect);
    }

    pub fn client_did_reconnect(&self) {
        self.send(BackendEvent::DidReconnect);
    }

    pub fn session_error(&self, reason: impl Into<String>) {
        self.send(BackendEvent::SessionError {
            reason: reason.into(),
        });
    }

    pub fn did_receive_invite(&self, call_id: &str, invite: Arc<dyn Invite>) {
        let Some(call_id) = parse_id::<CallId>("call_id", call_id) else {
            return;
        };
        self.send(BackendEvent::InviteReceived { call_id, invite });
    }

    pub fn did_receive_leg_status(&self, call_id: &str, leg_id: &str, status: &str) {
        let (Some(call), Some(leg)) = (
            parse_id::<CallId>("call_id", call_id),
            parse_id::<LegId>("leg_id", leg_id),
        ) else {
            return;
        };
        self.send(BackendEvent::LegStatus(CallUpdate::new(
            call,
            leg,
            LegStatus::from_backend(status),
        )));
    }

    pub fn did_receive_hangup(&self, call_id: &str, leg_id: &str) {
        let (Some(call), Some(leg)) = (
            parse_id::<CallId>("call_id", call_id),
            parse_id::<LegId>("leg_id", leg_id),
        ) else {
            return;
        };
        self.send(BackendEvent::Hangup(CallUpdate::new(
            call,
            leg,
            LegStatus::Completed,
        )));
    }

    fn send(&self, event: BackendEvent) {
        if self.tx.send(CoreEvent::Backend(event)).is_err() {
            debug!("Coordinator stopped, dropping backend callback");
        }
    }
}

fn parse_id<T: std::str::FromStr>(field: &'static str, raw: &str) -> Option<T> {
    match raw.parse() {
        Ok(id) => Some(id),
        Err(_) => {
            warn!(field, value = raw, "Dropping backend callback with invalid id");
            None
        }
    }
}
