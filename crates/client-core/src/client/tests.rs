//! Builder and manager lifecycle tests

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::*;
use crate::call::CallId;
use crate::connectivity::Connection;
use crate::error::{ClientError, ClientResult};
use crate::events::ApplicationAction;
use crate::sdk::{CallContext, CallHandle, Invite, PushPayload, SessionId, VoiceBackend};

struct IdleBackend;

#[async_trait]
impl VoiceBackend for IdleBackend {
    async fn create_session(&self, _token: &str) -> ClientResult<SessionId> {
        Err(ClientError::Unauthorised)
    }

    async fn register_device_push_token(&self, _: &[u8], _: &[u8], _: bool) -> ClientResult<()> {
        Ok(())
    }

    async fn start_outbound_call(&self, _context: &CallContext) -> ClientResult<Arc<dyn CallHandle>> {
        Err(ClientError::backend("offline"))
    }

    async fn decode_push_invite(&self, _: &PushPayload, _: &str) -> Option<Arc<dyn Invite>> {
        None
    }
}

#[test]
fn test_build_requires_backend() {
    let err = ClientBuilder::new().build().err().unwrap();
    assert!(matches!(err, ClientError::Configuration { .. }));
}

#[test]
fn test_build_requires_runtime() {
    let err = ClientBuilder::new()
        .with_backend(Arc::new(IdleBackend))
        .build()
        .err()
        .unwrap();
    assert!(err.to_string().contains("Tokio runtime"));
}

#[tokio::test]
async fn test_build_rejects_invalid_config() {
    let err = ClientBuilder::new()
        .with_config(ClientConfig::new().with_call_stream_capacity(0))
        .with_backend(Arc::new(IdleBackend))
        .build()
        .err()
        .unwrap();
    assert!(matches!(err, ClientError::Configuration { .. }));
}

#[tokio::test]
async fn test_initial_state() {
    let client = ClientBuilder::new()
        .with_backend(Arc::new(IdleBackend))
        .build()
        .unwrap();

    assert_eq!(client.connection(), Connection::Disconnected(None));
    assert!(client.active_calls().is_empty());
    assert_eq!(client.config().command_timeout(), Duration::from_secs(10));
    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_backend_failure_becomes_failed_result() {
    let client = ClientBuilder::new()
        .with_backend(Arc::new(IdleBackend))
        .build()
        .unwrap();

    let tx = client.start_outbound_call(CallContext::to("bob")).unwrap();
    let result = client.wait_for_result(tx.transaction_id).await.unwrap();
    let err = result.result.unwrap_err();
    assert_eq!(err.root_cause(), &ClientError::backend("offline"));
    assert!(client.active_calls().is_empty());
}

#[tokio::test]
async fn test_commands_after_shutdown_fail() {
    let client = ClientBuilder::new()
        .with_backend(Arc::new(IdleBackend))
        .build()
        .unwrap();
    client.shutdown().await.unwrap();
    // Second shutdown is a no-op.
    client.shutdown().await.unwrap();

    let err = client
        .dispatch(ApplicationAction::HangupCall {
            call_id: CallId::new_v4(),
        })
        .unwrap_err();
    assert!(matches!(err, ClientError::ChannelClosed { .. }));
    assert!(client.set_user(None).is_err());
}
