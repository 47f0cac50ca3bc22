//! Shared mocks for client-core integration tests
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use voxlink_client_core::{
    CallActionKind, CallActionRequest, CallContext, CallHandle, CallId, CallManagement,
    ClientBuilder, ClientConfig, ClientError, ClientManager, ClientResult, Connection,
    EndedReason, Invite, OutgoingCallProgress, PendingCallAction, PushPayload, PushTokens,
    SessionId, TransactionId, User, VoiceBackend,
};
use voxlink_infra_common::{log_welcome, try_setup_logging, LoggingConfig};

pub fn init_logging() {
    if try_setup_logging(LoggingConfig::default()) {
        log_welcome("voxlink-client-core tests", voxlink_client_core::VERSION);
    }
}

pub fn user() -> User {
    User::new("alice", "service-token")
}

pub fn push_tokens() -> PushTokens {
    PushTokens {
        voip: b"voip-token".to_vec(),
        device: b"device-token".to_vec(),
    }
}

pub fn client(backend: Arc<MockBackend>) -> ClientManager {
    client_with_config(backend, ClientConfig::default())
}

pub fn client_with_config(backend: Arc<MockBackend>, config: ClientConfig) -> ClientManager {
    init_logging();
    ClientBuilder::new()
        .with_config(config)
        .with_backend(backend)
        .build()
        .expect("client should build")
}

/// Poll `check` until it holds, failing the test after two seconds.
pub async fn eventually(what: &str, check: impl Fn() -> bool) {
    for _ in 0..400 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {}", what);
}

pub async fn wait_for_connection(
    rx: &mut watch::Receiver<Connection>,
    expected: Connection,
) -> Connection {
    let reached = match tokio::time::timeout(
        Duration::from_secs(120),
        rx.wait_for(|connection| *connection == expected),
    )
    .await
    {
        Ok(Ok(connection)) => Some(connection.clone()),
        _ => None,
    };
    match reached {
        Some(connection) => connection,
        None => panic!("connection never became {:?}, last {:?}", expected, *rx.borrow()),
    }
}

// Backend

#[derive(Debug)]
pub struct MockHandle {
    pub id: CallId,
    pub hangups: AtomicUsize,
}

impl MockHandle {
    pub fn new(id: CallId) -> Arc<Self> {
        Arc::new(Self {
            id,
            hangups: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl CallHandle for MockHandle {
    fn call_id(&self) -> CallId {
        self.id
    }

    async fn hangup(&self) -> ClientResult<()> {
        self.hangups.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub enum InviteBehavior {
    Succeed,
    Fail,
    /// Fails the first answer or reject, then succeeds
    FailOnce,
    /// Never completes
    Hang,
    /// Succeeds after the delay
    Delay(Duration),
}

#[derive(Debug)]
pub struct MockInvite {
    pub id: CallId,
    pub caller: String,
    pub behavior: InviteBehavior,
    pub answers: AtomicUsize,
    pub rejects: AtomicUsize,
    /// Handles returned by successful answers
    pub handles: Mutex<Vec<Arc<MockHandle>>>,
}

impl MockInvite {
    pub fn new(id: CallId, caller: &str) -> Arc<Self> {
        Self::with_behavior(id, caller, InviteBehavior::Succeed)
    }

    pub fn with_behavior(id: CallId, caller: &str, behavior: InviteBehavior) -> Arc<Self> {
        Arc::new(Self {
            id,
            caller: caller.to_string(),
            behavior,
            answers: AtomicUsize::new(0),
            rejects: AtomicUsize::new(0),
            handles: Mutex::new(Vec::new()),
        })
    }

    async fn behave(&self) -> ClientResult<()> {
        match self.behavior {
            InviteBehavior::Succeed => Ok(()),
            InviteBehavior::Fail => Err(ClientError::backend("invite expired")),
            InviteBehavior::FailOnce => {
                let attempts = self.answers.load(Ordering::SeqCst) + self.rejects.load(Ordering::SeqCst);
                if attempts == 1 {
                    Err(ClientError::backend("invite expired"))
                } else {
                    Ok(())
                }
            }
            InviteBehavior::Hang => std::future::pending().await,
            InviteBehavior::Delay(delay) => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
        }
    }
}

#[async_trait]
impl Invite for MockInvite {
    fn call_id(&self) -> CallId {
        self.id
    }

    fn caller(&self) -> String {
        self.caller.clone()
    }

    async fn answer(&self) -> ClientResult<Arc<dyn CallHandle>> {
        self.answers.fetch_add(1, Ordering::SeqCst);
        self.behave().await?;
        let handle = MockHandle::new(self.id);
        self.handles.lock().unwrap().push(Arc::clone(&handle));
        Ok(handle as Arc<dyn CallHandle>)
    }

    async fn reject(&self) -> ClientResult<()> {
        self.rejects.fetch_add(1, Ordering::SeqCst);
        self.behave().await
    }
}

#[derive(Default)]
pub struct MockBackend {
    session_failures: Mutex<VecDeque<ClientError>>,
    push_failure: Mutex<Option<ClientError>>,
    push_invites: Mutex<VecDeque<Arc<MockInvite>>>,
    pub handles: Mutex<Vec<Arc<MockHandle>>>,
    pub session_calls: AtomicUsize,
    pub push_registrations: AtomicUsize,
    pub decoded: AtomicUsize,
}

impl MockBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The next `count` session attempts fail with `reason`.
    pub fn fail_sessions(&self, count: usize, reason: &str) {
        let mut failures = self.session_failures.lock().unwrap();
        for _ in 0..count {
            failures.push_back(ClientError::session(reason));
        }
    }

    pub fn fail_push_registration(&self) {
        *self.push_failure.lock().unwrap() = Some(ClientError::backend("push rejected"));
    }

    pub fn queue_push_invite(&self, invite: Arc<MockInvite>) {
        self.push_invites.lock().unwrap().push_back(invite);
    }

    pub fn handle(&self, id: CallId) -> Option<Arc<MockHandle>> {
        self.handles
            .lock()
            .unwrap()
            .iter()
            .find(|handle| handle.id == id)
            .cloned()
    }
}

#[async_trait]
impl VoiceBackend for MockBackend {
    async fn create_session(&self, token: &str) -> ClientResult<SessionId> {
        let attempt = self.session_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(error) = self.session_failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        Ok(SessionId(format!("{}-{}", token, attempt)))
    }

    async fn register_device_push_token(
        &self,
        voip_token: &[u8],
        device_token: &[u8],
        _sandbox: bool,
    ) -> ClientResult<()> {
        assert!(!voip_token.is_empty() && !device_token.is_empty());
        self.push_registrations.fetch_add(1, Ordering::SeqCst);
        match self.push_failure.lock().unwrap().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn start_outbound_call(&self, context: &CallContext) -> ClientResult<Arc<dyn CallHandle>> {
        if context.to.is_empty() {
            return Err(ClientError::backend("missing callee"));
        }
        let handle = MockHandle::new(CallId::new_v4());
        self.handles.lock().unwrap().push(Arc::clone(&handle));
        Ok(handle as Arc<dyn CallHandle>)
    }

    async fn decode_push_invite(&self, _payload: &PushPayload, _token: &str) -> Option<Arc<dyn Invite>> {
        self.decoded.fetch_add(1, Ordering::SeqCst);
        let invite = self.push_invites.lock().unwrap().pop_front()?;
        Some(invite as Arc<dyn Invite>)
    }
}

// Platform call management

#[derive(Debug, Clone, PartialEq)]
pub enum Report {
    Incoming(CallId, String),
    Outgoing(CallId, OutgoingCallProgress),
    Ended(CallId, EndedReason),
}

#[derive(Default)]
pub struct RecordingCallManagement {
    pub reports: Mutex<Vec<Report>>,
    pub requests: Mutex<Vec<CallActionRequest>>,
}

impl RecordingCallManagement {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reports(&self) -> Vec<Report> {
        self.reports.lock().unwrap().clone()
    }

    pub fn requests(&self) -> Vec<CallActionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_for(&self, call_id: CallId, kind: CallActionKind) -> Option<CallActionRequest> {
        self.requests()
            .into_iter()
            .find(|request| request.call_id == call_id && request.kind == kind)
    }
}

#[async_trait]
impl CallManagement for RecordingCallManagement {
    async fn report_new_incoming_call(&self, call_id: CallId, caller: &str) -> ClientResult<()> {
        self.reports
            .lock()
            .unwrap()
            .push(Report::Incoming(call_id, caller.to_string()));
        Ok(())
    }

    fn report_outgoing_call(&self, call_id: CallId, progress: OutgoingCallProgress) {
        self.reports
            .lock()
            .unwrap()
            .push(Report::Outgoing(call_id, progress));
    }

    fn report_call_ended(&self, call_id: CallId, reason: EndedReason) {
        self.reports.lock().unwrap().push(Report::Ended(call_id, reason));
    }

    async fn request_transaction(&self, request: CallActionRequest) -> ClientResult<()> {
        self.requests.lock().unwrap().push(request);
        Ok(())
    }
}

/// Outcome of a pending platform action: `Some(true)` fulfilled, `Some(false)` failed
pub type ActionOutcomeSlot = Arc<Mutex<Option<bool>>>;

pub struct MockPendingAction {
    pub transaction_id: TransactionId,
    pub call_id: CallId,
    pub kind: CallActionKind,
    pub outcome: ActionOutcomeSlot,
}

impl MockPendingAction {
    pub fn new(
        transaction_id: TransactionId,
        call_id: CallId,
        kind: CallActionKind,
    ) -> (Box<Self>, ActionOutcomeSlot) {
        let outcome = Arc::new(Mutex::new(None));
        let action = Box::new(Self {
            transaction_id,
            call_id,
            kind,
            outcome: Arc::clone(&outcome),
        });
        (action, outcome)
    }
}

impl PendingCallAction for MockPendingAction {
    fn transaction_id(&self) -> TransactionId {
        self.transaction_id
    }

    fn call_id(&self) -> CallId {
        self.call_id
    }

    fn kind(&self) -> CallActionKind {
        self.kind
    }

    fn fulfill(self: Box<Self>) {
        *self.outcome.lock().unwrap() = Some(true);
    }

    fn fail(self: Box<Self>) {
        *self.outcome.lock().unwrap() = Some(false);
    }
}
