//! Application-facing client handle
//!
//! [`ClientManager`] is a cheap, cloneable front for the coordinator task.
//! Commands are stamped with a transaction id, registered with the
//! correlator and enqueued; state is read from `watch` snapshots.
//!
//! # Examples
//!
//! ```rust,no_run
//! # use std::sync::Arc;
//! # use voxlink_client_core::{ClientBuilder, VoiceBackend, User, CallContext};
//! # async fn example(backend: Arc<dyn VoiceBackend>) -> voxlink_client_core::ClientResult<()> {
//! let client = ClientBuilder::new().with_backend(backend).build()?;
//! client.set_user(Some(User::new("alice", "service-token")))?;
//!
//! let tx = client.start_outbound_call(CallContext::to("bob"))?;
//! let result = client.wait_for_result(tx.transaction_id).await?;
//! println!("outbound call: {:?}", result.result);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info};

use super::config::ClientConfig;
use super::coordinator::{ActiveCallMap, CoreEvent};
use super::stream::CallStream;
use crate::call::{CallId, CallRecord, TransactionId};
use crate::connectivity::{Connection, ConnectivityInput};
use crate::error::{ClientError, ClientResult};
use crate::events::{
    ActionResult, ActionStream, ActionTransaction, ApplicationAction, EventBus, EventStream,
    ResultStream,
};
use crate::sdk::{BackendEventAdapter, CallContext, PushPayload, PushTokens, User};

/// Stream of per-call record streams, one per newly created call
pub type NewCallStream = UnboundedReceiverStream<CallStream>;

#[derive(Clone)]
pub struct ClientManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    config: ClientConfig,
    tx: mpsc::UnboundedSender<CoreEvent>,
    bus: EventBus,
    connection: watch::Receiver<Connection>,
    calls: watch::Receiver<ActiveCallMap>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ClientManager {
    pub(crate) fn new(
        config: ClientConfig,
        tx: mpsc::UnboundedSender<CoreEvent>,
        bus: EventBus,
        connection: watch::Receiver<Connection>,
        calls: watch::Receiver<ActiveCallMap>,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                config,
                tx,
                bus,
                connection,
                calls,
                task: Mutex::new(Some(task)),
            }),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    // Commands

    /// Stamp `action` with a fresh transaction id and dispatch it.
    pub fn dispatch(&self, action: ApplicationAction) -> ClientResult<ActionTransaction> {
        self.dispatch_with_id(action, TransactionId::new_v4())
    }

    /// Dispatch with a caller-chosen transaction id, such as one issued by the
    /// platform call UI.
    pub fn dispatch_with_id(
        &self,
        action: ApplicationAction,
        transaction_id: TransactionId,
    ) -> ClientResult<ActionTransaction> {
        let transaction = ActionTransaction::with_id(action, transaction_id);
        self.inner.bus.begin_transaction(&transaction)?;

        if self
            .inner
            .tx
            .send(CoreEvent::Action(transaction.clone()))
            .is_err()
        {
            let error = ClientError::channel_closed("coordinator stopped");
            self.inner
                .bus
                .publish_result(ActionResult::failure(&transaction, error.clone()));
            return Err(error);
        }

        debug!(
            transaction_id = %transaction.transaction_id,
            action = transaction.action.name(),
            "Action dispatched"
        );
        self.inner.bus.publish_action(transaction.clone());
        Ok(transaction)
    }

    pub fn start_outbound_call(&self, context: CallContext) -> ClientResult<ActionTransaction> {
        self.dispatch(ApplicationAction::NewOutboundCall { context })
    }

    pub fn answer_call(&self, call_id: CallId) -> ClientResult<ActionTransaction> {
        self.dispatch(ApplicationAction::AnswerInboundCall { call_id })
    }

    pub fn reject_call(&self, call_id: CallId) -> ClientResult<ActionTransaction> {
        self.dispatch(ApplicationAction::RejectInboundCall { call_id })
    }

    pub fn hangup_call(&self, call_id: CallId) -> ClientResult<ActionTransaction> {
        self.dispatch(ApplicationAction::HangupCall { call_id })
    }

    /// Wait for the single result of a dispatched transaction.
    ///
    /// Each id can be waited on once; later calls fail with
    /// [`ClientError::UnknownTransaction`]. So do calls made more than twice
    /// the command timeout after dispatch, once the unclaimed result has been
    /// discarded.
    pub async fn wait_for_result(&self, transaction_id: TransactionId) -> ClientResult<ActionResult> {
        self.inner.bus.correlator().wait(transaction_id).await
    }

    /// Whether a transaction with this id was dispatched and its result not yet consumed
    pub fn is_transaction_known(&self, transaction_id: &TransactionId) -> bool {
        self.inner.bus.correlator().is_registered(transaction_id)
    }

    // Connectivity inputs

    pub fn set_user(&self, user: Option<User>) -> ClientResult<()> {
        self.send(CoreEvent::Connectivity(ConnectivityInput::UserChanged(user)))
    }

    pub fn enter_foreground(&self) -> ClientResult<()> {
        self.send(CoreEvent::Connectivity(ConnectivityInput::Foreground))
    }

    pub fn update_push_tokens(&self, tokens: PushTokens) -> ClientResult<()> {
        self.send(CoreEvent::Connectivity(ConnectivityInput::PushTokensUpdated(
            tokens,
        )))
    }

    /// Hand a push payload to the backend decoder; a decoded invite joins
    /// the invite registry like a live one.
    pub fn deliver_push(&self, payload: PushPayload) -> ClientResult<()> {
        self.send(CoreEvent::Push(payload))
    }

    pub fn event_adapter(&self) -> BackendEventAdapter {
        BackendEventAdapter::new(self.inner.tx.clone())
    }

    // State

    pub fn connection(&self) -> Connection {
        self.inner.connection.borrow().clone()
    }

    pub fn watch_connection(&self) -> watch::Receiver<Connection> {
        self.inner.connection.clone()
    }

    pub fn active_calls(&self) -> ActiveCallMap {
        Arc::clone(&self.inner.calls.borrow())
    }

    pub fn watch_active_calls(&self) -> watch::Receiver<ActiveCallMap> {
        self.inner.calls.clone()
    }

    pub fn call(&self, call_id: &CallId) -> Option<CallRecord> {
        self.inner.calls.borrow().get(call_id).cloned()
    }

    /// Streams for calls created after this subscription
    pub fn subscribe_new_calls(&self) -> ClientResult<NewCallStream> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.send(CoreEvent::SubscribeNewCalls(tx))?;
        Ok(UnboundedReceiverStream::new(rx))
    }

    pub fn subscribe_events(&self) -> EventStream {
        self.inner.bus.subscribe_events()
    }

    pub fn subscribe_results(&self) -> ResultStream {
        self.inner.bus.subscribe_results()
    }

    pub fn subscribe_actions(&self) -> ActionStream {
        self.inner.bus.subscribe_actions()
    }

    /// Stop the coordinator and wait for it to exit.
    pub async fn shutdown(&self) -> ClientResult<()> {
        let Some(task) = self.inner.task.lock().await.take() else {
            return Ok(());
        };
        // Already stopped if the send fails; joining still completes.
        let _ = self.inner.tx.send(CoreEvent::Shutdown);
        task.await
            .map_err(|e| ClientError::channel_closed(format!("coordinator task failed: {}", e)))?;
        info!("Client shut down");
        Ok(())
    }

    fn send(&self, event: CoreEvent) -> ClientResult<()> {
        self.inner
            .tx
            .send(event)
            .map_err(|_| ClientError::channel_closed("coordinator stopped"))
    }
}
