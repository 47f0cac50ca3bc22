//! Event bus
//!
//! Typed broadcast channels for application actions, action results and
//! client events, plus the backend event vocabulary consumed by the
//! coordinator. The bus is an explicit value handed to each component;
//! there is no global notification centre.
//!
//! # Example
//!
//! ```rust,no_run
//! # use voxlink_client_core::{ClientManager, ClientEvent};
//! # use futures::StreamExt;
//! # async fn example(manager: ClientManager) {
//! let mut events = manager.subscribe_events();
//! while let Some(Ok(event)) = events.next().await {
//!     if let ClientEvent::CallStatusChanged { record, .. } = event {
//!         println!("{} is now {}", record.id, record.status);
//!     }
//! }
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, warn};

use crate::call::{CallId, CallRecord, CallStatus, CallUpdate, TransactionId};
use crate::client::config::duration_millis;
use crate::connectivity::Connection;
use crate::correlator::Correlator;
use crate::error::{ClientError, ClientResult};
use crate::sdk::{CallContext, Invite};

/// User intent issued by the application or the platform call UI
#[derive(Debug, Clone, PartialEq)]
pub enum ApplicationAction {
    NewOutboundCall { context: CallContext },
    AnswerInboundCall { call_id: CallId },
    RejectInboundCall { call_id: CallId },
    HangupCall { call_id: CallId },
}

impl ApplicationAction {
    pub fn call_id(&self) -> Option<CallId> {
        match self {
            ApplicationAction::NewOutboundCall { .. } => None,
            ApplicationAction::AnswerInboundCall { call_id }
            | ApplicationAction::RejectInboundCall { call_id }
            | ApplicationAction::HangupCall { call_id } => Some(*call_id),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ApplicationAction::NewOutboundCall { .. } => "new_outbound_call",
            ApplicationAction::AnswerInboundCall { .. } => "answer",
            ApplicationAction::RejectInboundCall { .. } => "reject",
            ApplicationAction::HangupCall { .. } => "hangup",
        }
    }
}

/// An action stamped with its transaction id
#[derive(Debug, Clone, PartialEq)]
pub struct ActionTransaction {
    pub action: ApplicationAction,
    pub transaction_id: TransactionId,
    pub call_id: Option<CallId>,
}

impl ActionTransaction {
    pub fn new(action: ApplicationAction) -> Self {
        Self::with_id(action, TransactionId::new_v4())
    }

    pub fn with_id(action: ApplicationAction, transaction_id: TransactionId) -> Self {
        let call_id = action.call_id();
        Self {
            action,
            transaction_id,
            call_id,
        }
    }
}

/// Successful outcome of an action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    OutboundStarted(CallId),
    Answered,
    Rejected,
    HungUp,
}

/// Terminal result of one transaction
#[derive(Debug, Clone, PartialEq)]
pub struct ActionResult {
    pub transaction_id: TransactionId,
    pub call_id: Option<CallId>,
    pub result: Result<ActionOutcome, ClientError>,
}

impl ActionResult {
    pub fn success(transaction: &ActionTransaction, outcome: ActionOutcome) -> Self {
        let call_id = match outcome {
            ActionOutcome::OutboundStarted(id) => Some(id),
            _ => transaction.call_id,
        };
        Self {
            transaction_id: transaction.transaction_id,
            call_id,
            result: Ok(outcome),
        }
    }

    /// Failure of `transaction`; the cause is wrapped as a command failure.
    pub fn failure(transaction: &ActionTransaction, cause: ClientError) -> Self {
        Self {
            transaction_id: transaction.transaction_id,
            call_id: transaction.call_id,
            result: Err(ClientError::command_failed(transaction.call_id, cause)),
        }
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Backend callbacks, as delivered by [`BackendEventAdapter`](crate::sdk::BackendEventAdapter)
#[derive(Debug, Clone)]
pub enum BackendEvent {
    WillReconnect,
    DidReconnect,
    SessionError { reason: String },
    InviteReceived { call_id: CallId, invite: Arc<dyn Invite> },
    LegStatus(CallUpdate),
    /// Remote hangup; carries a `completed` update for the hung-up leg
    Hangup(CallUpdate),
}

/// Events published to the application
#[derive(Debug, Clone)]
pub enum ClientEvent {
    ConnectionChanged {
        previous: Connection,
        current: Connection,
    },
    /// First `Connected` for the current user
    ConnectionStarted,
    CallCreated(CallRecord),
    CallStatusChanged {
        record: CallRecord,
        previous: CallStatus,
        timestamp: DateTime<Utc>,
    },
    CallError {
        call_id: Option<CallId>,
        error: ClientError,
    },
}

pub type ActionStream = BroadcastStream<ActionTransaction>;
pub type ResultStream = BroadcastStream<ActionResult>;
pub type EventStream = BroadcastStream<ClientEvent>;

#[derive(Clone)]
pub struct EventBus {
    actions: broadcast::Sender<ActionTransaction>,
    results: broadcast::Sender<ActionResult>,
    events: broadcast::Sender<ClientEvent>,
    correlator: Correlator,
}

impl EventBus {
    pub fn new(capacity: usize, command_timeout: Duration) -> Self {
        let (actions, _) = broadcast::channel(capacity);
        let (results, _) = broadcast::channel(capacity);
        let (events, _) = broadcast::channel(capacity);
        Self {
            actions,
            results,
            events,
            correlator: Correlator::new(command_timeout),
        }
    }

    pub fn correlator(&self) -> &Correlator {
        &self.correlator
    }

    /// Register the transaction and arm its timeout.
    ///
    /// If nothing resolves the transaction within the correlator's timeout, a
    /// `CommandFailed(Timeout)` result is published in its place. A result
    /// nobody waits on is discarded one further timeout later.
    pub fn begin_transaction(&self, transaction: &ActionTransaction) -> ClientResult<()> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| ClientError::channel_closed("no Tokio runtime to arm the command timeout"))?;
        if !self.correlator.register(transaction.transaction_id) {
            return Err(ClientError::config(format!(
                "transaction {} already in use",
                transaction.transaction_id
            )));
        }

        let bus = self.clone();
        let transaction = transaction.clone();
        let timeout = self.correlator.timeout();
        let millis = duration_millis(timeout);
        runtime.spawn(async move {
            tokio::time::sleep(timeout).await;
            let timed_out = ActionResult::failure(&transaction, ClientError::Timeout { millis });
            if bus.publish_result(timed_out) {
                warn!(
                    transaction_id = %transaction.transaction_id,
                    action = transaction.action.name(),
                    timeout_ms = millis,
                    "No result in time, synthesized failure"
                );
            }

            tokio::time::sleep(timeout).await;
            if bus.correlator.discard(&transaction.transaction_id) {
                debug!(
                    transaction_id = %transaction.transaction_id,
                    action = transaction.action.name(),
                    "Discarded result nobody waited for"
                );
            }
        });
        Ok(())
    }

    pub fn publish_action(&self, transaction: ActionTransaction) {
        let _ = self.actions.send(transaction);
    }

    /// Resolve and broadcast a result. Late results are dropped and
    /// `false` is returned.
    pub fn publish_result(&self, result: ActionResult) -> bool {
        if !self.correlator.resolve(result.clone()) {
            return false;
        }
        if let Err(error) = &result.result {
            debug!(
                transaction_id = %result.transaction_id,
                category = error.category(),
                "Command failed: {}", error
            );
            self.publish_event(ClientEvent::CallError {
                call_id: result.call_id,
                error: error.clone(),
            });
        }
        let _ = self.results.send(result);
        true
    }

    pub fn publish_event(&self, event: ClientEvent) {
        let _ = self.events.send(event);
    }

    pub fn subscribe_actions(&self) -> ActionStream {
        BroadcastStream::new(self.actions.subscribe())
    }

    pub fn subscribe_results(&self) -> ResultStream {
        BroadcastStream::new(self.results.subscribe())
    }

    pub fn subscribe_events(&self) -> EventStream {
        BroadcastStream::new(self.events.subscribe())
    }
}
