//! Platform call-management bridge
//!
//! The platform call UI (lock-screen answer, native end button) has its
//! own transaction model: every answer or end must be requested from it,
//! then performed by it, and every performed action must be fulfilled or
//! failed. [`CallUiBridge`] keeps the two sides in step:
//!
//! - actions dispatched by the app are requested from the platform with
//!   the same transaction id
//! - performed platform actions wait for the matching [`ActionResult`]
//!   and fulfil or fail accordingly
//! - call record streams drive the platform's incoming/outgoing/ended
//!   reports
//!
//! [`ActionResult`]: crate::events::ActionResult

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use crate::call::{CallDirection, CallId, CallRecord, CallStatus, TransactionId};
use crate::client::{CallStream, ClientManager};
use crate::error::ClientResult;
use crate::events::{ActionTransaction, ApplicationAction};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallActionKind {
    Answer,
    End,
    StartOutbound,
}

/// A transaction requested from the platform call UI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallActionRequest {
    pub transaction_id: TransactionId,
    pub call_id: CallId,
    pub kind: CallActionKind,
    /// Callee, for outbound starts
    pub handle: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutgoingCallProgress {
    Connecting,
    Connected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndedReason {
    RemoteEnded,
    Unanswered,
    Failed,
}

/// Platform call-management subsystem
#[async_trait]
pub trait CallManagement: Send + Sync {
    async fn report_new_incoming_call(&self, call_id: CallId, caller: &str) -> ClientResult<()>;

    fn report_outgoing_call(&self, call_id: CallId, progress: OutgoingCallProgress);

    fn report_call_ended(&self, call_id: CallId, reason: EndedReason);

    async fn request_transaction(&self, request: CallActionRequest) -> ClientResult<()>;
}

/// An action the platform performed and now waits on
pub trait PendingCallAction: Send {
    fn transaction_id(&self) -> TransactionId;

    fn call_id(&self) -> CallId;

    fn kind(&self) -> CallActionKind;

    fn fulfill(self: Box<Self>);

    fn fail(self: Box<Self>);
}

pub struct CallUiBridge {
    manager: ClientManager,
    platform_originated: Arc<DashMap<TransactionId, ()>>,
    tasks: Vec<JoinHandle<()>>,
}

impl CallUiBridge {
    /// Subscribe to the manager's actions and new calls and start
    /// reporting to `platform`.
    pub fn attach(manager: &ClientManager, platform: Arc<dyn CallManagement>) -> ClientResult<Self> {
        let platform_originated = Arc::new(DashMap::new());
        let mut new_calls = manager.subscribe_new_calls()?;
        let mut actions = manager.subscribe_actions();

        let requests = {
            let platform = Arc::clone(&platform);
            let platform_originated = Arc::clone(&platform_originated);
            tokio::spawn(async move {
                while let Some(item) = actions.next().await {
                    let transaction = match item {
                        Ok(transaction) => transaction,
                        Err(e) => {
                            warn!(error = %e, "Action stream lagged");
                            continue;
                        }
                    };
                    if platform_originated.remove(&transaction.transaction_id).is_some() {
                        continue;
                    }
                    request_from_platform(platform.as_ref(), &transaction).await;
                }
            })
        };

        // Per-call reporters live in the set and are aborted with it.
        let reports = tokio::spawn(async move {
            let mut reporters = JoinSet::new();
            loop {
                tokio::select! {
                    stream = new_calls.next() => match stream {
                        Some(stream) => {
                            reporters.spawn(report_call(Arc::clone(&platform), stream));
                        }
                        None => break,
                    },
                    Some(joined) = reporters.join_next(), if !reporters.is_empty() => {
                        if let Err(e) = joined {
                            warn!(error = %e, "Call reporter ended abnormally");
                        }
                    }
                }
            }
            while let Some(joined) = reporters.join_next().await {
                if let Err(e) = joined {
                    warn!(error = %e, "Call reporter ended abnormally");
                }
            }
        });

        Ok(Self {
            manager: manager.clone(),
            platform_originated,
            tasks: vec![requests, reports],
        })
    }

    /// Complete a performed answer or end action.
    ///
    /// Actions the app never dispatched (answered from the lock screen, for
    /// instance) are dispatched here under the platform's transaction id.
    pub async fn perform_action(&self, action: Box<dyn PendingCallAction>) {
        let transaction_id = action.transaction_id();
        let call_id = action.call_id();

        if !self.manager.is_transaction_known(&transaction_id) {
            let app_action = match action.kind() {
                CallActionKind::Answer => ApplicationAction::AnswerInboundCall { call_id },
                CallActionKind::End if self.is_ringing_inbound(&call_id) => {
                    ApplicationAction::RejectInboundCall { call_id }
                }
                CallActionKind::End => ApplicationAction::HangupCall { call_id },
                CallActionKind::StartOutbound => {
                    action.fulfill();
                    return;
                }
            };
            debug!(
                transaction_id = %transaction_id,
                call_id = %call_id,
                action = app_action.name(),
                "Dispatching platform-originated action"
            );
            self.platform_originated.insert(transaction_id, ());
            if let Err(e) = self.manager.dispatch_with_id(app_action, transaction_id) {
                self.platform_originated.remove(&transaction_id);
                warn!(transaction_id = %transaction_id, error = %e, "Dispatch failed");
                action.fail();
                return;
            }
        }

        match self.manager.wait_for_result(transaction_id).await {
            Ok(result) if result.is_success() => {
                debug!(transaction_id = %transaction_id, "Fulfilling platform action");
                action.fulfill();
            }
            Ok(result) => {
                debug!(transaction_id = %transaction_id, result = ?result.result, "Failing platform action");
                action.fail();
            }
            Err(e) => {
                warn!(transaction_id = %transaction_id, error = %e, "No result for platform action");
                action.fail();
            }
        }
    }

    /// Start-outbound actions need no backend round trip.
    pub fn perform_start_outbound(&self, action: Box<dyn PendingCallAction>) {
        debug!(call_id = %action.call_id(), "Fulfilling start outbound action");
        action.fulfill();
    }

    /// Stop reporting to the platform.
    pub fn detach(self) {
        drop(self);
    }

    fn is_ringing_inbound(&self, call_id: &CallId) -> bool {
        self.manager
            .call(call_id)
            .map(|record| record.is_inbound() && record.status == CallStatus::Ringing)
            .unwrap_or(false)
    }
}

impl Drop for CallUiBridge {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

async fn request_from_platform(platform: &dyn CallManagement, transaction: &ActionTransaction) {
    let (kind, call_id) = match &transaction.action {
        ApplicationAction::AnswerInboundCall { call_id } => (CallActionKind::Answer, *call_id),
        ApplicationAction::RejectInboundCall { call_id } | ApplicationAction::HangupCall { call_id } => {
            (CallActionKind::End, *call_id)
        }
        // Requested once the backend has assigned the call id.
        ApplicationAction::NewOutboundCall { .. } => return,
    };

    let request = CallActionRequest {
        transaction_id: transaction.transaction_id,
        call_id,
        kind,
        handle: None,
    };
    if let Err(e) = platform.request_transaction(request).await {
        warn!(
            transaction_id = %transaction.transaction_id,
            call_id = %call_id,
            error = %e,
            "Platform refused transaction"
        );
    }
}

async fn report_call(platform: Arc<dyn CallManagement>, mut stream: CallStream) {
    let mut previous: Option<CallRecord> = None;
    while let Some(record) = stream.next().await {
        report_transition(platform.as_ref(), previous.as_ref(), &record).await;
        previous = Some(record);
    }
}

async fn report_transition(
    platform: &dyn CallManagement,
    previous: Option<&CallRecord>,
    record: &CallRecord,
) {
    let id = record.id;
    match (record.direction, previous.map(|p| p.status), record.status) {
        (CallDirection::Inbound, None, CallStatus::Ringing) => {
            info!(call_id = %id, "Reporting incoming call");
            if let Err(e) = platform.report_new_incoming_call(id, &record.counterpart).await {
                warn!(call_id = %id, error = %e, "Platform refused incoming call");
            }
        }
        (CallDirection::Outbound, None, CallStatus::Ringing) => {
            let request = CallActionRequest {
                transaction_id: TransactionId::new_v4(),
                call_id: id,
                kind: CallActionKind::StartOutbound,
                handle: Some(record.counterpart.clone()),
            };
            if let Err(e) = platform.request_transaction(request).await {
                warn!(call_id = %id, error = %e, "Platform refused outgoing call");
            }
            platform.report_outgoing_call(id, OutgoingCallProgress::Connecting);
        }
        (CallDirection::Outbound, _, CallStatus::Answered) => {
            platform.report_outgoing_call(id, OutgoingCallProgress::Connected);
        }
        (CallDirection::Outbound, _, CallStatus::Rejected) => {
            platform.report_call_ended(id, EndedReason::RemoteEnded);
        }
        (CallDirection::Inbound, _, CallStatus::Canceled) => {
            platform.report_call_ended(id, EndedReason::Unanswered);
        }
        (_, _, CallStatus::Completed { remote: true }) => {
            platform.report_call_ended(id, EndedReason::RemoteEnded);
        }
        _ => {}
    }
}
