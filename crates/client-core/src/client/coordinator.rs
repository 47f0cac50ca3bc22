//! Serialized event timeline
//!
//! One task owns every piece of mutable call state: the connectivity
//! reducer, both registries and the per-call state machines. Actions,
//! backend callbacks, timers and backend call completions all arrive on a
//! single inbox and are handled strictly in order. Backend calls run on
//! spawned tasks and re-enter the inbox as [`Completion`] events, so a slow
//! backend never stalls the timeline.

use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::config::ClientConfig;
use super::stream::CallStream;
use crate::call::{CallDirection, CallId, CallRecord, CallStatus, CallUpdate, LegStatus};
use crate::connectivity::{Connection, ConnectivityEffect, ConnectivityInput, ConnectivityReducer};
use crate::error::{ClientError, ClientResult};
use crate::events::{
    ActionOutcome, ActionResult, ActionTransaction, ApplicationAction, BackendEvent, ClientEvent,
    EventBus,
};
use crate::registry::{ActiveCallRegistry, FoldOutcome, InviteRegistry};
use crate::sdk::{CallContext, CallHandle, Invite, PushPayload, VoiceBackend};
use crate::state_machine::{CallStateMachine, Step};

/// Live, non-terminal calls
pub type ActiveCallMap = Arc<HashMap<CallId, CallRecord>>;

/// Everything the coordinator reacts to
#[derive(Debug)]
pub(crate) enum CoreEvent {
    Action(ActionTransaction),
    Backend(BackendEvent),
    Connectivity(ConnectivityInput),
    Push(PushPayload),
    Completion(Completion),
    SubscribeNewCalls(mpsc::UnboundedSender<CallStream>),
    Shutdown,
}

/// Result of a backend call issued for a transaction
#[derive(Debug)]
pub(crate) enum Completion {
    OutboundStarted {
        transaction: ActionTransaction,
        context: CallContext,
        result: ClientResult<Arc<dyn CallHandle>>,
    },
    Answered {
        transaction: ActionTransaction,
        call_id: CallId,
        invite: Arc<dyn Invite>,
        result: ClientResult<Arc<dyn CallHandle>>,
    },
    Rejected {
        transaction: ActionTransaction,
        call_id: CallId,
        invite: Arc<dyn Invite>,
        result: ClientResult<()>,
    },
    HungUp {
        transaction: ActionTransaction,
        call_id: CallId,
        result: ClientResult<()>,
    },
}

struct CallEntry {
    machine: CallStateMachine,
    records: broadcast::Sender<CallRecord>,
}

/// Bounded memory of terminated call ids
#[derive(Debug, Default)]
struct FinishedCalls {
    order: VecDeque<CallId>,
    ids: HashSet<CallId>,
    capacity: usize,
}

impl FinishedCalls {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            ..Default::default()
        }
    }

    fn remember(&mut self, id: CallId) {
        if self.capacity == 0 || !self.ids.insert(id) {
            return;
        }
        self.order.push_back(id);
        if self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
    }

    fn contains(&self, id: &CallId) -> bool {
        self.ids.contains(id)
    }
}

pub(crate) struct Coordinator {
    config: ClientConfig,
    backend: Arc<dyn VoiceBackend>,
    bus: EventBus,
    inbox: mpsc::UnboundedReceiver<CoreEvent>,
    loopback: mpsc::WeakUnboundedSender<CoreEvent>,
    connectivity: ConnectivityReducer,
    connectivity_tasks: Vec<JoinHandle<()>>,
    invites: InviteRegistry,
    active: ActiveCallRegistry,
    calls: HashMap<CallId, CallEntry>,
    finished: FinishedCalls,
    connection_tx: watch::Sender<Connection>,
    calls_tx: watch::Sender<ActiveCallMap>,
    new_call_subscribers: Vec<mpsc::UnboundedSender<CallStream>>,
}

impl Coordinator {
    pub(crate) fn new(
        config: ClientConfig,
        backend: Arc<dyn VoiceBackend>,
        bus: EventBus,
        inbox: mpsc::UnboundedReceiver<CoreEvent>,
        loopback: mpsc::WeakUnboundedSender<CoreEvent>,
        connection_tx: watch::Sender<Connection>,
        calls_tx: watch::Sender<ActiveCallMap>,
    ) -> Self {
        Self {
            connectivity: ConnectivityReducer::new(config.connect_retry.clone()),
            finished: FinishedCalls::new(config.finished_call_memory),
            config,
            backend,
            bus,
            inbox,
            loopback,
            connectivity_tasks: Vec::new(),
            invites: InviteRegistry::new(),
            active: ActiveCallRegistry::new(),
            calls: HashMap::new(),
            connection_tx,
            calls_tx,
            new_call_subscribers: Vec::new(),
        }
    }

    pub(crate) async fn run(mut self) {
        info!("Call coordinator started");
        while let Some(event) = self.inbox.recv().await {
            if matches!(event, CoreEvent::Shutdown) {
                break;
            }
            self.handle(event);
        }
        self.cancel_connectivity_tasks();
        info!("Call coordinator stopped");
    }

    fn handle(&mut self, event: CoreEvent) {
        match event {
            CoreEvent::Action(transaction) => self.handle_action(transaction),
            CoreEvent::Backend(event) => self.handle_backend(event),
            CoreEvent::Connectivity(input) => self.apply_connectivity(input),
            CoreEvent::Push(payload) => self.handle_push(payload),
            CoreEvent::Completion(completion) => self.handle_completion(completion),
            CoreEvent::SubscribeNewCalls(subscriber) => self.new_call_subscribers.push(subscriber),
            CoreEvent::Shutdown => {}
        }
    }

    // Actions

    fn handle_action(&mut self, transaction: ActionTransaction) {
        debug!(
            transaction_id = %transaction.transaction_id,
            action = transaction.action.name(),
            call_id = ?transaction.call_id,
            "Handling action"
        );

        match transaction.action.clone() {
            ApplicationAction::NewOutboundCall { context } => {
                let backend = Arc::clone(&self.backend);
                self.spawn_backend(async move {
                    let result = backend.start_outbound_call(&context).await;
                    CoreEvent::Completion(Completion::OutboundStarted {
                        transaction,
                        context,
                        result,
                    })
                });
            }
            ApplicationAction::AnswerInboundCall { call_id } => {
                let Some(invite) = self.invites.consume(&call_id) else {
                    return self.fail_unknown_call(&transaction, call_id);
                };
                self.spawn_backend(async move {
                    let result = invite.answer().await;
                    CoreEvent::Completion(Completion::Answered {
                        transaction,
                        call_id,
                        invite,
                        result,
                    })
                });
            }
            ApplicationAction::RejectInboundCall { call_id } => {
                let Some(invite) = self.invites.consume(&call_id) else {
                    return self.fail_unknown_call(&transaction, call_id);
                };
                self.spawn_backend(async move {
                    let result = invite.reject().await;
                    CoreEvent::Completion(Completion::Rejected {
                        transaction,
                        call_id,
                        invite,
                        result,
                    })
                });
            }
            ApplicationAction::HangupCall { call_id } => {
                let Some(handle) = self.active.get(&call_id).cloned() else {
                    return self.fail_unknown_call(&transaction, call_id);
                };
                self.spawn_backend(async move {
                    let result = handle.hangup().await;
                    CoreEvent::Completion(Completion::HungUp {
                        transaction,
                        call_id,
                        result,
                    })
                });
            }
        }
    }

    fn fail_unknown_call(&mut self, transaction: &ActionTransaction, call_id: CallId) {
        warn!(
            transaction_id = %transaction.transaction_id,
            call_id = %call_id,
            action = transaction.action.name(),
            "Command for unknown call"
        );
        self.bus
            .publish_result(ActionResult::failure(transaction, ClientError::Unknown));
    }

    fn handle_completion(&mut self, completion: Completion) {
        match completion {
            Completion::OutboundStarted {
                transaction,
                context,
                result,
            } => match result {
                Ok(handle) => {
                    let call_id = handle.call_id();
                    self.active.insert(handle);
                    self.create_call(call_id, CallDirection::Outbound, context.to);
                    self.succeed(&transaction, ActionOutcome::OutboundStarted(call_id));
                }
                Err(e) => self.fail(&transaction, e),
            },
            Completion::Answered {
                transaction,
                call_id,
                invite,
                result,
            } => match result {
                Ok(handle) if self.calls.contains_key(&call_id) => {
                    self.active.insert(handle);
                    self.succeed(&transaction, ActionOutcome::Answered);
                }
                Ok(handle) => {
                    warn!(call_id = %call_id, "Call ended before answer completed, hanging up");
                    self.hangup_orphan(handle);
                    self.fail(&transaction, ClientError::Unknown);
                }
                Err(e) => {
                    self.restore_invite(call_id, invite);
                    self.fail(&transaction, e);
                }
            },
            Completion::Rejected {
                transaction,
                call_id,
                invite,
                result,
            } => match result {
                Ok(()) => {
                    self.apply_update(CallUpdate::local(call_id, LegStatus::LocalReject));
                    self.succeed(&transaction, ActionOutcome::Rejected);
                }
                Err(e) => {
                    self.restore_invite(call_id, invite);
                    self.fail(&transaction, e);
                }
            },
            Completion::HungUp {
                transaction,
                call_id,
                result,
            } => match result {
                Ok(()) => {
                    self.active.remove(&call_id);
                    self.apply_update(CallUpdate::local(call_id, LegStatus::LocalComplete));
                    self.succeed(&transaction, ActionOutcome::HungUp);
                }
                Err(e) => self.fail(&transaction, e),
            },
        }
    }

    /// Put an invite back after a failed answer or reject, if its call is
    /// still ringing.
    fn restore_invite(&mut self, call_id: CallId, invite: Arc<dyn Invite>) {
        let ringing = self
            .calls
            .get(&call_id)
            .map(|entry| entry.machine.record().status == CallStatus::Ringing)
            .unwrap_or(false);
        if ringing && self.invites.restore(invite) == FoldOutcome::Inserted {
            debug!(call_id = %call_id, "Invite restored after failed command");
        }
    }

    fn hangup_orphan(&self, handle: Arc<dyn CallHandle>) {
        self.spawn_task(async move {
            if let Err(e) = handle.hangup().await {
                warn!(call_id = %handle.call_id(), error = %e, "Hangup of orphaned call failed");
            }
            None
        });
    }

    fn succeed(&self, transaction: &ActionTransaction, outcome: ActionOutcome) {
        debug!(
            transaction_id = %transaction.transaction_id,
            outcome = ?outcome,
            "Command succeeded"
        );
        self.bus
            .publish_result(ActionResult::success(transaction, outcome));
    }

    fn fail(&self, transaction: &ActionTransaction, cause: ClientError) {
        warn!(
            transaction_id = %transaction.transaction_id,
            action = transaction.action.name(),
            call_id = ?transaction.call_id,
            error = %cause,
            "Command failed"
        );
        self.bus
            .publish_result(ActionResult::failure(transaction, cause));
    }

    // Backend callbacks

    fn handle_backend(&mut self, event: BackendEvent) {
        match &event {
            BackendEvent::WillReconnect => self.apply_connectivity(ConnectivityInput::WillReconnect),
            BackendEvent::DidReconnect => self.apply_connectivity(ConnectivityInput::DidReconnect),
            BackendEvent::SessionError { reason } => {
                self.apply_connectivity(ConnectivityInput::SessionError {
                    reason: reason.clone(),
                })
            }
            BackendEvent::InviteReceived { call_id, invite } => {
                if self.calls.contains_key(call_id) || self.finished.contains(call_id) {
                    debug!(call_id = %call_id, "Invite for known call dropped");
                    return;
                }
                if self.invites.fold(&event) == FoldOutcome::Inserted {
                    self.create_call(*call_id, CallDirection::Inbound, invite.caller());
                }
            }
            BackendEvent::LegStatus(update) | BackendEvent::Hangup(update) => {
                self.invites.fold(&event);
                self.active.fold(&event);
                self.apply_update(update.clone());
            }
        }
    }

    fn handle_push(&mut self, payload: PushPayload) {
        let Some(token) = self.connectivity.user().and_then(|u| u.token.clone()) else {
            warn!("Push payload dropped, no signed-in user");
            return;
        };
        let backend = Arc::clone(&self.backend);
        self.spawn_task(async move {
            match backend.decode_push_invite(&payload, &token).await {
                Some(invite) => Some(CoreEvent::Backend(BackendEvent::InviteReceived {
                    call_id: invite.call_id(),
                    invite,
                })),
                None => {
                    warn!("Push payload did not decode to an invite");
                    None
                }
            }
        });
    }

    // Calls

    fn create_call(&mut self, id: CallId, direction: CallDirection, counterpart: String) {
        if self.calls.contains_key(&id) || self.finished.contains(&id) {
            warn!(call_id = %id, "Call already known, not recreated");
            return;
        }

        let record = CallRecord::ringing(id, direction, counterpart);
        let (records, _) = broadcast::channel(self.config.call_stream_capacity);
        self.new_call_subscribers
            .retain(|subscriber| subscriber.send(CallStream::new(record.clone(), records.subscribe())).is_ok());
        self.calls.insert(
            id,
            CallEntry {
                machine: CallStateMachine::new(record.clone()),
                records,
            },
        );

        info!(call_id = %id, direction = %direction, "Call created");
        self.bus.publish_event(ClientEvent::CallCreated(record));
        self.publish_active_calls();
    }

    fn apply_update(&mut self, update: CallUpdate) {
        let Some(entry) = self.calls.get_mut(&update.call) else {
            if self.finished.contains(&update.call) {
                debug!(call_id = %update.call, status = %update.status, "Dropping update for finished call");
            } else {
                debug!(call_id = %update.call, status = %update.status, "Update for unknown call ignored");
            }
            return;
        };

        let previous = entry.machine.record().status;
        match entry.machine.apply(&update) {
            Step::Applied(record) => {
                // No receivers is fine; streams may have been dropped.
                let _ = entry.records.send(record.clone());
                info!(call_id = %record.id, from = %previous, to = %record.status, "Call status changed");
                self.bus.publish_event(ClientEvent::CallStatusChanged {
                    record: record.clone(),
                    previous,
                    timestamp: Utc::now(),
                });
                if record.status.is_terminal() {
                    self.finish_call(record.id);
                }
                self.publish_active_calls();
            }
            Step::Unchanged => {
                debug!(call_id = %update.call, status = %update.status, current = %previous, "No transition");
            }
            Step::DeadLetter | Step::Ignored => {}
        }
    }

    fn finish_call(&mut self, id: CallId) {
        self.calls.remove(&id);
        self.invites.consume(&id);
        self.active.remove(&id);
        self.finished.remember(id);
    }

    fn publish_active_calls(&self) {
        let snapshot: HashMap<CallId, CallRecord> = self
            .calls
            .iter()
            .map(|(id, entry)| (*id, entry.machine.record().clone()))
            .collect();
        self.calls_tx.send_replace(Arc::new(snapshot));
    }

    // Connectivity

    fn apply_connectivity(&mut self, input: ConnectivityInput) {
        let previous = self.connectivity.connection().clone();
        let effects = self.connectivity.apply(input);

        let current = self.connectivity.connection().clone();
        if current != previous {
            info!(previous = ?previous, current = ?current, "Connection changed");
            self.connection_tx.send_replace(current.clone());
            self.bus
                .publish_event(ClientEvent::ConnectionChanged { previous, current });
        }

        for effect in effects {
            self.run_effect(effect);
        }
    }

    fn run_effect(&mut self, effect: ConnectivityEffect) {
        match effect {
            ConnectivityEffect::CreateSession { generation, token } => {
                let backend = Arc::clone(&self.backend);
                self.spawn_connectivity(async move {
                    let result = backend.create_session(&token).await;
                    ConnectivityInput::SessionCreated { generation, result }
                });
            }
            ConnectivityEffect::RegisterPush { generation, tokens } => {
                let backend = Arc::clone(&self.backend);
                let sandbox = self.config.push_sandbox;
                self.spawn_connectivity(async move {
                    let result = backend
                        .register_device_push_token(&tokens.voip, &tokens.device, sandbox)
                        .await;
                    ConnectivityInput::PushRegistered { generation, result }
                });
            }
            ConnectivityEffect::ScheduleRetry {
                generation,
                attempt,
                delay,
            } => {
                self.spawn_connectivity(async move {
                    tokio::time::sleep(delay).await;
                    ConnectivityInput::RetryElapsed {
                        generation,
                        attempt,
                    }
                });
            }
            ConnectivityEffect::CancelPending => self.cancel_connectivity_tasks(),
            ConnectivityEffect::ConnectionStarted => {
                info!("Connection started");
                self.bus.publish_event(ClientEvent::ConnectionStarted);
            }
        }
    }

    fn spawn_connectivity<F>(&mut self, future: F)
    where
        F: Future<Output = ConnectivityInput> + Send + 'static,
    {
        self.connectivity_tasks.retain(|task| !task.is_finished());
        let spawned = self.spawn_backend(async move { CoreEvent::Connectivity(future.await) });
        if let Some(task) = spawned {
            self.connectivity_tasks.push(task);
        }
    }

    fn cancel_connectivity_tasks(&mut self) {
        for task in self.connectivity_tasks.drain(..) {
            task.abort();
        }
    }

    fn spawn_backend<F>(&self, future: F) -> Option<JoinHandle<()>>
    where
        F: Future<Output = CoreEvent> + Send + 'static,
    {
        self.spawn_task(async move { Some(future.await) })
    }

    /// Run `future` off the timeline and feed its event back into the inbox.
    fn spawn_task<F>(&self, future: F) -> Option<JoinHandle<()>>
    where
        F: Future<Output = Option<CoreEvent>> + Send + 'static,
    {
        let Some(loopback) = self.loopback.upgrade() else {
            debug!("No remaining event senders, backend call skipped");
            return None;
        };
        Some(tokio::spawn(async move {
            if let Some(event) = future.await {
                let _ = loopback.send(event);
            }
        }))
    }
}
