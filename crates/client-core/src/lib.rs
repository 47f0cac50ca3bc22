//! # VOXLINK Client Core
//!
//! Coordination core for one-to-one VOIP calls. It reconciles two event
//! sources into one race-free view of each call:
//!
//! - the voice backend (invites, leg status, hangups, reconnects), behind
//!   [`VoiceBackend`] and [`BackendEventAdapter`]
//! - the platform call UI (answer, end, start actions), behind
//!   [`CallManagement`] and [`CallUiBridge`]
//!
//! All mutable state is owned by a single coordinator task. Applications
//! talk to it through a [`ClientManager`] and observe it through `watch`
//! snapshots and broadcast streams.
//!
//! ## Architecture
//!
//! ```text
//! backend callbacks ──┐                       ┌──> Connection (watch)
//! push payloads ──────┤                       ├──> active calls (watch)
//! ClientManager ──────┼──> coordinator inbox ─┼──> CallStream per call
//! timers / results ───┘   (single owner)      └──> EventBus (actions, results, events)
//!          ▲                     │
//!          └── backend calls ────┘  (spawned, re-enter as events)
//! ```
//!
//! ## Quick start
//!
//! ```rust,no_run
//! # use std::sync::Arc;
//! # use voxlink_client_core::*;
//! # async fn example(backend: Arc<dyn VoiceBackend>) -> ClientResult<()> {
//! let client = ClientBuilder::new().with_backend(backend).build()?;
//! let mut new_calls = client.subscribe_new_calls()?;
//!
//! client.set_user(Some(User::new("alice", "service-token")))?;
//!
//! use futures::StreamExt;
//! while let Some(mut call) = new_calls.next().await {
//!     while let Some(record) = call.next().await {
//!         println!("{} {} -> {}", record.direction, record.counterpart, record.status);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod call;
pub mod call_ui;
pub mod client;
pub mod connectivity;
pub mod correlator;
pub mod error;
pub mod events;
pub mod registry;
pub mod sdk;
pub mod state_machine;
pub mod state_table;

pub use call::{
    CallDirection, CallId, CallRecord, CallStatus, CallUpdate, LegId, LegStatus, TransactionId,
};
pub use call_ui::{
    CallActionKind, CallActionRequest, CallManagement, CallUiBridge, EndedReason,
    OutgoingCallProgress, PendingCallAction,
};
pub use client::{
    ActiveCallMap, CallStream, ClientBuilder, ClientConfig, ClientManager, ConnectRetryConfig,
    NewCallStream,
};
pub use connectivity::{
    Connection, ConnectionError, ConnectivityEffect, ConnectivityInput, ConnectivityReducer,
};
pub use correlator::Correlator;
pub use error::{ClientError, ClientResult};
pub use events::{
    ActionOutcome, ActionResult, ActionTransaction, ApplicationAction, BackendEvent, ClientEvent,
    EventBus,
};
pub use registry::{ActiveCallRegistry, FoldOutcome, InviteRegistry};
pub use sdk::{
    BackendEventAdapter, CallContext, CallHandle, Invite, PushPayload, PushTokens, SessionId,
    User, VoiceBackend,
};
pub use state_machine::{CallStateMachine, Step};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
