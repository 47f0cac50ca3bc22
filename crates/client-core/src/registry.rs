//! Invite and active-call registries
//!
//! Both registries are folded by the coordinator alone. Readers get
//! point-in-time snapshots: the map lives behind an `Arc` and is copied on
//! write, so a snapshot taken before a fold never changes underneath its
//! holder.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::call::{CallId, LegStatus};
use crate::events::BackendEvent;
use crate::sdk::{CallHandle, Invite};

pub type Snapshot<T> = Arc<HashMap<CallId, T>>;

/// What a fold step did to the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FoldOutcome {
    Inserted,
    /// Entry already present for this call id; the first one was kept
    Duplicate,
    Removed,
    Unchanged,
}

#[derive(Debug)]
struct Registry<T> {
    entries: Snapshot<T>,
}

impl<T: Clone> Registry<T> {
    fn new() -> Self {
        Self {
            entries: Arc::new(HashMap::new()),
        }
    }

    fn insert_first(&mut self, id: CallId, value: T) -> FoldOutcome {
        if self.entries.contains_key(&id) {
            return FoldOutcome::Duplicate;
        }
        Arc::make_mut(&mut self.entries).insert(id, value);
        FoldOutcome::Inserted
    }

    fn remove(&mut self, id: &CallId) -> Option<T> {
        if !self.entries.contains_key(id) {
            return None;
        }
        Arc::make_mut(&mut self.entries).remove(id)
    }

    fn removed(&mut self, id: &CallId) -> FoldOutcome {
        match self.remove(id) {
            Some(_) => FoldOutcome::Removed,
            None => FoldOutcome::Unchanged,
        }
    }
}

/// Pending inbound invites keyed by call id
#[derive(Debug)]
pub struct InviteRegistry {
    inner: Registry<Arc<dyn Invite>>,
}

impl InviteRegistry {
    pub fn new() -> Self {
        Self {
            inner: Registry::new(),
        }
    }

    pub fn fold(&mut self, event: &BackendEvent) -> FoldOutcome {
        let outcome = match event {
            BackendEvent::InviteReceived { call_id, invite } => {
                self.inner.insert_first(*call_id, Arc::clone(invite))
            }
            BackendEvent::Hangup(update) => self.inner.removed(&update.call),
            BackendEvent::LegStatus(update) if update.status == LegStatus::Answered => {
                self.inner.removed(&update.call)
            }
            _ => FoldOutcome::Unchanged,
        };
        if outcome == FoldOutcome::Duplicate {
            debug!("Duplicate invite ignored, keeping the first");
        }
        outcome
    }

    /// Put back an invite taken by [`consume`](Self::consume). An invite
    /// already present for the call wins.
    pub fn restore(&mut self, invite: Arc<dyn Invite>) -> FoldOutcome {
        self.inner.insert_first(invite.call_id(), invite)
    }

    /// Take the invite out of the registry for a local answer or reject.
    pub fn consume(&mut self, call_id: &CallId) -> Option<Arc<dyn Invite>> {
        self.inner.remove(call_id)
    }

    pub fn get(&self, call_id: &CallId) -> Option<&Arc<dyn Invite>> {
        self.inner.entries.get(call_id)
    }

    pub fn contains(&self, call_id: &CallId) -> bool {
        self.inner.entries.contains_key(call_id)
    }

    pub fn snapshot(&self) -> Snapshot<Arc<dyn Invite>> {
        Arc::clone(&self.inner.entries)
    }

    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }
}

/// Live call handles keyed by call id
#[derive(Debug)]
pub struct ActiveCallRegistry {
    inner: Registry<Arc<dyn CallHandle>>,
}

impl ActiveCallRegistry {
    pub fn new() -> Self {
        Self {
            inner: Registry::new(),
        }
    }

    /// Track a handle from an outbound call or a successful answer.
    pub fn insert(&mut self, handle: Arc<dyn CallHandle>) -> FoldOutcome {
        self.inner.insert_first(handle.call_id(), handle)
    }

    pub fn remove(&mut self, call_id: &CallId) -> Option<Arc<dyn CallHandle>> {
        self.inner.remove(call_id)
    }

    pub fn fold(&mut self, event: &BackendEvent) -> FoldOutcome {
        match event {
            BackendEvent::Hangup(update) => self.inner.removed(&update.call),
            _ => FoldOutcome::Unchanged,
        }
    }

    pub fn get(&self, call_id: &CallId) -> Option<&Arc<dyn CallHandle>> {
        self.inner.entries.get(call_id)
    }

    pub fn snapshot(&self) -> Snapshot<Arc<dyn CallHandle>> {
        Arc::clone(&self.inner.entries)
    }

    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }
}
