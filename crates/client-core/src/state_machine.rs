//! Per-call state machine
//!
//! Wraps the current [`CallRecord`] version and turns leg updates into new
//! versions by consulting [`CALL_STATE_TABLE`]. Once a call reaches a
//! terminal status every further update is dead-lettered.

use tracing::{debug, warn};

use crate::call::{CallRecord, CallUpdate};
use crate::state_table::{CallStateTable, CALL_STATE_TABLE};

/// Outcome of applying one update
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// The update produced a new record version
    Applied(CallRecord),
    /// No transition for this (status, update) pair
    Unchanged,
    /// The call already terminated; the update was dropped
    DeadLetter,
    /// The update was addressed to another call
    Ignored,
}

#[derive(Debug)]
pub struct CallStateMachine {
    record: CallRecord,
    table: &'static CallStateTable,
}

impl CallStateMachine {
    pub fn new(record: CallRecord) -> Self {
        Self::with_table(record, &CALL_STATE_TABLE)
    }

    pub fn with_table(record: CallRecord, table: &'static CallStateTable) -> Self {
        Self { record, table }
    }

    pub fn record(&self) -> &CallRecord {
        &self.record
    }

    pub fn is_terminal(&self) -> bool {
        self.record.status.is_terminal()
    }

    pub fn apply(&mut self, update: &CallUpdate) -> Step {
        if update.call != self.record.id {
            return Step::Ignored;
        }

        if self.record.status.is_terminal() {
            warn!(
                call_id = %update.call,
                leg_id = %update.leg,
                status = %update.status,
                current = %self.record.status,
                "Dropping update for terminated call"
            );
            return Step::DeadLetter;
        }

        match self
            .table
            .next_status(self.record.direction, self.record.status, update)
        {
            Some(next) => {
                debug!(
                    call_id = %self.record.id,
                    direction = %self.record.direction,
                    from = %self.record.status,
                    to = %next,
                    trigger = %update.status,
                    "Call transition"
                );
                self.record = self.record.with_status(next);
                Step::Applied(self.record.clone())
            }
            None => Step::Unchanged,
        }
    }
}
