use super::types::{CallStateTable, Guard, StateKey, Transition, Trigger};
use crate::call::{CallDirection, CallStatus};

pub struct StateTableBuilder {
    table: CallStateTable,
}

impl StateTableBuilder {
    pub fn new() -> Self {
        Self {
            table: CallStateTable::new(),
        }
    }

    pub fn add_transition(
        &mut self,
        direction: CallDirection,
        status: CallStatus,
        trigger: Trigger,
        transition: Transition,
    ) -> &mut Self {
        let key = StateKey {
            direction,
            status,
            trigger,
        };
        self.table.insert(key, transition);
        self
    }

    /// Unguarded status change
    pub fn add_status_change(
        &mut self,
        direction: CallDirection,
        from: CallStatus,
        trigger: Trigger,
        to: CallStatus,
    ) -> &mut Self {
        self.add_transition(direction, from, trigger, Transition::to(to))
    }

    pub fn add_guarded_change(
        &mut self,
        direction: CallDirection,
        from: CallStatus,
        trigger: Trigger,
        guard: Guard,
        to: CallStatus,
    ) -> &mut Self {
        self.add_transition(direction, from, trigger, Transition::guarded(guard, to))
    }

    pub fn build(self) -> CallStateTable {
        self.table
    }
}
