use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::call::{CallDirection, CallStatus, CallUpdate, LegStatus};

/// Table input derived from a leg status token
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum Trigger {
    LegAnswered,
    LegCompleted,
    LocalComplete,
    LocalReject,
}

impl Trigger {
    /// Tokens without a trigger (`ringing`, unrecognised strings) never
    /// change a call's status.
    pub fn from_status(status: &LegStatus) -> Option<Self> {
        match status {
            LegStatus::Answered => Some(Trigger::LegAnswered),
            LegStatus::Completed => Some(Trigger::LegCompleted),
            LegStatus::LocalComplete => Some(Trigger::LocalComplete),
            LegStatus::LocalReject => Some(Trigger::LocalReject),
            LegStatus::Ringing | LegStatus::Other(_) => None,
        }
    }
}

/// Guards evaluated against the update that fired the trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Guard {
    /// The reporting leg is the call's own leg
    LegIsCall,
    /// The reporting leg belongs to the other party
    LegIsRemote,
}

impl Guard {
    pub fn check(&self, update: &CallUpdate) -> bool {
        match self {
            Guard::LegIsCall => update.leg_is_call(),
            Guard::LegIsRemote => !update.leg_is_call(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    /// All guards must hold for the transition to fire
    pub guards: Vec<Guard>,
    pub next_status: CallStatus,
}

impl Transition {
    pub fn to(next_status: CallStatus) -> Self {
        Self {
            guards: vec![],
            next_status,
        }
    }

    pub fn guarded(guard: Guard, next_status: CallStatus) -> Self {
        Self {
            guards: vec![guard],
            next_status,
        }
    }

    pub fn allows(&self, update: &CallUpdate) -> bool {
        self.guards.iter().all(|guard| guard.check(update))
    }
}

/// Key for looking up transitions in the state table
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct StateKey {
    pub direction: CallDirection,
    pub status: CallStatus,
    pub trigger: Trigger,
}

/// Direction-selected call transition table
///
/// Each key holds candidate transitions in insertion order; the first one
/// whose guards pass wins. A missing key or a failed guard is a no-op.
#[derive(Debug, Default)]
pub struct CallStateTable {
    transitions: HashMap<StateKey, Vec<Transition>>,
}

impl CallStateTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: StateKey, transition: Transition) {
        self.transitions.entry(key).or_default().push(transition);
    }

    pub fn get(&self, key: &StateKey) -> Option<&[Transition]> {
        self.transitions.get(key).map(Vec::as_slice)
    }

    pub fn has_transition(&self, key: &StateKey) -> bool {
        self.transitions.contains_key(key)
    }

    pub fn transition_count(&self) -> usize {
        self.transitions.values().map(Vec::len).sum()
    }

    /// Next status for `update` applied to a call in `status`, if any.
    pub fn next_status(
        &self,
        direction: CallDirection,
        status: CallStatus,
        update: &CallUpdate,
    ) -> Option<CallStatus> {
        let trigger = Trigger::from_status(&update.status)?;
        let key = StateKey {
            direction,
            status,
            trigger,
        };
        self.get(&key)?
            .iter()
            .find(|transition| transition.allows(update))
            .map(|transition| transition.next_status)
    }

    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        for (key, transitions) in &self.transitions {
            if key.status.is_terminal() {
                errors.push(format!(
                    "{} transition leaves terminal status {} on {:?}",
                    key.direction, key.status, key.trigger
                ));
            }
            if transitions.iter().any(|t| t.next_status == key.status) {
                errors.push(format!(
                    "{} self transition on {} for {:?}",
                    key.direction, key.status, key.trigger
                ));
            }
        }

        for direction in [CallDirection::Inbound, CallDirection::Outbound] {
            let has_exit = self
                .transitions
                .keys()
                .any(|k| k.direction == direction && k.status == CallStatus::Ringing);
            if !has_exit {
                errors.push(format!("{} ringing has no exit transitions", direction));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
