//! Call data model
//!
//! Identifiers, call records and the leg-status updates that drive the
//! per-call state machine.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new_v4() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

uuid_id!(
    /// Stable identifier of one call, the join key across registries and the bus
    CallId
);
uuid_id!(
    /// Identifier of one signaling leg of a call
    LegId
);
uuid_id!(
    /// Identifier of one user-initiated command
    TransactionId
);

impl From<CallId> for LegId {
    /// The call-originating leg shares the call's identifier.
    fn from(call: CallId) -> Self {
        LegId(call.0)
    }
}

impl LegId {
    pub fn is_leg_of(&self, call: &CallId) -> bool {
        self.0 == call.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallDirection {
    Inbound,
    Outbound,
}

impl fmt::Display for CallDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallDirection::Inbound => write!(f, "inbound"),
            CallDirection::Outbound => write!(f, "outbound"),
        }
    }
}

/// Lifecycle status of a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallStatus {
    Ringing,
    Answered,
    Rejected,
    Canceled,
    Completed { remote: bool },
    Unknown,
}

impl CallStatus {
    /// No transition leaves a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CallStatus::Rejected | CallStatus::Canceled | CallStatus::Completed { .. }
        )
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, CallStatus::Completed { .. })
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallStatus::Ringing => write!(f, "ringing"),
            CallStatus::Answered => write!(f, "answered"),
            CallStatus::Rejected => write!(f, "rejected"),
            CallStatus::Canceled => write!(f, "canceled"),
            CallStatus::Completed { remote: true } => write!(f, "completed(remote)"),
            CallStatus::Completed { remote: false } => write!(f, "completed(local)"),
            CallStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// One version of a call's observable state
///
/// Records are never mutated in place; every transition produces a new
/// value through [`CallRecord::with_status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallRecord {
    pub id: CallId,
    pub direction: CallDirection,
    /// Caller for inbound calls, callee for outbound calls
    pub counterpart: String,
    pub status: CallStatus,
}

impl CallRecord {
    pub fn ringing(id: CallId, direction: CallDirection, counterpart: impl Into<String>) -> Self {
        Self {
            id,
            direction,
            counterpart: counterpart.into(),
            status: CallStatus::Ringing,
        }
    }

    pub fn with_status(&self, status: CallStatus) -> Self {
        Self {
            status,
            ..self.clone()
        }
    }

    pub fn is_inbound(&self) -> bool {
        self.direction == CallDirection::Inbound
    }
}

/// Status token carried by a leg update
///
/// `Ringing`, `Answered` and `Completed` come from the backend. The local
/// tokens are injected when a local hangup or reject succeeds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LegStatus {
    Ringing,
    Answered,
    Completed,
    LocalComplete,
    LocalReject,
    Other(String),
}

impl LegStatus {
    pub fn from_backend(token: &str) -> Self {
        match token {
            "ringing" => LegStatus::Ringing,
            "answered" => LegStatus::Answered,
            "completed" => LegStatus::Completed,
            other => LegStatus::Other(other.to_string()),
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, LegStatus::LocalComplete | LegStatus::LocalReject)
    }
}

impl fmt::Display for LegStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LegStatus::Ringing => write!(f, "ringing"),
            LegStatus::Answered => write!(f, "answered"),
            LegStatus::Completed => write!(f, "completed"),
            LegStatus::LocalComplete => write!(f, "localComplete"),
            LegStatus::LocalReject => write!(f, "localReject"),
            LegStatus::Other(token) => write!(f, "{}", token),
        }
    }
}

/// Input to the call state machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallUpdate {
    pub call: CallId,
    pub leg: LegId,
    pub status: LegStatus,
}

impl CallUpdate {
    pub fn new(call: CallId, leg: LegId, status: LegStatus) -> Self {
        Self { call, leg, status }
    }

    /// Synthetic update for a locally completed command; the leg is the call's own.
    pub fn local(call: CallId, status: LegStatus) -> Self {
        Self {
            call,
            leg: LegId::from(call),
            status,
        }
    }

    pub fn leg_is_call(&self) -> bool {
        self.leg.is_leg_of(&self.call)
    }
}
