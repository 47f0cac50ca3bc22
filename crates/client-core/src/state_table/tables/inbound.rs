use crate::call::{CallDirection, CallStatus};
use crate::state_table::{Guard, StateTableBuilder, Trigger};

/// Add all inbound call transitions to the table
pub fn add_inbound_transitions(builder: &mut StateTableBuilder) {
    let dir = CallDirection::Inbound;

    // Ringing -> Answered: this device accepted, so our own leg reports it
    builder.add_guarded_change(
        dir,
        CallStatus::Ringing,
        Trigger::LegAnswered,
        Guard::LegIsCall,
        CallStatus::Answered,
    );

    // Ringing -> Canceled: caller gave up
    builder.add_status_change(
        dir,
        CallStatus::Ringing,
        Trigger::LegCompleted,
        CallStatus::Canceled,
    );

    builder.add_status_change(
        dir,
        CallStatus::Ringing,
        Trigger::LocalReject,
        CallStatus::Rejected,
    );

    builder.add_status_change(
        dir,
        CallStatus::Answered,
        Trigger::LocalComplete,
        CallStatus::Completed { remote: false },
    );

    builder.add_status_change(
        dir,
        CallStatus::Answered,
        Trigger::LegCompleted,
        CallStatus::Completed { remote: true },
    );
}
