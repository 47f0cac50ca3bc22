use crate::call::{CallDirection, CallStatus};
use crate::state_table::{Guard, StateTableBuilder, Trigger};

/// Add all outbound call transitions to the table
pub fn add_outbound_transitions(builder: &mut StateTableBuilder) {
    let dir = CallDirection::Outbound;

    // Ringing -> Answered: the callee's leg picked up
    builder.add_guarded_change(
        dir,
        CallStatus::Ringing,
        Trigger::LegAnswered,
        Guard::LegIsRemote,
        CallStatus::Answered,
    );

    // Ringing -> Rejected: callee declined
    builder.add_status_change(
        dir,
        CallStatus::Ringing,
        Trigger::LegCompleted,
        CallStatus::Rejected,
    );

    // Ringing -> Canceled: we hung up before an answer
    builder.add_status_change(
        dir,
        CallStatus::Ringing,
        Trigger::LocalComplete,
        CallStatus::Canceled,
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
