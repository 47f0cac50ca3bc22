//! Call transition tables
//!
//! Transitions are data: one table keyed by direction, current status and
//! trigger, built once and shared by every call state machine.

mod builder;
pub mod tables;
mod types;

pub use builder::StateTableBuilder;
pub use types::{CallStateTable, Guard, StateKey, Transition, Trigger};

use once_cell::sync::Lazy;

/// The process-wide call transition table
pub static CALL_STATE_TABLE: Lazy<CallStateTable> = Lazy::new(build_call_table);

/// Build the inbound and outbound transition tables
pub fn build_call_table() -> CallStateTable {
    let mut builder = StateTableBuilder::new();
    tables::add_outbound_transitions(&mut builder);
    tables::add_inbound_transitions(&mut builder);
    let table = builder.build();

    if let Err(errors) = table.validate() {
        tracing::error!(?errors, "Call state table failed validation");
    } else {
        tracing::debug!(
            transitions = table.transition_count(),
            "Call state table built"
        );
    }
    table
}
