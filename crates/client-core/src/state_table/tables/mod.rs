mod inbound;
mod outbound;

pub use inbound::add_inbound_transitions;
pub use outbound::add_outbound_transitions;
