//! Events delivered to protocol state machines.

use tally_messages::{AggregateReply, EvalCircuit, EvalCircuitReply, FinalEvalCircuitReply};
use tally_types::ServerIndex;

/// Everything that can happen to a node during a round.
///
/// `from` is the transport-level sender. Replies also carry the index the
/// sender claims in their body; the two are not required to match, and the
/// state machine validates the claimed index.
#[derive(Debug, Clone)]
pub enum Event {
    /// The root asked this node to take part in a round.
    EvalCircuitReceived {
        from: ServerIndex,
        message: EvalCircuit,
    },

    /// A peer's phase-1 correctness shares arrived.
    EvalCircuitReplyReceived {
        from: ServerIndex,
        reply: EvalCircuitReply,
    },

    /// A peer's phase-2 validity shares arrived.
    FinalEvalCircuitReplyReceived {
        from: ServerIndex,
        reply: FinalEvalCircuitReply,
    },

    /// A peer's phase-3 aggregator arrived.
    AggregateReplyReceived {
        from: ServerIndex,
        reply: AggregateReply,
    },

    /// A peer's message arrived under `topic` but its payload could not be
    /// decoded.
    UndecodableMessage {
        from: ServerIndex,
        topic: String,
        reason: String,
    },

    /// The whole-round timer expired.
    RoundTimeout,

    /// The runner could not deliver a message this node asked it to send.
    TransportFailed { to: ServerIndex, reason: String },
}

impl Event {
    /// Get a human-readable name for this event type.
    pub fn type_name(&self) -> &'static str {
        match self {
            Event::EvalCircuitReceived { .. } => "EvalCircuitReceived",
            Event::EvalCircuitReplyReceived { .. } => "EvalCircuitReplyReceived",
            Event::FinalEvalCircuitReplyReceived { .. } => "FinalEvalCircuitReplyReceived",
            Event::AggregateReplyReceived { .. } => "AggregateReplyReceived",
            Event::UndecodableMessage { .. } => "UndecodableMessage",
            Event::RoundTimeout => "RoundTimeout",
            Event::TransportFailed { .. } => "TransportFailed",
        }
    }

    /// Internal events are generated by the runner rather than a peer.
    ///
    /// The simulation gives them priority over network events scheduled for
    /// the same instant.
    pub fn is_internal(&self) -> bool {
        matches!(self, Event::RoundTimeout | Event::TransportFailed { .. })
    }
}
