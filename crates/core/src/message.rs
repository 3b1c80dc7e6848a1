//! Outbound message types for network communication.

use crate::Event;
use tally_messages::{
    AggregateReply, EvalCircuit, EvalCircuitReply, FinalEvalCircuitReply, NetworkMessage,
};
use tally_types::ServerIndex;

/// Outbound network messages.
///
/// These are the messages that a node can send to other nodes.
/// The runner handles the actual network I/O.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundMessage {
    /// Round start, root to every server.
    EvalCircuit(EvalCircuit),

    /// Phase-1 correctness shares.
    EvalCircuitReply(EvalCircuitReply),

    /// Phase-2 validity shares.
    FinalEvalCircuitReply(FinalEvalCircuitReply),

    /// Phase-3 aggregator.
    AggregateReply(AggregateReply),
}

impl OutboundMessage {
    /// Get a human-readable name for this message type.
    pub fn type_name(&self) -> &'static str {
        match self {
            OutboundMessage::EvalCircuit(_) => "EvalCircuit",
            OutboundMessage::EvalCircuitReply(_) => "EvalCircuitReply",
            OutboundMessage::FinalEvalCircuitReply(_) => "FinalEvalCircuitReply",
            OutboundMessage::AggregateReply(_) => "AggregateReply",
        }
    }

    /// Get the wire topic for this message.
    pub fn topic(&self) -> &'static str {
        match self {
            OutboundMessage::EvalCircuit(_) => EvalCircuit::message_type_id(),
            OutboundMessage::EvalCircuitReply(_) => EvalCircuitReply::message_type_id(),
            OutboundMessage::FinalEvalCircuitReply(_) => FinalEvalCircuitReply::message_type_id(),
            OutboundMessage::AggregateReply(_) => AggregateReply::message_type_id(),
        }
    }

    /// Check if this is a reply exchanged between peers (as opposed to the
    /// root's round start).
    pub fn is_reply(&self) -> bool {
        !matches!(self, OutboundMessage::EvalCircuit(_))
    }

    /// Turn a delivered message into the event the recipient handles.
    pub fn into_event(self, from: ServerIndex) -> Event {
        match self {
            OutboundMessage::EvalCircuit(message) => Event::EvalCircuitReceived { from, message },
            OutboundMessage::EvalCircuitReply(reply) => {
                Event::EvalCircuitReplyReceived { from, reply }
            }
            OutboundMessage::FinalEvalCircuitReply(reply) => {
                Event::FinalEvalCircuitReplyReceived { from, reply }
            }
            OutboundMessage::AggregateReply(reply) => {
                Event::AggregateReplyReceived { from, reply }
            }
        }
    }
}
