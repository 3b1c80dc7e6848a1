//! Network messages for the aggregation round.
//!
//! A round uses four messages, one per phase:
//!
//! | Message                   | Sent by            | Sent to            |
//! |---------------------------|--------------------|--------------------|
//! | [`EvalCircuit`]           | root               | every server       |
//! | [`EvalCircuitReply`]      | every server       | every other server |
//! | [`FinalEvalCircuitReply`] | every server       | every other server |
//! | [`AggregateReply`]        | every server       | every other server |

pub mod phase;

pub use phase::{
    AggregateReply, CorShareText, EvalCircuit, EvalCircuitReply, FinalEvalCircuitReply,
};

/// A message that can travel over the network.
pub trait NetworkMessage {
    /// Stable topic name used by the wire codec to dispatch payloads.
    fn message_type_id() -> &'static str;
}
