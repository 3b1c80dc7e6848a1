//! AggregateReply message.

use crate::NetworkMessage;
use serde::{Deserialize, Serialize};
use tally_types::{Aggregator, ServerIndex};

/// Phase-3 reply: one server's aggregator over the accepted clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateReply {
    pub server_index: ServerIndex,
    pub aggregator: Aggregator,
}

impl AggregateReply {
    /// Create a new phase-3 reply.
    pub fn new(server_index: ServerIndex, aggregator: Aggregator) -> Self {
        Self {
            server_index,
            aggregator,
        }
    }

    /// Consume and return the inner aggregator.
    pub fn into_aggregator(self) -> Aggregator {
        self.aggregator
    }
}

impl NetworkMessage for AggregateReply {
    fn message_type_id() -> &'static str {
        "round.aggregate_reply"
    }
}
