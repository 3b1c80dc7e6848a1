//! FinalEvalCircuitReply message.

use crate::NetworkMessage;
use serde::{Deserialize, Serialize};
use tally_types::{ServerIndex, ValidityShare};

/// Phase-2 reply: one server's validity shares for every client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalEvalCircuitReply {
    /// Index the sender claims. Receivers range-check it.
    pub server_index: ServerIndex,
    /// One entry per client, in client order.
    pub validity_shares: Vec<ValidityShare>,
}

impl FinalEvalCircuitReply {
    /// Create a new phase-2 reply.
    pub fn new(server_index: ServerIndex, validity_shares: Vec<ValidityShare>) -> Self {
        Self {
            server_index,
            validity_shares,
        }
    }
}

impl NetworkMessage for FinalEvalCircuitReply {
    fn message_type_id() -> &'static str {
        "round.final_eval_circuit_reply"
    }
}
