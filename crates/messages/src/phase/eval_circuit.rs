//! EvalCircuit message.

use crate::NetworkMessage;
use serde::{Deserialize, Serialize};
use tally_types::ClientRequest;

/// Starts a round on one server.
///
/// The root sends one of these to every server, itself included. `shares`
/// holds the recipient's column of the client-request matrix, one entry per
/// client in client order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvalCircuit {
    /// Name the recipient resolves through its configuration loader.
    pub config_reference: String,
    /// The recipient's share of every client's request.
    pub shares: Vec<ClientRequest>,
}

impl EvalCircuit {
    /// Create a new phase-1 message.
    pub fn new(config_reference: impl Into<String>, shares: Vec<ClientRequest>) -> Self {
        Self {
            config_reference: config_reference.into(),
            shares,
        }
    }

    /// Number of clients in the round.
    pub fn num_clients(&self) -> usize {
        self.shares.len()
    }
}

impl NetworkMessage for EvalCircuit {
    fn message_type_id() -> &'static str {
        "round.eval_circuit"
    }
}
