//! EvalCircuitReply message.

use crate::NetworkMessage;
use serde::{Deserialize, Serialize};
use tally_types::{CorrectnessShare, ScalarParseError, ServerIndex};

/// A correctness share in its decimal text wire form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorShareText {
    pub share_d: String,
    pub share_e: String,
}

impl CorShareText {
    /// Parse the text back into field elements.
    pub fn parse(&self) -> Result<CorrectnessShare, ScalarParseError> {
        Ok(CorrectnessShare {
            d: self.share_d.parse()?,
            e: self.share_e.parse()?,
        })
    }
}

impl From<&CorrectnessShare> for CorShareText {
    fn from(share: &CorrectnessShare) -> Self {
        Self {
            share_d: share.d.to_string(),
            share_e: share.e.to_string(),
        }
    }
}

/// Phase-1 reply: one server's correctness shares for every client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvalCircuitReply {
    /// Index the sender claims. Receivers range-check it.
    pub server_index: ServerIndex,
    /// One entry per client, in client order.
    pub correctness_shares: Vec<CorShareText>,
}

impl EvalCircuitReply {
    /// Build a reply from locally produced shares.
    pub fn new(server_index: ServerIndex, shares: &[CorrectnessShare]) -> Self {
        Self {
            server_index,
            correctness_shares: shares.iter().map(CorShareText::from).collect(),
        }
    }

    /// Parse every share, failing on the first malformed one.
    pub fn parse_shares(&self) -> Result<Vec<CorrectnessShare>, ScalarParseError> {
        self.correctness_shares
            .iter()
            .map(CorShareText::parse)
            .collect()
    }
}

impl NetworkMessage for EvalCircuitReply {
    fn message_type_id() -> &'static str {
        "round.eval_circuit_reply"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_types::Scalar;

    #[test]
    fn test_shares_travel_as_decimal_text() {
        let share = CorrectnessShare {
            d: Scalar::new(12345),
            e: Scalar::from_i64(-1),
        };
        let reply = EvalCircuitReply::new(ServerIndex(2), &[share]);

        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["server_index"], 2);
        assert_eq!(json["correctness_shares"][0]["share_d"], "12345");
        assert_eq!(
            json["correctness_shares"][0]["share_e"],
            (tally_types::MODULUS - 1).to_string()
        );

        assert_eq!(reply.parse_shares().unwrap(), vec![share]);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let reply = EvalCircuitReply {
            server_index: ServerIndex(0),
            correctness_shares: vec![CorShareText {
                share_d: "7".into(),
                share_e: "seven".into(),
            }],
        };
        assert!(reply.parse_shares().is_err());
    }
}
