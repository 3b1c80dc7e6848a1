//! Round driver errors.

use crate::Phase;
use std::time::Duration;
use tally_types::ServerIndex;
use tally_verifier::VerifyError;

/// Why a round failed, or why a reply was not counted.
///
/// `OutOfRangeIndex` and `MalformedReply` are absorbed by the failure
/// tracker and only end the round through `QuorumUnreachable`. Every other
/// variant ends the round directly.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("failed to send to {to}: {reason}")]
    Transport { to: ServerIndex, reason: String },

    #[error("reply claims index {index} in a roster of {num_servers}")]
    OutOfRangeIndex {
        index: ServerIndex,
        num_servers: usize,
    },

    #[error("malformed {phase} reply from {from}: {reason}")]
    MalformedReply {
        from: ServerIndex,
        phase: Phase,
        reason: String,
    },

    #[error("quorum unreachable: {failures} failed replies, {tolerated} tolerated")]
    QuorumUnreachable { failures: usize, tolerated: usize },

    #[error("round timed out after {0:?}")]
    Timeout(Duration),

    #[error("local index {index} is outside a roster of {num_servers}")]
    InvalidLocalIndex {
        index: ServerIndex,
        num_servers: usize,
    },

    #[error("verification failed: {0}")]
    Verification(#[from] VerifyError),
}

impl ProtocolError {
    /// Check if this error is counted against the quorum rather than ending
    /// the round on its own.
    pub fn is_absorbed(&self) -> bool {
        matches!(
            self,
            ProtocolError::OutOfRangeIndex { .. } | ProtocolError::MalformedReply { .. }
        )
    }
}
