//! Actions returned by protocol state machines.

use crate::OutboundMessage;
use std::time::Duration;
use tally_types::ServerIndex;

/// Timer identifiers.
///
/// A round owns a single timer. Setting a timer that is already pending
/// replaces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimerId {
    /// Whole-round deadline, started at phase-1 entry.
    Round,
}

/// Work for the runner to perform on behalf of a state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Send a message to one server. The target may be the sender itself.
    SendTo {
        to: ServerIndex,
        message: OutboundMessage,
    },

    /// Send a message to every roster member except the sender.
    Broadcast { message: OutboundMessage },

    /// Start (or restart) a timer.
    SetTimer { id: TimerId, duration: Duration },

    /// Cancel a timer. Cancelling a timer that is not pending is a no-op.
    CancelTimer { id: TimerId },

    /// Publish the round outcome. Emitted at most once per round.
    EmitRoundResult { success: bool },
}

impl Action {
    /// Get a human-readable name for this action type.
    pub fn type_name(&self) -> &'static str {
        match self {
            Action::SendTo { .. } => "SendTo",
            Action::Broadcast { .. } => "Broadcast",
            Action::SetTimer { .. } => "SetTimer",
            Action::CancelTimer { .. } => "CancelTimer",
            Action::EmitRoundResult { .. } => "EmitRoundResult",
        }
    }

    /// Check if this action puts a message on the network.
    pub fn is_network(&self) -> bool {
        matches!(self, Action::SendTo { .. } | Action::Broadcast { .. })
    }
}
