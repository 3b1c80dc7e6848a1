//! Round phases.

use std::fmt;

/// Where a server is in the round.
///
/// Ordered: a reply for a later phase than the current one is buffered, a
/// reply for an earlier phase is stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    /// Waiting for the root's `EvalCircuit`.
    Init,
    /// Collecting phase-1 correctness shares.
    AwaitingCorrectness,
    /// Collecting phase-2 validity shares.
    AwaitingValidity,
    /// Collecting phase-3 aggregators.
    AwaitingAggregators,
    /// Finished with the given outcome.
    Done(bool),
}

impl Phase {
    pub fn is_done(self) -> bool {
        matches!(self, Phase::Done(_))
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Init => write!(f, "init"),
            Phase::AwaitingCorrectness => write!(f, "correctness"),
            Phase::AwaitingValidity => write!(f, "validity"),
            Phase::AwaitingAggregators => write!(f, "aggregate"),
            Phase::Done(true) => write!(f, "done(success)"),
            Phase::Done(false) => write!(f, "done(failure)"),
        }
    }
}
