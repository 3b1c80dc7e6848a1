//! Failure counting against the reply threshold.

use crate::ProtocolError;

/// Tracks failed replies for a round.
///
/// With `ns` servers and threshold `T`, a phase can still complete while at
/// most `ns - T` replies have failed. The counter is monotonic and shared by
/// all phases of the round.
#[derive(Debug, Clone)]
pub struct FailureTracker {
    num_servers: usize,
    threshold: usize,
    failures: usize,
}

impl FailureTracker {
    /// Create a tracker, checking `1 <= threshold <= num_servers`.
    pub fn new(num_servers: usize, threshold: usize) -> Result<Self, ProtocolError> {
        if threshold == 0 || threshold > num_servers {
            return Err(ProtocolError::Configuration(format!(
                "threshold {} outside 1..={}",
                threshold, num_servers
            )));
        }
        Ok(Self {
            num_servers,
            threshold,
            failures: 0,
        })
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn failures(&self) -> usize {
        self.failures
    }

    /// Number of failures the round survives.
    pub fn tolerated(&self) -> usize {
        self.num_servers - self.threshold
    }

    /// Record a failed reply. Returns whether the quorum is still reachable.
    pub fn record_failure(&mut self) -> bool {
        self.failures += 1;
        self.is_quorum_reachable()
    }

    pub fn is_quorum_reachable(&self) -> bool {
        self.failures <= self.tolerated()
    }

    /// Check whether `replies` is enough to leave a phase.
    pub fn is_met(&self, replies: usize) -> bool {
        replies >= self.threshold
    }
}
