//! Round driver configuration.

use std::time::Duration;

/// Configuration for the round driver.
#[derive(Debug, Clone)]
pub struct ProtocolConfig {
    /// Replies needed to leave a phase. `None` means every server.
    pub threshold: Option<usize>,

    /// Whole-round deadline, started when phase 1 begins.
    pub round_timeout: Duration,

    /// Count a second reply from the same claimed index in one phase as
    /// malformed instead of accepting it.
    pub reject_duplicate_senders: bool,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            threshold: None,
            round_timeout: Duration::from_secs(5),
            reject_duplicate_senders: false,
        }
    }
}

impl ProtocolConfig {
    /// Set the reply threshold.
    pub fn with_threshold(mut self, threshold: usize) -> Self {
        self.threshold = Some(threshold);
        self
    }

    /// Set the round timeout.
    pub fn with_round_timeout(mut self, timeout: Duration) -> Self {
        self.round_timeout = timeout;
        self
    }

    /// Enable or disable duplicate-sender rejection.
    pub fn with_reject_duplicate_senders(mut self, reject: bool) -> Self {
        self.reject_duplicate_senders = reject;
        self
    }

    /// Threshold for a roster of `num_servers`.
    pub fn threshold_for(&self, num_servers: usize) -> usize {
        self.threshold.unwrap_or(num_servers)
    }
}
