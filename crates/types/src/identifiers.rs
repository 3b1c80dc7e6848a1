//! Domain-specific identifier types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Position of a server in the aggregation roster.
///
/// Indices are dense: a roster of `ns` servers uses `0..ns`. Replies carry the
/// index their sender claims, which is why the index must be range-checked
/// against the roster before use.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ServerIndex(pub u32);

impl ServerIndex {
    /// The root server (the node that starts a round).
    pub const ROOT: Self = ServerIndex(0);

    /// Get the index as a `usize` for slice access.
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// Check whether the index is a legal position in a roster of `num_servers`.
    pub fn is_within(self, num_servers: usize) -> bool {
        self.as_usize() < num_servers
    }

    /// Whether this is the root server.
    pub fn is_root(self) -> bool {
        self == Self::ROOT
    }
}

impl From<usize> for ServerIndex {
    fn from(index: usize) -> Self {
        ServerIndex(index as u32)
    }
}

impl fmt::Display for ServerIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Server({})", self.0)
    }
}

/// Aggregation round identifier.
///
/// Session state never outlives a round; the id only tags log lines and
/// result channels so several rounds can share a runner.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RoundId(pub u64);

impl RoundId {
    /// Get the next round id.
    pub fn next(self) -> Self {
        RoundId(self.0 + 1)
    }
}

impl fmt::Display for RoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Round({})", self.0)
    }
}
