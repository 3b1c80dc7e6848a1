//! Topology trait and static implementation.

use crate::ServerIndex;
use std::sync::Arc;

/// View of the aggregation roster from one server.
pub trait Topology: Send + Sync {
    /// Get the local server's index.
    ///
    /// Not guaranteed to be inside the roster; the round driver checks it
    /// before using it to address per-server state.
    fn local_index(&self) -> ServerIndex;

    /// Get the ordered roster.
    fn roster(&self) -> &[ServerIndex];

    // Derived methods

    /// Get the number of servers taking part in a round.
    fn num_servers(&self) -> usize {
        self.roster().len()
    }

    /// Check if the local index is a legal roster position.
    fn local_index_is_valid(&self) -> bool {
        self.local_index().is_within(self.num_servers())
    }

    /// Check if the local server is the root.
    fn is_root(&self) -> bool {
        self.local_index().is_root()
    }

    /// Get every roster member except the local server.
    fn peers(&self) -> Vec<ServerIndex> {
        let local = self.local_index();
        self.roster()
            .iter()
            .copied()
            .filter(|index| *index != local)
            .collect()
    }
}

/// A static topology implementation.
#[derive(Debug, Clone)]
pub struct StaticTopology {
    local_index: ServerIndex,
    roster: Vec<ServerIndex>,
}

impl StaticTopology {
    /// Create a topology for a dense roster of `num_servers` servers.
    pub fn new(local_index: ServerIndex, num_servers: usize) -> Self {
        Self {
            local_index,
            roster: (0..num_servers).map(ServerIndex::from).collect(),
        }
    }

    /// Create a topology as an Arc.
    pub fn into_arc(self) -> Arc<dyn Topology> {
        Arc::new(self)
    }
}

impl Topology for StaticTopology {
    fn local_index(&self) -> ServerIndex {
        self.local_index
    }

    fn roster(&self) -> &[ServerIndex] {
        &self.roster
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peers_exclude_local() {
        let topology = StaticTopology::new(ServerIndex(1), 3);
        assert_eq!(topology.num_servers(), 3);
        assert_eq!(topology.peers(), vec![ServerIndex(0), ServerIndex(2)]);
        assert!(!topology.is_root());
        assert!(topology.local_index_is_valid());
    }

    #[test]
    fn test_local_index_outside_roster() {
        let topology = StaticTopology::new(ServerIndex(5), 3);
        assert!(!topology.local_index_is_valid());
        assert_eq!(topology.peers().len(), 3);
    }
}
