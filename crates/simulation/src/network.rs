//! Simulated network conditions.

use rand::Rng;
use std::collections::BTreeSet;
use std::time::Duration;
use tally_types::ServerIndex;

/// Configuration for the simulated network.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Number of servers in the roster.
    pub num_servers: usize,

    /// Base one-way latency.
    pub latency: Duration,

    /// Maximum extra latency added uniformly at random.
    pub jitter: Duration,

    /// Probability that any single message is lost.
    pub drop_probability: f64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            num_servers: 3,
            latency: Duration::from_millis(10),
            jitter: Duration::from_millis(5),
            drop_probability: 0.0,
        }
    }
}

impl NetworkConfig {
    /// Create a configuration for `num_servers` servers.
    pub fn new(num_servers: usize) -> Self {
        Self {
            num_servers,
            ..Default::default()
        }
    }

    /// Set the base latency.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Set the latency jitter.
    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// Set the message drop probability (clamped to 0.0..=1.0).
    pub fn with_drop_probability(mut self, probability: f64) -> Self {
        self.drop_probability = probability.clamp(0.0, 1.0);
        self
    }
}

/// What happens to one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Delivered after the given latency.
    After(Duration),
    /// Lost without a trace.
    Dropped,
    /// The sender's transport reports an error.
    Unreachable,
}

/// Network model: latency, loss, silent nodes and unreachable nodes.
#[derive(Debug, Clone)]
pub struct SimulatedNetwork {
    config: NetworkConfig,
    /// Nodes whose traffic is silently dropped in both directions.
    isolated: BTreeSet<ServerIndex>,
    /// Nodes that senders fail to connect to.
    severed: BTreeSet<ServerIndex>,
}

impl SimulatedNetwork {
    pub fn new(config: NetworkConfig) -> Self {
        Self {
            config,
            isolated: BTreeSet::new(),
            severed: BTreeSet::new(),
        }
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    /// Silence a node: nothing it sends or is sent arrives.
    pub fn isolate(&mut self, node: ServerIndex) {
        self.isolated.insert(node);
    }

    /// Make sends to a node fail at the sender.
    pub fn sever(&mut self, node: ServerIndex) {
        self.severed.insert(node);
    }

    pub fn is_isolated(&self, node: ServerIndex) -> bool {
        self.isolated.contains(&node)
    }

    /// Decide the fate of one message.
    pub fn route<R: Rng + ?Sized>(
        &self,
        from: ServerIndex,
        to: ServerIndex,
        rng: &mut R,
    ) -> Delivery {
        if self.severed.contains(&to) && from != to {
            return Delivery::Unreachable;
        }
        if self.is_isolated(from) || self.is_isolated(to) {
            return Delivery::Dropped;
        }
        if self.config.drop_probability > 0.0 && rng.gen_bool(self.config.drop_probability) {
            return Delivery::Dropped;
        }
        Delivery::After(self.sample_latency(rng))
    }

    fn sample_latency<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let jitter = self.config.jitter.as_micros() as u64;
        let extra = if jitter == 0 {
            0
        } else {
            rng.gen_range(0..=jitter)
        };
        self.config.latency + Duration::from_micros(extra)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_latency_within_jitter() {
        let network = SimulatedNetwork::new(
            NetworkConfig::new(3)
                .with_latency(Duration::from_millis(20))
                .with_jitter(Duration::from_millis(4)),
        );
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        for _ in 0..100 {
            match network.route(ServerIndex(0), ServerIndex(1), &mut rng) {
                Delivery::After(latency) => {
                    assert!(latency >= Duration::from_millis(20));
                    assert!(latency <= Duration::from_millis(24));
                }
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[test]
    fn test_isolated_and_severed() {
        let mut network = SimulatedNetwork::new(NetworkConfig::new(3));
        let [a, b, c] = [ServerIndex(0), ServerIndex(1), ServerIndex(2)];
        network.isolate(c);
        network.sever(b);
        let mut rng = ChaCha8Rng::seed_from_u64(2);

        assert!(network.is_isolated(c));
        assert_eq!(network.route(a, c, &mut rng), Delivery::Dropped);
        assert_eq!(network.route(c, a, &mut rng), Delivery::Dropped);
        assert_eq!(network.route(a, b, &mut rng), Delivery::Unreachable);
        assert!(matches!(network.route(b, b, &mut rng), Delivery::After(_)));
    }

    #[test]
    fn test_full_loss() {
        let network = SimulatedNetwork::new(NetworkConfig::new(2).with_drop_probability(1.0));
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        assert_eq!(
            network.route(ServerIndex(0), ServerIndex(1), &mut rng),
            Delivery::Dropped
        );
    }
}
