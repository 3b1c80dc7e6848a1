//! Simulation runner.

use crate::event_queue::{EventKey, EventPriority};
use crate::network::{Delivery, NetworkConfig, SimulatedNetwork};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tally_core::{Action, CompletionGate, Event, OutboundMessage, StateMachine, TimerId};
use tally_protocol::{ProtocolConfig, ProtocolError, RoundState};
use tally_types::{
    AggregationConfig, ClientRequest, ConfigLoader, RoundId, ServerIndex, StaticConfigLoader,
    StaticTopology,
};
use tally_verifier::Verifier;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

/// Configuration reference every simulated server resolves.
const CONFIG_REFERENCE: &str = "simulation";

/// Hook that sees every message before the network does.
///
/// Receives `(from, to, message)` and returns the message to put on the
/// network, possibly rewritten, or `None` to drop it.
pub type MessageInterceptor =
    Box<dyn FnMut(ServerIndex, ServerIndex, OutboundMessage) -> Option<OutboundMessage>>;

/// Errors setting up a simulation.
#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    #[error("roster size {network} does not match configuration for {config} servers")]
    RosterMismatch { network: usize, config: usize },

    #[error("failed to create node {node}: {source}")]
    NodeSetup {
        node: ServerIndex,
        #[source]
        source: ProtocolError,
    },
}

/// Counters collected while running.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimulationStats {
    pub events_processed: u64,
    pub messages_sent: u64,
    pub messages_dropped: u64,
    pub messages_intercepted: u64,
    pub send_failures: u64,
    pub timers_fired: u64,
    pub timers_cancelled: u64,
}

struct SimNode<V: Verifier> {
    state: RoundState<V>,
    gate: CompletionGate,
    results: mpsc::Receiver<bool>,
    outcome: Option<bool>,
    round_timer: Option<EventKey>,
}

/// Runs one aggregation round across in-process nodes in simulated time.
pub struct SimulationRunner<V: Verifier> {
    nodes: Vec<SimNode<V>>,
    queue: BTreeMap<EventKey, Event>,
    sequence: u64,
    now: Duration,
    rng: ChaCha8Rng,
    network: SimulatedNetwork,
    interceptor: Option<MessageInterceptor>,
    stats: SimulationStats,
}

impl<V: Verifier> SimulationRunner<V> {
    /// Create a runner with one node per roster position.
    pub fn new(
        network: NetworkConfig,
        protocol: ProtocolConfig,
        aggregation: AggregationConfig,
        verifier: V,
        seed: u64,
    ) -> Result<Self, SimulationError> {
        if network.num_servers != aggregation.num_servers {
            return Err(SimulationError::RosterMismatch {
                network: network.num_servers,
                config: aggregation.num_servers,
            });
        }

        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let verifier = Arc::new(verifier);
        let loader: Arc<dyn ConfigLoader> =
            Arc::new(StaticConfigLoader::single(CONFIG_REFERENCE, aggregation));
        let num_servers = network.num_servers;

        let mut nodes = Vec::with_capacity(num_servers);
        for node in (0..num_servers).map(ServerIndex::from) {
            let topology = StaticTopology::new(node, num_servers).into_arc();
            let state = RoundState::new(
                RoundId(1),
                topology,
                verifier.clone(),
                loader.clone(),
                protocol.clone(),
                rng.gen(),
            )
            .map_err(|source| SimulationError::NodeSetup { node, source })?;
            let (gate, results) = CompletionGate::new();
            nodes.push(SimNode {
                state,
                gate,
                results,
                outcome: None,
                round_timer: None,
            });
        }

        Ok(Self {
            nodes,
            queue: BTreeMap::new(),
            sequence: 0,
            now: Duration::ZERO,
            rng,
            network: SimulatedNetwork::new(network),
            interceptor: None,
            stats: SimulationStats::default(),
        })
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Setup
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn network_mut(&mut self) -> &mut SimulatedNetwork {
        &mut self.network
    }

    /// Install a hook that can rewrite or drop messages.
    pub fn set_interceptor(
        &mut self,
        interceptor: impl FnMut(ServerIndex, ServerIndex, OutboundMessage) -> Option<OutboundMessage>
            + 'static,
    ) {
        self.interceptor = Some(Box::new(interceptor));
    }

    /// Start the round at the root with the given `[clients][servers]` matrix.
    ///
    /// A start error fails the round at the root and is returned.
    pub fn start_round(&mut self, requests: Vec<Vec<ClientRequest>>) -> Result<(), ProtocolError> {
        let root = &mut self.nodes[0];
        root.state.set_config_reference(CONFIG_REFERENCE);
        root.state.set_client_requests(requests);
        root.state.set_time(self.now);
        match root.state.start() {
            Ok(actions) => {
                self.process_actions(ServerIndex::ROOT, actions);
                Ok(())
            }
            Err(error) => {
                self.complete(ServerIndex::ROOT, false);
                Err(error)
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Execution
    // ═══════════════════════════════════════════════════════════════════════════

    /// Process the next scheduled event. Returns `false` when the queue is empty.
    pub fn step(&mut self) -> bool {
        let Some((key, event)) = self.queue.pop_first() else {
            return false;
        };
        self.now = key.time;
        self.stats.events_processed += 1;

        let node = &mut self.nodes[key.node.as_usize()];
        if matches!(event, Event::RoundTimeout) {
            self.stats.timers_fired += 1;
            node.round_timer = None;
        }

        trace!(node = %key.node, time = ?key.time, event = event.type_name(), "Processing event");
        node.state.set_time(self.now);
        let actions = node.state.handle(event);
        self.process_actions(key.node, actions);
        true
    }

    /// Run until no events remain.
    pub fn run_until_idle(&mut self) {
        while self.step() {}
    }

    /// Run every event scheduled at or before `deadline`.
    pub fn run_until(&mut self, deadline: Duration) {
        while self
            .queue
            .first_key_value()
            .is_some_and(|(key, _)| key.time <= deadline)
        {
            self.step();
        }
        self.now = self.now.max(deadline);
    }

    fn process_actions(&mut self, node: ServerIndex, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::SendTo { to, message } => self.send(node, to, message),
                Action::Broadcast { message } => {
                    for peer in (0..self.nodes.len()).map(ServerIndex::from) {
                        if peer != node {
                            self.send(node, peer, message.clone());
                        }
                    }
                }
                Action::SetTimer {
                    id: TimerId::Round,
                    duration,
                } => {
                    if let Some(previous) = self.nodes[node.as_usize()].round_timer.take() {
                        self.queue.remove(&previous);
                    }
                    let key = self.schedule(node, self.now + duration, Event::RoundTimeout);
                    self.nodes[node.as_usize()].round_timer = Some(key);
                }
                Action::CancelTimer { id: TimerId::Round } => {
                    if let Some(key) = self.nodes[node.as_usize()].round_timer.take() {
                        self.queue.remove(&key);
                        self.stats.timers_cancelled += 1;
                    }
                }
                Action::EmitRoundResult { success } => self.complete(node, success),
            }
        }
    }

    fn send(&mut self, from: ServerIndex, to: ServerIndex, message: OutboundMessage) {
        if !to.is_within(self.nodes.len()) {
            warn!(from = %from, to = %to, "Dropping message to unknown node");
            return;
        }

        let message = match self.interceptor.as_mut() {
            Some(intercept) => match intercept(from, to, message) {
                Some(message) => message,
                None => {
                    self.stats.messages_intercepted += 1;
                    return;
                }
            },
            None => message,
        };

        self.stats.messages_sent += 1;
        match self.network.route(from, to, &mut self.rng) {
            Delivery::After(latency) => {
                self.schedule(
                    to,
                    self.now + latency,
                    message.into_event(from),
                );
            }
            Delivery::Dropped => {
                trace!(from = %from, to = %to, message = message.type_name(), "Message dropped");
                self.stats.messages_dropped += 1;
            }
            Delivery::Unreachable => {
                debug!(from = %from, to = %to, message = message.type_name(), "Send failed");
                self.stats.send_failures += 1;
                self.schedule(
                    from,
                    self.now,
                    Event::TransportFailed {
                        to,
                        reason: "connection refused".into(),
                    },
                );
            }
        }
    }

    fn schedule(&mut self, node: ServerIndex, time: Duration, event: Event) -> EventKey {
        let key = EventKey {
            time,
            priority: EventPriority::for_event(&event),
            node,
            sequence: self.sequence,
        };
        self.sequence += 1;
        self.queue.insert(key, event);
        key
    }

    fn complete(&mut self, node: ServerIndex, success: bool) {
        let node = &mut self.nodes[node.as_usize()];
        node.gate.complete(success);
        if let Ok(outcome) = node.results.try_recv() {
            node.outcome = Some(outcome);
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Inspection
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn node(&self, node: ServerIndex) -> &RoundState<V> {
        &self.nodes[node.as_usize()].state
    }

    /// The outcome published through a node's completion gate.
    pub fn outcome(&self, node: ServerIndex) -> Option<bool> {
        self.nodes[node.as_usize()].outcome
    }

    pub fn outcomes(&self) -> Vec<Option<bool>> {
        self.nodes.iter().map(|n| n.outcome).collect()
    }

    pub fn now(&self) -> Duration {
        self.now
    }

    pub fn stats(&self) -> &SimulationStats {
        &self.stats
    }

    pub fn pending_events(&self) -> usize {
        self.queue.len()
    }
}
