//! Async round runner.
//!
//! Each server's [`RoundState`] runs on its own tokio task. The task owns the
//! state machine and its inbox; it decodes envelopes into events, executes
//! the returned actions, and publishes the outcome through a
//! [`CompletionGate`]. Timers are tokio sleeps whose abort handle is armed on
//! the gate, so finishing the round always stops the timer.

use crate::network::{decode_message, encode_message, Envelope, LocalTransport, Transport};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tally_core::{Action, CompletionGate, Event, OutboundMessage, StateMachine, TimerId};
use tally_protocol::{ProtocolConfig, ProtocolError, RoundState};
use tally_types::{
    ClientRequest, ConfigLoader, RoundId, ServerIndex, StaticTopology, Topology,
};
use tally_verifier::Verifier;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Settings for the async runner.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Round driver settings shared by every server.
    pub protocol: ProtocolConfig,

    /// Capacity of each server's inbox.
    pub inbox_capacity: usize,

    /// How long past the round timeout to wait for servers that never
    /// started before shutting them down.
    pub shutdown_grace: Duration,

    /// Seed for the per-server random keys.
    pub seed: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            protocol: ProtocolConfig::default(),
            inbox_capacity: 1024,
            shutdown_grace: Duration::from_millis(500),
            seed: 0,
        }
    }
}

impl RunnerConfig {
    pub fn with_protocol(mut self, protocol: ProtocolConfig) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn with_inbox_capacity(mut self, capacity: usize) -> Self {
        self.inbox_capacity = capacity;
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Errors running a round.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("failed to set up {index}: {source}")]
    Setup {
        index: ServerIndex,
        #[source]
        source: ProtocolError,
    },

    #[error("a round needs at least one server")]
    EmptyRoster,

    #[error("server task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Drives one server's state machine.
pub struct NodeRunner<V: Verifier> {
    state: RoundState<V>,
    peers: Vec<ServerIndex>,
    transport: Arc<dyn Transport>,
    inbox: mpsc::Receiver<Envelope>,
    gate: Arc<CompletionGate>,
    timer_tx: mpsc::Sender<TimerId>,
    timer_rx: mpsc::Receiver<TimerId>,
    timer: Option<AbortHandle>,
    started_at: Instant,
}

impl<V: Verifier + 'static> NodeRunner<V> {
    pub fn new(
        state: RoundState<V>,
        peers: Vec<ServerIndex>,
        transport: Arc<dyn Transport>,
        inbox: mpsc::Receiver<Envelope>,
        gate: Arc<CompletionGate>,
    ) -> Self {
        let (timer_tx, timer_rx) = mpsc::channel(1);
        Self {
            state,
            peers,
            transport,
            inbox,
            gate,
            timer_tx,
            timer_rx,
            timer: None,
            started_at: Instant::now(),
        }
    }

    pub fn state(&self) -> &RoundState<V> {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut RoundState<V> {
        &mut self.state
    }

    /// Start the round on the root.
    ///
    /// A start error is published as a failed round before it is returned.
    pub fn start(&mut self) -> Result<(), ProtocolError> {
        self.state.set_time(self.started_at.elapsed());
        match self.state.start() {
            Ok(actions) => {
                self.execute(actions);
                Ok(())
            }
            Err(error) => {
                self.gate.complete(false);
                Err(error)
            }
        }
    }

    /// Process inbound messages and timers until shut down.
    ///
    /// Keeps draining the inbox after the round finishes so that late peers
    /// can still deliver. Returns the state machine for inspection.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> RoundState<V> {
        loop {
            let event = tokio::select! {
                envelope = self.inbox.recv() => match envelope {
                    Some(envelope) => match decode_message(envelope.topic, &envelope.payload) {
                        Ok(message) => message.into_event(envelope.from),
                        Err(error) => {
                            warn!(
                                server = %self.state.local_index(),
                                from = %envelope.from,
                                topic = envelope.topic,
                                error = %error,
                                "Undecodable message"
                            );
                            Event::UndecodableMessage {
                                from: envelope.from,
                                topic: envelope.topic.to_string(),
                                reason: error.to_string(),
                            }
                        }
                    },
                    None => break,
                },
                Some(TimerId::Round) = self.timer_rx.recv() => {
                    self.timer = None;
                    Event::RoundTimeout
                }
                _ = shutdown.changed() => break,
            };
            self.dispatch(event);
        }

        self.cancel_timer();
        debug!(
            server = %self.state.local_index(),
            phase = %self.state.phase(),
            "Runner stopped"
        );
        self.state
    }

    fn dispatch(&mut self, event: Event) {
        self.state.set_time(self.started_at.elapsed());
        let actions = self.state.handle(event);
        self.execute(actions);
    }

    fn execute(&mut self, actions: Vec<Action>) {
        let mut pending: VecDeque<Action> = actions.into();
        while let Some(action) = pending.pop_front() {
            match action {
                Action::SendTo { to, message } => {
                    if let Err(reason) = self.send(to, &message) {
                        pending.extend(self.state.on_transport_failure(to, reason));
                    }
                }
                Action::Broadcast { message } => {
                    for peer in self.peers.clone() {
                        if let Err(reason) = self.send(peer, &message) {
                            pending.extend(self.state.on_transport_failure(peer, reason));
                            break;
                        }
                    }
                }
                Action::SetTimer { id, duration } => self.arm_timer(id, duration),
                Action::CancelTimer { .. } => self.cancel_timer(),
                Action::EmitRoundResult { success } => self.gate.complete(success),
            }
        }
    }

    fn send(&self, to: ServerIndex, message: &OutboundMessage) -> Result<(), String> {
        let payload = encode_message(message).map_err(|e| e.to_string())?;
        let envelope = Envelope {
            from: self.state.local_index(),
            topic: message.topic(),
            payload,
        };
        self.transport
            .send(to, envelope)
            .map_err(|e| e.to_string())
    }

    fn arm_timer(&mut self, id: TimerId, duration: Duration) {
        self.cancel_timer();
        let tx = self.timer_tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            let _ = tx.send(id).await;
        })
        .abort_handle();

        let cancel = handle.clone();
        self.gate.arm_timer(move || cancel.abort());
        self.timer = Some(handle);
    }

    fn cancel_timer(&mut self) {
        if let Some(handle) = self.timer.take() {
            handle.abort();
        }
    }
}

/// Outcome of a round run by [`LocalCluster`].
///
/// Always holds at least the root.
pub struct RoundReport<V: Verifier> {
    outcomes: Vec<Option<bool>>,
    states: Vec<RoundState<V>>,
}

impl<V: Verifier> RoundReport<V> {
    /// Whether the root's round succeeded.
    pub fn succeeded(&self) -> bool {
        self.outcome(ServerIndex::ROOT) == Some(true)
    }

    /// The outcome a server published, if it finished.
    pub fn outcome(&self, index: ServerIndex) -> Option<bool> {
        self.outcomes.get(index.as_usize()).copied().flatten()
    }

    pub fn outcomes(&self) -> &[Option<bool>] {
        &self.outcomes
    }

    pub fn state(&self, index: ServerIndex) -> Option<&RoundState<V>> {
        self.states.get(index.as_usize())
    }

    pub fn root(&self) -> &RoundState<V> {
        &self.states[0]
    }
}

/// A full roster of servers in one process, connected by [`LocalTransport`].
pub struct LocalCluster<V: Verifier> {
    num_servers: usize,
    verifier: Arc<V>,
    loader: Arc<dyn ConfigLoader>,
    reference: String,
    config: RunnerConfig,
    disconnected: Vec<ServerIndex>,
}

impl<V: Verifier + 'static> LocalCluster<V> {
    pub fn new(
        num_servers: usize,
        verifier: V,
        loader: Arc<dyn ConfigLoader>,
        reference: impl Into<String>,
        config: RunnerConfig,
    ) -> Self {
        Self {
            num_servers,
            verifier: Arc::new(verifier),
            loader,
            reference: reference.into(),
            config,
            disconnected: Vec::new(),
        }
    }

    /// Make every send to `server` fail.
    pub fn with_disconnected(mut self, server: ServerIndex) -> Self {
        self.disconnected.push(server);
        self
    }

    /// Run one round over the `[clients][servers]` request matrix.
    pub async fn run(
        &self,
        round: RoundId,
        requests: Vec<Vec<ClientRequest>>,
    ) -> Result<RoundReport<V>, RunnerError> {
        if self.num_servers == 0 {
            return Err(RunnerError::EmptyRoster);
        }
        let (transport, inboxes) = LocalTransport::mesh(self.num_servers, self.config.inbox_capacity);
        for server in &self.disconnected {
            transport.disconnect(*server);
        }
        let transport: Arc<dyn Transport> = transport;

        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        let mut runners = Vec::with_capacity(self.num_servers);
        let mut results = Vec::with_capacity(self.num_servers);
        for (i, inbox) in inboxes.into_iter().enumerate() {
            let index = ServerIndex::from(i);
            let topology = StaticTopology::new(index, self.num_servers);
            let peers = topology.peers();
            let state = RoundState::new(
                round,
                topology.into_arc(),
                self.verifier.clone(),
                self.loader.clone(),
                self.config.protocol.clone(),
                rng.gen(),
            )
            .map_err(|source| RunnerError::Setup { index, source })?;

            let (gate, result_rx) = CompletionGate::new();
            let gate = gate.with_done_hook(move || debug!(server = %index, "Round finished"));
            runners.push(NodeRunner::new(
                state,
                peers,
                transport.clone(),
                inbox,
                Arc::new(gate),
            ));
            results.push(result_rx);
        }

        info!(
            round = %round,
            servers = self.num_servers,
            clients = requests.len(),
            "Running round"
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let started = match runners.first_mut() {
            Some(root) => {
                root.state_mut().set_config_reference(self.reference.clone());
                root.state_mut().set_client_requests(requests);
                match root.start() {
                    Ok(()) => true,
                    Err(error) => {
                        warn!(round = %round, error = %error, "Round failed to start");
                        false
                    }
                }
            }
            None => false,
        };

        let handles: Vec<_> = runners
            .into_iter()
            .map(|runner| tokio::spawn(runner.run(shutdown_rx.clone())))
            .collect();

        let mut outcomes = Vec::with_capacity(results.len());
        if started {
            let deadline =
                Instant::now() + self.config.protocol.round_timeout + self.config.shutdown_grace;
            for rx in &mut results {
                outcomes.push(tokio::time::timeout_at(deadline, rx.recv()).await.ok().flatten());
            }
        } else {
            outcomes.extend(results.iter_mut().map(|rx| rx.try_recv().ok()));
        }

        let _ = shutdown_tx.send(true);
        let mut states = Vec::with_capacity(handles.len());
        for handle in handles {
            states.push(handle.await?);
        }

        Ok(RoundReport { outcomes, states })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::TransportError;
    use tally_client::ClientRequestSupplier;
    use tally_messages::{EvalCircuitReply, NetworkMessage};
    use tally_types::{AggregationConfig, DataPoint, StaticConfigLoader};
    use tally_verifier::{LinRegCircuit, LinRegStatistic, SnipVerifier};
    use tracing_test::traced_test;

    const REFERENCE: &str = "linreg";

    fn cluster(num_servers: usize) -> LocalCluster<SnipVerifier> {
        let loader = Arc::new(StaticConfigLoader::single(
            REFERENCE,
            AggregationConfig::new(num_servers, 2),
        ));
        let config = RunnerConfig::default().with_protocol(
            ProtocolConfig::default().with_round_timeout(Duration::from_secs(2)),
        );
        LocalCluster::new(num_servers, SnipVerifier::new(), loader, REFERENCE, config)
    }

    fn requests(num_servers: usize) -> Vec<Vec<ClientRequest>> {
        let points = vec![
            DataPoint::new(1.0, vec![2.0, 3.0]),
            DataPoint::new(-2.0, vec![0.0, 1.0]),
        ];
        ClientRequestSupplier::new(SnipVerifier::new(), AggregationConfig::new(num_servers, 2))
            .shares_for_points(&points, &mut ChaCha8Rng::seed_from_u64(3))
            .unwrap()
    }

    #[traced_test]
    #[tokio::test]
    async fn test_round_through_codec_succeeds() {
        let report = cluster(3).run(RoundId(1), requests(3)).await.unwrap();

        assert!(report.succeeded());
        assert_eq!(report.outcomes(), &[Some(true); 3]);
        for i in 0..3 {
            let state = report.state(ServerIndex(i)).unwrap();
            assert_eq!(state.acceptance(), &[true, true]);
            assert_eq!(state.aggregators().len(), 3);
        }

        let combined = report.root().combined_aggregate().unwrap().unwrap();
        let stat = LinRegStatistic::from_aggregator(&LinRegCircuit::new(2), &combined).unwrap();
        assert_eq!(stat.count, 2);
        assert_eq!(stat.sum_x, vec![2, 4]);
        assert_eq!(stat.sum_y, -1);
        assert_eq!(stat.sum_xy, vec![2, 1]);
    }

    #[traced_test]
    #[tokio::test]
    async fn test_disconnected_server_fails_round() {
        let report = cluster(3)
            .with_disconnected(ServerIndex(2))
            .run(RoundId(2), requests(3))
            .await
            .unwrap();

        assert!(!report.succeeded());
        assert_eq!(report.outcome(ServerIndex::ROOT), Some(false));
        assert!(matches!(
            report.root().failure_reason(),
            Some(ProtocolError::Transport { to: ServerIndex(2), .. })
        ));
    }

    #[traced_test]
    #[tokio::test]
    async fn test_start_failure_is_published() {
        let mut matrix = requests(3);
        matrix[0].pop();

        let report = cluster(3).run(RoundId(3), matrix).await.unwrap();
        assert_eq!(report.outcomes(), &[Some(false), None, None]);
        assert!(matches!(
            report.root().failure_reason(),
            Some(ProtocolError::Configuration(_))
        ));
    }

    /// Replaces one sender's correctness replies with a payload that
    /// decompresses but is not a message.
    struct Corrupting {
        inner: Arc<LocalTransport>,
        sender: ServerIndex,
    }

    impl Transport for Corrupting {
        fn send(&self, to: ServerIndex, mut envelope: Envelope) -> Result<(), TransportError> {
            if envelope.from == self.sender && envelope.topic == EvalCircuitReply::message_type_id()
            {
                envelope.payload = lz4_flex::compress_prepend_size(b"{\"server_index\":");
            }
            self.inner.send(to, envelope)
        }
    }

    #[traced_test]
    #[tokio::test]
    async fn test_undecodable_reply_fails_round_before_timeout() {
        let num_servers = 3;
        let (mesh, inboxes) = LocalTransport::mesh(num_servers, 64);
        let transport: Arc<dyn Transport> = Arc::new(Corrupting {
            inner: mesh,
            sender: ServerIndex(1),
        });
        let loader: Arc<dyn ConfigLoader> = Arc::new(StaticConfigLoader::single(
            REFERENCE,
            AggregationConfig::new(num_servers, 2),
        ));
        let verifier = Arc::new(SnipVerifier::new());
        let protocol = ProtocolConfig::default().with_round_timeout(Duration::from_secs(60));

        let mut runners = Vec::new();
        let mut results = Vec::new();
        for (i, inbox) in inboxes.into_iter().enumerate() {
            let topology = StaticTopology::new(ServerIndex::from(i), num_servers);
            let peers = topology.peers();
            let state = RoundState::new(
                RoundId(5),
                topology.into_arc(),
                verifier.clone(),
                loader.clone(),
                protocol.clone(),
                i as u64,
            )
            .unwrap();
            let (gate, result_rx) = CompletionGate::new();
            runners.push(NodeRunner::new(
                state,
                peers,
                transport.clone(),
                inbox,
                Arc::new(gate),
            ));
            results.push(result_rx);
        }

        let root = &mut runners[0];
        root.state_mut().set_config_reference(REFERENCE);
        root.state_mut().set_client_requests(requests(num_servers));
        root.start().unwrap();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handles: Vec<_> = runners
            .into_iter()
            .map(|runner| tokio::spawn(runner.run(shutdown_rx.clone())))
            .collect();

        let outcome = tokio::time::timeout(Duration::from_secs(5), results[0].recv())
            .await
            .unwrap();
        assert_eq!(outcome, Some(false));

        shutdown_tx.send(true).unwrap();
        let mut states = Vec::new();
        for handle in handles {
            states.push(handle.await.unwrap());
        }
        assert_eq!(states[0].failures(), 1);
        assert!(matches!(
            states[0].failure_reason(),
            Some(ProtocolError::QuorumUnreachable {
                failures: 1,
                tolerated: 0
            })
        ));
    }

    #[traced_test]
    #[tokio::test]
    async fn test_empty_roster_is_rejected() {
        let result = cluster(0).run(RoundId(6), Vec::new()).await;
        assert!(matches!(result, Err(RunnerError::EmptyRoster)));
    }

    #[traced_test]
    #[tokio::test]
    async fn test_single_server_round() {
        let report = cluster(1).run(RoundId(4), requests(1)).await.unwrap();
        assert!(report.succeeded());
        assert_eq!(report.root().aggregators().len(), 1);
    }
}
