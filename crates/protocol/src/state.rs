//! Per-round state machine.

use crate::{transpose, FailureTracker, Phase, ProtocolConfig, ProtocolError};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tally_core::{Action, Event, OutboundMessage, StateMachine, TimerId};
use tally_messages::{
    AggregateReply, EvalCircuit, EvalCircuitReply, FinalEvalCircuitReply, NetworkMessage,
};
use tally_types::{
    Aggregator, AggregatorMismatch, ClientRequest, ConfigLoader, CorrectnessShare, PrgKey,
    RoundId, ServerIndex, Topology, ValidityShare,
};
use tally_verifier::Verifier;
use tracing::{debug, info, trace, warn};

/// Replies collected for one phase, in arrival order.
#[derive(Debug)]
struct ReplySet<T> {
    senders: Vec<ServerIndex>,
    values: Vec<T>,
}

impl<T> ReplySet<T> {
    fn new() -> Self {
        Self {
            senders: Vec::new(),
            values: Vec::new(),
        }
    }

    fn contains(&self, index: ServerIndex) -> bool {
        self.senders.contains(&index)
    }

    fn push(&mut self, index: ServerIndex, value: T) {
        self.senders.push(index);
        self.values.push(value);
    }

    fn len(&self) -> usize {
        self.values.len()
    }

    fn take_values(&mut self) -> Vec<T> {
        std::mem::take(&mut self.values)
    }
}

/// Verifier context for the round, built in phase 1.
struct Session<V: Verifier> {
    precomp: V::Precomp,
    checkers: Vec<V::Checker>,
}

/// How a reply relates to the current phase.
enum Route {
    Process,
    Buffer,
    Ignore,
}

fn reply_phase(event: &Event) -> Option<Phase> {
    match event {
        Event::EvalCircuitReplyReceived { .. } => Some(Phase::AwaitingCorrectness),
        Event::FinalEvalCircuitReplyReceived { .. } => Some(Phase::AwaitingValidity),
        Event::AggregateReplyReceived { .. } => Some(Phase::AwaitingAggregators),
        Event::UndecodableMessage { topic, .. } => topic_phase(topic),
        _ => None,
    }
}

/// Phase whose replies travel under `topic`.
fn topic_phase(topic: &str) -> Option<Phase> {
    if topic == EvalCircuitReply::message_type_id() {
        Some(Phase::AwaitingCorrectness)
    } else if topic == FinalEvalCircuitReply::message_type_id() {
        Some(Phase::AwaitingValidity)
    } else if topic == AggregateReply::message_type_id() {
        Some(Phase::AwaitingAggregators)
    } else {
        None
    }
}

fn missing_session() -> ProtocolError {
    ProtocolError::Configuration("phase entered without verifier context".into())
}

/// One server's state for one aggregation round.
///
/// Created per round and discarded after completion. Replies are collected
/// in arrival order; a phase completes as soon as the threshold is reached,
/// and later replies for it are ignored. Replies for a phase this server has
/// not reached yet are buffered and replayed when it gets there.
pub struct RoundState<V: Verifier> {
    round: RoundId,

    /// Network topology (roster and local index).
    topology: Arc<dyn Topology>,

    verifier: Arc<V>,

    /// Resolves the configuration reference carried by `EvalCircuit`.
    loader: Arc<dyn ConfigLoader>,

    config: ProtocolConfig,

    /// Source of per-client keys.
    rng: ChaCha8Rng,

    phase: Phase,

    failures: FailureTracker,

    /// Root only: inputs for `start`.
    config_reference: Option<String>,
    client_requests: Option<Vec<Vec<ClientRequest>>>,
    started: bool,

    session: Option<Session<V>>,

    correctness: ReplySet<Vec<CorrectnessShare>>,
    validity: ReplySet<Vec<ValidityShare>>,
    aggregators: ReplySet<Aggregator>,

    /// Per-client verdicts, set once in phase 2.
    acceptance: Vec<bool>,

    /// Replies that arrived before their phase.
    buffered: VecDeque<Event>,

    failure_reason: Option<ProtocolError>,

    now: Duration,
}

impl<V: Verifier> RoundState<V> {
    /// Create the state for one round.
    ///
    /// Fails if the configured threshold does not fit the roster.
    pub fn new(
        round: RoundId,
        topology: Arc<dyn Topology>,
        verifier: Arc<V>,
        loader: Arc<dyn ConfigLoader>,
        config: ProtocolConfig,
        seed: u64,
    ) -> Result<Self, ProtocolError> {
        let num_servers = topology.num_servers();
        let failures = FailureTracker::new(num_servers, config.threshold_for(num_servers))?;
        Ok(Self {
            round,
            topology,
            verifier,
            loader,
            config,
            rng: ChaCha8Rng::seed_from_u64(seed),
            phase: Phase::Init,
            failures,
            config_reference: None,
            client_requests: None,
            started: false,
            session: None,
            correctness: ReplySet::new(),
            validity: ReplySet::new(),
            aggregators: ReplySet::new(),
            acceptance: Vec::new(),
            buffered: VecDeque::new(),
            failure_reason: None,
            now: Duration::ZERO,
        })
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Accessors
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn round(&self) -> RoundId {
        self.round
    }

    pub fn local_index(&self) -> ServerIndex {
        self.topology.local_index()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_done(&self) -> bool {
        self.phase.is_done()
    }

    /// The round outcome, once finished.
    pub fn outcome(&self) -> Option<bool> {
        match self.phase {
            Phase::Done(success) => Some(success),
            _ => None,
        }
    }

    /// Why the round failed, if it did.
    pub fn failure_reason(&self) -> Option<&ProtocolError> {
        self.failure_reason.as_ref()
    }

    /// Number of replies rejected so far.
    pub fn failures(&self) -> usize {
        self.failures.failures()
    }

    pub fn threshold(&self) -> usize {
        self.failures.threshold()
    }

    /// Number of clients in the round (zero before phase 1).
    pub fn num_clients(&self) -> usize {
        self.session.as_ref().map_or(0, |s| s.checkers.len())
    }

    /// Per-client acceptance, in client order. Empty before phase 2 completes.
    pub fn acceptance(&self) -> &[bool] {
        &self.acceptance
    }

    /// Aggregators collected in phase 3, in arrival order, own first.
    pub fn aggregators(&self) -> &[Aggregator] {
        &self.aggregators.values
    }

    /// Claimed senders of [`Self::aggregators`], in the same order.
    pub fn aggregator_senders(&self) -> &[ServerIndex] {
        &self.aggregators.senders
    }

    /// Combine the collected aggregators. `None` until any were collected.
    pub fn combined_aggregate(&self) -> Option<Result<Aggregator, AggregatorMismatch>> {
        Aggregator::combine_all(self.aggregators.values.iter())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Root API
    // ═══════════════════════════════════════════════════════════════════════════

    /// Name the configuration every server will load.
    pub fn set_config_reference(&mut self, reference: impl Into<String>) {
        self.config_reference = Some(reference.into());
    }

    /// Provide the client-request matrix, `[clients][servers]`.
    pub fn set_client_requests(&mut self, requests: Vec<Vec<ClientRequest>>) {
        self.client_requests = Some(requests);
    }

    /// Start the round by sending every server its column of the client
    /// requests, this server included.
    ///
    /// On error nothing is sent and the round is marked failed; the caller
    /// publishes the failure.
    pub fn start(&mut self) -> Result<Vec<Action>, ProtocolError> {
        if self.started {
            return Err(ProtocolError::Configuration("round already started".into()));
        }
        self.started = true;

        match self.prepare_start() {
            Ok(actions) => Ok(actions),
            Err(error) => {
                self.fail(error.clone());
                Err(error)
            }
        }
    }

    fn prepare_start(&mut self) -> Result<Vec<Action>, ProtocolError> {
        if !self.topology.is_root() {
            return Err(ProtocolError::Configuration(format!(
                "{} is not the root",
                self.local_index()
            )));
        }
        let reference = self
            .config_reference
            .clone()
            .ok_or_else(|| ProtocolError::Configuration("no configuration reference".into()))?;
        let matrix = self
            .client_requests
            .take()
            .ok_or_else(|| ProtocolError::Configuration("no client requests".into()))?;

        let num_servers = self.topology.num_servers();
        let aggregation = self
            .loader
            .load(&reference)
            .map_err(|e| ProtocolError::Configuration(e.to_string()))?;
        if aggregation.num_servers != num_servers {
            return Err(ProtocolError::Configuration(format!(
                "configuration is for {} servers, roster has {}",
                aggregation.num_servers, num_servers
            )));
        }
        let precomp = self.verifier.precompute(&aggregation)?;
        self.check_verifier(&precomp)?;

        let num_clients = matrix.len();
        let columns = transpose(matrix, num_servers)
            .map_err(|e| ProtocolError::Configuration(format!("client requests: {}", e)))?;

        info!(
            round = %self.round,
            clients = num_clients,
            servers = num_servers,
            reference = %reference,
            "Starting round"
        );

        Ok(self
            .topology
            .roster()
            .iter()
            .copied()
            .zip(columns)
            .map(|(to, shares)| Action::SendTo {
                to,
                message: OutboundMessage::EvalCircuit(EvalCircuit::new(reference.clone(), shares)),
            })
            .collect())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Phase 1: correctness shares
    // ═══════════════════════════════════════════════════════════════════════════

    fn on_eval_circuit(&mut self, from: ServerIndex, message: EvalCircuit) -> Vec<Action> {
        if self.phase != Phase::Init {
            debug!(server = %self.local_index(), from = %from, phase = %self.phase, "Ignoring repeated EvalCircuit");
            return vec![];
        }

        let local = self.local_index();
        let num_servers = self.topology.num_servers();
        if !local.is_within(num_servers) {
            return self.fail(ProtocolError::InvalidLocalIndex {
                index: local,
                num_servers,
            });
        }

        let session = match self.open_session(&message) {
            Ok(session) => session,
            Err(error) => return self.fail(error),
        };

        let shares: Vec<CorrectnessShare> = session
            .checkers
            .iter()
            .map(|checker| {
                self.verifier
                    .produce_correctness_share(&session.precomp, checker)
            })
            .collect();

        debug!(
            server = %local,
            from = %from,
            clients = shares.len(),
            "Produced correctness shares"
        );

        self.session = Some(session);
        self.phase = Phase::AwaitingCorrectness;

        let reply = EvalCircuitReply::new(local, &shares);
        self.correctness.push(local, shares);

        let mut actions = vec![
            Action::SetTimer {
                id: TimerId::Round,
                duration: self.config.round_timeout,
            },
            Action::Broadcast {
                message: OutboundMessage::EvalCircuitReply(reply),
            },
        ];
        actions.extend(self.try_finish_correctness());
        actions
    }

    fn open_session(&self, message: &EvalCircuit) -> Result<Session<V>, ProtocolError> {
        let aggregation = self
            .loader
            .load(&message.config_reference)
            .map_err(|e| ProtocolError::Configuration(e.to_string()))?;
        let num_servers = self.topology.num_servers();
        if aggregation.num_servers != num_servers {
            return Err(ProtocolError::Configuration(format!(
                "configuration is for {} servers, roster has {}",
                aggregation.num_servers, num_servers
            )));
        }

        let precomp = self.verifier.precompute(&aggregation)?;
        self.check_verifier(&precomp)?;
        let local = self.local_index();
        let checkers = message
            .shares
            .iter()
            .map(|request| self.verifier.new_checker(&precomp, local, request))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Session { precomp, checkers })
    }

    /// Refuse a round the verifier cannot decide.
    fn check_verifier(&self, precomp: &V::Precomp) -> Result<(), ProtocolError> {
        if self.verifier.modulus(precomp) == 0 {
            return Err(ProtocolError::Configuration("verifier reports a zero modulus".into()));
        }
        let minimum = self.verifier.min_threshold(precomp);
        let threshold = self.failures.threshold();
        if threshold < minimum {
            return Err(ProtocolError::Configuration(format!(
                "threshold {} is below the {} replies the verifier needs",
                threshold, minimum
            )));
        }
        Ok(())
    }

    fn on_correctness_reply(&mut self, from: ServerIndex, reply: EvalCircuitReply) -> Vec<Action> {
        let phase = Phase::AwaitingCorrectness;
        match self.route(phase) {
            Route::Process => {}
            Route::Buffer => {
                trace!(server = %self.local_index(), from = %from, "Buffering early correctness reply");
                self.buffered
                    .push_back(Event::EvalCircuitReplyReceived { from, reply });
                return vec![];
            }
            Route::Ignore => {
                trace!(server = %self.local_index(), from = %from, "Ignoring stale correctness reply");
                return vec![];
            }
        }

        let index = reply.server_index;
        let checked = self
            .check_index(index)
            .and_then(|()| self.check_duplicate(phase, from, index, self.correctness.contains(index)))
            .and_then(|()| {
                let shares = reply
                    .parse_shares()
                    .map_err(|e| self.malformed(phase, from, e.to_string()))?;
                self.check_length(phase, from, shares.len())?;
                Ok(shares)
            });

        match checked {
            Ok(shares) => {
                self.correctness.push(index, shares);
                self.try_finish_correctness()
            }
            Err(error) => self.reject(error),
        }
    }

    fn try_finish_correctness(&mut self) -> Vec<Action> {
        if self.phase != Phase::AwaitingCorrectness || !self.failures.is_met(self.correctness.len())
        {
            return vec![];
        }
        match self.enter_validity() {
            Ok(actions) => actions,
            Err(error) => self.fail(error),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Phase 2: validity shares
    // ═══════════════════════════════════════════════════════════════════════════

    fn enter_validity(&mut self) -> Result<Vec<Action>, ProtocolError> {
        let num_clients = self.num_clients();
        let per_client = transpose(self.correctness.take_values(), num_clients)
            .map_err(|e| ProtocolError::Configuration(format!("correctness shares: {}", e)))?;

        let session = self.session.as_ref().ok_or_else(missing_session)?;
        let mut shares = Vec::with_capacity(num_clients);
        for (checker, client_shares) in session.checkers.iter().zip(&per_client) {
            let correctness =
                self.verifier
                    .fold_correctness_shares(&session.precomp, checker, client_shares);
            let key = PrgKey::random(&mut self.rng);
            shares.push(self.verifier.produce_validity_share(
                &session.precomp,
                checker,
                &correctness,
                &key,
            ));
        }

        let local = self.local_index();
        debug!(server = %local, clients = num_clients, "Produced validity shares");

        self.phase = Phase::AwaitingValidity;
        self.validity.push(local, shares.clone());

        let mut actions = vec![Action::Broadcast {
            message: OutboundMessage::FinalEvalCircuitReply(FinalEvalCircuitReply::new(
                local, shares,
            )),
        }];
        actions.extend(self.try_finish_validity());
        Ok(actions)
    }

    fn on_validity_reply(&mut self, from: ServerIndex, reply: FinalEvalCircuitReply) -> Vec<Action> {
        let phase = Phase::AwaitingValidity;
        match self.route(phase) {
            Route::Process => {}
            Route::Buffer => {
                trace!(server = %self.local_index(), from = %from, "Buffering early validity reply");
                self.buffered
                    .push_back(Event::FinalEvalCircuitReplyReceived { from, reply });
                return vec![];
            }
            Route::Ignore => {
                trace!(server = %self.local_index(), from = %from, "Ignoring stale validity reply");
                return vec![];
            }
        }

        let index = reply.server_index;
        let checked = self
            .check_index(index)
            .and_then(|()| self.check_duplicate(phase, from, index, self.validity.contains(index)))
            .and_then(|()| self.check_length(phase, from, reply.validity_shares.len()));

        match checked {
            Ok(()) => {
                self.validity.push(index, reply.validity_shares);
                self.try_finish_validity()
            }
            Err(error) => self.reject(error),
        }
    }

    fn try_finish_validity(&mut self) -> Vec<Action> {
        if self.phase != Phase::AwaitingValidity || !self.failures.is_met(self.validity.len()) {
            return vec![];
        }
        match self.enter_aggregation() {
            Ok(actions) => actions,
            Err(error) => self.fail(error),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Phase 3: aggregation
    // ═══════════════════════════════════════════════════════════════════════════

    fn enter_aggregation(&mut self) -> Result<Vec<Action>, ProtocolError> {
        let num_clients = self.num_clients();
        let per_client = transpose(self.validity.take_values(), num_clients)
            .map_err(|e| ProtocolError::Configuration(format!("validity shares: {}", e)))?;

        let session = self.session.as_ref().ok_or_else(missing_session)?;
        let modulus = self.verifier.modulus(&session.precomp) as u128;
        self.acceptance = per_client
            .iter()
            .map(|shares| {
                let total: u128 = shares.iter().map(|s| s.check.value() as u128).sum();
                total % modulus == 0
            })
            .collect();

        let mut aggregator = self.verifier.new_aggregator(&session.precomp);
        for (checker, accepted) in session.checkers.iter().zip(&self.acceptance) {
            self.verifier
                .fold_into_aggregator(&session.precomp, &mut aggregator, checker, *accepted);
        }

        let local = self.local_index();
        let accepted = self.acceptance.iter().filter(|a| **a).count();
        info!(
            server = %local,
            round = %self.round,
            accepted,
            rejected = num_clients - accepted,
            "Client validity decided"
        );

        self.phase = Phase::AwaitingAggregators;
        self.aggregators.push(local, aggregator.clone());

        let mut actions = vec![Action::Broadcast {
            message: OutboundMessage::AggregateReply(AggregateReply::new(local, aggregator)),
        }];
        actions.extend(self.try_finish_aggregation());
        Ok(actions)
    }

    fn on_aggregate_reply(&mut self, from: ServerIndex, reply: AggregateReply) -> Vec<Action> {
        let phase = Phase::AwaitingAggregators;
        match self.route(phase) {
            Route::Process => {}
            Route::Buffer => {
                trace!(server = %self.local_index(), from = %from, "Buffering early aggregate reply");
                self.buffered
                    .push_back(Event::AggregateReplyReceived { from, reply });
                return vec![];
            }
            Route::Ignore => {
                trace!(server = %self.local_index(), from = %from, "Ignoring stale aggregate reply");
                return vec![];
            }
        }

        let index = reply.server_index;
        if let Err(error) =
            self.check_duplicate(phase, from, index, self.aggregators.contains(index))
        {
            return self.reject(error);
        }

        self.aggregators.push(index, reply.into_aggregator());
        self.try_finish_aggregation()
    }

    fn try_finish_aggregation(&mut self) -> Vec<Action> {
        if self.phase != Phase::AwaitingAggregators || !self.failures.is_met(self.aggregators.len())
        {
            return vec![];
        }
        info!(
            server = %self.local_index(),
            round = %self.round,
            aggregators = self.aggregators.len(),
            "Round complete"
        );
        self.finish(true)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Failure handling
    // ═══════════════════════════════════════════════════════════════════════════

    fn on_round_timeout(&mut self) -> Vec<Action> {
        if self.is_done() {
            trace!(server = %self.local_index(), "Round timer fired after completion");
            return vec![];
        }
        self.fail(ProtocolError::Timeout(self.config.round_timeout))
    }

    /// A peer's message could not be decoded by the runner.
    ///
    /// A reply counts against the quorum of its phase. A round start has no
    /// other sender, so an unreadable one ends the round.
    fn on_undecodable_message(
        &mut self,
        from: ServerIndex,
        topic: String,
        reason: String,
    ) -> Vec<Action> {
        if topic == EvalCircuit::message_type_id() {
            if self.phase != Phase::Init {
                return vec![];
            }
            return self.fail(ProtocolError::Configuration(format!(
                "undecodable round start from {}: {}",
                from, reason
            )));
        }
        let Some(phase) = topic_phase(&topic) else {
            debug!(server = %self.local_index(), from = %from, topic = %topic, "Ignoring undecodable message on unknown topic");
            return vec![];
        };
        match self.route(phase) {
            Route::Process => {}
            Route::Buffer => {
                trace!(server = %self.local_index(), from = %from, "Buffering early undecodable reply");
                self.buffered
                    .push_back(Event::UndecodableMessage { from, topic, reason });
                return vec![];
            }
            Route::Ignore => {
                trace!(server = %self.local_index(), from = %from, "Ignoring stale undecodable reply");
                return vec![];
            }
        }
        let error = self.malformed(phase, from, reason);
        self.reject(error)
    }

    /// A message this server asked the runner to send could not be delivered.
    pub fn on_transport_failure(&mut self, to: ServerIndex, reason: String) -> Vec<Action> {
        self.fail(ProtocolError::Transport { to, reason })
    }

    fn route(&self, reply_phase: Phase) -> Route {
        if self.is_done() || reply_phase < self.phase {
            Route::Ignore
        } else if reply_phase > self.phase {
            Route::Buffer
        } else {
            Route::Process
        }
    }

    fn check_index(&self, index: ServerIndex) -> Result<(), ProtocolError> {
        let num_servers = self.topology.num_servers();
        if index.is_within(num_servers) {
            Ok(())
        } else {
            Err(ProtocolError::OutOfRangeIndex { index, num_servers })
        }
    }

    fn check_duplicate(
        &self,
        phase: Phase,
        from: ServerIndex,
        index: ServerIndex,
        seen: bool,
    ) -> Result<(), ProtocolError> {
        if !seen {
            return Ok(());
        }
        if self.config.reject_duplicate_senders {
            return Err(self.malformed(phase, from, format!("second reply claiming {}", index)));
        }
        debug!(
            server = %self.local_index(),
            from = %from,
            claimed = %index,
            phase = %phase,
            "Accepting second reply for the same index"
        );
        Ok(())
    }

    fn check_length(&self, phase: Phase, from: ServerIndex, len: usize) -> Result<(), ProtocolError> {
        let expected = self.num_clients();
        if len == expected {
            Ok(())
        } else {
            Err(self.malformed(
                phase,
                from,
                format!("{} shares for {} clients", len, expected),
            ))
        }
    }

    fn malformed(&self, phase: Phase, from: ServerIndex, reason: String) -> ProtocolError {
        ProtocolError::MalformedReply {
            from,
            phase,
            reason,
        }
    }

    /// Count a rejected reply; fail the round once the quorum is unreachable.
    fn reject(&mut self, error: ProtocolError) -> Vec<Action> {
        let reachable = self.failures.record_failure();
        warn!(
            server = %self.local_index(),
            phase = %self.phase,
            failures = self.failures.failures(),
            error = %error,
            "Rejected reply"
        );
        if reachable {
            return vec![];
        }
        self.fail(ProtocolError::QuorumUnreachable {
            failures: self.failures.failures(),
            tolerated: self.failures.tolerated(),
        })
    }

    fn fail(&mut self, error: ProtocolError) -> Vec<Action> {
        if self.is_done() {
            debug!(server = %self.local_index(), error = %error, "Round already finished");
            return vec![];
        }
        warn!(
            server = %self.local_index(),
            round = %self.round,
            phase = %self.phase,
            error = %error,
            "Round failed"
        );
        self.failure_reason = Some(error);
        self.finish(false)
    }

    fn finish(&mut self, success: bool) -> Vec<Action> {
        if self.is_done() {
            return vec![];
        }
        self.phase = Phase::Done(success);
        self.buffered.clear();
        vec![
            Action::CancelTimer { id: TimerId::Round },
            Action::EmitRoundResult { success },
        ]
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Dispatch
    // ═══════════════════════════════════════════════════════════════════════════

    fn dispatch(&mut self, event: Event) -> Vec<Action> {
        match event {
            Event::EvalCircuitReceived { from, message } => self.on_eval_circuit(from, message),
            Event::EvalCircuitReplyReceived { from, reply } => self.on_correctness_reply(from, reply),
            Event::FinalEvalCircuitReplyReceived { from, reply } => {
                self.on_validity_reply(from, reply)
            }
            Event::AggregateReplyReceived { from, reply } => self.on_aggregate_reply(from, reply),
            Event::UndecodableMessage {
                from,
                topic,
                reason,
            } => self.on_undecodable_message(from, topic, reason),
            Event::RoundTimeout => self.on_round_timeout(),
            Event::TransportFailed { to, reason } => self.on_transport_failure(to, reason),
        }
    }

    /// Next buffered reply whose phase has been reached, in arrival order.
    fn next_ready_buffered(&mut self) -> Option<Event> {
        let phase = self.phase;
        let position = self
            .buffered
            .iter()
            .position(|event| reply_phase(event).map_or(true, |p| p <= phase))?;
        self.buffered.remove(position)
    }
}

impl<V: Verifier> StateMachine for RoundState<V> {
    fn handle(&mut self, event: Event) -> Vec<Action> {
        let mut actions = self.dispatch(event);
        while let Some(ready) = self.next_ready_buffered() {
            actions.extend(self.dispatch(ready));
        }
        actions
    }

    fn set_time(&mut self, now: Duration) {
        self.now = now;
    }

    fn now(&self) -> Duration {
        self.now
    }
}

impl<V: Verifier> std::fmt::Debug for RoundState<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoundState")
            .field("round", &self.round)
            .field("server", &self.local_index())
            .field("phase", &self.phase)
            .field("failures", &self.failures.failures())
            .field("clients", &self.num_clients())
            .finish()
    }
}
