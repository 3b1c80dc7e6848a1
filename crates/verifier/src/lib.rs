//! Verification capability consumed by the round driver.
//!
//! The round driver never does arithmetic on shares itself. Every step that
//! touches the proof system goes through a [`Verifier`]:
//!
//! ```text
//! precompute ─► new_checker ─► produce_correctness_share      (phase 1)
//!                            ─► fold_correctness_shares
//!                            ─► produce_validity_share         (phase 2)
//!                            ─► fold_into_aggregator           (phase 3)
//! ```
//!
//! [`SnipVerifier`] is the reference implementation: a linear-regression
//! validity circuit checked with a polynomial identity test over
//! additively shared values.

mod snip;

pub use snip::{LinRegCircuit, LinRegStatistic, SnipChecker, SnipPrecomp, SnipVerifier};

use rand::Rng;
use tally_types::{
    AggregationConfig, Aggregator, ClientRequest, Correctness, CorrectnessShare, PrgKey,
    ServerIndex, ValidityShare,
};

/// Errors raised by a verifier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerifyError {
    #[error("configuration rejected by verifier: {0}")]
    Config(String),

    #[error("evaluation point {point} lies inside the interpolation domain 0..={max}")]
    EvalPointInDomain { point: u64, max: u64 },

    #[error("server {server} is outside a roster of {num_servers}")]
    ServerOutOfRange {
        server: ServerIndex,
        num_servers: usize,
    },

    #[error("payload has {actual} elements, circuit expects {expected}")]
    PayloadLength { expected: usize, actual: usize },

    #[error("data point has {actual} features, circuit expects {expected}")]
    InputArity { expected: usize, actual: usize },

    #[error("aggregator cannot be decoded: {0}")]
    Aggregate(String),
}

/// The proof-system operations a round needs.
///
/// `Precomp` is built once per round from the configuration. A `Checker` is
/// one server's view of one client and lives for the whole round.
pub trait Verifier: Send + Sync {
    /// Per-round context derived from the configuration.
    type Precomp: Send;

    /// Per-client verification state held by one server.
    type Checker: Send;

    /// Derive the per-round context.
    fn precompute(&self, config: &AggregationConfig) -> Result<Self::Precomp, VerifyError>;

    /// Seed a checker with this server's share of one client's request.
    fn new_checker(
        &self,
        precomp: &Self::Precomp,
        server: ServerIndex,
        request: &ClientRequest,
    ) -> Result<Self::Checker, VerifyError>;

    /// Phase 1: this server's correctness share for the client.
    fn produce_correctness_share(
        &self,
        precomp: &Self::Precomp,
        checker: &Self::Checker,
    ) -> CorrectnessShare;

    /// Fold every server's correctness share for the client.
    fn fold_correctness_shares(
        &self,
        precomp: &Self::Precomp,
        checker: &Self::Checker,
        shares: &[CorrectnessShare],
    ) -> Correctness;

    /// Phase 2: this server's validity share for the client.
    fn produce_validity_share(
        &self,
        precomp: &Self::Precomp,
        checker: &Self::Checker,
        correctness: &Correctness,
        key: &PrgKey,
    ) -> ValidityShare;

    /// Modulus the validity checks are summed under.
    fn modulus(&self, precomp: &Self::Precomp) -> u64;

    /// Fewest servers whose shares reconstruct a client's values.
    ///
    /// A phase that completes with fewer replies than this cannot verify any
    /// client, so rounds configured below it are refused.
    fn min_threshold(&self, precomp: &Self::Precomp) -> usize;

    /// Create an empty aggregator for this circuit.
    fn new_aggregator(&self, precomp: &Self::Precomp) -> Aggregator;

    /// Phase 3: fold one client's contribution into the aggregator.
    ///
    /// Called for every client; `accepted` carries the phase-2 verdict and
    /// the implementation decides what a rejected client contributes.
    fn fold_into_aggregator(
        &self,
        precomp: &Self::Precomp,
        aggregator: &mut Aggregator,
        checker: &Self::Checker,
        accepted: bool,
    );

    /// Client side: secret-share one data point into one request per server.
    fn share_data_point<R: Rng + ?Sized>(
        &self,
        config: &AggregationConfig,
        label: f64,
        features: &[f64],
        rng: &mut R,
    ) -> Result<Vec<ClientRequest>, VerifyError>;
}
