//! Reference verifier: secret-shared non-interactive proofs over a
//! linear-regression circuit.

mod circuit;
mod poly;
mod statistic;
mod verifier;

pub use circuit::LinRegCircuit;
pub use statistic::LinRegStatistic;
pub use verifier::{SnipChecker, SnipPrecomp, SnipVerifier};
