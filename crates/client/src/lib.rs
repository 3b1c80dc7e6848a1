//! Client side of an aggregation round.
//!
//! [`ClientRequestSupplier`] turns raw [`DataPoint`]s into the
//! client-request matrix the root server starts a round with.
//! [`LinearWorkload`] generates synthetic points for the CLI and tests.
//!
//! [`DataPoint`]: tally_types::DataPoint

mod supplier;
mod workload;

pub use supplier::ClientRequestSupplier;
pub use workload::{DataPointGenerator, LinearWorkload};

use tally_verifier::VerifyError;

/// Errors turning a data point into client requests.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodingError {
    #[error("data point has {actual} features, configuration expects {expected}")]
    ArityMismatch { expected: usize, actual: usize },

    #[error("verifier failed to share data point: {0}")]
    Verifier(#[from] VerifyError),
}
