//! Share bundles exchanged between clients and servers.
//!
//! These are opaque to the round driver: it moves them between phases and
//! hands them to the verifier, but only the verifier interprets their
//! contents.

use crate::Scalar;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One server's share of a Beaver multiplication triple `(a, b, a*b)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TripleShare {
    pub a: Scalar,
    pub b: Scalar,
    pub c: Scalar,
}

/// One client's contribution destined for one server.
///
/// Produced once per data point per server by the client-request supplier and
/// never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRequest {
    /// Shares of every wire value the verifier needs (layout is verifier-defined).
    pub payload: Vec<Scalar>,
    /// Share of the proof-construction triple.
    pub triple: TripleShare,
}

impl ClientRequest {
    /// Create a new request.
    pub fn new(payload: Vec<Scalar>, triple: TripleShare) -> Self {
        Self { payload, triple }
    }
}

/// Phase-1 output of one server for one client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CorrectnessShare {
    pub d: Scalar,
    pub e: Scalar,
}

/// All servers' correctness shares for one client, folded together.
///
/// Every server that folds the same set of shares obtains the same value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Correctness {
    pub d: Scalar,
    pub e: Scalar,
}

/// Phase-2 output of one server for one client.
///
/// Summed over the servers, the checks are zero exactly when the client's
/// input passed verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ValidityShare {
    pub check: Scalar,
}

/// Fresh per-client randomness mixed into validity shares.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PrgKey([u8; 32]);

impl PrgKey {
    /// Size of the key in bytes.
    pub const BYTES: usize = 32;

    /// Draw a fresh random key.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let mut bytes = [0u8; 32];
        rng.fill(&mut bytes[..]);
        Self(bytes)
    }

    /// Create a key from raw bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for PrgKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrgKey({}..)", hex::encode(&self.0[..4]))
    }
}

/// Per-server accumulator of accepted contributions.
///
/// Each server folds in the clients that passed verification; combining the
/// aggregators of all servers reconstructs the global sums.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aggregator {
    /// Share of each accumulated wire sum.
    pub sums: Vec<Scalar>,
    /// Number of clients folded in. Public, identical on every server.
    pub accepted: u64,
}

impl Aggregator {
    /// Create an empty aggregator with `width` sums.
    pub fn new(width: usize) -> Self {
        Self {
            sums: vec![Scalar::ZERO; width],
            accepted: 0,
        }
    }

    /// Number of accumulated sums.
    pub fn width(&self) -> usize {
        self.sums.len()
    }

    /// Add another server's aggregator into this one.
    ///
    /// Sums are added element-wise. The accepted count is not a share, so it
    /// is kept as-is; combining aggregators that disagree on it is a caller
    /// bug.
    pub fn combine(&mut self, other: &Aggregator) -> Result<(), AggregatorMismatch> {
        if other.width() != self.width() {
            return Err(AggregatorMismatch::Width {
                expected: self.width(),
                actual: other.width(),
            });
        }
        if other.accepted != self.accepted {
            return Err(AggregatorMismatch::AcceptedCount {
                expected: self.accepted,
                actual: other.accepted,
            });
        }
        for (sum, theirs) in self.sums.iter_mut().zip(&other.sums) {
            *sum += *theirs;
        }
        Ok(())
    }

    /// Combine a list of per-server aggregators into one.
    ///
    /// Returns `None` for an empty list.
    pub fn combine_all<'a, I>(aggregators: I) -> Option<Result<Aggregator, AggregatorMismatch>>
    where
        I: IntoIterator<Item = &'a Aggregator>,
    {
        let mut iter = aggregators.into_iter();
        let mut combined = iter.next()?.clone();
        for aggregator in iter {
            if let Err(e) = combined.combine(aggregator) {
                return Some(Err(e));
            }
        }
        Some(Ok(combined))
    }
}

/// Aggregators that cannot be combined.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AggregatorMismatch {
    #[error("aggregator width mismatch: expected {expected}, got {actual}")]
    Width { expected: usize, actual: usize },

    #[error("aggregators folded different client sets: {expected} vs {actual} accepted")]
    AcceptedCount { expected: u64, actual: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aggregator(values: &[i64], accepted: u64) -> Aggregator {
        Aggregator {
            sums: values.iter().map(|&v| Scalar::from_i64(v)).collect(),
            accepted,
        }
    }

    #[test]
    fn test_combine_is_elementwise() {
        let mut a = aggregator(&[1, 2, 3], 2);
        a.combine(&aggregator(&[10, -2, 0], 2)).unwrap();
        assert_eq!(a, aggregator(&[11, 0, 3], 2));
    }

    #[test]
    fn test_combine_order_independent() {
        let parts = [
            aggregator(&[5, 7], 1),
            aggregator(&[-3, 4], 1),
            aggregator(&[9, -1], 1),
        ];
        let forward = Aggregator::combine_all(parts.iter()).unwrap().unwrap();
        let backward = Aggregator::combine_all(parts.iter().rev()).unwrap().unwrap();
        assert_eq!(forward, backward);
        assert_eq!(forward, aggregator(&[11, 10], 1));
    }

    #[test]
    fn test_combine_rejects_mismatch() {
        let mut a = aggregator(&[1, 2], 1);
        assert!(matches!(
            a.combine(&aggregator(&[1], 1)),
            Err(AggregatorMismatch::Width { .. })
        ));
        assert!(matches!(
            a.combine(&aggregator(&[1, 2], 3)),
            Err(AggregatorMismatch::AcceptedCount { .. })
        ));
        assert!(Aggregator::combine_all(std::iter::empty()).is_none());
    }
}
