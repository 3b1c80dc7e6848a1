//! Client-request supplier.

use crate::EncodingError;
use rand::Rng;
use tally_types::{AggregationConfig, ClientRequest, DataPoint};
use tally_verifier::Verifier;
use tracing::debug;

/// Builds every server's share bundle from raw data points.
#[derive(Debug, Clone)]
pub struct ClientRequestSupplier<V> {
    verifier: V,
    config: AggregationConfig,
}

impl<V: Verifier> ClientRequestSupplier<V> {
    /// Create a supplier for the given circuit configuration.
    pub fn new(verifier: V, config: AggregationConfig) -> Self {
        Self { verifier, config }
    }

    pub fn config(&self) -> &AggregationConfig {
        &self.config
    }

    /// Share one data point, returning one request per server.
    pub fn shares_for_point<R: Rng + ?Sized>(
        &self,
        point: &DataPoint,
        rng: &mut R,
    ) -> Result<Vec<ClientRequest>, EncodingError> {
        if point.arity() != self.config.num_features {
            return Err(EncodingError::ArityMismatch {
                expected: self.config.num_features,
                actual: point.arity(),
            });
        }
        let requests = self
            .verifier
            .share_data_point(&self.config, point.label, &point.features, rng)?;
        Ok(requests)
    }

    /// Share a batch of points into the `[clients][servers]` matrix.
    pub fn shares_for_points<R: Rng + ?Sized>(
        &self,
        points: &[DataPoint],
        rng: &mut R,
    ) -> Result<Vec<Vec<ClientRequest>>, EncodingError> {
        let matrix = points
            .iter()
            .map(|point| self.shares_for_point(point, rng))
            .collect::<Result<Vec<_>, _>>()?;
        debug!(
            clients = matrix.len(),
            servers = self.config.num_servers,
            "Shared client data points"
        );
        Ok(matrix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use tally_verifier::SnipVerifier;

    #[test]
    fn test_matrix_shape() {
        let supplier = ClientRequestSupplier::new(SnipVerifier::new(), AggregationConfig::new(4, 2));
        let points = vec![
            DataPoint::new(1.0, vec![2.0, 3.0]),
            DataPoint::new(-1.0, vec![0.5, 7.0]),
        ];
        let matrix = supplier
            .shares_for_points(&points, &mut ChaCha8Rng::seed_from_u64(5))
            .unwrap();
        assert_eq!(matrix.len(), 2);
        assert!(matrix.iter().all(|row| row.len() == 4));
    }

    #[test]
    fn test_arity_mismatch() {
        let supplier = ClientRequestSupplier::new(SnipVerifier::new(), AggregationConfig::new(3, 2));
        let err = supplier
            .shares_for_point(
                &DataPoint::new(1.0, vec![1.0]),
                &mut ChaCha8Rng::seed_from_u64(0),
            )
            .unwrap_err();
        assert_eq!(
            err,
            EncodingError::ArityMismatch {
                expected: 2,
                actual: 1
            }
        );
    }
}
