//! Decoding combined aggregators into regression statistics.

use super::circuit::LinRegCircuit;
use crate::VerifyError;
use tally_types::Aggregator;

/// Sufficient statistics for ordinary least squares over accepted clients.
///
/// Values are the plain integer sums of the (truncated) inputs and their
/// pairwise products.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinRegStatistic {
    /// Number of clients that contributed.
    pub count: u64,
    /// `sum x_j` per feature.
    pub sum_x: Vec<i64>,
    /// `sum y`.
    pub sum_y: i64,
    /// `sum x_j x_k` for `j <= k`, row-major upper triangle.
    pub sum_xx: Vec<i64>,
    /// `sum x_j y` per feature.
    pub sum_xy: Vec<i64>,
}

impl LinRegStatistic {
    /// Decode an aggregator that has been combined across all servers.
    pub fn from_aggregator(
        circuit: &LinRegCircuit,
        aggregator: &Aggregator,
    ) -> Result<Self, VerifyError> {
        if aggregator.width() != circuit.aggregator_width() {
            return Err(VerifyError::Aggregate(format!(
                "width {} does not match circuit width {}",
                aggregator.width(),
                circuit.aggregator_width()
            )));
        }
        let d = circuit.num_features();
        let values: Vec<i64> = aggregator.sums.iter().map(|s| s.to_i64()).collect();
        let (inputs, products) = values.split_at(circuit.num_inputs());
        let num_squares = d * (d + 1) / 2;

        Ok(Self {
            count: aggregator.accepted,
            sum_x: inputs[..d].to_vec(),
            sum_y: inputs[d],
            sum_xx: products[..num_squares].to_vec(),
            sum_xy: products[num_squares..].to_vec(),
        })
    }

    /// `sum x_j x_k`, in either index order.
    pub fn sum_xx_at(&self, j: usize, k: usize) -> Option<i64> {
        let d = self.sum_x.len();
        let (j, k) = if j <= k { (j, k) } else { (k, j) };
        if k >= d {
            return None;
        }
        // rows before j hold d, d-1, .., d-j+1 entries
        let row_start = j * d - j * (j.saturating_sub(1)) / 2;
        self.sum_xx.get(row_start + (k - j)).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_types::Scalar;

    #[test]
    fn test_decode_and_index() {
        let circuit = LinRegCircuit::new(3);
        // inputs: x1..x3, y; products: 6 squares/cross terms, 3 xy terms
        let raw: Vec<i64> = vec![1, 2, 3, 4, 11, 12, 13, 22, 23, 33, 14, 24, -34];
        let aggregator = Aggregator {
            sums: raw.iter().map(|&v| Scalar::from_i64(v)).collect(),
            accepted: 5,
        };

        let stat = LinRegStatistic::from_aggregator(&circuit, &aggregator).unwrap();
        assert_eq!(stat.count, 5);
        assert_eq!(stat.sum_x, vec![1, 2, 3]);
        assert_eq!(stat.sum_y, 4);
        assert_eq!(stat.sum_xy, vec![14, 24, -34]);

        assert_eq!(stat.sum_xx_at(0, 0), Some(11));
        assert_eq!(stat.sum_xx_at(0, 2), Some(13));
        assert_eq!(stat.sum_xx_at(2, 1), Some(23));
        assert_eq!(stat.sum_xx_at(2, 2), Some(33));
        assert_eq!(stat.sum_xx_at(3, 0), None);
    }

    #[test]
    fn test_decode_rejects_wrong_width() {
        let circuit = LinRegCircuit::new(2);
        let aggregator = Aggregator::new(3);
        assert!(matches!(
            LinRegStatistic::from_aggregator(&circuit, &aggregator),
            Err(VerifyError::Aggregate(_))
        ));
    }
}
