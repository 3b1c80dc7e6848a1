//! Synthetic data point generation.

use rand::Rng;
use tally_types::DataPoint;

/// Trait for generating data point workloads.
pub trait DataPointGenerator {
    /// Generate a single data point.
    fn generate_one(&mut self, rng: &mut impl Rng) -> DataPoint;

    /// Generate a batch of data points.
    fn generate_batch(&mut self, count: usize, rng: &mut impl Rng) -> Vec<DataPoint> {
        (0..count).map(|_| self.generate_one(rng)).collect()
    }
}

/// Points scattered around a fixed linear model.
///
/// Features are integers drawn from `-range..=range`; the label is
/// `intercept + sum_j weight_j * x_j` plus integer noise.
#[derive(Debug, Clone)]
pub struct LinearWorkload {
    weights: Vec<i64>,
    intercept: i64,
    range: i64,
    noise: i64,
}

impl LinearWorkload {
    /// Create a workload with the given weights and no noise.
    pub fn new(weights: Vec<i64>, intercept: i64) -> Self {
        Self {
            weights,
            intercept,
            range: 10,
            noise: 0,
        }
    }

    /// Create a workload with `num_features` unit weights.
    pub fn unit(num_features: usize) -> Self {
        Self::new(vec![1; num_features], 0)
    }

    /// Set the feature range.
    pub fn with_range(mut self, range: i64) -> Self {
        self.range = range.max(0);
        self
    }

    /// Set the label noise amplitude.
    pub fn with_noise(mut self, noise: i64) -> Self {
        self.noise = noise.max(0);
        self
    }

    pub fn num_features(&self) -> usize {
        self.weights.len()
    }
}

impl DataPointGenerator for LinearWorkload {
    fn generate_one(&mut self, rng: &mut impl Rng) -> DataPoint {
        let features: Vec<i64> = self
            .weights
            .iter()
            .map(|_| rng.gen_range(-self.range..=self.range))
            .collect();
        let noise = rng.gen_range(-self.noise..=self.noise);
        let label = self.intercept
            + noise
            + self
                .weights
                .iter()
                .zip(&features)
                .map(|(w, x)| w * x)
                .sum::<i64>();
        DataPoint::new(label as f64, features.into_iter().map(|x| x as f64).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_noiseless_points_fit_model() {
        let mut workload = LinearWorkload::new(vec![2, -1], 5).with_range(4);
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        for point in workload.generate_batch(20, &mut rng) {
            assert_eq!(point.arity(), 2);
            assert!(point.features.iter().all(|x| x.abs() <= 4.0));
            let expected = 5.0 + 2.0 * point.features[0] - point.features[1];
            assert_eq!(point.label, expected);
        }
    }

    #[test]
    fn test_seeded_generation_is_deterministic() {
        let batch = |seed| {
            LinearWorkload::unit(3)
                .with_noise(2)
                .generate_batch(5, &mut ChaCha8Rng::seed_from_u64(seed))
        };
        assert_eq!(batch(3), batch(3));
    }
}
