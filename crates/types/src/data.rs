//! Raw client data points.

use serde::{Deserialize, Serialize};

/// One labelled observation before it is secret-shared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    /// Target value.
    pub label: f64,
    /// Feature values.
    pub features: Vec<f64>,
}

impl DataPoint {
    /// Create a new data point.
    pub fn new(label: f64, features: Vec<f64>) -> Self {
        Self { label, features }
    }

    /// Number of features.
    pub fn arity(&self) -> usize {
        self.features.len()
    }
}
