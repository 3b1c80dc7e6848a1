//! Linear-regression validity circuit.
//!
//! Inputs are `w = (x_1, .., x_d, y)`. The circuit has one multiplication
//! gate for every `x_j * x_k` with `j <= k` and one for every `x_j * y`,
//! which are exactly the cross terms needed for the normal equations.

use std::ops::Range;
use tally_types::Scalar;

/// One multiplication gate, by input wire index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gate {
    pub left: usize,
    pub right: usize,
}

/// Wiring and payload layout for `d` features.
///
/// A client request payload is laid out as
///
/// ```text
/// [ inputs (d+1) | claimed products (M) | f0 | g0 | h(0..=2M) (2M+1) ]
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinRegCircuit {
    num_features: usize,
    gates: Vec<Gate>,
}

impl LinRegCircuit {
    /// Build the circuit for `num_features` features.
    pub fn new(num_features: usize) -> Self {
        let label = num_features;
        let mut gates = Vec::with_capacity(num_features * (num_features + 1) / 2 + num_features);
        for j in 0..num_features {
            for k in j..num_features {
                gates.push(Gate { left: j, right: k });
            }
        }
        for j in 0..num_features {
            gates.push(Gate {
                left: j,
                right: label,
            });
        }
        Self {
            num_features,
            gates,
        }
    }

    pub fn num_features(&self) -> usize {
        self.num_features
    }

    /// Number of input wires (features plus label).
    pub fn num_inputs(&self) -> usize {
        self.num_features + 1
    }

    /// Number of multiplication gates, `M`.
    pub fn num_gates(&self) -> usize {
        self.gates.len()
    }

    pub fn gates(&self) -> &[Gate] {
        &self.gates
    }

    /// Largest node of the `h` interpolation domain, `2M`.
    pub fn max_domain_point(&self) -> usize {
        2 * self.num_gates()
    }

    /// Compute every gate output for the given inputs.
    pub fn evaluate(&self, inputs: &[Scalar]) -> Vec<Scalar> {
        self.gates
            .iter()
            .map(|gate| inputs[gate.left] * inputs[gate.right])
            .collect()
    }

    pub fn inputs_range(&self) -> Range<usize> {
        0..self.num_inputs()
    }

    pub fn products_range(&self) -> Range<usize> {
        let start = self.num_inputs();
        start..start + self.num_gates()
    }

    pub fn f0_index(&self) -> usize {
        self.products_range().end
    }

    pub fn g0_index(&self) -> usize {
        self.f0_index() + 1
    }

    pub fn h_range(&self) -> Range<usize> {
        let start = self.g0_index() + 1;
        start..start + self.max_domain_point() + 1
    }

    /// Total payload length of one client request.
    pub fn payload_len(&self) -> usize {
        self.h_range().end
    }

    /// Number of sums an aggregator keeps: inputs then products.
    pub fn aggregator_width(&self) -> usize {
        self.num_inputs() + self.num_gates()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_count() {
        for d in 1..6 {
            let circuit = LinRegCircuit::new(d);
            assert_eq!(circuit.num_gates(), d * (d + 1) / 2 + d);
        }
    }

    #[test]
    fn test_layout_two_features() {
        // x1, x2, y; gates x1x1, x1x2, x2x2, x1y, x2y
        let circuit = LinRegCircuit::new(2);
        assert_eq!(circuit.num_gates(), 5);
        assert_eq!(circuit.inputs_range(), 0..3);
        assert_eq!(circuit.products_range(), 3..8);
        assert_eq!(circuit.f0_index(), 8);
        assert_eq!(circuit.g0_index(), 9);
        assert_eq!(circuit.h_range(), 10..21);
        assert_eq!(circuit.payload_len(), 21);
        assert_eq!(circuit.aggregator_width(), 8);
    }

    #[test]
    fn test_evaluate() {
        let circuit = LinRegCircuit::new(2);
        let inputs: Vec<Scalar> = [2, -3, 5].iter().map(|&v| Scalar::from_i64(v)).collect();
        let products: Vec<i64> = circuit
            .evaluate(&inputs)
            .into_iter()
            .map(Scalar::to_i64)
            .collect();
        assert_eq!(products, vec![4, -6, 9, 10, -15]);
    }
}
