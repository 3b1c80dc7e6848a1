//! Lagrange interpolation over the integer nodes `0, 1, .., n-1`.

use tally_types::Scalar;

/// Coefficients `L_j(x)` for the nodes `0..num_nodes`.
///
/// Interpolating values `v_j` at `x` is then `sum_j L_j(x) * v_j`. Works for
/// any `x`, including one of the nodes.
pub(crate) fn lagrange_coefficients(num_nodes: usize, x: Scalar) -> Vec<Scalar> {
    if num_nodes == 0 {
        return Vec::new();
    }
    let node = |k: usize| Scalar::new(k as u64);

    // prefix[j] = prod_{k<j} (x - k), suffix[j] = prod_{k>j} (x - k)
    let mut prefix = vec![Scalar::ONE; num_nodes];
    for j in 1..num_nodes {
        prefix[j] = prefix[j - 1] * (x - node(j - 1));
    }
    let mut suffix = vec![Scalar::ONE; num_nodes];
    for j in (0..num_nodes - 1).rev() {
        suffix[j] = suffix[j + 1] * (x - node(j + 1));
    }

    let mut factorial = vec![Scalar::ONE; num_nodes];
    for k in 1..num_nodes {
        factorial[k] = factorial[k - 1] * node(k);
    }

    (0..num_nodes)
        .map(|j| {
            // prod_{k != j} (j - k) = j! * (-1)^(n-1-j) * (n-1-j)!
            let mut denominator = factorial[j] * factorial[num_nodes - 1 - j];
            if (num_nodes - 1 - j) % 2 == 1 {
                denominator = -denominator;
            }
            let inverse = denominator.inverse().unwrap_or(Scalar::ZERO);
            prefix[j] * suffix[j] * inverse
        })
        .collect()
}

/// Inner product of coefficients and values.
pub(crate) fn dot(coefficients: &[Scalar], values: &[Scalar]) -> Scalar {
    coefficients
        .iter()
        .zip(values)
        .map(|(c, v)| *c * *v)
        .sum()
}

/// Evaluate the polynomial through `(j, values[j])` at `0..len`.
pub(crate) fn extend(values: &[Scalar], len: usize) -> Vec<Scalar> {
    (0..len)
        .map(|i| {
            if i < values.len() {
                values[i]
            } else {
                dot(
                    &lagrange_coefficients(values.len(), Scalar::new(i as u64)),
                    values,
                )
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quadratic(t: u64) -> Scalar {
        // p(t) = 3t^2 + 2t + 1
        let t = Scalar::new(t);
        Scalar::new(3) * t * t + Scalar::new(2) * t + Scalar::ONE
    }

    #[test]
    fn test_interpolate_quadratic() {
        let values: Vec<Scalar> = (0..3).map(quadratic).collect();
        let at_ten = dot(&lagrange_coefficients(3, Scalar::new(10)), &values);
        assert_eq!(at_ten, Scalar::new(321));

        let far = 1u64 << 40;
        assert_eq!(
            dot(&lagrange_coefficients(3, Scalar::new(far)), &values),
            quadratic(far)
        );
    }

    #[test]
    fn test_coefficients_at_node_select_value() {
        let coefficients = lagrange_coefficients(4, Scalar::new(2));
        assert_eq!(
            coefficients,
            vec![Scalar::ZERO, Scalar::ZERO, Scalar::ONE, Scalar::ZERO]
        );
    }

    #[test]
    fn test_extend() {
        let values: Vec<Scalar> = (0..3).map(quadratic).collect();
        let extended = extend(&values, 7);
        let expected: Vec<Scalar> = (0..7).map(quadratic).collect();
        assert_eq!(extended, expected);
    }
}
