//! Polynomial identity check over additively shared wires.
//!
//! The client commits to two polynomials `f` and `g` whose values at the
//! gate indices `1..=M` are the left and right inputs of every
//! multiplication gate, and sends shares of `h = f * g` evaluated on
//! `0..=2M`. Servers evaluate their shares of `f`, `g` and `h` at a point `r`
//! outside that domain, use a Beaver triple to obtain shares of `f(r) g(r)`
//! without revealing either factor, and publish
//!
//! ```text
//! check = rho * (f(r) g(r) - h(r)) + sum_m r_m * (z_m - h(m))
//! ```
//!
//! in shares. The checks of all servers sum to zero when `h = f * g` and
//! every claimed product `z_m` matches `h(m)`.

use super::circuit::LinRegCircuit;
use super::poly;
use crate::{Verifier, VerifyError};
use rand::Rng;
use tally_types::{
    AggregationConfig, Aggregator, ClientRequest, Correctness, CorrectnessShare, PrgKey, Scalar,
    ServerIndex, TripleShare, ValidityShare, MODULUS,
};
use tracing::trace;

const CHALLENGE_CONTEXT: &str = "tally snip challenge v1";

/// Reference [`Verifier`] for the linear-regression circuit.
#[derive(Debug, Clone, Copy, Default)]
pub struct SnipVerifier;

impl SnipVerifier {
    pub fn new() -> Self {
        Self
    }
}

/// Per-round context: the circuit and the interpolation coefficients at the
/// evaluation point.
#[derive(Debug, Clone)]
pub struct SnipPrecomp {
    circuit: LinRegCircuit,
    num_servers: usize,
    /// Coefficients over `0..=M`, for `f` and `g`.
    lagrange_fg: Vec<Scalar>,
    /// Coefficients over `0..=2M`, for `h`.
    lagrange_h: Vec<Scalar>,
}

impl SnipPrecomp {
    pub fn circuit(&self) -> &LinRegCircuit {
        &self.circuit
    }

    pub fn num_servers(&self) -> usize {
        self.num_servers
    }
}

/// One server's view of one client.
#[derive(Debug, Clone)]
pub struct SnipChecker {
    server: ServerIndex,
    inputs: Vec<Scalar>,
    products: Vec<Scalar>,
    h_at_gates: Vec<Scalar>,
    triple: TripleShare,
    f_r: Scalar,
    g_r: Scalar,
    h_r: Scalar,
}

/// Derive a challenge every server agrees on from the folded correctness.
fn challenge(correctness: &Correctness, index: u64) -> Scalar {
    let mut hasher = blake3::Hasher::new_derive_key(CHALLENGE_CONTEXT);
    hasher.update(&correctness.d.value().to_le_bytes());
    hasher.update(&correctness.e.value().to_le_bytes());
    hasher.update(&index.to_le_bytes());
    Scalar::from_digest(hasher.finalize().as_bytes())
}

/// Split a value into `num_servers` additive shares.
fn share<R: Rng + ?Sized>(value: Scalar, num_servers: usize, rng: &mut R) -> Vec<Scalar> {
    let mut shares: Vec<Scalar> = (1..num_servers).map(|_| Scalar::random(rng)).collect();
    let masked: Scalar = shares.iter().copied().sum();
    shares.push(value - masked);
    shares
}

/// Map a raw measurement into the field, truncating toward zero.
fn encode(value: f64) -> Scalar {
    Scalar::from_i64(value as i64)
}

impl Verifier for SnipVerifier {
    type Precomp = SnipPrecomp;
    type Checker = SnipChecker;

    fn precompute(&self, config: &AggregationConfig) -> Result<SnipPrecomp, VerifyError> {
        config
            .validate()
            .map_err(|e| VerifyError::Config(e.to_string()))?;

        let circuit = LinRegCircuit::new(config.num_features);
        let max = circuit.max_domain_point() as u64;
        if config.eval_point <= max {
            return Err(VerifyError::EvalPointInDomain {
                point: config.eval_point,
                max,
            });
        }

        let r = Scalar::new(config.eval_point);
        let lagrange_fg = poly::lagrange_coefficients(circuit.num_gates() + 1, r);
        let lagrange_h = poly::lagrange_coefficients(circuit.max_domain_point() + 1, r);

        Ok(SnipPrecomp {
            circuit,
            num_servers: config.num_servers,
            lagrange_fg,
            lagrange_h,
        })
    }

    fn new_checker(
        &self,
        precomp: &SnipPrecomp,
        server: ServerIndex,
        request: &ClientRequest,
    ) -> Result<SnipChecker, VerifyError> {
        if !server.is_within(precomp.num_servers) {
            return Err(VerifyError::ServerOutOfRange {
                server,
                num_servers: precomp.num_servers,
            });
        }
        let circuit = &precomp.circuit;
        let payload = &request.payload;
        if payload.len() != circuit.payload_len() {
            return Err(VerifyError::PayloadLength {
                expected: circuit.payload_len(),
                actual: payload.len(),
            });
        }

        let inputs = payload[circuit.inputs_range()].to_vec();
        let products = payload[circuit.products_range()].to_vec();
        let h = &payload[circuit.h_range()];

        let mut f_points = Vec::with_capacity(circuit.num_gates() + 1);
        let mut g_points = Vec::with_capacity(circuit.num_gates() + 1);
        f_points.push(payload[circuit.f0_index()]);
        g_points.push(payload[circuit.g0_index()]);
        for gate in circuit.gates() {
            f_points.push(inputs[gate.left]);
            g_points.push(inputs[gate.right]);
        }

        Ok(SnipChecker {
            server,
            f_r: poly::dot(&precomp.lagrange_fg, &f_points),
            g_r: poly::dot(&precomp.lagrange_fg, &g_points),
            h_r: poly::dot(&precomp.lagrange_h, h),
            h_at_gates: h[1..=circuit.num_gates()].to_vec(),
            inputs,
            products,
            triple: request.triple,
        })
    }

    fn produce_correctness_share(
        &self,
        _precomp: &SnipPrecomp,
        checker: &SnipChecker,
    ) -> CorrectnessShare {
        CorrectnessShare {
            d: checker.f_r - checker.triple.a,
            e: checker.g_r - checker.triple.b,
        }
    }

    fn fold_correctness_shares(
        &self,
        _precomp: &SnipPrecomp,
        _checker: &SnipChecker,
        shares: &[CorrectnessShare],
    ) -> Correctness {
        Correctness {
            d: shares.iter().map(|s| s.d).sum(),
            e: shares.iter().map(|s| s.e).sum(),
        }
    }

    fn produce_validity_share(
        &self,
        _precomp: &SnipPrecomp,
        checker: &SnipChecker,
        correctness: &Correctness,
        _key: &PrgKey,
    ) -> ValidityShare {
        let TripleShare { a, b, c } = checker.triple;
        let (d, e) = (correctness.d, correctness.e);

        // Beaver: sum over servers of sigma is (d + a)(e + b) = f(r) g(r)
        let mut sigma = d * b + e * a + c;
        if checker.server.is_root() {
            sigma += d * e;
        }

        let rho = challenge(correctness, 0);
        let mut check = rho * (sigma - checker.h_r);
        for (m, (z, h)) in checker.products.iter().zip(&checker.h_at_gates).enumerate() {
            check += challenge(correctness, m as u64 + 1) * (*z - *h);
        }
        ValidityShare { check }
    }

    fn modulus(&self, _precomp: &SnipPrecomp) -> u64 {
        MODULUS
    }

    /// Additive shares only sum to the secret when every server contributes.
    fn min_threshold(&self, precomp: &SnipPrecomp) -> usize {
        precomp.num_servers
    }

    fn new_aggregator(&self, precomp: &SnipPrecomp) -> Aggregator {
        Aggregator::new(precomp.circuit.aggregator_width())
    }

    fn fold_into_aggregator(
        &self,
        _precomp: &SnipPrecomp,
        aggregator: &mut Aggregator,
        checker: &SnipChecker,
        accepted: bool,
    ) {
        if !accepted {
            trace!(server = %checker.server, "Skipping rejected client");
            return;
        }
        for (sum, value) in aggregator
            .sums
            .iter_mut()
            .zip(checker.inputs.iter().chain(&checker.products))
        {
            *sum += *value;
        }
        aggregator.accepted += 1;
    }

    fn share_data_point<R: Rng + ?Sized>(
        &self,
        config: &AggregationConfig,
        label: f64,
        features: &[f64],
        rng: &mut R,
    ) -> Result<Vec<ClientRequest>, VerifyError> {
        config
            .validate()
            .map_err(|e| VerifyError::Config(e.to_string()))?;
        let circuit = LinRegCircuit::new(config.num_features);
        if features.len() != circuit.num_features() {
            return Err(VerifyError::InputArity {
                expected: circuit.num_features(),
                actual: features.len(),
            });
        }
        let ns = config.num_servers;

        let mut inputs: Vec<Scalar> = features.iter().copied().map(encode).collect();
        inputs.push(encode(label));
        let products = circuit.evaluate(&inputs);

        let f0 = Scalar::random(rng);
        let g0 = Scalar::random(rng);
        let mut f_points = vec![f0];
        let mut g_points = vec![g0];
        for gate in circuit.gates() {
            f_points.push(inputs[gate.left]);
            g_points.push(inputs[gate.right]);
        }
        let domain = circuit.max_domain_point() + 1;
        let h: Vec<Scalar> = poly::extend(&f_points, domain)
            .into_iter()
            .zip(poly::extend(&g_points, domain))
            .map(|(f, g)| f * g)
            .collect();

        let mut plain = Vec::with_capacity(circuit.payload_len());
        plain.extend_from_slice(&inputs);
        plain.extend_from_slice(&products);
        plain.push(f0);
        plain.push(g0);
        plain.extend_from_slice(&h);

        let mut payloads = vec![Vec::with_capacity(plain.len()); ns];
        for value in plain {
            for (payload, piece) in payloads.iter_mut().zip(share(value, ns, rng)) {
                payload.push(piece);
            }
        }

        let a = Scalar::random(rng);
        let b = Scalar::random(rng);
        let a_shares = share(a, ns, rng);
        let b_shares = share(b, ns, rng);
        let c_shares = share(a * b, ns, rng);

        Ok(payloads
            .into_iter()
            .enumerate()
            .map(|(s, payload)| {
                ClientRequest::new(
                    payload,
                    TripleShare {
                        a: a_shares[s],
                        b: b_shares[s],
                        c: c_shares[s],
                    },
                )
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LinRegStatistic;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    /// Run every server's side of the check locally and return the summed
    /// validity checks.
    fn run_check(
        verifier: &SnipVerifier,
        precomp: &SnipPrecomp,
        requests: &[ClientRequest],
    ) -> (Scalar, Vec<SnipChecker>) {
        let checkers: Vec<SnipChecker> = requests
            .iter()
            .enumerate()
            .map(|(s, r)| verifier.new_checker(precomp, ServerIndex::from(s), r).unwrap())
            .collect();
        let shares: Vec<CorrectnessShare> = checkers
            .iter()
            .map(|c| verifier.produce_correctness_share(precomp, c))
            .collect();
        let mut rng = ChaCha8Rng::seed_from_u64(99);
        let total = checkers
            .iter()
            .map(|checker| {
                let cor = verifier.fold_correctness_shares(precomp, checker, &shares);
                verifier
                    .produce_validity_share(precomp, checker, &cor, &PrgKey::random(&mut rng))
                    .check
            })
            .sum();
        (total, checkers)
    }

    #[test]
    fn test_honest_client_passes() {
        let verifier = SnipVerifier::new();
        let config = AggregationConfig::new(3, 2);
        let precomp = verifier.precompute(&config).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        for point in [(3.0, vec![1.0, 2.0]), (-7.9, vec![-4.2, 0.0]), (0.0, vec![0.0, 0.0])] {
            let requests = verifier
                .share_data_point(&config, point.0, &point.1, &mut rng)
                .unwrap();
            assert_eq!(requests.len(), 3);
            let (total, _) = run_check(&verifier, &precomp, &requests);
            assert_eq!(total, Scalar::ZERO);
        }
    }

    #[test]
    fn test_subset_of_servers_cannot_verify() {
        let verifier = SnipVerifier::new();
        let config = AggregationConfig::new(3, 2);
        let precomp = verifier.precompute(&config).unwrap();
        assert_eq!(verifier.min_threshold(&precomp), 3);

        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let requests = verifier
            .share_data_point(&config, 3.0, &[1.0, 2.0], &mut rng)
            .unwrap();
        let checkers: Vec<SnipChecker> = requests
            .iter()
            .enumerate()
            .map(|(s, r)| verifier.new_checker(&precomp, ServerIndex::from(s), r).unwrap())
            .collect();
        let shares: Vec<CorrectnessShare> = checkers
            .iter()
            .map(|c| verifier.produce_correctness_share(&precomp, c))
            .collect();

        // Two of three servers fold and sum what they have.
        let total: Scalar = checkers[..2]
            .iter()
            .map(|checker| {
                let cor = verifier.fold_correctness_shares(&precomp, checker, &shares[..2]);
                verifier
                    .produce_validity_share(&precomp, checker, &cor, &PrgKey::random(&mut rng))
                    .check
            })
            .sum();
        assert_ne!(total, Scalar::ZERO);
    }

    #[test]
    fn test_wrong_claimed_product_fails() {
        let verifier = SnipVerifier::new();
        let config = AggregationConfig::new(3, 2);
        let precomp = verifier.precompute(&config).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(2);

        let mut requests = verifier
            .share_data_point(&config, 5.0, &[2.0, 3.0], &mut rng)
            .unwrap();
        let product = precomp.circuit().products_range().start;
        requests[1].payload[product] += Scalar::ONE;

        let (total, _) = run_check(&verifier, &precomp, &requests);
        assert_ne!(total, Scalar::ZERO);
    }

    #[test]
    fn test_inconsistent_h_fails() {
        let verifier = SnipVerifier::new();
        let config = AggregationConfig::new(2, 1);
        let precomp = verifier.precompute(&config).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(3);

        let mut requests = verifier
            .share_data_point(&config, 1.0, &[4.0], &mut rng)
            .unwrap();
        let last_h = precomp.circuit().h_range().end - 1;
        requests[0].payload[last_h] += Scalar::new(17);

        let (total, _) = run_check(&verifier, &precomp, &requests);
        assert_ne!(total, Scalar::ZERO);
    }

    #[test]
    fn test_aggregate_skips_rejected_clients() {
        let verifier = SnipVerifier::new();
        let config = AggregationConfig::new(2, 1);
        let precomp = verifier.precompute(&config).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(4);

        let points = [(10.0, 2.0, true), (100.0, 50.0, false), (-3.0, 3.0, true)];
        let mut aggregators = vec![verifier.new_aggregator(&precomp); 2];
        for (label, x, accepted) in points {
            let requests = verifier
                .share_data_point(&config, label, &[x], &mut rng)
                .unwrap();
            for (s, request) in requests.iter().enumerate() {
                let checker = verifier
                    .new_checker(&precomp, ServerIndex::from(s), request)
                    .unwrap();
                verifier.fold_into_aggregator(&precomp, &mut aggregators[s], &checker, accepted);
            }
        }

        let combined = Aggregator::combine_all(aggregators.iter()).unwrap().unwrap();
        let stat = LinRegStatistic::from_aggregator(precomp.circuit(), &combined).unwrap();
        assert_eq!(stat.count, 2);
        assert_eq!(stat.sum_x, vec![5]);
        assert_eq!(stat.sum_y, 7);
        assert_eq!(stat.sum_xx, vec![13]);
        assert_eq!(stat.sum_xy, vec![11]);
    }

    #[test]
    fn test_precompute_rejects_eval_point_in_domain() {
        let verifier = SnipVerifier::new();
        // d = 1 -> M = 2, domain 0..=4
        let config = AggregationConfig::new(3, 1).with_eval_point(4);
        assert!(matches!(
            verifier.precompute(&config),
            Err(VerifyError::EvalPointInDomain { point: 4, max: 4 })
        ));
        assert!(verifier.precompute(&config.with_eval_point(5)).is_ok());
    }

    #[test]
    fn test_checker_validates_inputs() {
        let verifier = SnipVerifier::new();
        let config = AggregationConfig::new(3, 1);
        let precomp = verifier.precompute(&config).unwrap();
        let request = ClientRequest::new(vec![Scalar::ZERO; 3], TripleShare::default());

        assert!(matches!(
            verifier.new_checker(&precomp, ServerIndex(0), &request),
            Err(VerifyError::PayloadLength { .. })
        ));
        assert!(matches!(
            verifier.new_checker(&precomp, ServerIndex(3), &request),
            Err(VerifyError::ServerOutOfRange { .. })
        ));
        assert!(matches!(
            verifier.share_data_point(&config, 1.0, &[1.0, 2.0], &mut ChaCha8Rng::seed_from_u64(0)),
            Err(VerifyError::InputArity {
                expected: 1,
                actual: 2
            })
        ));
    }
}
