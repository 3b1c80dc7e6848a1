//! Rounds whose configuration is loaded from disk by every server.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;
use tally_client::{ClientRequestSupplier, DataPointGenerator, LinearWorkload};
use tally_production::{LocalCluster, RunnerConfig};
use tally_protocol::{ProtocolConfig, ProtocolError};
use tally_types::{AggregationConfig, FileConfigLoader, RoundId};
use tally_verifier::{LinRegCircuit, LinRegStatistic, SnipVerifier};
use tracing_test::traced_test;

#[traced_test]
#[tokio::test]
async fn test_round_with_file_configuration() {
    let dir = tempfile::tempdir().unwrap();
    let config = AggregationConfig::new(4, 2).with_eval_point(123_456_789);
    std::fs::write(
        dir.path().join("round.toml"),
        config.to_toml_string().unwrap(),
    )
    .unwrap();

    let mut rng = ChaCha8Rng::seed_from_u64(21);
    let points = LinearWorkload::new(vec![3, -1], 2).generate_batch(12, &mut rng);
    let requests = ClientRequestSupplier::new(SnipVerifier::new(), config)
        .shares_for_points(&points, &mut rng)
        .unwrap();

    let cluster = LocalCluster::new(
        4,
        SnipVerifier::new(),
        Arc::new(FileConfigLoader::with_base_dir(dir.path())),
        "round.toml",
        RunnerConfig::default().with_seed(1),
    );
    let report = cluster.run(RoundId(1), requests).await.unwrap();

    assert!(report.succeeded());
    assert_eq!(report.outcomes(), &[Some(true); 4]);

    let combined = report.root().combined_aggregate().unwrap().unwrap();
    let stat = LinRegStatistic::from_aggregator(&LinRegCircuit::new(2), &combined).unwrap();
    assert_eq!(stat.count, 12);
    let expected_y: i64 = points.iter().map(|p| p.label as i64).sum();
    assert_eq!(stat.sum_y, expected_y);
}

#[traced_test]
#[tokio::test]
async fn test_missing_configuration_fails_at_start() {
    let dir = tempfile::tempdir().unwrap();
    let config = AggregationConfig::new(3, 1);
    let requests = ClientRequestSupplier::new(SnipVerifier::new(), config)
        .shares_for_points(
            &LinearWorkload::unit(1).generate_batch(2, &mut ChaCha8Rng::seed_from_u64(0)),
            &mut ChaCha8Rng::seed_from_u64(1),
        )
        .unwrap();

    let cluster = LocalCluster::new(
        3,
        SnipVerifier::new(),
        Arc::new(FileConfigLoader::with_base_dir(dir.path())),
        "absent.toml",
        RunnerConfig::default()
            .with_protocol(ProtocolConfig::default().with_threshold(2)),
    );
    let report = cluster.run(RoundId(7), requests).await.unwrap();

    assert!(!report.succeeded());
    assert_eq!(report.outcomes(), &[Some(false), None, None]);
    assert!(matches!(
        report.root().failure_reason(),
        Some(ProtocolError::Configuration(_))
    ));
}

#[traced_test]
#[tokio::test]
async fn test_threshold_below_server_count_fails_at_start() {
    let dir = tempfile::tempdir().unwrap();
    let config = AggregationConfig::new(3, 1);
    std::fs::write(
        dir.path().join("round.toml"),
        config.to_toml_string().unwrap(),
    )
    .unwrap();
    let requests = ClientRequestSupplier::new(SnipVerifier::new(), config)
        .shares_for_points(
            &LinearWorkload::unit(1).generate_batch(3, &mut ChaCha8Rng::seed_from_u64(0)),
            &mut ChaCha8Rng::seed_from_u64(1),
        )
        .unwrap();

    let cluster = LocalCluster::new(
        3,
        SnipVerifier::new(),
        Arc::new(FileConfigLoader::with_base_dir(dir.path())),
        "round.toml",
        RunnerConfig::default()
            .with_protocol(ProtocolConfig::default().with_threshold(2)),
    );
    let report = cluster.run(RoundId(8), requests).await.unwrap();

    assert!(!report.succeeded());
    assert_eq!(report.outcomes(), &[Some(false), None, None]);
    assert!(report.root().acceptance().is_empty());
    assert!(matches!(
        report.root().failure_reason(),
        Some(ProtocolError::Configuration(_))
    ));
}
