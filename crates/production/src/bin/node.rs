//! Tally Node CLI
//!
//! Runs an aggregation round on an in-process cluster and writes
//! aggregation configuration files.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tally_client::{ClientRequestSupplier, DataPointGenerator, LinearWorkload};
use tally_production::{LocalCluster, RunnerConfig};
use tally_protocol::ProtocolConfig;
use tally_types::{
    AggregationConfig, ConfigLoader, FileConfigLoader, RoundId, StaticConfigLoader,
};
use tally_verifier::{LinRegCircuit, LinRegStatistic, SnipVerifier, Verifier};
use tracing_subscriber::EnvFilter;

/// Reference used when the configuration comes from command-line flags.
const INLINE_REFERENCE: &str = "inline";

#[derive(Parser)]
#[command(name = "tally-node")]
#[command(about = "Quorum-gated secure aggregation")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write an aggregation configuration file
    InitConfig {
        /// Output path
        #[arg(short, long)]
        output: PathBuf,

        /// Number of servers
        #[arg(long, default_value = "3")]
        num_servers: usize,

        /// Features per data point
        #[arg(long, default_value = "2")]
        num_features: usize,

        /// Polynomial evaluation point (defaults to the built-in point)
        #[arg(long)]
        eval_point: Option<u64>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Run one round over generated data points
    Run {
        /// Aggregation configuration file (overrides --num-servers/--num-features)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Number of servers
        #[arg(long, default_value = "3")]
        num_servers: usize,

        /// Features per data point
        #[arg(long, default_value = "2")]
        num_features: usize,

        /// Number of clients
        #[arg(long, default_value = "100")]
        clients: usize,

        /// Model weights for generated points (comma-separated, one per feature)
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
        weights: Vec<i64>,

        /// Model intercept
        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        intercept: i64,

        /// Features are drawn from -range..=range
        #[arg(long, default_value = "10")]
        range: i64,

        /// Label noise is drawn from -noise..=noise
        #[arg(long, default_value = "0")]
        noise: i64,

        /// Replies required per phase (defaults to every server)
        #[arg(long)]
        threshold: Option<usize>,

        /// Whole-round timeout in milliseconds
        #[arg(long, default_value = "5000")]
        timeout_ms: u64,

        /// Count a second reply for the same server as malformed
        #[arg(long)]
        reject_duplicates: bool,

        /// Random seed for data generation and server keys
        #[arg(long, default_value = "0")]
        seed: u64,
    },
}

fn init_config(
    output: PathBuf,
    num_servers: usize,
    num_features: usize,
    eval_point: Option<u64>,
    force: bool,
) -> Result<()> {
    if output.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", output.display());
    }

    let mut config = AggregationConfig::new(num_servers, num_features);
    if let Some(point) = eval_point {
        config = config.with_eval_point(point);
    }
    config.validate()?;

    std::fs::write(&output, config.to_toml_string()?)
        .with_context(|| format!("failed to write {}", output.display()))?;
    println!("Wrote {}", output.display());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::InitConfig {
            output,
            num_servers,
            num_features,
            eval_point,
            force,
        } => init_config(output, num_servers, num_features, eval_point, force)?,

        Commands::Run {
            config,
            num_servers,
            num_features,
            clients,
            weights,
            intercept,
            range,
            noise,
            threshold,
            timeout_ms,
            reject_duplicates,
            seed,
        } => {
            tracing_subscriber::fmt()
                .with_env_filter(
                    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
                )
                .init();

            let (loader, reference): (Arc<dyn ConfigLoader>, String) = match config {
                Some(path) => (
                    Arc::new(FileConfigLoader::new()),
                    path.to_string_lossy().into_owned(),
                ),
                None => (
                    Arc::new(StaticConfigLoader::single(
                        INLINE_REFERENCE,
                        AggregationConfig::new(num_servers, num_features),
                    )),
                    INLINE_REFERENCE.to_string(),
                ),
            };
            let aggregation = loader
                .load(&reference)
                .with_context(|| format!("failed to load configuration {:?}", reference))?;

            let verifier = SnipVerifier::new();
            let minimum = verifier.min_threshold(&verifier.precompute(&aggregation)?);
            if let Some(threshold) = threshold {
                if threshold < minimum {
                    bail!(
                        "--threshold {} is below {}: every server's shares are needed to verify a client",
                        threshold,
                        minimum
                    );
                }
            }

            let mut workload = if weights.is_empty() {
                LinearWorkload::unit(aggregation.num_features)
            } else if weights.len() == aggregation.num_features {
                LinearWorkload::new(weights, intercept)
            } else {
                bail!(
                    "{} weights given for {} features",
                    weights.len(),
                    aggregation.num_features
                );
            }
            .with_range(range)
            .with_noise(noise);

            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let points = workload.generate_batch(clients, &mut rng);
            let requests = ClientRequestSupplier::new(verifier, aggregation.clone())
                .shares_for_points(&points, &mut rng)?;

            let mut protocol = ProtocolConfig::default()
                .with_round_timeout(Duration::from_millis(timeout_ms))
                .with_reject_duplicate_senders(reject_duplicates);
            if let Some(threshold) = threshold {
                protocol = protocol.with_threshold(threshold);
            }
            let runner_config = RunnerConfig::default()
                .with_protocol(protocol)
                .with_seed(seed);

            let cluster = LocalCluster::new(
                aggregation.num_servers,
                verifier,
                loader,
                reference,
                runner_config,
            );
            let report = cluster.run(RoundId(1), requests).await?;

            for (i, outcome) in report.outcomes().iter().enumerate() {
                println!("server {}: {:?}", i, outcome);
            }
            if !report.succeeded() {
                let reason = report
                    .root()
                    .failure_reason()
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "no outcome".to_string());
                bail!("round failed: {}", reason);
            }

            let combined = report
                .root()
                .combined_aggregate()
                .context("no aggregators collected")??;
            let stat = LinRegStatistic::from_aggregator(
                &LinRegCircuit::new(aggregation.num_features),
                &combined,
            )?;

            println!("accepted: {} of {}", stat.count, clients);
            println!("sum x:    {:?}", stat.sum_x);
            println!("sum y:    {}", stat.sum_y);
            println!("sum xx:   {:?}", stat.sum_xx);
            println!("sum xy:   {:?}", stat.sum_xy);
        }
    }

    Ok(())
}
