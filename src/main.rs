//! evict-sim: replay a cache trace against a priority eviction policy at
//! several cache sizes and report miss ratios.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use evict_sim::config::{Cli, Config};
use evict_sim::metrics::SimMetrics;
use evict_sim::sim::{simulate_at_multi_sizes, Request, ShardsSampler, TraceReader};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments.
    let cli = Cli::parse();

    // Initialize tracing/logging.
    let filter = if cli.verbose {
        "evict_sim=debug"
    } else {
        "evict_sim=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with_target(true)
        .init();

    info!("evict-sim v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration.
    let mut config = Config::load(&cli.config)?;
    config.apply_cli(&cli);
    config.validate()?;

    let trace_path = config
        .trace
        .path
        .clone()
        .context("no trace file configured")?;

    info!(
        trace = %trace_path.display(),
        policy = %config.policy.kind,
        cache_sizes = ?config.simulation.cache_sizes,
        workers = config.simulation.workers,
        "Configuration loaded"
    );

    let sampler = config
        .trace
        .sampling_ratio
        .map(ShardsSampler::new)
        .transpose()?;

    // Read the whole trace once; every run replays the same slice.
    let started = Instant::now();
    let requests = load_trace(
        trace_path,
        config.trace.format,
        config.trace.skip_malformed,
        sampler,
    )
    .await?;
    info!(
        requests = requests.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        sampling_ratio = ?sampler.map(|s| s.ratio()),
        "Trace loaded"
    );
    if requests.is_empty() {
        warn!("Trace contains no requests");
    }

    let metrics = Arc::new(SimMetrics::new()?);
    let results = simulate_at_multi_sizes(
        requests,
        &config.simulation,
        &config.policy,
        sampler,
        Some(Arc::clone(&metrics)),
    )
    .await;

    for result in &results {
        match (&result.stats, &result.error) {
            (Some(stats), _) => println!("{:<16} {}", result.policy, stats),
            (None, Some(err)) => println!(
                "{:<16} cache size {:>12}, failed: {}",
                result.policy, result.cache_size, err
            ),
            (None, None) => {}
        }
    }

    if let Some(path) = &config.output.results_path {
        let json = serde_json::to_string_pretty(&results)?;
        std::fs::write(path, json)
            .with_context(|| format!("writing results to {}", path.display()))?;
        info!(path = %path.display(), "Results written");
    }

    if let Some(path) = &config.output.metrics_path {
        std::fs::write(path, metrics.encode()?)
            .with_context(|| format!("writing metrics to {}", path.display()))?;
        info!(path = %path.display(), "Metrics written");
    }

    let failed = results.iter().filter(|r| r.error.is_some()).count();
    if failed > 0 {
        anyhow::bail!("{failed} of {} simulations failed", results.len());
    }

    Ok(())
}

async fn load_trace(
    path: PathBuf,
    format: Option<evict_sim::sim::TraceFormat>,
    skip_malformed: bool,
    sampler: Option<ShardsSampler>,
) -> anyhow::Result<Arc<[Request]>> {
    let requests = tokio::task::spawn_blocking(move || {
        let mut reader = TraceReader::open(&path, format)?.skip_malformed(skip_malformed);
        if let Some(sampler) = sampler {
            reader = reader.with_sampler(sampler);
        }
        reader.read_all()
    })
    .await??;
    Ok(requests.into())
}
