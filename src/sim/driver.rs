//! Trace replay and multi-size fan-out.
//!
//! Each cache size is simulated by an independent [`SimCache`] on a blocking
//! worker thread. Runs share only the immutable request slice.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::config::{PolicyConfig, SimulationConfig};
use crate::engine::EvictionPolicyEngine;
use crate::metrics::SimMetrics;
use crate::sim::cache::{SimCache, SimError};
use crate::sim::sampling::ShardsSampler;
use crate::sim::stats::{CacheStats, SimulationResult};
use crate::sim::trace::Request;

/// Build a cache simulating the nominal `cache_size`.
///
/// With a sampler the simulated capacity (and an explicit history budget) is
/// scaled by the sampling ratio. The history budget otherwise defaults to the
/// simulated capacity.
pub fn build_cache(
    cache_size: u64,
    sampler: Option<&ShardsSampler>,
    sim: &SimulationConfig,
    policy: &PolicyConfig,
) -> Result<SimCache, SimError> {
    let scale = |bytes: u64| sampler.map_or(bytes, |s| s.scale(bytes));
    let capacity = scale(cache_size);
    let history_budget = sim.history_budget.map_or(capacity, scale);

    let scorer = policy.kind.build(policy)?;
    let engine = EvictionPolicyEngine::new(scorer, history_budget)?;
    Ok(SimCache::new(capacity, engine, sim.ignore_obj_size).with_nominal_size(cache_size))
}

/// Feed `requests` through `cache` in order.
///
/// Logs progress every `report_interval` requests when it is non-zero.
pub fn replay(
    cache: &mut SimCache,
    requests: &[Request],
    report_interval: u64,
) -> Result<CacheStats, SimError> {
    for (i, req) in requests.iter().enumerate() {
        cache.get(req)?;
        let processed = i as u64 + 1;
        if report_interval > 0 && processed % report_interval == 0 {
            let stats = cache.stats();
            info!(
                cache_size = stats.cache_size,
                processed,
                miss_ratio = stats.miss_ratio(),
                occupied = cache.occupied(),
                "Replay progress"
            );
        }
    }
    Ok(*cache.stats())
}

/// Simulate one cache size from scratch.
pub fn run_simulation(
    requests: &[Request],
    cache_size: u64,
    sampler: Option<&ShardsSampler>,
    sim: &SimulationConfig,
    policy: &PolicyConfig,
) -> Result<CacheStats, SimError> {
    let mut cache = build_cache(cache_size, sampler, sim, policy)?;
    replay(&mut cache, requests, sim.report_interval)
}

/// Simulate every size in `sim.cache_sizes` concurrently.
///
/// At most `sim.workers` runs execute at once. A failed run is reported as an
/// error entry and does not cancel the others. Results are sorted by cache size.
pub async fn simulate_at_multi_sizes(
    requests: Arc<[Request]>,
    sim: &SimulationConfig,
    policy: &PolicyConfig,
    sampler: Option<ShardsSampler>,
    metrics: Option<Arc<SimMetrics>>,
) -> Vec<SimulationResult> {
    let permits = Arc::new(Semaphore::new(sim.workers.max(1)));
    let mut tasks = JoinSet::new();

    for &cache_size in &sim.cache_sizes {
        let requests = Arc::clone(&requests);
        let permits = Arc::clone(&permits);
        let sim = sim.clone();
        let policy = policy.clone();
        let run_id = Uuid::new_v4();

        tasks.spawn(async move {
            let outcome = match permits.acquire_owned().await {
                Ok(permit) => {
                    debug!(%run_id, cache_size, "Simulation started");
                    let started = Instant::now();
                    let joined = tokio::task::spawn_blocking(move || {
                        let _permit = permit;
                        run_simulation(&requests, cache_size, sampler.as_ref(), &sim, &policy)
                    })
                    .await;
                    let elapsed_ms = started.elapsed().as_millis() as u64;
                    let result = joined.unwrap_or_else(|e| Err(SimError::Task(e.to_string())));
                    (result, elapsed_ms)
                }
                Err(e) => (Err(SimError::Task(e.to_string())), 0),
            };
            (run_id, cache_size, outcome)
        });
    }

    let sampling_ratio = sampler.map(|s| s.ratio());
    let policy_name = policy.kind.name();
    let mut results = Vec::with_capacity(sim.cache_sizes.len());

    while let Some(joined) = tasks.join_next().await {
        let (run_id, cache_size, (outcome, elapsed_ms)) = match joined {
            Ok(done) => done,
            Err(e) => {
                error!(error = %e, "Simulation task aborted");
                continue;
            }
        };

        let mut result = SimulationResult {
            run_id,
            policy: policy_name.to_string(),
            cache_size,
            sampling_ratio,
            stats: None,
            error: None,
            elapsed_ms,
        };
        match outcome {
            Ok(stats) => {
                info!(
                    %run_id,
                    policy = policy_name,
                    cache_size,
                    n_req = stats.n_req,
                    miss_ratio = stats.miss_ratio(),
                    byte_miss_ratio = stats.byte_miss_ratio(),
                    elapsed_ms,
                    "Simulation finished"
                );
                if let Some(metrics) = &metrics {
                    metrics.record(policy_name, &stats);
                }
                result.stats = Some(stats);
            }
            Err(e) => {
                error!(%run_id, cache_size, error = %e, "Simulation failed");
                result.error = Some(e.to_string());
            }
        }
        results.push(result);
    }

    results.sort_by_key(|r| r.cache_size);
    results
}
