//! Runtime configuration for evict-sim.
//!
//! Configuration can be loaded from a JSON file or constructed programmatically;
//! command-line flags override whatever the file says. All simulation knobs
//! (cache sizes, policy parameters, trace options, outputs) live here.

use std::path::{Path, PathBuf};

use clap::Parser;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::PolicyKind;
use crate::sim::trace::TraceFormat;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("No cache sizes configured")]
    NoCacheSizes,

    #[error("Cache size must be positive")]
    ZeroCacheSize,

    #[error("Sampling ratio must be in (0, 1], got {0}")]
    InvalidSamplingRatio(f64),

    #[error("Worker count must be positive")]
    NoWorkers,

    #[error("History budget must be positive")]
    ZeroHistoryBudget,

    #[error("Policy parameter {name} must be in [0, 1], got {value}")]
    InvalidPolicyParameter { name: &'static str, value: f64 },

    #[error("No trace file given (use --trace or trace.path)")]
    MissingTrace,
}

/// Command-line arguments.
#[derive(Parser, Debug, Clone)]
#[command(name = "evict-sim", about = "Trace-driven cache eviction simulator")]
pub struct Cli {
    /// Path to configuration file (JSON).
    #[arg(short, long, default_value = "evict-sim.json")]
    pub config: PathBuf,

    /// Trace file to replay (CSV or oracleGeneral binary, optionally .zst).
    #[arg(short, long)]
    pub trace: Option<PathBuf>,

    /// Trace format; detected from the file name when omitted.
    #[arg(long, value_enum)]
    pub format: Option<TraceFormat>,

    /// Eviction policy.
    #[arg(short, long, value_enum)]
    pub policy: Option<PolicyKind>,

    /// Comma-separated cache sizes, e.g. `64MiB,256MiB,1GiB`.
    #[arg(short = 's', long, value_delimiter = ',', value_parser = parse_size)]
    pub cache_sizes: Vec<u64>,

    /// SHARDS spatial sampling ratio in (0, 1].
    #[arg(long)]
    pub sampling_ratio: Option<f64>,

    /// Number of simulations to run at once.
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Treat every object as size 1 (object miss ratio instead of byte miss ratio).
    #[arg(long)]
    pub ignore_obj_size: bool,

    /// Write per-size results as JSON to this path.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Write prometheus text-format counters to this path.
    #[arg(long)]
    pub metrics_out: Option<PathBuf>,

    /// Enable verbose logging.
    #[arg(short, long)]
    pub verbose: bool,
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Simulation sizing.
    pub simulation: SimulationConfig,

    /// Eviction policy selection and tuning.
    pub policy: PolicyConfig,

    /// Trace input.
    pub trace: TraceConfig,

    /// Result outputs.
    pub output: OutputConfig,
}

/// Cache sizing and fan-out.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Cache sizes to simulate, in bytes (or objects with `ignore_obj_size`).
    pub cache_sizes: Vec<u64>,

    /// Maximum simulations running at once.
    pub workers: usize,

    /// Ghost history budget in bytes. `None` uses the cache size.
    pub history_budget: Option<u64>,

    /// Count every object as size 1.
    pub ignore_obj_size: bool,

    /// Emit a progress log line every this many requests (0 = never).
    pub report_interval: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            cache_sizes: vec![64 * MIB, 256 * MIB, GIB],
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            history_budget: None,
            ignore_obj_size: false,
            report_interval: 0,
        }
    }
}

/// Eviction policy and its parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Which scoring function to use.
    pub kind: PolicyKind,

    /// Count percentile separating cold from warm objects (`percentile-lfu`).
    pub count_percentile: f64,

    /// Age percentile above which objects are evicted first (`age-gated`).
    pub age_percentile: f64,

    /// Recency window in evicted bytes for `ghost-lru`. `None` means the whole history.
    pub history_window: Option<u64>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            kind: PolicyKind::Lru,
            count_percentile: 0.5,
            age_percentile: 0.9,
            history_window: None,
        }
    }
}

/// Trace input settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceConfig {
    /// Trace file.
    pub path: Option<PathBuf>,

    /// Format override; detected from the file name when absent.
    pub format: Option<TraceFormat>,

    /// Skip malformed CSV lines with a warning instead of failing.
    pub skip_malformed: bool,

    /// SHARDS spatial sampling ratio.
    pub sampling_ratio: Option<f64>,
}

/// Where results go.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// JSON results file.
    pub results_path: Option<PathBuf>,

    /// Prometheus text exposition file.
    pub metrics_path: Option<PathBuf>,
}

pub const KIB: u64 = 1024;
pub const MIB: u64 = 1024 * KIB;
pub const GIB: u64 = 1024 * MIB;
pub const TIB: u64 = 1024 * GIB;

/// Parse a size such as `4096`, `64KiB`, `256MB` or `1g`. Suffixes are binary.
pub fn parse_size(input: &str) -> Result<u64, String> {
    let trimmed = input.trim();
    let split = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (digits, suffix) = trimmed.split_at(split);
    let value: u64 = digits
        .parse()
        .map_err(|_| format!("invalid size: {input:?}"))?;
    let multiplier = match suffix.trim().to_ascii_lowercase().as_str() {
        "" | "b" => 1,
        "k" | "kb" | "kib" => KIB,
        "m" | "mb" | "mib" => MIB,
        "g" | "gb" | "gib" => GIB,
        "t" | "tb" | "tib" => TIB,
        other => return Err(format!("unknown size suffix {other:?} in {input:?}")),
    };
    value
        .checked_mul(multiplier)
        .ok_or_else(|| format!("size overflows u64: {input:?}"))
}

impl Config {
    /// Load configuration from a JSON file, falling back to defaults for missing fields.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let data = std::fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&data)?;
            Ok(config)
        } else {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            Ok(Config::default())
        }
    }

    /// Overlay command-line flags onto the loaded configuration.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(trace) = &cli.trace {
            self.trace.path = Some(trace.clone());
        }
        if cli.format.is_some() {
            self.trace.format = cli.format;
        }
        if let Some(policy) = cli.policy {
            self.policy.kind = policy;
        }
        if !cli.cache_sizes.is_empty() {
            self.simulation.cache_sizes = cli.cache_sizes.clone();
        }
        if cli.sampling_ratio.is_some() {
            self.trace.sampling_ratio = cli.sampling_ratio;
        }
        if let Some(workers) = cli.workers {
            self.simulation.workers = workers;
        }
        if cli.ignore_obj_size {
            self.simulation.ignore_obj_size = true;
        }
        if let Some(output) = &cli.output {
            self.output.results_path = Some(output.clone());
        }
        if let Some(metrics) = &cli.metrics_out {
            self.output.metrics_path = Some(metrics.clone());
        }
    }

    /// Reject configurations that cannot produce a meaningful simulation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.simulation.cache_sizes.is_empty() {
            return Err(ConfigError::NoCacheSizes);
        }
        if self.simulation.cache_sizes.contains(&0) {
            return Err(ConfigError::ZeroCacheSize);
        }
        if self.simulation.workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if self.simulation.history_budget == Some(0) {
            return Err(ConfigError::ZeroHistoryBudget);
        }
        if let Some(ratio) = self.trace.sampling_ratio {
            if !(ratio > 0.0 && ratio <= 1.0) {
                return Err(ConfigError::InvalidSamplingRatio(ratio));
            }
        }
        for (name, value) in [
            ("count_percentile", self.policy.count_percentile),
            ("age_percentile", self.policy.age_percentile),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidPolicyParameter { name, value });
            }
        }
        if self.trace.path.is_none() {
            return Err(ConfigError::MissingTrace);
        }
        Ok(())
    }
}
