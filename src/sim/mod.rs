//! Trace-driven cache simulation around the eviction engine.
//!
//! A [`cache::SimCache`] owns object storage and capacity accounting and calls
//! into an [`crate::engine::EvictionPolicyEngine`] at each lifecycle point.
//! Traces are read by [`trace::TraceReader`], optionally thinned by
//! [`sampling::ShardsSampler`], and replayed at several cache sizes by
//! [`driver::simulate_at_multi_sizes`].

pub mod cache;
pub mod driver;
pub mod sampling;
pub mod stats;
pub mod trace;

pub use cache::{SimCache, SimError};
pub use driver::{run_simulation, simulate_at_multi_sizes};
pub use sampling::ShardsSampler;
pub use stats::{CacheStats, SimulationResult};
pub use trace::{Request, TraceError, TraceFormat, TraceReader};
