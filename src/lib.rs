//! evict-sim: trace-driven cache simulator.
//!
//! The core is a priority eviction engine that keeps order-statistics over
//! the cached population (access counts, insertion times, sizes) and a
//! byte-bounded ghost history of recent evictions, so that scoring functions
//! can rank objects relative to the rest of the cache.

pub mod config;
pub mod engine;
pub mod hash;
pub mod metrics;
pub mod sim;
