//! Per-run hit/miss accounting.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Counters for one simulated cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Nominal cache size being reported on.
    pub cache_size: u64,
    /// Capacity actually simulated (differs from `cache_size` when sampling).
    pub simulated_size: u64,
    pub n_req: u64,
    pub n_miss: u64,
    pub n_req_byte: u64,
    pub n_miss_byte: u64,
    pub n_evictions: u64,
    /// Misses for objects larger than the whole cache, which are never admitted.
    pub n_bypass: u64,
}

impl CacheStats {
    pub fn new(cache_size: u64, simulated_size: u64) -> Self {
        Self {
            cache_size,
            simulated_size,
            ..Default::default()
        }
    }

    /// Fraction of requests that missed (0.0 when nothing was requested).
    pub fn miss_ratio(&self) -> f64 {
        if self.n_req == 0 {
            return 0.0;
        }
        self.n_miss as f64 / self.n_req as f64
    }

    /// Fraction of requested bytes that missed.
    pub fn byte_miss_ratio(&self) -> f64 {
        if self.n_req_byte == 0 {
            return 0.0;
        }
        self.n_miss_byte as f64 / self.n_req_byte as f64
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cache size {:>12}, req {:>10}, miss {:>10}, miss ratio {:.4}, byte miss ratio {:.4}",
            self.cache_size,
            self.n_req,
            self.n_miss,
            self.miss_ratio(),
            self.byte_miss_ratio()
        )
    }
}

/// Outcome of one simulation in a fan-out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationResult {
    pub run_id: Uuid,
    pub policy: String,
    pub cache_size: u64,
    pub sampling_ratio: Option<f64>,
    /// Counters, absent when the run failed.
    pub stats: Option<CacheStats>,
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ratios() {
        let mut stats = CacheStats::new(100, 100);
        assert_eq!(stats.miss_ratio(), 0.0);
        assert_eq!(stats.byte_miss_ratio(), 0.0);

        stats.n_req = 4;
        stats.n_miss = 1;
        stats.n_req_byte = 400;
        stats.n_miss_byte = 300;
        assert_eq!(stats.miss_ratio(), 0.25);
        assert_eq!(stats.byte_miss_ratio(), 0.75);
        assert!(stats.to_string().contains("miss ratio 0.2500"));
    }
}
