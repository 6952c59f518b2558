//! SHARDS spatial sampling.
//!
//! A request is kept when the hash of its object id falls below
//! `ratio * 2^24` in the low 24 bits, so every request of a sampled object is
//! kept and every request of an unsampled object is dropped. Cache sizes
//! must be scaled by the same ratio when simulating a sampled trace.

use crate::engine::ObjId;
use crate::hash::mix64;
use crate::sim::trace::TraceError;

const MODULUS_BITS: u32 = 24;
const MODULUS: u64 = 1 << MODULUS_BITS;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShardsSampler {
    ratio: f64,
    threshold: u64,
}

impl ShardsSampler {
    pub fn new(ratio: f64) -> Result<Self, TraceError> {
        if !(ratio > 0.0 && ratio <= 1.0) {
            return Err(TraceError::InvalidSamplingRatio(ratio));
        }
        Ok(Self {
            ratio,
            threshold: (ratio * MODULUS as f64 + 0.5) as u64,
        })
    }

    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    /// Whether requests for `obj_id` belong to the sample.
    pub fn sample(&self, obj_id: ObjId) -> bool {
        (mix64(obj_id) & (MODULUS - 1)) < self.threshold
    }

    /// Cache size to simulate for a nominal `cache_size` on the sampled trace.
    pub fn scale(&self, cache_size: u64) -> u64 {
        ((cache_size as f64 * self.ratio) as u64).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_bad_ratio() {
        assert!(ShardsSampler::new(0.0).is_err());
        assert!(ShardsSampler::new(1.5).is_err());
        assert!(ShardsSampler::new(f64::NAN).is_err());
        assert!(ShardsSampler::new(1.0).is_ok());
    }

    #[test]
    fn test_full_ratio_keeps_everything() {
        let sampler = ShardsSampler::new(1.0).unwrap();
        assert!((0..10_000).all(|id| sampler.sample(id)));
    }

    #[test]
    fn test_ratio_is_approximately_honoured() {
        let sampler = ShardsSampler::new(0.1).unwrap();
        let kept = (0..100_000u64).filter(|&id| sampler.sample(id)).count();
        assert!((9_000..11_000).contains(&kept), "kept {kept}");
    }

    #[test]
    fn test_scale() {
        let sampler = ShardsSampler::new(0.01).unwrap();
        assert_eq!(sampler.scale(1_000_000), 10_000);
        assert_eq!(sampler.scale(10), 1);
    }
}
