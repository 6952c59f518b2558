//! Simulated cache substrate.
//!
//! Owns object storage and occupancy accounting and drives the eviction
//! engine at the matching lifecycle points. The logical clock is the
//! request sequence number: the first request is time 1.

use std::collections::HashMap;

use thiserror::Error;
use tracing::{debug, error, warn};

use crate::engine::{EngineError, EvictionPolicyEngine, ObjId, ObjectRef};
use crate::sim::stats::CacheStats;
use crate::sim::trace::Request;

#[derive(Error, Debug)]
pub enum SimError {
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Cache over budget ({occupied} of {capacity} bytes) but nothing is evictable")]
    NothingToEvict { occupied: u64, capacity: u64 },

    #[error("Simulation task failed: {0}")]
    Task(String),
}

#[derive(Debug, Clone, Copy)]
struct CachedObject {
    reference: ObjectRef,
    size: u64,
}

/// A single simulated cache of fixed capacity.
#[derive(Debug)]
pub struct SimCache {
    capacity: u64,
    occupied: u64,
    objects: HashMap<ObjId, CachedObject>,
    engine: EvictionPolicyEngine,
    next_handle: u64,
    clock: u64,
    ignore_obj_size: bool,
    stats: CacheStats,
}

impl SimCache {
    /// `capacity` is in bytes, or in objects when `ignore_obj_size` is set.
    pub fn new(capacity: u64, engine: EvictionPolicyEngine, ignore_obj_size: bool) -> Self {
        Self {
            capacity,
            occupied: 0,
            objects: HashMap::new(),
            engine,
            next_handle: 0,
            clock: 0,
            ignore_obj_size,
            stats: CacheStats::new(capacity, capacity),
        }
    }

    /// Report statistics against `cache_size` instead of the simulated capacity.
    pub fn with_nominal_size(mut self, cache_size: u64) -> Self {
        self.stats.cache_size = cache_size;
        self
    }

    /// Serve one request. Returns whether it was a hit.
    ///
    /// On a miss the object is admitted after evicting until it fits, unless
    /// it is larger than the whole cache.
    pub fn get(&mut self, req: &Request) -> Result<bool, SimError> {
        self.clock += 1;
        let now = self.clock;
        let size = self.object_size(req);

        self.stats.n_req += 1;
        self.stats.n_req_byte += size;

        if let Some(cached) = self.objects.get(&req.obj_id) {
            self.engine.on_access(now, cached.reference);
            return Ok(true);
        }

        self.stats.n_miss += 1;
        self.stats.n_miss_byte += size;

        if size > self.capacity {
            self.stats.n_bypass += 1;
            return Ok(false);
        }

        let mut evicted = 0u32;
        while self.occupied + size > self.capacity {
            self.evict(now)?;
            evicted += 1;
        }
        if evicted > 0 {
            debug!(
                obj_id = req.obj_id,
                size,
                evicted,
                occupied = self.occupied,
                "Made room for admission"
            );
        }
        self.insert(now, req.obj_id, size);
        Ok(false)
    }

    /// Run the two-phase eviction protocol once.
    pub fn evict(&mut self, now: u64) -> Result<ObjectRef, SimError> {
        let before = self.engine.indexed();
        let victim = self.engine.pop_min().ok_or(SimError::NothingToEvict {
            occupied: self.occupied,
            capacity: self.capacity,
        })?;
        if self.engine.indexed() + 1 != before {
            error!(
                before,
                after = self.engine.indexed(),
                "Priority index did not shrink by one on eviction"
            );
            debug_assert!(false, "priority index size mismatch");
        }

        match self.objects.remove(&victim.id) {
            Some(cached) => {
                self.occupied -= cached.size;
                self.stats.n_evictions += 1;
            }
            None => warn!(obj_id = victim.id, "Evicted object is not in cache storage"),
        }
        self.engine.on_evict(now, victim);
        Ok(victim)
    }

    pub fn contains(&self, id: ObjId) -> bool {
        self.objects.contains_key(&id)
    }

    pub fn occupied(&self) -> u64 {
        self.occupied
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Current logical time.
    pub fn clock(&self) -> u64 {
        self.clock
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    pub fn engine(&self) -> &EvictionPolicyEngine {
        &self.engine
    }

    /// Drop all cached objects and engine state. Statistics are kept.
    pub fn clear(&mut self) {
        self.objects.clear();
        self.occupied = 0;
        self.engine.clear();
    }

    fn insert(&mut self, now: u64, id: ObjId, size: u64) {
        let reference = ObjectRef {
            handle: self.next_handle,
            id,
        };
        self.next_handle += 1;
        self.objects.insert(id, CachedObject { reference, size });
        self.occupied += size;
        self.engine.on_insert(now, reference, size);
    }

    fn object_size(&self, req: &Request) -> u64 {
        if self.ignore_obj_size {
            1
        } else {
            req.obj_size
        }
    }
}
