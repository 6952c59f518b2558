//! Priority eviction engine.
//!
//! An eviction policy here is just a scoring function over per-object
//! features and global percentile statistics. This module holds the pieces
//! that keep those statistics current:
//! - [`ranked_set`]: order-statistics multiset (percentile / rank queries)
//! - [`age_view`]: age percentiles over insertion timestamps
//! - [`history`]: byte-budgeted ghost log of evicted objects
//! - [`priority_index`]: mutable-priority index with pop-min
//! - [`scoring`]: the `Scorer` hook and the named policy catalog
//! - [`policy_engine`]: lifecycle orchestration (insert / access / evict)

pub mod age_view;
pub mod history;
pub mod policy_engine;
pub mod priority_index;
pub mod ranked_set;
pub mod scoring;

use thiserror::Error;

pub use age_view::AgeView;
pub use history::{EvictionHistory, HistoryEntry};
pub use policy_engine::EvictionPolicyEngine;
pub use priority_index::PriorityIndex;
pub use ranked_set::RankedSet;
pub use scoring::{PolicyKind, Scorer, ScoringContext};

/// Object identifier as it appears in the trace.
pub type ObjId = u64;

/// Eviction priority; smaller is evicted sooner.
///
/// Wide enough that a `u32` band times [`scoring::BAND`] plus any `u64` clock
/// cannot overflow.
pub type Priority = i128;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Eviction history budget must be positive, got {0} bytes")]
    InvalidHistoryBudget(u64),

    #[error("Policy parameter {name} out of range: {value}")]
    InvalidPolicyParameter { name: &'static str, value: f64 },
}

/// Handle the substrate passes for a cached object.
///
/// `handle` is a creation-order sequence number and is unique per insertion,
/// so it alone decides ordering between two references; it exists so that
/// equal priorities still have a deterministic order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectRef {
    pub handle: u64,
    pub id: ObjId,
}

/// Features the engine tracks for one cached object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectMetadata {
    pub access_count: u32,
    pub last_access_time: u64,
    pub size: u64,
    pub insertion_time: u64,
}

impl ObjectMetadata {
    /// Metadata for an object inserted at `now`.
    pub fn new(now: u64, size: u64) -> Self {
        Self {
            access_count: 1,
            last_access_time: now,
            size,
            insertion_time: now,
        }
    }

    /// Record an access at `now`.
    pub fn touch(&mut self, now: u64) {
        self.access_count = self.access_count.saturating_add(1);
        self.last_access_time = now;
    }

    /// Time since insertion.
    pub fn age(&self, now: u64) -> u64 {
        now.saturating_sub(self.insertion_time)
    }
}
