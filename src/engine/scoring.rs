//! Scoring hook and the named policy catalog.
//!
//! A policy is a pure function from one object's features plus the global
//! feature statistics to an integer priority; the smallest priority is
//! evicted first. Priorities are computed when an object is inserted or
//! accessed and are not refreshed in between.
//!
//! Composite policies split the priority space into bands of width
//! [`BAND`]: the band encodes the policy's coarse decision (cold / warm,
//! size class, ...) and the offset inside the band is the last access time,
//! so each band behaves as LRU.

use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::config::PolicyConfig;
use crate::engine::{
    AgeView, EngineError, EvictionHistory, ObjId, ObjectMetadata, Priority, RankedSet,
};

/// Width of one priority band. Every `u64` clock value fits below it.
pub const BAND: Priority = 1 << 64;

/// Number of size classes used by [`LargestFirst`].
const SIZE_CLASSES: Priority = 10;

/// Everything a scorer may look at.
#[derive(Debug, Clone, Copy)]
pub struct ScoringContext<'a> {
    /// Logical clock (request sequence number).
    pub now: u64,
    pub id: ObjId,
    pub meta: &'a ObjectMetadata,
    /// Access counts of all cached objects.
    pub counts: &'a RankedSet<u32>,
    /// Ages of all cached objects.
    pub ages: AgeView<'a>,
    /// Sizes of all cached objects.
    pub sizes: &'a RankedSet<u64>,
    pub history: &'a EvictionHistory,
}

/// Eviction priority function. Smaller is evicted sooner.
///
/// Implementations must be deterministic and keep no hidden mutable state,
/// otherwise simulation results stop being reproducible.
pub trait Scorer: Send + Sync {
    fn priority(&self, ctx: &ScoringContext<'_>) -> Priority;

    fn name(&self) -> &str;
}

fn clock(t: u64) -> Priority {
    Priority::from(t)
}

/// `band` must be below `2^32`, which every band used here is.
fn banded(band: Priority, t: u64) -> Priority {
    band * BAND + clock(t)
}

/// Least recently used.
#[derive(Debug, Clone, Copy, Default)]
pub struct Lru;

impl Scorer for Lru {
    fn priority(&self, ctx: &ScoringContext<'_>) -> Priority {
        clock(ctx.meta.last_access_time)
    }

    fn name(&self) -> &str {
        "lru"
    }
}

/// Most recently used.
#[derive(Debug, Clone, Copy, Default)]
pub struct Mru;

impl Scorer for Mru {
    fn priority(&self, ctx: &ScoringContext<'_>) -> Priority {
        -clock(ctx.meta.last_access_time)
    }

    fn name(&self) -> &str {
        "mru"
    }
}

/// Insertion order.
#[derive(Debug, Clone, Copy, Default)]
pub struct Fifo;

impl Scorer for Fifo {
    fn priority(&self, ctx: &ScoringContext<'_>) -> Priority {
        clock(ctx.meta.insertion_time)
    }

    fn name(&self) -> &str {
        "fifo"
    }
}

/// Least frequently used; equal counts fall back to insertion order through
/// the index tie-break.
#[derive(Debug, Clone, Copy, Default)]
pub struct Lfu;

impl Scorer for Lfu {
    fn priority(&self, ctx: &ScoringContext<'_>) -> Priority {
        Priority::from(ctx.meta.access_count)
    }

    fn name(&self) -> &str {
        "lfu"
    }
}

/// Frequency first, recency among equal counts.
#[derive(Debug, Clone, Copy, Default)]
pub struct LfuLru;

impl Scorer for LfuLru {
    fn priority(&self, ctx: &ScoringContext<'_>) -> Priority {
        banded(Priority::from(ctx.meta.access_count), ctx.meta.last_access_time)
    }

    fn name(&self) -> &str {
        "lfu-lru"
    }
}

/// Objects whose access count is below the given count percentile go to the
/// cold band and are evicted before any warm object.
///
/// The band is decided when the object is inserted or accessed. An object that
/// was cold at its last touch stays cold even if the population's percentile
/// has dropped below its count since then.
#[derive(Debug, Clone, Copy)]
pub struct PercentileLfu {
    percentile: f64,
}

impl PercentileLfu {
    pub fn new(percentile: f64) -> Result<Self, EngineError> {
        check_fraction("percentile", percentile)?;
        Ok(Self { percentile })
    }
}

impl Scorer for PercentileLfu {
    fn priority(&self, ctx: &ScoringContext<'_>) -> Priority {
        let threshold = ctx.counts.percentile(self.percentile);
        let band = if ctx.meta.access_count < threshold { 0 } else { 1 };
        banded(band, ctx.meta.last_access_time)
    }

    fn name(&self) -> &str {
        "percentile-lfu"
    }
}

/// LRU that protects objects which come back shortly after being evicted.
///
/// With a window, "shortly" means within the last `window_bytes` of evicted
/// bytes; without one, anything still in the history counts.
#[derive(Debug, Clone, Copy)]
pub struct GhostLru {
    window_bytes: Option<u64>,
}

impl GhostLru {
    pub fn new(window_bytes: Option<u64>) -> Self {
        Self { window_bytes }
    }
}

impl Scorer for GhostLru {
    fn priority(&self, ctx: &ScoringContext<'_>) -> Priority {
        let returning = match self.window_bytes {
            Some(k) => ctx.history.in_last_k_bytes(ctx.id, k),
            None => ctx.history.contains(ctx.id),
        };
        banded(Priority::from(returning), ctx.meta.last_access_time)
    }

    fn name(&self) -> &str {
        "ghost-lru"
    }
}

/// Larger size classes are evicted first, LRU within a class.
#[derive(Debug, Clone, Copy, Default)]
pub struct LargestFirst;

impl Scorer for LargestFirst {
    fn priority(&self, ctx: &ScoringContext<'_>) -> Priority {
        let len = ctx.sizes.len().max(1) as Priority;
        let below = ctx.sizes.rank(ctx.meta.size) as Priority;
        let class = (below * SIZE_CLASSES / len).min(SIZE_CLASSES - 1);
        banded(SIZE_CLASSES - 1 - class, ctx.meta.last_access_time)
    }

    fn name(&self) -> &str {
        "largest-first"
    }
}

/// Objects at least as old as the given age percentile are evicted first.
#[derive(Debug, Clone, Copy)]
pub struct AgeGated {
    percentile: f64,
}

impl AgeGated {
    pub fn new(percentile: f64) -> Result<Self, EngineError> {
        check_fraction("age_percentile", percentile)?;
        Ok(Self { percentile })
    }
}

impl Scorer for AgeGated {
    fn priority(&self, ctx: &ScoringContext<'_>) -> Priority {
        let old = ctx.meta.age(ctx.now) >= ctx.ages.percentile(self.percentile);
        banded(Priority::from(!old), ctx.meta.last_access_time)
    }

    fn name(&self) -> &str {
        "age-gated"
    }
}

/// A scorer built from a closure.
pub struct FnScorer<F> {
    name: String,
    f: F,
}

impl<F> FnScorer<F>
where
    F: Fn(&ScoringContext<'_>) -> Priority + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> Scorer for FnScorer<F>
where
    F: Fn(&ScoringContext<'_>) -> Priority + Send + Sync,
{
    fn priority(&self, ctx: &ScoringContext<'_>) -> Priority {
        (self.f)(ctx)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl<F> fmt::Debug for FnScorer<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnScorer").field("name", &self.name).finish()
    }
}

fn check_fraction(name: &'static str, value: f64) -> Result<(), EngineError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(EngineError::InvalidPolicyParameter { name, value })
    }
}

/// Named policies selectable from the command line or config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyKind {
    #[serde(alias = "recency")]
    #[value(alias = "recency")]
    Lru,
    Mru,
    #[serde(alias = "insertion-order")]
    #[value(alias = "insertion-order")]
    Fifo,
    #[serde(alias = "frequency")]
    #[value(alias = "frequency")]
    Lfu,
    LfuLru,
    PercentileLfu,
    GhostLru,
    LargestFirst,
    AgeGated,
}

impl PolicyKind {
    pub const ALL: [PolicyKind; 9] = [
        PolicyKind::Lru,
        PolicyKind::Mru,
        PolicyKind::Fifo,
        PolicyKind::Lfu,
        PolicyKind::LfuLru,
        PolicyKind::PercentileLfu,
        PolicyKind::GhostLru,
        PolicyKind::LargestFirst,
        PolicyKind::AgeGated,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            PolicyKind::Lru => "lru",
            PolicyKind::Mru => "mru",
            PolicyKind::Fifo => "fifo",
            PolicyKind::Lfu => "lfu",
            PolicyKind::LfuLru => "lfu-lru",
            PolicyKind::PercentileLfu => "percentile-lfu",
            PolicyKind::GhostLru => "ghost-lru",
            PolicyKind::LargestFirst => "largest-first",
            PolicyKind::AgeGated => "age-gated",
        }
    }

    /// Instantiate the scorer for this policy.
    pub fn build(&self, params: &PolicyConfig) -> Result<Box<dyn Scorer>, EngineError> {
        let scorer: Box<dyn Scorer> = match self {
            PolicyKind::Lru => Box::new(Lru),
            PolicyKind::Mru => Box::new(Mru),
            PolicyKind::Fifo => Box::new(Fifo),
            PolicyKind::Lfu => Box::new(Lfu),
            PolicyKind::LfuLru => Box::new(LfuLru),
            PolicyKind::PercentileLfu => Box::new(PercentileLfu::new(params.count_percentile)?),
            PolicyKind::GhostLru => Box::new(GhostLru::new(params.history_window)),
            PolicyKind::LargestFirst => Box::new(LargestFirst),
            PolicyKind::AgeGated => Box::new(AgeGated::new(params.age_percentile)?),
        };
        Ok(scorer)
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for PolicyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <Self as ValueEnum>::from_str(s, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        counts: RankedSet<u32>,
        timestamps: RankedSet<u64>,
        sizes: RankedSet<u64>,
        history: EvictionHistory,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                counts: RankedSet::new(),
                timestamps: RankedSet::new(),
                sizes: RankedSet::new(),
                history: EvictionHistory::new(1000).unwrap(),
            }
        }

        fn add(&mut self, meta: &ObjectMetadata) {
            self.counts.insert(meta.access_count);
            self.timestamps.insert(meta.insertion_time);
            self.sizes.insert(meta.size);
        }

        fn score(
            &self,
            scorer: &dyn Scorer,
            now: u64,
            id: ObjId,
            meta: &ObjectMetadata,
        ) -> Priority {
            scorer.priority(&ScoringContext {
                now,
                id,
                meta,
                counts: &self.counts,
                ages: AgeView::new(&self.timestamps, now),
                sizes: &self.sizes,
                history: &self.history,
            })
        }
    }

    fn meta(count: u32, last: u64, size: u64, inserted: u64) -> ObjectMetadata {
        ObjectMetadata {
            access_count: count,
            last_access_time: last,
            size,
            insertion_time: inserted,
        }
    }

    #[test]
    fn test_basic_policies() {
        let fx = Fixture::new();
        let m = meta(3, 20, 100, 5);
        assert_eq!(fx.score(&Lru, 30, 1, &m), 20);
        assert_eq!(fx.score(&Mru, 30, 1, &m), -20);
        assert_eq!(fx.score(&Fifo, 30, 1, &m), 5);
        assert_eq!(fx.score(&Lfu, 30, 1, &m), 3);
        assert_eq!(fx.score(&LfuLru, 30, 1, &m), 3 * BAND + 20);
    }

    #[test]
    fn test_lfu_lru_large_counts_keep_order() {
        let fx = Fixture::new();
        let hot = fx.score(&LfuLru, 0, 1, &meta(1 << 20, 5, 1, 0));
        let hotter = fx.score(&LfuLru, 0, 2, &meta((1 << 20) + 1, 1, 1, 0));
        let recent = fx.score(&LfuLru, 0, 3, &meta(1 << 20, 9, 1, 0));
        assert!(hot < recent && recent < hotter);

        let max = fx.score(&LfuLru, 0, 4, &meta(u32::MAX, u64::MAX, 1, 0));
        let below = fx.score(&LfuLru, 0, 5, &meta(u32::MAX, u64::MAX - 1, 1, 0));
        assert!(below < max);
    }

    #[test]
    fn test_percentile_lfu_bands() {
        let mut fx = Fixture::new();
        for count in [1, 1, 5, 5] {
            fx.add(&meta(count, 0, 10, 0));
        }
        let scorer = PercentileLfu::new(0.5).unwrap();
        let cold = fx.score(&scorer, 10, 1, &meta(1, 9, 10, 0));
        let warm = fx.score(&scorer, 10, 2, &meta(5, 1, 10, 0));
        assert!(cold < warm);
        assert_eq!(cold, 9);
        assert_eq!(warm, BAND + 1);
    }

    #[test]
    fn test_ghost_lru_protects_returning_objects() {
        let mut fx = Fixture::new();
        fx.history.insert(7, 50, 2, 10);
        fx.history.insert(8, 50, 1, 10);

        let any = GhostLru::new(None);
        assert_eq!(fx.score(&any, 5, 7, &meta(1, 5, 50, 5)), BAND + 5);
        assert_eq!(fx.score(&any, 5, 9, &meta(1, 5, 50, 5)), 5);

        let windowed = GhostLru::new(Some(50));
        assert_eq!(fx.score(&windowed, 5, 8, &meta(1, 5, 50, 5)), BAND + 5);
        assert_eq!(fx.score(&windowed, 5, 7, &meta(1, 5, 50, 5)), 5);
    }

    #[test]
    fn test_largest_first_orders_by_size_class() {
        let mut fx = Fixture::new();
        for size in [10, 20, 30, 40, 1000] {
            fx.add(&meta(1, 0, size, 0));
        }
        let big = fx.score(&LargestFirst, 5, 1, &meta(1, 4, 1000, 0));
        let small = fx.score(&LargestFirst, 5, 2, &meta(1, 1, 10, 0));
        assert!(big < small);
    }

    #[test]
    fn test_age_gated() {
        let mut fx = Fixture::new();
        for inserted in [0, 10, 20, 30] {
            fx.add(&meta(1, inserted, 1, inserted));
        }
        let scorer = AgeGated::new(0.5).unwrap();
        // Median age at now=40 is 20.
        let old = fx.score(&scorer, 40, 1, &meta(1, 35, 1, 0));
        let young = fx.score(&scorer, 40, 2, &meta(1, 30, 1, 30));
        assert_eq!(old, 35);
        assert_eq!(young, BAND + 30);
    }

    #[test]
    fn test_invalid_parameters_rejected() {
        assert!(PercentileLfu::new(1.5).is_err());
        assert!(AgeGated::new(-0.1).is_err());
        let params = PolicyConfig {
            count_percentile: f64::NAN,
            ..PolicyConfig::default()
        };
        assert!(PolicyKind::PercentileLfu.build(&params).is_err());
    }

    #[test]
    fn test_catalog_names_roundtrip() {
        let params = PolicyConfig::default();
        for kind in PolicyKind::ALL {
            let scorer = kind.build(&params).unwrap();
            assert_eq!(scorer.name(), kind.name());
            assert_eq!(kind.name().parse::<PolicyKind>().unwrap(), kind);
        }
        assert_eq!("recency".parse::<PolicyKind>().unwrap(), PolicyKind::Lru);
        assert_eq!("LRU".parse::<PolicyKind>().unwrap(), PolicyKind::Lru);
        assert_eq!(
            "insertion-order".parse::<PolicyKind>().unwrap(),
            PolicyKind::Fifo
        );
        assert!("belady".parse::<PolicyKind>().is_err());
        let parsed: PolicyKind = serde_json::from_str("\"frequency\"").unwrap();
        assert_eq!(parsed, PolicyKind::Lfu);
    }

    #[test]
    fn test_closure_scorer() {
        let fx = Fixture::new();
        let scorer = FnScorer::new("size-desc", |ctx: &ScoringContext<'_>| {
            -(ctx.meta.size as Priority)
        });
        assert_eq!(scorer.name(), "size-desc");
        assert_eq!(fx.score(&scorer, 1, 1, &meta(1, 1, 64, 1)), -64);
    }
}
