//! Lifecycle orchestration for the priority eviction engine.
//!
//! The engine is the single owner of per-object metadata. Every transition
//! updates the metadata map, the three global feature sets and the priority
//! index in one step, so that percentile queries made by the scorer always
//! describe exactly the objects currently cached.
//!
//! Eviction is two-phase: the substrate calls [`EvictionPolicyEngine::pop_min`]
//! to pick (and unindex) a victim, removes it from storage, then reports it
//! with [`EvictionPolicyEngine::on_evict`].

use std::collections::HashMap;

use tracing::{trace, warn};

use crate::engine::{
    AgeView, EngineError, EvictionHistory, ObjId, ObjectMetadata, ObjectRef, Priority,
    PriorityIndex, RankedSet, Scorer, ScoringContext,
};

/// Metadata plus the reference the object was inserted under.
#[derive(Debug, Clone, Copy)]
struct Tracked {
    reference: ObjectRef,
    meta: ObjectMetadata,
}

pub struct EvictionPolicyEngine {
    objects: HashMap<ObjId, Tracked>,
    counts: RankedSet<u32>,
    timestamps: RankedSet<u64>,
    sizes: RankedSet<u64>,
    history: EvictionHistory,
    index: PriorityIndex<ObjectRef>,
    scorer: Box<dyn Scorer>,
}

impl EvictionPolicyEngine {
    /// Create an engine whose ghost history keeps at most `history_budget` bytes.
    pub fn new(scorer: Box<dyn Scorer>, history_budget: u64) -> Result<Self, EngineError> {
        Ok(Self {
            objects: HashMap::new(),
            counts: RankedSet::new(),
            timestamps: RankedSet::new(),
            sizes: RankedSet::new(),
            history: EvictionHistory::new(history_budget)?,
            index: PriorityIndex::new(),
            scorer,
        })
    }

    /// A new object entered the cache at `now`.
    pub fn on_insert(&mut self, now: u64, obj: ObjectRef, size: u64) {
        if self.objects.contains_key(&obj.id) {
            warn!(obj_id = obj.id, "Insert for an object that is already tracked, ignoring");
            return;
        }

        let meta = ObjectMetadata::new(now, size);
        self.counts.insert(meta.access_count);
        self.timestamps.insert(meta.insertion_time);
        self.sizes.insert(meta.size);
        self.objects.insert(
            obj.id,
            Tracked {
                reference: obj,
                meta,
            },
        );

        let priority = self.score(now, obj.id, &meta);
        self.index.upsert(obj, priority);
        trace!(obj_id = obj.id, size, %priority, "Inserted");
    }

    /// A cached object was hit at `now`.
    pub fn on_access(&mut self, now: u64, obj: ObjectRef) {
        let Some(tracked) = self.lookup_mut(obj, "access") else {
            return;
        };
        let prev_count = tracked.meta.access_count;
        tracked.meta.touch(now);
        let meta = tracked.meta;

        self.counts.remove(prev_count);
        self.counts.insert(meta.access_count);

        let priority = self.score(now, obj.id, &meta);
        self.index.upsert(obj, priority);
        trace!(obj_id = obj.id, count = meta.access_count, %priority, "Accessed");
    }

    /// `obj` was removed from the cache; move its metadata into the history.
    ///
    /// The caller is expected to have taken the object out of the priority
    /// index with [`pop_min`](Self::pop_min) already.
    pub fn on_evict(&mut self, now: u64, obj: ObjectRef) {
        if self.lookup_mut(obj, "evict").is_none() {
            return;
        }
        let Some(Tracked { meta, .. }) = self.objects.remove(&obj.id) else {
            return;
        };

        if self.index.remove(obj).is_some() {
            warn!(
                obj_id = obj.id,
                "Evicted object was still indexed; dropping its priority entry"
            );
        }

        self.history
            .insert(obj.id, meta.size, meta.access_count, meta.age(now));
        self.counts.remove(meta.access_count);
        self.timestamps.remove(meta.insertion_time);
        self.sizes.remove(meta.size);
        trace!(obj_id = obj.id, count = meta.access_count, "Evicted");
    }

    /// Take the lowest-priority object out of the index.
    ///
    /// This is the first phase of an eviction; the object's metadata stays
    /// until [`on_evict`](Self::on_evict) is called for it.
    pub fn pop_min(&mut self) -> Option<ObjectRef> {
        self.index.pop_min().map(|(reference, _)| reference)
    }

    /// The object `pop_min` would return.
    pub fn peek_min(&self) -> Option<ObjectRef> {
        self.index.peek_min().map(|(reference, _)| reference)
    }

    pub fn metadata(&self, id: ObjId) -> Option<&ObjectMetadata> {
        self.objects.get(&id).map(|tracked| &tracked.meta)
    }

    pub fn priority_of(&self, obj: ObjectRef) -> Option<Priority> {
        self.index.priority_of(obj)
    }

    pub fn counts(&self) -> &RankedSet<u32> {
        &self.counts
    }

    pub fn timestamps(&self) -> &RankedSet<u64> {
        &self.timestamps
    }

    pub fn sizes(&self) -> &RankedSet<u64> {
        &self.sizes
    }

    pub fn ages(&self, now: u64) -> AgeView<'_> {
        AgeView::new(&self.timestamps, now)
    }

    pub fn history(&self) -> &EvictionHistory {
        &self.history
    }

    /// Number of entries in the priority index.
    pub fn indexed(&self) -> usize {
        self.index.len()
    }

    /// Number of objects with live metadata.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn scorer_name(&self) -> &str {
        self.scorer.name()
    }

    /// Forget every object and the whole eviction history.
    pub fn clear(&mut self) {
        self.objects.clear();
        self.counts.clear();
        self.timestamps.clear();
        self.sizes.clear();
        self.history.clear();
        self.index.clear();
    }

    fn lookup_mut(&mut self, obj: ObjectRef, op: &'static str) -> Option<&mut Tracked> {
        match self.objects.get_mut(&obj.id) {
            Some(tracked) if tracked.reference == obj => Some(tracked),
            Some(tracked) => {
                warn!(
                    obj_id = obj.id,
                    op,
                    expected_handle = tracked.reference.handle,
                    handle = obj.handle,
                    "Stale object handle, ignoring"
                );
                None
            }
            None => {
                warn!(obj_id = obj.id, op, "Object not found in metadata map, ignoring");
                None
            }
        }
    }

    fn score(&self, now: u64, id: ObjId, meta: &ObjectMetadata) -> Priority {
        self.scorer.priority(&ScoringContext {
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

impl std::fmt::Debug for EvictionPolicyEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvictionPolicyEngine")
            .field("scorer", &self.scorer.name())
            .field("objects", &self.objects.len())
            .field("indexed", &self.index.len())
            .field("history_bytes", &self.history.total_size())
            .finish()
    }
}
