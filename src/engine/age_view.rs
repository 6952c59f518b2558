//! Age percentiles derived from insertion timestamps.

use crate::engine::ranked_set::RankedSet;

/// Read-only view turning insertion-time percentiles into age percentiles.
///
/// Borrowing the timestamp set means the view cannot outlive it, and no
/// second set indexed by age has to be rebuilt as the clock advances.
#[derive(Debug, Clone, Copy)]
pub struct AgeView<'a> {
    timestamps: &'a RankedSet<u64>,
    now: u64,
}

impl<'a> AgeView<'a> {
    pub fn new(timestamps: &'a RankedSet<u64>, now: u64) -> Self {
        Self { timestamps, now }
    }

    /// The `p`-th percentile of object age: `now - timestamp_at(1 - p)`.
    ///
    /// An empty timestamp set yields `now`, since the sentinel timestamp is
    /// zero; callers should check [`AgeView::is_empty`] first.
    pub fn percentile(&self, p: f64) -> u64 {
        let p = (1.0 - p).clamp(0.0, 1.0);
        self.now.saturating_sub(self.timestamps.percentile(p))
    }

    /// Reference time the ages are measured against.
    pub fn now(&self) -> u64 {
        self.now
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_age_percentiles_invert_timestamps() {
        let mut timestamps = RankedSet::new();
        for t in [10, 20, 30, 40] {
            timestamps.insert(t);
        }
        let ages = AgeView::new(&timestamps, 50);

        // Youngest object was inserted at t=40.
        assert_eq!(ages.percentile(0.0), 10);
        // p=1 maps to timestamp percentile 0, the oldest insert.
        assert_eq!(ages.percentile(1.0), 40);
        assert_eq!(ages.percentile(0.5), 20);
        assert_eq!(ages.percentile(2.0), 40);
        assert_eq!(ages.percentile(-1.0), 10);
    }

    #[test]
    fn test_empty_view() {
        let timestamps = RankedSet::new();
        let ages = AgeView::new(&timestamps, 7);
        assert!(ages.is_empty());
        assert_eq!(ages.percentile(0.5), 7);
    }
}
