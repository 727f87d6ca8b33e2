//! Time-based coalescing of mutation bursts and the overlay memo.

use chrono::DateTime;
use chrono::TimeDelta;
use chrono::Utc;
use nr_dom::MutationRecord;
use nr_dom::NodeId;
use std::collections::BTreeSet;

/// Collects inserted nodes and releases them once per batch window.
#[derive(Debug, Clone)]
pub struct MutationBatcher {
    window: TimeDelta,
    pending: Vec<NodeId>,
    opened_at: Option<DateTime<Utc>>,
}

impl MutationBatcher {
    pub fn new(window: TimeDelta) -> Self {
        Self {
            window,
            pending: Vec::new(),
            opened_at: None,
        }
    }

    /// Queues inserted nodes. The first record after a flush opens the window.
    pub fn push(&mut self, records: Vec<MutationRecord>, now: DateTime<Utc>) {
        if records.is_empty() {
            return;
        }
        self.opened_at.get_or_insert(now);
        self.pending
            .extend(records.into_iter().flat_map(|record| record.added));
    }

    /// Drains the batch once its window has elapsed.
    pub fn take_due(&mut self, now: DateTime<Utc>) -> Option<Vec<NodeId>> {
        let opened_at = self.opened_at?;
        if now - opened_at < self.window {
            return None;
        }
        self.opened_at = None;
        Some(std::mem::take(&mut self.pending))
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
        self.opened_at = None;
    }
}

/// Remembers which elements were already evaluated as overlays.
#[derive(Debug, Clone)]
pub struct OverlayCache {
    period: TimeDelta,
    checked: BTreeSet<NodeId>,
    cleared_at: DateTime<Utc>,
}

impl OverlayCache {
    pub fn new(period: TimeDelta, now: DateTime<Utc>) -> Self {
        Self {
            period,
            checked: BTreeSet::new(),
            cleared_at: now,
        }
    }

    /// True the first time `node` is seen since the last clear.
    pub fn first_visit(&mut self, node: NodeId, now: DateTime<Utc>) -> bool {
        self.expire(now);
        self.checked.insert(node)
    }

    /// Forgets everything once the clear period has passed.
    pub fn expire(&mut self, now: DateTime<Utc>) {
        if now - self.cleared_at >= self.period {
            self.checked.clear();
            self.cleared_at = now;
        }
    }

    pub fn len(&self) -> usize {
        self.checked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checked.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::MutationBatcher;
    use super::OverlayCache;
    use chrono::DateTime;
    use chrono::TimeDelta;
    use chrono::Utc;
    use nr_dom::MutationRecord;

    fn at(millis: i64) -> DateTime<Utc> {
        DateTime::<Utc>::UNIX_EPOCH + TimeDelta::milliseconds(millis)
    }

    fn record(added: u64) -> MutationRecord {
        MutationRecord {
            target: 1,
            added: vec![added],
        }
    }

    #[test]
    fn burst_is_released_once_after_window() {
        let mut batcher = MutationBatcher::new(TimeDelta::milliseconds(5));
        batcher.push(vec![record(10)], at(0));
        batcher.push(vec![record(11), record(12)], at(3));
        assert_eq!(batcher.take_due(at(4)), None);
        assert_eq!(batcher.take_due(at(5)), Some(vec![10, 11, 12]));
        assert_eq!(batcher.take_due(at(50)), None);
    }

    #[test]
    fn next_burst_opens_a_new_window() {
        let mut batcher = MutationBatcher::new(TimeDelta::milliseconds(5));
        batcher.push(vec![record(1)], at(0));
        assert!(batcher.take_due(at(6)).is_some());
        batcher.push(vec![record(2)], at(20));
        assert_eq!(batcher.take_due(at(22)), None);
        assert_eq!(batcher.take_due(at(25)), Some(vec![2]));
    }

    #[test]
    fn overlay_memo_clears_after_period() {
        let mut cache = OverlayCache::new(TimeDelta::seconds(30), at(0));
        assert!(cache.first_visit(7, at(0)));
        assert!(!cache.first_visit(7, at(10_000)));
        assert!(cache.first_visit(7, at(30_000)));
        assert_eq!(cache.len(), 1);
    }
}
