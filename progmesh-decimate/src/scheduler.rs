//! Priority scheduling of removal candidates
//!
//! A min-priority queue over point ids with two fallback tiers: a recycle bin
//! for points whose removal attempt failed, and a deferred set of complex
//! points that wait for the split phase. Both tiers drain in id order.

use crate::topology::PointId;
use priority_queue::PriorityQueue;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use tracing::debug;

/// Scheduling key of a point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Key {
    /// Removal candidate with the given error. Among equal errors lower
    /// ranks pop first.
    Cost { cost: f64, rank: u8 },
    /// Complex point that can only be handled once splitting starts.
    Deferred,
    /// Not a candidate in the current configuration.
    Retained,
}

/// Computes fresh keys for points; implemented by the decimation engine.
pub trait Rekey {
    /// Classify `point` and compute its key.
    fn rekey(&mut self, point: PointId) -> Key;

    /// Switch to the split phase: feature detection relaxes to the split
    /// angle and complex points become split candidates.
    fn relax_features(&mut self);
}

#[derive(Debug, Clone, Copy)]
struct Priority {
    cost: f64,
    rank: u8,
    point: PointId,
}

impl PartialEq for Priority {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for Priority {}

impl PartialOrd for Priority {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Priority {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap on (cost, rank, id)
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.rank.cmp(&self.rank))
            .then_with(|| other.point.cmp(&self.point))
    }
}

/// Three-tier candidate queue.
pub struct Scheduler {
    queue: PriorityQueue<PointId, Priority>,
    recycled: BTreeSet<PointId>,
    deferred: BTreeSet<PointId>,
    recycle_drained: bool,
    flushed: bool,
    deferring: bool,
}

impl Scheduler {
    /// Create an empty scheduler. `deferring` enables the deferred-split tier.
    pub fn new(deferring: bool) -> Self {
        Self {
            queue: PriorityQueue::new(),
            recycled: BTreeSet::new(),
            deferred: BTreeSet::new(),
            recycle_drained: false,
            flushed: false,
            deferring,
        }
    }

    /// Number of points in the primary queue.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Whether the deferred-split flush has fired.
    pub fn flushed(&self) -> bool {
        self.flushed
    }

    /// Insert a point with a precomputed key, replacing any previous entry.
    pub fn insert_key(&mut self, point: PointId, key: Key) {
        match key {
            Key::Cost { cost, rank } => {
                self.deferred.remove(&point);
                self.queue.push(point, Priority { cost, rank, point });
            }
            Key::Deferred if self.deferring => {
                self.queue.remove(&point);
                self.deferred.insert(point);
            }
            Key::Deferred | Key::Retained => {
                self.queue.remove(&point);
            }
        }
    }

    /// Insert a point, computing its key through `rekey`.
    pub fn insert<R: Rekey + ?Sized>(&mut self, point: PointId, rekey: &mut R) {
        let key = rekey.rekey(point);
        self.insert_key(point, key);
    }

    /// Pop the cheapest candidate, falling back to the recycle bin and then
    /// to the deferred-split flush when the primary queue runs dry.
    pub fn pop<R: Rekey + ?Sized>(&mut self, rekey: &mut R) -> Option<(PointId, f64)> {
        loop {
            if let Some((point, priority)) = self.queue.pop() {
                return Some((point, priority.cost));
            }

            if !self.recycle_drained && !self.recycled.is_empty() {
                self.recycle_drained = true;
                let points = std::mem::take(&mut self.recycled);
                debug!(points = points.len(), "Draining recycle bin");
                for point in points {
                    self.insert(point, rekey);
                }
                continue;
            }

            if self.deferring && !self.flushed {
                self.flushed = true;
                rekey.relax_features();
                let mut points = std::mem::take(&mut self.deferred);
                points.append(&mut self.recycled);
                debug!(points = points.len(), "Flushing deferred points for splitting");
                for point in points {
                    self.insert(point, rekey);
                }
                continue;
            }

            return None;
        }
    }

    /// Remove a point from every tier.
    pub fn delete(&mut self, point: PointId) {
        self.queue.remove(&point);
        self.recycled.remove(&point);
        self.deferred.remove(&point);
    }

    /// Park a point whose removal attempt failed.
    pub fn recycle(&mut self, point: PointId) {
        self.queue.remove(&point);
        self.recycled.insert(point);
    }

    /// Record a successful operation; the recycle bin may be drained again.
    pub fn mark_progress(&mut self) {
        self.recycle_drained = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Key table standing in for the engine.
    #[derive(Default)]
    struct Table {
        keys: HashMap<PointId, Key>,
        split_keys: HashMap<PointId, Key>,
        relaxed: bool,
    }

    fn cost(cost: f64) -> Key {
        Key::Cost { cost, rank: 0 }
    }

    impl Rekey for Table {
        fn rekey(&mut self, point: PointId) -> Key {
            if self.relaxed {
                if let Some(&key) = self.split_keys.get(&point) {
                    return key;
                }
            }
            self.keys.get(&point).copied().unwrap_or(Key::Retained)
        }

        fn relax_features(&mut self) {
            self.relaxed = true;
        }
    }

    #[test]
    fn test_pops_in_cost_order() {
        let mut table = Table::default();
        let mut scheduler = Scheduler::new(false);
        for (point, c) in [(0, 3.0), (1, 1.0), (2, 2.0)] {
            scheduler.insert_key(point, cost(c));
        }
        let order: Vec<_> = std::iter::from_fn(|| scheduler.pop(&mut table))
            .map(|(p, _)| p)
            .collect();
        assert_eq!(order, vec![1, 2, 0]);
    }

    #[test]
    fn test_rank_breaks_cost_ties() {
        let mut table = Table::default();
        let mut scheduler = Scheduler::new(false);
        scheduler.insert_key(0, Key::Cost { cost: 1.0, rank: 2 });
        scheduler.insert_key(1, Key::Cost { cost: 1.0, rank: 0 });
        scheduler.insert_key(2, Key::Cost { cost: 0.5, rank: 3 });
        scheduler.insert_key(3, Key::Cost { cost: 1.0, rank: 0 });
        let order: Vec<_> = std::iter::from_fn(|| scheduler.pop(&mut table))
            .map(|(p, _)| p)
            .collect();
        assert_eq!(order, vec![2, 1, 3, 0]);
    }

    #[test]
    fn test_recycled_point_pops_once() {
        let mut table = Table::default();
        table.keys.insert(4, cost(1.0));
        table.keys.insert(9, cost(1.0));
        let mut scheduler = Scheduler::new(false);
        for point in [9, 4, 9, 4] {
            scheduler.recycle(point);
        }
        let order: Vec<_> = std::iter::from_fn(|| scheduler.pop(&mut table))
            .map(|(p, _)| p)
            .collect();
        assert_eq!(order, vec![4, 9]);
    }

    #[test]
    fn test_reinsert_updates_key() {
        let mut table = Table::default();
        let mut scheduler = Scheduler::new(false);
        scheduler.insert_key(0, cost(1.0));
        scheduler.insert_key(1, cost(2.0));
        scheduler.insert_key(0, cost(5.0));
        assert_eq!(scheduler.len(), 2);
        assert_eq!(scheduler.pop(&mut table), Some((1, 2.0)));
        scheduler.insert_key(0, Key::Retained);
        assert_eq!(scheduler.pop(&mut table), None);
    }

    #[test]
    fn test_delete() {
        let mut table = Table::default();
        let mut scheduler = Scheduler::new(false);
        scheduler.insert_key(0, cost(1.0));
        scheduler.recycle(1);
        scheduler.delete(0);
        scheduler.delete(1);
        assert_eq!(scheduler.pop(&mut table), None);
    }

    #[test]
    fn test_recycle_drains_once_until_progress() {
        let mut table = Table::default();
        table.keys.insert(7, cost(0.5));
        let mut scheduler = Scheduler::new(false);

        scheduler.recycle(7);
        assert_eq!(scheduler.pop(&mut table), Some((7, 0.5)));
        // failed again: stays parked until something succeeds
        scheduler.recycle(7);
        assert_eq!(scheduler.pop(&mut table), None);

        scheduler.mark_progress();
        assert_eq!(scheduler.pop(&mut table), Some((7, 0.5)));
    }

    #[test]
    fn test_deferred_flush_fires_once() {
        let mut table = Table::default();
        table.split_keys.insert(3, cost(0.0));
        let mut scheduler = Scheduler::new(true);

        scheduler.insert_key(3, Key::Deferred);
        assert!(scheduler.is_empty());
        assert_eq!(scheduler.pop(&mut table), Some((3, 0.0)));
        assert!(table.relaxed);
        assert!(scheduler.flushed());

        scheduler.insert_key(3, Key::Deferred);
        assert_eq!(scheduler.pop(&mut table), None);
    }

    #[test]
    fn test_deferred_ignored_without_splitting() {
        let mut table = Table::default();
        table.split_keys.insert(3, cost(0.0));
        let mut scheduler = Scheduler::new(false);
        scheduler.insert_key(3, Key::Deferred);
        assert_eq!(scheduler.pop(&mut table), None);
        assert!(!table.relaxed);
    }
}
