//! The "HISTORY" Ledger - Bounded Per-Track Motion History
//!
//! Each track id owns a FIFO of its most recent fused states. Once a track's
//! sequence grows past the cap, the oldest entry is evicted.
//!
//! Reads never mutate: [`HistoryLedger::trajectory`] returns a borrowed view
//! that can be iterated any number of times and yields the same entries until
//! the next [`append`](HistoryLedger::append).

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use std::collections::vec_deque;
use std::collections::{BTreeMap, VecDeque};

/// Default number of entries retained per track.
pub const DEFAULT_HISTORY_CAP: usize = 30;

/// One recorded state of a track at one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Step index this entry was recorded at
    pub step: u64,

    /// Bounding-box center in pixels
    pub pixel_center: Vector2<f64>,

    /// Ground-truth speed (0 when the track was unmatched)
    pub speed: f64,

    /// Ground-truth heading in degrees (0 when unmatched)
    pub heading_deg: f64,

    /// Ground-truth world position, known only for matched steps
    pub world_position: Option<Vector2<f64>>,
}

/// Bounded per-track time series, keyed by tracker id.
#[derive(Debug, Clone)]
pub struct HistoryLedger {
    cap: usize,
    tracks: BTreeMap<u64, VecDeque<HistoryEntry>>,
}

impl HistoryLedger {
    /// Create a ledger keeping at most `cap` entries per track (minimum 1).
    pub fn new(cap: usize) -> Self {
        Self {
            cap: cap.max(1),
            tracks: BTreeMap::new(),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_HISTORY_CAP)
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Push an entry and evict the oldest ones beyond the cap.
    pub fn append(&mut self, track_id: u64, entry: HistoryEntry) {
        let cap = self.cap;
        let history = self
            .tracks
            .entry(track_id)
            .or_insert_with(|| VecDeque::with_capacity(cap));
        history.push_back(entry);
        while history.len() > cap {
            history.pop_front();
        }
    }

    /// The last `n` entries of a track, oldest first.
    ///
    /// Fewer are returned when the track has a shorter history, none for an
    /// unknown track.
    pub fn trajectory(&self, track_id: u64, n: usize) -> Trajectory<'_> {
        match self.tracks.get(&track_id) {
            Some(history) => Trajectory {
                entries: Some(history),
                start: history.len().saturating_sub(n),
            },
            None => Trajectory { entries: None, start: 0 },
        }
    }

    /// Most recent entry of a track.
    pub fn latest(&self, track_id: u64) -> Option<&HistoryEntry> {
        self.tracks.get(&track_id)?.back()
    }

    /// Number of entries recorded for a track.
    pub fn len(&self, track_id: u64) -> usize {
        self.tracks.get(&track_id).map_or(0, VecDeque::len)
    }

    pub fn contains(&self, track_id: u64) -> bool {
        self.tracks.contains_key(&track_id)
    }

    /// All track ids with recorded history, ascending.
    pub fn track_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.tracks.keys().copied()
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Forget tracks whose newest entry is more than `max_age` steps old.
    ///
    /// Returns the removed ids.
    pub fn retire_stale(&mut self, current_step: u64, max_age: u64) -> Vec<u64> {
        let stale: Vec<u64> = self
            .tracks
            .iter()
            .filter_map(|(id, history)| {
                let last = history.back()?.step;
                if current_step.saturating_sub(last) > max_age {
                    Some(*id)
                } else {
                    None
                }
            })
            .collect();

        for id in &stale {
            self.tracks.remove(id);
        }
        stale
    }

    pub fn clear(&mut self) {
        self.tracks.clear();
    }
}

impl Default for HistoryLedger {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// A borrowed, restartable view over the tail of one track's history.
#[derive(Debug, Clone, Copy)]
pub struct Trajectory<'a> {
    entries: Option<&'a VecDeque<HistoryEntry>>,
    start: usize,
}

impl<'a> Trajectory<'a> {
    /// A fresh iterator from the oldest entry of the view.
    pub fn iter(&self) -> TrajectoryIter<'a> {
        TrajectoryIter {
            inner: self.entries.map(|e| e.range(self.start..)),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.map_or(0, |e| e.len() - self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_vec(&self) -> Vec<HistoryEntry> {
        self.iter().cloned().collect()
    }
}

impl<'a> IntoIterator for Trajectory<'a> {
    type Item = &'a HistoryEntry;
    type IntoIter = TrajectoryIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a> IntoIterator for &Trajectory<'a> {
    type Item = &'a HistoryEntry;
    type IntoIter = TrajectoryIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator produced by [`Trajectory::iter`].
#[derive(Debug, Clone)]
pub struct TrajectoryIter<'a> {
    inner: Option<vec_deque::Iter<'a, HistoryEntry>>,
}

impl<'a> Iterator for TrajectoryIter<'a> {
    type Item = &'a HistoryEntry;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.as_mut()?.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.as_ref().map_or((0, Some(0)), |i| i.size_hint())
    }
}

impl ExactSizeIterator for TrajectoryIter<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn entry(step: u64, speed: f64) -> HistoryEntry {
        HistoryEntry {
            step,
            pixel_center: Vector2::new(step as f64, 0.0),
            speed,
            heading_deg: 0.0,
            world_position: Some(Vector2::new(step as f64, 0.0)),
        }
    }

    #[test]
    fn test_append_and_latest() {
        let mut ledger = HistoryLedger::with_defaults();
        assert!(ledger.latest(1).is_none());

        ledger.append(1, entry(0, 1.0));
        ledger.append(1, entry(1, 2.0));

        assert_eq!(ledger.len(1), 2);
        assert_eq!(ledger.latest(1).unwrap().speed, 2.0);
        assert_eq!(ledger.len(2), 0);
    }

    #[test]
    fn test_cap_evicts_oldest_first() {
        let mut ledger = HistoryLedger::new(3);
        for step in 0..5 {
            ledger.append(7, entry(step, 0.0));
        }
        let steps: Vec<u64> = ledger.trajectory(7, 10).iter().map(|e| e.step).collect();
        assert_eq!(steps, vec![2, 3, 4]);
    }

    #[test]
    fn test_trajectory_tail_and_short_history() {
        let mut ledger = HistoryLedger::with_defaults();
        for step in 0..10 {
            ledger.append(1, entry(step, 0.0));
        }
        let tail: Vec<u64> = ledger.trajectory(1, 3).iter().map(|e| e.step).collect();
        assert_eq!(tail, vec![7, 8, 9]);

        assert_eq!(ledger.trajectory(1, 50).len(), 10);
        assert!(ledger.trajectory(99, 5).is_empty());
        assert_eq!(ledger.trajectory(99, 5).iter().count(), 0);
    }

    #[test]
    fn test_trajectory_is_idempotent_and_restartable() {
        let mut ledger = HistoryLedger::with_defaults();
        for step in 0..6 {
            ledger.append(3, entry(step, step as f64));
        }

        let first = ledger.trajectory(3, 4).to_vec();
        let second = ledger.trajectory(3, 4).to_vec();
        assert_eq!(first, second);

        // The same view iterated twice yields the same sequence
        let view = ledger.trajectory(3, 4);
        let a: Vec<_> = view.iter().collect();
        let b: Vec<_> = (&view).into_iter().collect();
        assert_eq!(a, b);
        assert_eq!(view.iter().len(), 4);
    }

    #[test]
    fn test_retire_stale() {
        let mut ledger = HistoryLedger::with_defaults();
        ledger.append(1, entry(0, 0.0));
        ledger.append(2, entry(8, 0.0));

        let removed = ledger.retire_stale(10, 5);
        assert_eq!(removed, vec![1]);
        assert!(!ledger.contains(1));
        assert!(ledger.contains(2));
    }

    #[test]
    fn test_track_ids_sorted() {
        let mut ledger = HistoryLedger::with_defaults();
        for id in [5, 1, 3] {
            ledger.append(id, entry(0, 0.0));
        }
        assert_eq!(ledger.track_ids().collect::<Vec<_>>(), vec![1, 3, 5]);

        ledger.clear();
        assert!(ledger.is_empty());
    }

    proptest! {
        #[test]
        fn prop_cap_never_exceeded(ops in prop::collection::vec((0u64..5, 0u64..1000), 0..300)) {
            let mut ledger = HistoryLedger::with_defaults();
            for (id, step) in ops {
                ledger.append(id, entry(step, 0.0));
                prop_assert!(ledger.len(id) <= DEFAULT_HISTORY_CAP);
            }
            for id in ledger.track_ids() {
                prop_assert!(ledger.len(id) <= DEFAULT_HISTORY_CAP);
            }
        }
    }
}
