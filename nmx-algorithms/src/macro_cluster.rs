//! Spatio-temporal bag of eventlets belonging to one readout plane.

use nmx_core::Eventlet;
use std::collections::BTreeSet;

/// Returns true if `[a_start, a_end]` and `[b_start, b_end]` come within
/// `slack` of each other.
#[inline]
#[must_use]
pub fn windows_overlap(a: (u64, u64), b: (u64, u64), slack: u64) -> bool {
    a.0 <= b.1.saturating_add(slack) && b.0 <= a.1.saturating_add(slack)
}

/// A growable cluster of adjacent eventlets.
///
/// Bounds are only meaningful once the cluster holds at least one eventlet;
/// an empty cluster is adjacent to nothing.
#[derive(Debug, Clone)]
pub struct MacroCluster {
    contents: Vec<Eventlet>,
    time_start: u64,
    time_end: u64,
    strips_seen: BTreeSet<u16>,
    planes: BTreeSet<u8>,
    time_slack: u64,
    strip_slack: u16,
    correlation_slack: u64,
}

impl MacroCluster {
    /// Creates an empty cluster. The correlation slack defaults to
    /// `time_slack`.
    #[must_use]
    pub fn new(time_slack: u64, strip_slack: u16) -> Self {
        Self {
            contents: Vec::new(),
            time_start: 0,
            time_end: 0,
            strips_seen: BTreeSet::new(),
            planes: BTreeSet::new(),
            time_slack,
            strip_slack,
            correlation_slack: time_slack,
        }
    }

    /// Sets the slack used for cross-plane [`time_overlap`](Self::time_overlap).
    #[must_use]
    pub fn with_correlation_slack(mut self, slack: u64) -> Self {
        self.correlation_slack = slack;
        self
    }

    /// Adds an eventlet and widens the bounds.
    pub fn insert(&mut self, eventlet: Eventlet) {
        if self.contents.is_empty() {
            self.time_start = eventlet.time;
            self.time_end = eventlet.time;
        } else {
            self.time_start = self.time_start.min(eventlet.time);
            self.time_end = self.time_end.max(eventlet.time);
        }
        self.strips_seen.insert(eventlet.strip);
        self.planes.insert(eventlet.plane);
        self.contents.push(eventlet);
    }

    /// True iff `time` lies in `[time_start - slack, time_end + slack]`.
    #[must_use]
    pub fn time_adjacent(&self, time: u64) -> bool {
        !self.contents.is_empty()
            && self.time_start.saturating_sub(self.time_slack) <= time
            && time <= self.time_end.saturating_add(self.time_slack)
    }

    /// True iff some strip already seen lies within the strip slack of `strip`.
    #[must_use]
    pub fn strip_adjacent(&self, strip: u16) -> bool {
        let lo = strip.saturating_sub(self.strip_slack);
        let hi = strip.saturating_add(self.strip_slack);
        self.strips_seen.range(lo..=hi).next().is_some()
    }

    /// True iff the time windows come within the correlation slack.
    #[must_use]
    pub fn time_overlap(&self, other: &MacroCluster) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && windows_overlap(self.bounds(), other.bounds(), self.correlation_slack)
    }

    /// Takes ownership of `other` and absorbs it.
    pub fn merge(&mut self, mut other: MacroCluster) {
        self.absorb(&mut other);
    }

    /// Moves every eventlet of `other` into this cluster, leaving `other`
    /// empty but with its allocations intact.
    pub fn absorb(&mut self, other: &mut MacroCluster) {
        if other.is_empty() {
            return;
        }
        if self.is_empty() {
            self.time_start = other.time_start;
            self.time_end = other.time_end;
        } else {
            self.time_start = self.time_start.min(other.time_start);
            self.time_end = self.time_end.max(other.time_end);
        }
        self.contents.append(&mut other.contents);
        self.strips_seen.append(&mut other.strips_seen);
        self.planes.append(&mut other.planes);
        other.reset();
    }

    /// Empties the cluster, keeping its slack settings.
    pub fn reset(&mut self) {
        self.contents.clear();
        self.strips_seen.clear();
        self.planes.clear();
        self.time_start = 0;
        self.time_end = 0;
    }

    /// Moves all eventlets out, leaving the cluster empty.
    pub fn drain(&mut self) -> std::vec::Drain<'_, Eventlet> {
        self.strips_seen.clear();
        self.planes.clear();
        self.contents.drain(..)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.contents.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.contents.len()
    }

    #[must_use]
    pub fn contents(&self) -> &[Eventlet] {
        &self.contents
    }

    #[must_use]
    pub fn time_start(&self) -> u64 {
        self.time_start
    }

    #[must_use]
    pub fn time_end(&self) -> u64 {
        self.time_end
    }

    /// `(time_start, time_end)`.
    #[must_use]
    pub fn bounds(&self) -> (u64, u64) {
        (self.time_start, self.time_end)
    }

    #[must_use]
    pub fn strips(&self) -> &BTreeSet<u16> {
        &self.strips_seen
    }

    #[must_use]
    pub fn planes(&self) -> &BTreeSet<u8> {
        &self.planes
    }
}

impl std::fmt::Display for MacroCluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match (self.planes.contains(&0), self.planes.contains(&1)) {
            (true, true) => "XY",
            (true, false) => "X",
            (false, true) => "Y",
            (false, false) => "-",
        };
        let (s0, s1) = match (self.strips_seen.first(), self.strips_seen.last()) {
            (Some(a), Some(b)) => (*a, *b),
            _ => (0, 0),
        };
        write!(
            f,
            "{tag} t[{},{}] s[{s0},{s1}] evts={}",
            self.time_start,
            self.time_end,
            self.contents.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(time: u64, strip: u16) -> Eventlet {
        Eventlet::new(time, 0, strip, 10)
    }

    #[test]
    fn test_bounds_follow_inserts() {
        let mut c = MacroCluster::new(5, 2);
        assert!(c.is_empty());
        c.insert(hit(10, 3));
        c.insert(hit(7, 4));
        assert_eq!(c.bounds(), (7, 10));
        assert_eq!(c.len(), 2);
        assert!(c.strips().contains(&3));
        assert_eq!(c.planes().len(), 1);
    }

    #[test]
    fn test_time_adjacent_window() {
        let mut c = MacroCluster::new(5, 2);
        assert!(!c.time_adjacent(0));
        c.insert(hit(10, 3));
        c.insert(hit(12, 3));
        assert!(c.time_adjacent(5));
        assert!(c.time_adjacent(17));
        assert!(!c.time_adjacent(4));
        assert!(!c.time_adjacent(18));
    }

    #[test]
    fn test_time_adjacent_saturates_near_zero() {
        let mut c = MacroCluster::new(5, 2);
        c.insert(hit(1, 3));
        assert!(c.time_adjacent(0));
    }

    #[test]
    fn test_strip_adjacent_uses_seen_strips() {
        let mut c = MacroCluster::new(5, 2);
        c.insert(hit(0, 10));
        c.insert(hit(0, 20));
        assert!(c.strip_adjacent(12));
        assert!(c.strip_adjacent(18));
        // Inside the [10, 20] span but more than 2 away from any seen strip.
        assert!(!c.strip_adjacent(15));
        assert!(!c.strip_adjacent(23));
    }

    #[test]
    fn test_time_overlap_uses_correlation_slack() {
        let mut a = MacroCluster::new(5, 2).with_correlation_slack(50);
        a.insert(hit(0, 5));
        a.insert(hit(1, 6));
        let mut b = MacroCluster::new(5, 2);
        b.insert(Eventlet::new(40, 1, 5, 9));
        assert!(a.time_overlap(&b));

        let tight = a.clone().with_correlation_slack(5);
        assert!(!tight.time_overlap(&b));
    }

    #[test]
    fn test_merge_transfers_contents() {
        let mut a = MacroCluster::new(5, 2);
        a.insert(hit(10, 1));
        let mut b = MacroCluster::new(5, 2);
        b.insert(Eventlet::new(3, 1, 9, 4));
        a.merge(b);
        assert_eq!(a.len(), 2);
        assert_eq!(a.bounds(), (3, 10));
        assert_eq!(a.planes().len(), 2);
        assert!(a.strip_adjacent(9));
    }

    #[test]
    fn test_absorb_leaves_donor_empty() {
        let mut a = MacroCluster::new(5, 2);
        let mut b = MacroCluster::new(5, 2);
        b.insert(hit(4, 4));
        a.absorb(&mut b);
        assert!(b.is_empty());
        assert!(b.strips().is_empty());
        assert_eq!(a.bounds(), (4, 4));
    }
}
