//! Streaming eventlet clusterer.
//!
//! Eventlets are fed in chronological order. Each plane keeps a list of
//! *open* clusters ordered by start time; a hit joins every open cluster it
//! is adjacent to (coalescing them when it bridges several) or starts a new
//! one. Starting a new cluster retires every open cluster the hit is no
//! longer time-adjacent to. Retired clusters from both planes are then
//! correlated: the earliest one seeds a supercluster that absorbs every
//! retired cluster overlapping it under the correlation slack, and the
//! supercluster is emitted as a [`SimpleEvent`] once nothing can extend it.

use crate::event::SimpleEvent;
use crate::macro_cluster::{windows_overlap, MacroCluster};
use crate::pool::{ClusterId, ClusterPool};
use nmx_core::Eventlet;
use std::collections::VecDeque;

/// Clusterer configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClustererConfig {
    /// Maximum time gap between hits of one plane cluster.
    pub time_slack: u64,
    /// Maximum strip gap between hits of one plane cluster.
    pub strip_slack: u16,
    /// Maximum time gap between clusters correlated into one event.
    pub correlation_slack: u64,
    /// Initial cluster arena size.
    pub pool_capacity: usize,
}

impl Default for ClustererConfig {
    fn default() -> Self {
        Self {
            time_slack: 28,
            strip_slack: 18,
            correlation_slack: 3,
            pool_capacity: 64,
        }
    }
}

impl ClustererConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_time_slack(mut self, slack: u64) -> Self {
        self.time_slack = slack;
        self
    }

    #[must_use]
    pub fn with_strip_slack(mut self, slack: u16) -> Self {
        self.strip_slack = slack;
        self
    }

    #[must_use]
    pub fn with_correlation_slack(mut self, slack: u64) -> Self {
        self.correlation_slack = slack;
        self
    }

    #[must_use]
    pub fn with_pool_capacity(mut self, capacity: usize) -> Self {
        self.pool_capacity = capacity;
        self
    }
}

/// Counters accumulated since construction or the last [`Clusterer::clear`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClusteringStatistics {
    pub eventlets_seen: usize,
    /// Zero-amplitude eventlets dropped on insert.
    pub eventlets_rejected: usize,
    pub clusters_started: usize,
    /// Open clusters coalesced by a bridging hit.
    pub clusters_merged: usize,
    pub clusters_retired: usize,
    pub events_emitted: usize,
}

/// Streaming two-plane clusterer.
///
/// Single-threaded; the clusterer never fails. A plane that never retires
/// clusters lets the backlog grow until [`dump`](Self::dump).
#[derive(Debug, Clone)]
pub struct Clusterer {
    config: ClustererConfig,
    pool: ClusterPool,
    open: [Vec<ClusterId>; 2],
    /// Ordered by cluster start time; equal starts keep retirement order.
    retired: Vec<ClusterId>,
    ready: VecDeque<SimpleEvent>,
    stats: ClusteringStatistics,
}

impl Default for Clusterer {
    fn default() -> Self {
        Self::new(ClustererConfig::default())
    }
}

impl Clusterer {
    #[must_use]
    pub fn new(config: ClustererConfig) -> Self {
        let prototype = MacroCluster::new(config.time_slack, config.strip_slack)
            .with_correlation_slack(config.correlation_slack);
        Self {
            pool: ClusterPool::new(config.pool_capacity, prototype),
            config,
            open: [Vec::new(), Vec::new()],
            retired: Vec::new(),
            ready: VecDeque::new(),
            stats: ClusteringStatistics::default(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &ClustererConfig {
        &self.config
    }

    #[must_use]
    pub fn statistics(&self) -> ClusteringStatistics {
        self.stats
    }

    /// Adds one eventlet. Eventlets must arrive in chronological order.
    pub fn insert(&mut self, eventlet: Eventlet) {
        self.stats.eventlets_seen += 1;
        if eventlet.adc == 0 {
            self.stats.eventlets_rejected += 1;
            return;
        }

        if self.join_open(eventlet) {
            return;
        }

        let plane = plane_slot(&eventlet);
        let id = self.pool.requisition();
        self.pool.get_mut(id).insert(eventlet);
        let pool = &self.pool;
        let list = &mut self.open[plane];
        let pos = list.partition_point(|&o| pool.get(o).time_start() <= eventlet.time);
        list.insert(pos, id);
        self.stats.clusters_started += 1;

        if self.retire_stale(eventlet.time) > 0 {
            self.correlate(false);
        }
    }

    /// Adds a run of eventlets.
    pub fn insert_all<I: IntoIterator<Item = Eventlet>>(&mut self, eventlets: I) {
        for e in eventlets {
            self.insert(e);
        }
    }

    /// True if finished events are waiting in the queue.
    #[must_use]
    pub fn events_ready(&self) -> bool {
        !self.ready.is_empty()
    }

    /// True if no open or retired clusters remain. Queued events are not
    /// counted as backlog.
    #[must_use]
    pub fn empty(&self) -> bool {
        self.open[0].is_empty() && self.open[1].is_empty() && self.retired.is_empty()
    }

    /// Number of open plus retired clusters.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.open[0].len() + self.open[1].len() + self.retired.len()
    }

    /// Drains the finished-event queue in emission order.
    pub fn pop_events(&mut self) -> Vec<SimpleEvent> {
        self.ready.drain(..).collect()
    }

    /// Retires every open cluster and emits everything pending.
    pub fn dump(&mut self) {
        for plane in 0..2 {
            for id in std::mem::take(&mut self.open[plane]) {
                self.retire(id);
            }
        }
        self.correlate(true);
        log::debug!(
            "clusterer dump: {} events emitted, {} clusters retired",
            self.stats.events_emitted,
            self.stats.clusters_retired
        );
    }

    /// Discards all state without emitting.
    pub fn clear(&mut self) {
        self.open = [Vec::new(), Vec::new()];
        self.retired.clear();
        self.ready.clear();
        self.pool.release_all();
        self.stats = ClusteringStatistics::default();
    }

    /// Offers the eventlet to its plane's open clusters. Returns true if it
    /// joined at least one.
    fn join_open(&mut self, eventlet: Eventlet) -> bool {
        let plane = plane_slot(&eventlet);
        let reach = eventlet.time.saturating_add(self.config.time_slack);
        let list = &mut self.open[plane];
        let pool = &mut self.pool;

        let mut target: Option<ClusterId> = None;
        let mut i = 0;
        while i < list.len() {
            let id = list[i];
            let cluster = pool.get(id);
            if cluster.time_start() > reach {
                break;
            }
            if !(cluster.time_adjacent(eventlet.time) && cluster.strip_adjacent(eventlet.strip)) {
                i += 1;
                continue;
            }
            match target {
                None => {
                    pool.get_mut(id).insert(eventlet);
                    target = Some(id);
                    i += 1;
                }
                Some(into) => {
                    pool.merge(into, id);
                    list.remove(i);
                    self.stats.clusters_merged += 1;
                }
            }
        }
        target.is_some()
    }

    /// Retires open clusters of both planes that are no longer time-adjacent
    /// to `time`. Returns how many were retired.
    fn retire_stale(&mut self, time: u64) -> usize {
        let mut stale = Vec::new();
        for list in &mut self.open {
            let pool = &self.pool;
            list.retain(|&id| {
                let keep = pool.get(id).time_adjacent(time);
                if !keep {
                    stale.push(id);
                }
                keep
            });
        }
        let count = stale.len();
        for id in stale {
            self.retire(id);
        }
        count
    }

    fn retire(&mut self, id: ClusterId) {
        let pool = &self.pool;
        let start = pool.get(id).time_start();
        let pos = self
            .retired
            .partition_point(|&o| pool.get(o).time_start() <= start);
        self.retired.insert(pos, id);
        self.stats.clusters_retired += 1;
    }

    /// Emits superclusters from the retired pool until the earliest one is
    /// no longer provably complete.
    fn correlate(&mut self, force: bool) {
        while let Some(&seed) = self.retired.first() {
            let slack = self.config.correlation_slack;
            let pool = &self.pool;
            let mut bounds = pool.get(seed).bounds();
            let mut members = vec![seed];
            let mut leftovers: Vec<ClusterId> = self.retired[1..].to_vec();

            loop {
                let absorbed = members.len();
                leftovers.retain(|&id| {
                    let c = pool.get(id);
                    if windows_overlap(bounds, c.bounds(), slack) {
                        bounds = (bounds.0.min(c.time_start()), bounds.1.max(c.time_end()));
                        members.push(id);
                        false
                    } else {
                        true
                    }
                });
                if members.len() == absorbed {
                    break;
                }
            }

            if !force && !self.is_final(bounds, &leftovers) {
                break;
            }

            let mut event = SimpleEvent::default();
            for id in members {
                for e in self.pool.get_mut(id).drain() {
                    event.insert_eventlet(e);
                }
                self.pool.release(id);
            }
            self.ready.push_back(event);
            self.stats.events_emitted += 1;
            self.retired = leftovers;
        }
    }

    /// A supercluster is final when a later retired cluster starts more than
    /// one time slack after it ends, and no open cluster could still be
    /// correlated with it.
    fn is_final(&self, bounds: (u64, u64), leftovers: &[ClusterId]) -> bool {
        let Some(&next) = leftovers.first() else {
            return false;
        };
        if bounds.1.saturating_add(self.config.time_slack) >= self.pool.get(next).time_start() {
            return false;
        }
        let slack = self.config.correlation_slack;
        !self
            .open
            .iter()
            .flatten()
            .any(|&id| windows_overlap(bounds, self.pool.get(id).bounds(), slack))
    }
}

/// Plane 0 is X; every other plane value is routed to Y.
fn plane_slot(eventlet: &Eventlet) -> usize {
    usize::from(eventlet.plane != 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clusterer(time_slack: u64, strip_slack: u16, correlation_slack: u64) -> Clusterer {
        Clusterer::new(
            ClustererConfig::new()
                .with_time_slack(time_slack)
                .with_strip_slack(strip_slack)
                .with_correlation_slack(correlation_slack)
                .with_pool_capacity(4),
        )
    }

    #[test]
    fn test_zero_amplitude_is_ignored() {
        let mut c = clusterer(5, 2, 5);
        c.insert(Eventlet::new(0, 0, 1, 0));
        assert!(c.empty());
        assert_eq!(c.statistics().eventlets_rejected, 1);
    }

    #[test]
    fn test_planes_correlate_on_dump() {
        let mut c = clusterer(5, 2, 50);
        c.insert_all([
            Eventlet::new(0, 0, 5, 10),
            Eventlet::new(1, 0, 6, 12),
            Eventlet::new(40, 1, 5, 9),
        ]);
        assert!(!c.events_ready());

        c.dump();
        assert!(c.empty());
        let events = c.pop_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].x.entries.len(), 2);
        assert_eq!(events[0].y.entries.len(), 1);
    }

    #[test]
    fn test_strip_gap_splits_clusters() {
        let mut c = clusterer(5, 2, 0);
        c.insert(Eventlet::new(0, 0, 1, 1));
        c.insert(Eventlet::new(1, 0, 10, 1));
        assert_eq!(c.pending_len(), 2);
        assert_eq!(c.statistics().clusters_started, 2);
    }

    #[test]
    fn test_adjacent_hits_share_cluster() {
        let mut c = clusterer(5, 2, 50);
        c.insert(Eventlet::new(0, 0, 5, 10));
        c.insert(Eventlet::new(1, 0, 6, 12));
        assert_eq!(c.pending_len(), 1);
        assert_eq!(c.statistics().clusters_started, 1);
    }

    #[test]
    fn test_bridging_hit_merges_clusters() {
        let mut c = clusterer(5, 2, 5);
        c.insert(Eventlet::new(0, 0, 10, 1));
        c.insert(Eventlet::new(1, 0, 14, 1));
        assert_eq!(c.pending_len(), 2);

        c.insert(Eventlet::new(2, 0, 12, 1));
        assert_eq!(c.pending_len(), 1);
        assert_eq!(c.statistics().clusters_merged, 1);

        c.dump();
        let events = c.pop_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].x.entries.len(), 3);
    }

    #[test]
    fn test_stale_clusters_retire_and_emit() {
        let mut c = clusterer(5, 2, 5);
        c.insert(Eventlet::new(0, 0, 1, 1));
        c.insert(Eventlet::new(0, 1, 1, 1));
        // Starts a new cluster far away in time: both earlier clusters retire
        // and correlate, but the supercluster has no later retired cluster yet.
        c.insert(Eventlet::new(100, 0, 1, 1));
        assert!(!c.events_ready());

        c.insert(Eventlet::new(200, 0, 1, 1));
        let events = c.pop_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].len(), 2);
        assert_eq!(events[0].time_start(), 0);
    }

    #[test]
    fn test_open_cluster_blocks_emission() {
        let mut c = clusterer(5, 2, 20);
        // Y cluster keeps growing and stays open while X clusters retire.
        let mut hits: Vec<_> = (0..60)
            .step_by(4)
            .map(|t| Eventlet::new(t, 1, 50, 1))
            .collect();
        hits.extend([0, 30, 60].map(|t| Eventlet::new(t, 0, 1, 1)));
        hits.sort_by_key(|e| e.time);
        c.insert_all(hits);
        assert!(!c.events_ready());

        c.dump();
        let events = c.pop_events();
        let starts: Vec<_> = events.iter().map(SimpleEvent::time_start).collect();
        let mut sorted = starts.clone();
        sorted.sort_unstable();
        assert_eq!(starts, sorted);
        assert_eq!(events.iter().map(SimpleEvent::len).sum::<usize>(), 18);
    }

    #[test]
    fn test_clear_discards_everything() {
        let mut c = clusterer(5, 2, 5);
        c.insert(Eventlet::new(0, 0, 1, 1));
        c.insert(Eventlet::new(100, 0, 1, 1));
        c.clear();
        assert!(c.empty());
        assert!(!c.events_ready());
        c.dump();
        assert!(c.pop_events().is_empty());
    }
}
