//! Arena of reusable clusters addressed by stable ids.
//!
//! Released slots keep their allocations, so steady-state clustering does
//! not allocate per cluster. Requisition scans for a free slot starting at
//! a cursor that wraps around the arena.

use crate::macro_cluster::MacroCluster;

/// Stable handle to a cluster slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClusterId(usize);

impl ClusterId {
    /// Slot index in the arena.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone)]
struct Entry {
    cluster: MacroCluster,
    used: bool,
}

/// Pool of [`MacroCluster`] slots.
#[derive(Debug, Clone)]
pub struct ClusterPool {
    entries: Vec<Entry>,
    prototype: MacroCluster,
    cursor: usize,
    free_count: usize,
}

impl ClusterPool {
    /// Creates a pool of `capacity` empty clones of `prototype`.
    #[must_use]
    pub fn new(capacity: usize, prototype: MacroCluster) -> Self {
        let mut prototype = prototype;
        prototype.reset();
        let entries = (0..capacity)
            .map(|_| Entry {
                cluster: prototype.clone(),
                used: false,
            })
            .collect();
        Self {
            entries,
            prototype,
            cursor: 0,
            free_count: capacity,
        }
    }

    /// Total number of slots.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Number of unused slots.
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.free_count
    }

    /// Number of slots in use.
    #[must_use]
    pub fn in_use(&self) -> usize {
        self.entries.len() - self.free_count
    }

    /// Hands out an empty cluster, doubling the arena when it is full.
    pub fn requisition(&mut self) -> ClusterId {
        if self.free_count == 0 {
            self.grow();
        }
        let len = self.entries.len();
        let mut idx = self.cursor % len;
        while self.entries[idx].used {
            idx = (idx + 1) % len;
        }
        let entry = &mut self.entries[idx];
        entry.used = true;
        entry.cluster.reset();
        self.free_count -= 1;
        self.cursor = (idx + 1) % len;
        ClusterId(idx)
    }

    /// Returns a slot to the pool. Releasing a free slot is a no-op.
    pub fn release(&mut self, id: ClusterId) {
        let entry = &mut self.entries[id.0];
        if entry.used {
            entry.used = false;
            entry.cluster.reset();
            self.free_count += 1;
        }
    }

    /// Releases every slot.
    pub fn release_all(&mut self) {
        for entry in &mut self.entries {
            entry.used = false;
            entry.cluster.reset();
        }
        self.free_count = self.entries.len();
        self.cursor = 0;
    }

    /// Moves the contents of `from` into `into` and releases `from`.
    pub fn merge(&mut self, into: ClusterId, from: ClusterId) {
        if into == from {
            return;
        }
        let (dst, src) = if into.0 < from.0 {
            let (lo, hi) = self.entries.split_at_mut(from.0);
            (&mut lo[into.0], &mut hi[0])
        } else {
            let (lo, hi) = self.entries.split_at_mut(into.0);
            (&mut hi[0], &mut lo[from.0])
        };
        dst.cluster.absorb(&mut src.cluster);
        self.release(from);
    }

    #[must_use]
    pub fn get(&self, id: ClusterId) -> &MacroCluster {
        &self.entries[id.0].cluster
    }

    pub fn get_mut(&mut self, id: ClusterId) -> &mut MacroCluster {
        &mut self.entries[id.0].cluster
    }

    fn grow(&mut self) {
        let extra = self.entries.len().max(1);
        let prototype = &self.prototype;
        self.entries.extend((0..extra).map(|_| Entry {
            cluster: prototype.clone(),
            used: false,
        }));
        self.free_count += extra;
    }
}
