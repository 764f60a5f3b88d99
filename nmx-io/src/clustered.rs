//! Clustered raw storage: a record log plus a per-event range index.
//!
//! Event `i` owns two contiguous record ranges of the log, one per plane.
//! The index is the source of truth for the event count. A crash between
//! appending an event's records and writing its index row leaves an
//! unindexed tail in the log; it is never read, and later appends go past it.

use crate::raw_log::{to_usize, RawLog};
use crate::store::{append_rows, create_extendable_rows, open_shaped, read_rows, row_count};
use crate::{Error, Result};
use hdf5::{Dataset, Group};
use nmx_algorithms::SimpleEvent;
use nmx_core::{Event, Eventlet, Plane};
use std::ops::Range;

/// Dataset name of the event index within its group.
pub const INDICES_DATASET: &str = "indices";

const INDEX_WORDS: usize = 4;

/// Creation options for clustered storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusteredLayout {
    /// Chunk length of both datasets, in rows.
    pub chunk_size: usize,
}

impl Default for ClusteredLayout {
    fn default() -> Self {
        Self { chunk_size: 20 }
    }
}

impl ClusteredLayout {
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }
}

/// `[N, 4]` `u64` rows of `[start0, end0, start1, end1]`.
#[derive(Debug, Clone)]
pub struct ClusteredIndex {
    group: Group,
}

impl ClusteredIndex {
    #[must_use]
    pub fn exists_in(group: &Group) -> bool {
        open_shaped(group, INDICES_DATASET, 2, Some(INDEX_WORDS)).is_ok()
    }

    /// # Errors
    /// Returns `NotFound` if the dataset is missing or has the wrong shape.
    pub fn open(group: &Group) -> Result<Self> {
        open_shaped(group, INDICES_DATASET, 2, Some(INDEX_WORDS))?;
        Ok(Self {
            group: group.clone(),
        })
    }

    /// # Errors
    /// Returns an error if the dataset cannot be created.
    pub fn create(group: &Group, chunk_size: usize) -> Result<Self> {
        create_extendable_rows::<u64>(group, INDICES_DATASET, INDEX_WORDS, chunk_size)?;
        Ok(Self {
            group: group.clone(),
        })
    }

    fn dataset(&self) -> Result<Dataset> {
        Ok(self.group.dataset(INDICES_DATASET)?)
    }

    /// Number of indexed events.
    ///
    /// # Errors
    /// Returns an error if the dataset cannot be read.
    pub fn event_count(&self) -> Result<u64> {
        Ok(row_count(&self.dataset()?)? as u64)
    }

    /// Writes the index row of event `index`, which must be the next one.
    ///
    /// # Errors
    /// Returns `OutOfOrder` if `index != event_count()`, and `InvalidFormat`
    /// for a range whose start exceeds its end.
    pub fn append_event(&self, index: u64, plane0: Range<u64>, plane1: Range<u64>) -> Result<()> {
        let dataset = self.dataset()?;
        let expected = row_count(&dataset)? as u64;
        if index != expected {
            return Err(Error::OutOfOrder { index, expected });
        }
        if plane0.start > plane0.end || plane1.start > plane1.end {
            return Err(Error::InvalidFormat(format!(
                "inverted record range for event {index}"
            )));
        }
        let row = [plane0.start, plane0.end, plane1.start, plane1.end];
        append_rows(&dataset, INDEX_WORDS, &row[..])?;
        Ok(())
    }

    /// Record ranges of both planes of event `index`.
    ///
    /// # Errors
    /// Returns `OutOfRange` if `index >= event_count()`.
    pub fn read_event(&self, index: u64) -> Result<(Range<u64>, Range<u64>)> {
        let dataset = self.dataset()?;
        let len = row_count(&dataset)? as u64;
        if index >= len {
            return Err(Error::OutOfRange { index, len });
        }
        let i = to_usize(index)?;
        let row: Vec<u64> = read_rows(&dataset, i, i + 1)?;
        match row.as_slice() {
            [s0, e0, s1, e1] => Ok((*s0..*e0, *s1..*e1)),
            _ => Err(Error::InvalidFormat(format!("short index row {index}"))),
        }
    }
}

/// Record log and index appended in lock-step.
#[derive(Debug, Clone)]
pub struct ClusteredRaw {
    log: RawLog,
    index: ClusteredIndex,
}

impl ClusteredRaw {
    /// Returns true if `group` holds both datasets.
    #[must_use]
    pub fn exists_in(group: &Group) -> bool {
        RawLog::exists_in(group) && ClusteredIndex::exists_in(group)
    }

    /// # Errors
    /// Returns `NotFound` if either dataset is missing.
    pub fn open(group: &Group) -> Result<Self> {
        Ok(Self {
            log: RawLog::open(group)?,
            index: ClusteredIndex::open(group)?,
        })
    }

    /// # Errors
    /// Returns an error if either dataset cannot be created.
    pub fn create(group: &Group, layout: ClusteredLayout) -> Result<Self> {
        Ok(Self {
            log: RawLog::create(group, layout.chunk_size)?,
            index: ClusteredIndex::create(group, layout.chunk_size)?,
        })
    }

    #[must_use]
    pub fn log(&self) -> &RawLog {
        &self.log
    }

    #[must_use]
    pub fn index(&self) -> &ClusteredIndex {
        &self.index
    }

    /// Number of indexed events.
    ///
    /// # Errors
    /// Returns an error if the index cannot be read.
    pub fn event_count(&self) -> Result<u64> {
        self.index.event_count()
    }

    /// Eventlets of event `index`, per plane.
    ///
    /// # Errors
    /// Returns `OutOfRange` for an unindexed event or a range past the log.
    pub fn read_eventlets(&self, index: u64) -> Result<(Vec<Eventlet>, Vec<Eventlet>)> {
        let (r0, r1) = self.index.read_event(index)?;
        Ok((self.log.read_range(r0)?, self.log.read_range(r1)?))
    }

    /// Reconstructs event `index` with timebins from the low time bits.
    ///
    /// # Errors
    /// See [`read_eventlets`](Self::read_eventlets).
    pub fn get_event(&self, index: u64) -> Result<Event> {
        let (x, y) = self.read_eventlets(index)?;
        Ok(Event::new(Plane::from_eventlets(&x), Plane::from_eventlets(&y)))
    }

    /// Appends the eventlets of the next event and indexes them. Returns the
    /// new event's index.
    ///
    /// # Errors
    /// Returns an error if HDF5 I/O fails.
    pub fn append_eventlets(&self, plane0: &[Eventlet], plane1: &[Eventlet]) -> Result<u64> {
        let index = self.index.event_count()?;
        self.append_at(index, plane0, plane1)?;
        Ok(index)
    }

    /// Appends an assembled event.
    ///
    /// # Errors
    /// Returns an error if HDF5 I/O fails.
    pub fn append_simple_event(&self, event: &SimpleEvent) -> Result<u64> {
        self.append_eventlets(&event.x.entries, &event.y.entries)
    }

    /// Stores `event` as event `index`, stamping eventlet times with
    /// `index << 8 | timebin`.
    ///
    /// # Errors
    /// Returns `OutOfOrder` unless `index` is the next event.
    pub fn write_event(&self, index: u64, event: &Event) -> Result<()> {
        let x = event.x.to_eventlets(index, 0);
        let y = event.y.to_eventlets(index, 1);
        self.append_at(index, &x, &y)
    }

    fn append_at(&self, index: u64, plane0: &[Eventlet], plane1: &[Eventlet]) -> Result<()> {
        let expected = self.index.event_count()?;
        if index != expected {
            return Err(Error::OutOfOrder { index, expected });
        }
        let r0 = self.log.append_batch(plane0)?;
        let r1 = self.log.append_batch(plane1)?;
        self.index.append_event(index, r0, r1)
    }
}
