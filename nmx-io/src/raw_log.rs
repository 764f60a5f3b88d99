//! Append-only log of encoded eventlets.

use crate::store::{append_rows, create_extendable_rows, open_shaped, read_rows, row_count};
use crate::{Error, Result};
use hdf5::{Dataset, Group};
use nmx_core::{decode_batch, encode_batch, Eventlet, RECORD_WORDS};
use std::ops::Range;

/// Dataset name of the record log within its group.
pub const POINTS_DATASET: &str = "points";

/// Eventlet records stored as a `[N, 4]` `u32` dataset.
///
/// Record indices are permanent once written. Appends always target the
/// dataset's actual length.
#[derive(Debug, Clone)]
pub struct RawLog {
    group: Group,
}

impl RawLog {
    /// Returns true if `group` holds a record log.
    #[must_use]
    pub fn exists_in(group: &Group) -> bool {
        open_shaped(group, POINTS_DATASET, 2, Some(RECORD_WORDS)).is_ok()
    }

    /// Opens an existing log.
    ///
    /// # Errors
    /// Returns `NotFound` if the dataset is missing or has the wrong shape.
    pub fn open(group: &Group) -> Result<Self> {
        open_shaped(group, POINTS_DATASET, 2, Some(RECORD_WORDS))?;
        Ok(Self {
            group: group.clone(),
        })
    }

    /// Creates an empty log chunked every `chunk_size` records.
    ///
    /// # Errors
    /// Returns an error if the dataset cannot be created.
    pub fn create(group: &Group, chunk_size: usize) -> Result<Self> {
        create_extendable_rows::<u32>(group, POINTS_DATASET, RECORD_WORDS, chunk_size)?;
        Ok(Self {
            group: group.clone(),
        })
    }

    fn dataset(&self) -> Result<Dataset> {
        Ok(self.group.dataset(POINTS_DATASET)?)
    }

    /// Number of records physically present.
    ///
    /// # Errors
    /// Returns an error if the dataset cannot be read.
    pub fn entry_count(&self) -> Result<u64> {
        Ok(row_count(&self.dataset()?)? as u64)
    }

    /// Appends one record and returns its index.
    ///
    /// # Errors
    /// Returns an error if HDF5 I/O fails.
    pub fn append(&self, eventlet: &Eventlet) -> Result<u64> {
        let words = eventlet.encode();
        append_rows(&self.dataset()?, RECORD_WORDS, &words[..])
    }

    /// Appends records in order and returns their index range.
    ///
    /// # Errors
    /// Returns an error if HDF5 I/O fails.
    pub fn append_batch(&self, eventlets: &[Eventlet]) -> Result<Range<u64>> {
        let words = encode_batch(eventlets);
        let start = append_rows(&self.dataset()?, RECORD_WORDS, &words)?;
        Ok(start..start + eventlets.len() as u64)
    }

    /// Reads one record.
    ///
    /// # Errors
    /// Returns `OutOfRange` if `index >= entry_count()`.
    pub fn read(&self, index: u64) -> Result<Eventlet> {
        let dataset = self.dataset()?;
        let len = row_count(&dataset)? as u64;
        if index >= len {
            return Err(Error::OutOfRange { index, len });
        }
        let row = to_usize(index)?;
        let words: Vec<u32> = read_rows(&dataset, row, row + 1)?;
        decode_batch(&words)
            .pop()
            .ok_or(Error::OutOfRange { index, len })
    }

    /// Reads records `range`.
    ///
    /// # Errors
    /// Returns `OutOfRange` if the range extends past the tail.
    pub fn read_range(&self, range: Range<u64>) -> Result<Vec<Eventlet>> {
        let dataset = self.dataset()?;
        let len = row_count(&dataset)? as u64;
        if range.end > len || range.start > range.end {
            return Err(Error::OutOfRange {
                index: range.end.saturating_sub(1).max(range.start),
                len,
            });
        }
        let words: Vec<u32> = read_rows(&dataset, to_usize(range.start)?, to_usize(range.end)?)?;
        Ok(decode_batch(&words))
    }
}

pub(crate) fn to_usize(value: u64) -> Result<usize> {
    usize::try_from(value).map_err(|_| Error::InvalidFormat(format!("index {value} exceeds address space")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn log() -> (NamedTempFile, hdf5::File, RawLog) {
        let tmp = NamedTempFile::new().unwrap();
        let file = hdf5::File::create(tmp.path()).unwrap();
        let group = file.create_group("RawVMM").unwrap();
        let log = RawLog::create(&group, 4).unwrap();
        (tmp, file, log)
    }

    #[test]
    fn test_append_then_read() {
        let (_tmp, _file, log) = log();
        let e = Eventlet::new(0x1_0000_0042, 1, 300, 1023).with_flag(true);
        assert_eq!(log.append(&e).unwrap(), 0);
        assert_eq!(log.entry_count().unwrap(), 1);
        assert_eq!(log.read(0).unwrap(), e);
    }

    #[test]
    fn test_batch_ranges_are_contiguous() {
        let (_tmp, _file, log) = log();
        let first: Vec<_> = (0..5).map(|i| Eventlet::new(i, 0, 7, 10)).collect();
        let second: Vec<_> = (5..7).map(|i| Eventlet::new(i, 1, 8, 20)).collect();
        assert_eq!(log.append_batch(&first).unwrap(), 0..5);
        assert_eq!(log.append_batch(&second).unwrap(), 5..7);
        assert_eq!(log.read_range(3..6).unwrap()[2], second[0]);
        assert!(log.read_range(4..4).unwrap().is_empty());
    }

    #[test]
    fn test_read_past_tail() {
        let (_tmp, _file, log) = log();
        log.append(&Eventlet::new(1, 0, 1, 1)).unwrap();
        assert!(matches!(
            log.read(1),
            Err(Error::OutOfRange { index: 1, len: 1 })
        ));
        assert!(log.read_range(0..3).is_err());
    }

    #[test]
    fn test_read_extreme_index() {
        let (_tmp, _file, log) = log();
        log.append_batch(&[Eventlet::new(1, 0, 1, 1), Eventlet::new(2, 0, 2, 1)])
            .unwrap();
        assert!(matches!(
            log.read(u64::MAX),
            Err(Error::OutOfRange { index: u64::MAX, len: 2 })
        ));
        let len = log.entry_count().unwrap();
        assert!(matches!(
            log.read(len),
            Err(Error::OutOfRange { index: 2, len: 2 })
        ));
        assert!(log.read_range(u64::MAX..u64::MAX).is_err());
    }

    #[test]
    fn test_open_missing_is_not_found() {
        let tmp = NamedTempFile::new().unwrap();
        let file = hdf5::File::create(tmp.path()).unwrap();
        assert!(!RawLog::exists_in(&file));
        assert!(matches!(RawLog::open(&file), Err(Error::NotFound(_))));
    }
}
