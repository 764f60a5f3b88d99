//! Raw event sources resolved once when a file is opened.

use crate::clustered::{ClusteredLayout, ClusteredRaw};
use crate::raster::{DenseRaster, RasterShape};
use crate::store::child_group;
use crate::Result;
use hdf5::Group;
use nmx_core::Event;

/// Group holding the clustered record log and its index.
pub const CLUSTERED_GROUP: &str = "RawVMM";

/// Capability shared by every raw event store.
pub trait RawSource {
    /// Number of addressable events.
    ///
    /// # Errors
    /// Returns an error if the store cannot be read.
    fn event_count(&self) -> Result<u64>;

    /// Reads event `index`.
    ///
    /// # Errors
    /// Returns `OutOfRange` past the last event.
    fn get_event(&self, index: u64) -> Result<Event>;

    /// Stores event `index`.
    ///
    /// # Errors
    /// Returns an error if the store rejects the index.
    fn write_event(&self, index: u64, event: &Event) -> Result<()>;
}

impl RawSource for ClusteredRaw {
    fn event_count(&self) -> Result<u64> {
        ClusteredRaw::event_count(self)
    }

    fn get_event(&self, index: u64) -> Result<Event> {
        ClusteredRaw::get_event(self, index)
    }

    fn write_event(&self, index: u64, event: &Event) -> Result<()> {
        ClusteredRaw::write_event(self, index, event)
    }
}

impl RawSource for DenseRaster {
    fn event_count(&self) -> Result<u64> {
        Ok(DenseRaster::event_count(self))
    }

    fn get_event(&self, index: u64) -> Result<Event> {
        DenseRaster::get_event(self, index)
    }

    fn write_event(&self, index: u64, event: &Event) -> Result<()> {
        DenseRaster::write_event(self, index, event)
    }
}

/// The raw store of one file.
#[derive(Debug, Clone)]
pub enum Raw {
    Clustered(ClusteredRaw),
    Dense(DenseRaster),
}

impl Raw {
    /// Looks for clustered storage first, then a dense raster.
    ///
    /// # Errors
    /// Returns an error if HDF5 I/O fails while probing.
    pub fn probe(root: &Group) -> Result<Option<Self>> {
        if let Some(group) = child_group(root, CLUSTERED_GROUP)? {
            if ClusteredRaw::exists_in(&group) {
                return Ok(Some(Raw::Clustered(ClusteredRaw::open(&group)?)));
            }
        }
        if DenseRaster::exists_in(root) {
            return Ok(Some(Raw::Dense(DenseRaster::open(root)?)));
        }
        Ok(None)
    }

    /// Creates clustered storage under [`CLUSTERED_GROUP`].
    ///
    /// # Errors
    /// Returns an error if the datasets cannot be created.
    pub fn create_clustered(root: &Group, layout: ClusteredLayout) -> Result<Self> {
        let group = crate::store::require_group(root, CLUSTERED_GROUP)?;
        Ok(Raw::Clustered(ClusteredRaw::create(&group, layout)?))
    }

    /// Allocates a dense raster in `root`.
    ///
    /// # Errors
    /// Returns an error if the dataset cannot be created.
    pub fn create_dense(root: &Group, shape: RasterShape) -> Result<Self> {
        Ok(Raw::Dense(DenseRaster::create(root, shape)?))
    }

    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Raw::Clustered(_) => "clustered",
            Raw::Dense(_) => "dense",
        }
    }

    fn source(&self) -> &dyn RawSource {
        match self {
            Raw::Clustered(raw) => raw,
            Raw::Dense(raw) => raw,
        }
    }
}

impl RawSource for Raw {
    fn event_count(&self) -> Result<u64> {
        self.source().event_count()
    }

    fn get_event(&self, index: u64) -> Result<Event> {
        self.source().get_event(index)
    }

    fn write_event(&self, index: u64, event: &Event) -> Result<()> {
        self.source().write_event(index, event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nmx_core::Plane;
    use tempfile::NamedTempFile;

    #[test]
    fn test_probe_prefers_clustered() {
        let tmp = NamedTempFile::new().unwrap();
        let file = hdf5::File::create(tmp.path()).unwrap();
        assert!(Raw::probe(&file).unwrap().is_none());

        Raw::create_dense(&file, RasterShape::new(2, 4, 4)).unwrap();
        assert_eq!(Raw::probe(&file).unwrap().unwrap().kind(), "dense");

        Raw::create_clustered(&file, ClusteredLayout::default()).unwrap();
        assert_eq!(Raw::probe(&file).unwrap().unwrap().kind(), "clustered");
    }

    #[test]
    fn test_log_without_index_is_not_a_source() {
        let tmp = NamedTempFile::new().unwrap();
        let file = hdf5::File::create(tmp.path()).unwrap();
        let group = file.create_group(CLUSTERED_GROUP).unwrap();
        crate::RawLog::create(&group, 8).unwrap();
        assert!(Raw::probe(&file).unwrap().is_none());
    }

    #[test]
    fn test_dispatch_through_trait() {
        let tmp = NamedTempFile::new().unwrap();
        let file = hdf5::File::create(tmp.path()).unwrap();
        let raw = Raw::create_dense(&file, RasterShape::new(3, 4, 4)).unwrap();
        let mut x = Plane::new();
        x.set(1, 2, 9);
        let event = Event::new(x, Plane::new());
        raw.write_event(2, &event).unwrap();
        assert_eq!(raw.event_count().unwrap(), 3);
        assert_eq!(raw.get_event(2).unwrap(), event);
    }
}
