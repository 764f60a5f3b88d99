//! Pre-allocated dense strip × timebin storage.

use crate::raw_log::to_usize;
use crate::store::open_shaped;
use crate::{Error, Result};
use hdf5::{Dataset, Group};
use ndarray::{s, Array2};
use nmx_core::{Event, Plane};

/// Dataset name of the raster within its group.
pub const RASTER_DATASET: &str = "RawAPV";

/// Fixed raster dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RasterShape {
    pub max_events: usize,
    pub strips: usize,
    pub timebins: usize,
}

impl RasterShape {
    #[must_use]
    pub fn new(max_events: usize, strips: usize, timebins: usize) -> Self {
        Self {
            max_events,
            strips,
            timebins,
        }
    }
}

/// `[max_events, 2, strips, timebins]` `i16` raster, chunked one event at a
/// time. Any slot may be (re)written in any order.
#[derive(Debug, Clone)]
pub struct DenseRaster {
    group: Group,
    shape: RasterShape,
}

impl DenseRaster {
    #[must_use]
    pub fn exists_in(group: &Group) -> bool {
        Self::open(group).is_ok()
    }

    /// # Errors
    /// Returns `NotFound` if the dataset is missing or is not 4-D with two
    /// planes.
    pub fn open(group: &Group) -> Result<Self> {
        let dataset = open_shaped(group, RASTER_DATASET, 4, None)?;
        let dims = dataset.shape();
        if dims[1] != 2 {
            return Err(Error::NotFound(format!(
                "{RASTER_DATASET} has {} planes",
                dims[1]
            )));
        }
        Ok(Self {
            group: group.clone(),
            shape: RasterShape::new(dims[0], dims[2], dims[3]),
        })
    }

    /// Allocates the full raster.
    ///
    /// # Errors
    /// Returns `InvalidFormat` for a zero dimension, or an HDF5 error.
    pub fn create(group: &Group, shape: RasterShape) -> Result<Self> {
        if shape.max_events == 0 || shape.strips == 0 || shape.timebins == 0 {
            return Err(Error::InvalidFormat(format!(
                "raster dimensions must be non-zero: {shape:?}"
            )));
        }
        group
            .new_dataset::<i16>()
            .shape((shape.max_events, 2, shape.strips, shape.timebins))
            .chunk([1, 2, shape.strips, shape.timebins])
            .create(RASTER_DATASET)?;
        log::debug!(
            "created raster [{}, 2, {}, {}]",
            shape.max_events,
            shape.strips,
            shape.timebins
        );
        Ok(Self {
            group: group.clone(),
            shape,
        })
    }

    fn dataset(&self) -> Result<Dataset> {
        Ok(self.group.dataset(RASTER_DATASET)?)
    }

    #[must_use]
    pub fn shape(&self) -> RasterShape {
        self.shape
    }

    /// The allocated capacity; every slot counts as an event.
    #[must_use]
    pub fn event_count(&self) -> u64 {
        self.shape.max_events as u64
    }

    fn slot(&self, index: u64, plane: usize) -> Result<usize> {
        let len = self.event_count();
        if index >= len {
            return Err(Error::OutOfRange { index, len });
        }
        if plane > 1 {
            return Err(Error::OutOfRange {
                index: plane as u64,
                len: 2,
            });
        }
        to_usize(index)
    }

    /// Writes one plane of event `index`.
    ///
    /// # Errors
    /// Returns `OutOfRange` for a bad index or plane and `ShapeMismatch` if
    /// `matrix` is not `[strips, timebins]`.
    pub fn write_plane(&self, index: u64, plane: usize, matrix: &Array2<i16>) -> Result<()> {
        let i = self.slot(index, plane)?;
        let expected = (self.shape.strips, self.shape.timebins);
        let actual = matrix.dim();
        if actual != expected {
            return Err(Error::ShapeMismatch { expected, actual });
        }
        self.dataset()?
            .write_slice(matrix.view(), s![i, plane, .., ..])?;
        Ok(())
    }

    /// Reads one plane of event `index`.
    ///
    /// # Errors
    /// Returns `OutOfRange` for a bad index or plane.
    pub fn read_plane(&self, index: u64, plane: usize) -> Result<Array2<i16>> {
        let i = self.slot(index, plane)?;
        Ok(self
            .dataset()?
            .read_slice_2d::<i16, _>(s![i, plane, .., ..])?)
    }

    /// Both planes of event `index`.
    ///
    /// # Errors
    /// Returns `OutOfRange` for a bad index.
    pub fn get_event(&self, index: u64) -> Result<Event> {
        Ok(Event::new(
            Plane::from_matrix(&self.read_plane(index, 0)?),
            Plane::from_matrix(&self.read_plane(index, 1)?),
        ))
    }

    /// Writes both planes of event `index`. Points outside the raster shape
    /// are dropped.
    ///
    /// # Errors
    /// Returns `OutOfRange` for a bad index.
    pub fn write_event(&self, index: u64, event: &Event) -> Result<()> {
        let (strips, timebins) = (self.shape.strips, self.shape.timebins);
        self.write_plane(index, 0, &event.x.to_matrix(strips, timebins))?;
        self.write_plane(index, 1, &event.y.to_matrix(strips, timebins))
    }
}
