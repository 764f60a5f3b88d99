//! nmx-io: HDF5 storage for NMX detector data.
//!
//! This crate provides:
//! - **RawLog** - append-only eventlet records
//! - **ClusteredRaw** - record log plus per-event range index
//! - **DenseRaster** - pre-allocated strip × timebin matrices
//! - **Analysis** - cached per-event metrics with frozen parameters
//! - **File** - façade tying one raw source to one active analysis
//!

mod analysis;
mod clustered;
mod error;
mod file;
mod metric;
mod raster;
mod raw;
mod raw_log;
mod store;

pub use analysis::Analysis;
pub use clustered::{ClusteredIndex, ClusteredLayout, ClusteredRaw, INDICES_DATASET};
pub use error::{Error, Result};
pub use file::{Access, AnalysisProgress, File, ANALYSES_GROUP};
pub use metric::Metric;
pub use raster::{DenseRaster, RasterShape, RASTER_DATASET};
pub use raw::{Raw, RawSource, CLUSTERED_GROUP};
pub use raw_log::{RawLog, POINTS_DATASET};
