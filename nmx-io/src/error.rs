//! I/O error types.

use thiserror::Error;

/// Result type for I/O operations.
pub type Result<T> = std::result::Result<T, Error>;

/// I/O error types.
#[derive(Error, Debug)]
pub enum Error {
    /// Index at or beyond the stored extent.
    #[error("index {index} out of range (len {len})")]
    OutOfRange { index: u64, len: u64 },

    /// Index row appended out of sequence.
    #[error("event {index} written out of order (expected {expected})")]
    OutOfOrder { index: u64, expected: u64 },

    /// Matrix dimensions differ from the declared raster shape.
    #[error("shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        actual: (usize, usize),
    },

    /// Requested dataset, group or analysis does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Mutating call on a store opened read-only.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// Invalid file format.
    #[error("invalid file format: {0}")]
    InvalidFormat(String),

    /// HDF5 library error.
    #[error("HDF5 error: {0}")]
    Hdf5(#[from] hdf5::Error),

    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Core library error.
    #[error("core error: {0}")]
    Core(#[from] nmx_core::Error),
}
