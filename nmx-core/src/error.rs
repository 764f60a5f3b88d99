//! Error types for nmx-core.

use thiserror::Error;

/// Result type alias for nmx-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types.
#[derive(Error, Debug)]
pub enum Error {
    /// Plane index other than 0 (X) or 1 (Y).
    #[error("invalid plane index: {0}")]
    InvalidPlane(usize),

    /// Requested setting is not defined.
    #[error("missing setting: {0}")]
    MissingSetting(String),

    /// Setting exists but holds a value of another kind.
    #[error("setting '{name}' is not a {expected}")]
    SettingType {
        name: String,
        expected: &'static str,
    },
}
