//! nmx-core: Core types for NMX strip detector data.
//!
//! This crate provides the value types shared by the clustering engine and
//! the storage layer: detector hits (eventlets) and their wire codec,
//! per-event strip/timebin planes, analysis settings and metric sets.
//!

pub mod error;
pub mod eventlet;
pub mod metrics;
pub mod plane;
pub mod settings;

pub use error::{Error, Result};
pub use eventlet::{decode_batch, encode_batch, Eventlet, RECORD_WORDS};
pub use metrics::{MetricEngine, MetricSet, MetricValue};
pub use plane::{Event, Plane};
pub use settings::{Setting, SettingValue, Settings};
