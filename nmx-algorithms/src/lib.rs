//! nmx-algorithms: Eventlet clustering for two-plane strip detectors.
//!
//! This crate provides:
//! - **Clusterer** - streaming per-plane clustering with cross-plane correlation
//! - **ClusterPool** - arena of reusable clusters
//! - **SimpleEvent** - assembled events with entry-point estimates
//! - **PlaneSummary** - default per-event metric engine
//!

mod clusterer;
mod event;
mod macro_cluster;
mod pool;
mod summary;

pub use clusterer::{Clusterer, ClustererConfig, ClusteringStatistics};
pub use event::{SimpleEvent, SimplePlane};
pub use macro_cluster::{windows_overlap, MacroCluster};
pub use pool::{ClusterId, ClusterPool};
pub use summary::PlaneSummary;
