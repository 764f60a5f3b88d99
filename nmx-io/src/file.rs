//! File façade: one HDF5 file, its raw source and one active analysis.

use crate::analysis::Analysis;
use crate::clustered::ClusteredLayout;
use crate::metric::Metric;
use crate::raster::RasterShape;
use crate::raw::{Raw, RawSource};
use crate::store::{child_group, require_group};
use crate::{Error, Result};
use nmx_algorithms::PlaneSummary;
use nmx_core::{Event, MetricEngine, MetricSet, Settings};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Group holding every analysis.
pub const ANALYSES_GROUP: &str = "Analyses";

/// How a file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    ReadOnly,
    ReadWrite,
    /// Create or truncate.
    Create,
}

/// Progress of [`File::analyze_pending`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalysisProgress {
    /// High-water mark of the active analysis.
    pub done: u64,
    /// Events in the raw source.
    pub total: u64,
    /// Events analyzed by this call so far.
    pub analyzed: u64,
    pub elapsed: Duration,
}

/// An open NMX data file.
///
/// Dropping a writable file saves the active analysis.
pub struct File {
    h5: hdf5::File,
    path: PathBuf,
    access: Access,
    raw: Option<Raw>,
    engine: Box<dyn MetricEngine>,
    analysis: Option<Analysis>,
}

impl std::fmt::Debug for File {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("File")
            .field("path", &self.path)
            .field("access", &self.access)
            .field("raw", &self.raw.as_ref().map(Raw::kind))
            .field("analysis", &self.analysis.as_ref().map(Analysis::name))
            .finish_non_exhaustive()
    }
}

impl File {
    /// Opens `path` and probes for a raw source.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened.
    pub fn open<P: AsRef<Path>>(path: P, access: Access) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let h5 = match access {
            Access::ReadOnly => hdf5::File::open(&path)?,
            Access::ReadWrite => hdf5::File::open_rw(&path)?,
            Access::Create => hdf5::File::create(&path)?,
        };
        let raw = Raw::probe(&h5)?;
        log::debug!(
            "opened {} ({access:?}), raw source: {}",
            path.display(),
            raw.as_ref().map_or("none", Raw::kind)
        );
        Ok(Self {
            h5,
            path,
            access,
            raw,
            engine: Box::new(PlaneSummary::new()),
            analysis: None,
        })
    }

    /// Replaces the metric engine used for analyses.
    #[must_use]
    pub fn with_engine(mut self, engine: Box<dyn MetricEngine>) -> Self {
        self.engine = engine;
        self
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn is_writable(&self) -> bool {
        self.access != Access::ReadOnly
    }

    fn require_writable(&self, operation: &str) -> Result<()> {
        if self.is_writable() {
            Ok(())
        } else {
            Err(Error::StoreUnavailable(format!(
                "{operation}: {} is open read-only",
                self.path.display()
            )))
        }
    }

    #[must_use]
    pub fn raw(&self) -> Option<&Raw> {
        self.raw.as_ref()
    }

    fn require_raw(&self) -> Result<&Raw> {
        self.raw
            .as_ref()
            .ok_or_else(|| Error::NotFound(format!("raw data in {}", self.path.display())))
    }

    /// Creates clustered raw storage.
    ///
    /// # Errors
    /// Returns `StoreUnavailable` on a read-only file and `InvalidFormat` if
    /// raw data already exists.
    pub fn create_clustered_raw(&mut self, layout: ClusteredLayout) -> Result<&Raw> {
        self.require_writable("create raw")?;
        self.require_no_raw()?;
        Ok(self.raw.insert(Raw::create_clustered(&self.h5, layout)?))
    }

    /// Allocates dense raw storage.
    ///
    /// # Errors
    /// Returns `StoreUnavailable` on a read-only file and `InvalidFormat` if
    /// raw data already exists.
    pub fn create_dense_raw(&mut self, shape: RasterShape) -> Result<&Raw> {
        self.require_writable("create raw")?;
        self.require_no_raw()?;
        Ok(self.raw.insert(Raw::create_dense(&self.h5, shape)?))
    }

    fn require_no_raw(&self) -> Result<()> {
        match &self.raw {
            Some(raw) => Err(Error::InvalidFormat(format!(
                "{} already holds {} raw data",
                self.path.display(),
                raw.kind()
            ))),
            None => Ok(()),
        }
    }

    /// Number of raw events, zero without a raw source.
    ///
    /// # Errors
    /// Returns an error if the raw source cannot be read.
    pub fn event_count(&self) -> Result<u64> {
        self.raw.as_ref().map_or(Ok(0), RawSource::event_count)
    }

    /// # Errors
    /// Returns `NotFound` without a raw source, `OutOfRange` past the end.
    pub fn get_event(&self, index: u64) -> Result<Event> {
        self.require_raw()?.get_event(index)
    }

    /// # Errors
    /// Returns `StoreUnavailable` on a read-only file, or the raw source's
    /// own error.
    pub fn write_event(&self, index: u64, event: &Event) -> Result<()> {
        self.require_writable("write event")?;
        self.require_raw()?.write_event(index, event)
    }

    /// Names of stored analyses.
    ///
    /// # Errors
    /// Returns an error if HDF5 I/O fails.
    pub fn analyses(&self) -> Result<Vec<String>> {
        match child_group(&self.h5, ANALYSES_GROUP)? {
            Some(group) => Ok(group.member_names()?),
            None => Ok(Vec::new()),
        }
    }

    /// Creates analysis `name` with the engine's default parameters and
    /// makes it active.
    ///
    /// # Errors
    /// Returns `StoreUnavailable` on a read-only file, or an error if the
    /// analysis exists.
    pub fn create_analysis(&mut self, name: &str) -> Result<&mut Analysis> {
        self.require_writable("create analysis")?;
        self.save()?;
        self.analysis = None;
        let parent = require_group(&self.h5, ANALYSES_GROUP)?;
        let analysis = Analysis::create(
            &parent,
            name,
            self.event_count()?,
            self.engine.default_parameters(),
        )?;
        Ok(self.analysis.insert(analysis))
    }

    /// Activates analysis `name`, saving the previous one. A missing
    /// analysis is created when the file is writable.
    ///
    /// # Errors
    /// Returns `NotFound` for a missing analysis on a read-only file.
    pub fn load_analysis(&mut self, name: &str) -> Result<&mut Analysis> {
        if self.analysis.as_ref().is_some_and(|a| a.name() == name) {
            return self
                .analysis
                .as_mut()
                .ok_or_else(|| Error::NotFound(name.to_string()));
        }
        if !self.analyses()?.iter().any(|a| a == name) {
            if self.is_writable() {
                return self.create_analysis(name);
            }
            return Err(Error::NotFound(format!("analysis '{name}'")));
        }
        self.save()?;
        self.analysis = None;
        let parent = self.h5.group(ANALYSES_GROUP)?;
        let analysis = Analysis::open(&parent, name, self.event_count()?)?;
        Ok(self.analysis.insert(analysis))
    }

    /// Removes analysis `name`, deactivating it without saving if active.
    ///
    /// # Errors
    /// Returns `StoreUnavailable` on a read-only file and `NotFound` for a
    /// missing analysis.
    pub fn delete_analysis(&mut self, name: &str) -> Result<()> {
        self.require_writable("delete analysis")?;
        let parent = child_group(&self.h5, ANALYSES_GROUP)?
            .filter(|g| g.link_exists(name))
            .ok_or_else(|| Error::NotFound(format!("analysis '{name}'")))?;
        if self.analysis.as_ref().is_some_and(|a| a.name() == name) {
            self.analysis = None;
        }
        parent.unlink(name)?;
        log::debug!("deleted analysis '{name}'");
        Ok(())
    }

    #[must_use]
    pub fn current_analysis(&self) -> Option<&Analysis> {
        self.analysis.as_ref()
    }

    fn require_analysis(&mut self) -> Result<&mut Analysis> {
        self.analysis
            .as_mut()
            .ok_or_else(|| Error::NotFound("no active analysis".to_string()))
    }

    /// Sets the active analysis' parameters; returns false when they are
    /// already frozen.
    ///
    /// # Errors
    /// Returns `StoreUnavailable` on a read-only file and `NotFound` without
    /// an active analysis.
    pub fn set_parameters(&mut self, params: Settings) -> Result<bool> {
        self.require_writable("set parameters")?;
        Ok(self.require_analysis()?.set_parameters(params))
    }

    /// Analyzes event `index` with the active analysis.
    ///
    /// # Errors
    /// Returns `StoreUnavailable` on a read-only file, `NotFound` without raw
    /// data or an active analysis, `OutOfRange` past the end.
    pub fn analyze_event(&mut self, index: u64) -> Result<()> {
        self.require_writable("analyze")?;
        let event = self.get_event(index)?;
        let total = self.event_count()?;
        let engine = self.engine.as_ref();
        let analysis = self
            .analysis
            .as_mut()
            .ok_or_else(|| Error::NotFound("no active analysis".to_string()))?;
        analysis.ensure_capacity(total)?;
        analysis.analyze_event(index, &event, engine)
    }

    /// Metrics of event `index`; stored when analyzed, computed otherwise.
    ///
    /// # Errors
    /// Returns `NotFound` without raw data or an active analysis.
    pub fn gather_metrics(&self, index: u64) -> Result<MetricSet> {
        let analysis = self
            .analysis
            .as_ref()
            .ok_or_else(|| Error::NotFound("no active analysis".to_string()))?;
        let event = self.get_event(index)?;
        Ok(analysis.gather_metrics(index, &event, self.engine.as_ref()))
    }

    /// Metric names of the active analysis.
    #[must_use]
    pub fn metrics(&self) -> Vec<String> {
        self.analysis
            .as_ref()
            .map(Analysis::metric_names)
            .unwrap_or_default()
    }

    /// Metric `name` of the active analysis, limited to analyzed events.
    #[must_use]
    pub fn metric(&self, name: &str) -> Option<Metric> {
        self.analysis.as_ref().and_then(|a| a.metric(name))
    }

    /// Analyzes every event past the active analysis' high-water mark.
    ///
    /// `progress` is called at most once per `cadence` and once at the end.
    /// Setting `cancel` stops the loop between events. Events whose raw data
    /// cannot be read are skipped. Returns the number of events analyzed.
    ///
    /// # Errors
    /// Returns `StoreUnavailable` on a read-only file, `NotFound` without raw
    /// data or an active analysis.
    pub fn analyze_pending<F>(&mut self, cancel: &AtomicBool, cadence: Duration, mut progress: F) -> Result<u64>
    where
        F: FnMut(&AnalysisProgress),
    {
        self.require_writable("analyze")?;
        let total = self.event_count()?;
        let raw = self
            .raw
            .as_ref()
            .ok_or_else(|| Error::NotFound(format!("raw data in {}", self.path.display())))?;
        let engine = self.engine.as_ref();
        let analysis = self
            .analysis
            .as_mut()
            .ok_or_else(|| Error::NotFound("no active analysis".to_string()))?;
        analysis.ensure_capacity(total)?;

        let start = Instant::now();
        let mut last_report = start;
        let mut analyzed = 0;
        for index in analysis.num_analyzed()..total {
            if cancel.load(Ordering::Relaxed) {
                log::debug!("analysis '{}' cancelled at event {index}", analysis.name());
                break;
            }
            let event = match raw.get_event(index) {
                Ok(event) => event,
                Err(e) => {
                    log::warn!("skipping event {index}: {e}");
                    continue;
                }
            };
            analysis.analyze_event(index, &event, engine)?;
            analyzed += 1;
            if last_report.elapsed() >= cadence {
                last_report = Instant::now();
                progress(&AnalysisProgress {
                    done: analysis.num_analyzed(),
                    total,
                    analyzed,
                    elapsed: start.elapsed(),
                });
            }
        }
        progress(&AnalysisProgress {
            done: analysis.num_analyzed(),
            total,
            analyzed,
            elapsed: start.elapsed(),
        });
        analysis.save()?;
        Ok(analyzed)
    }

    /// Saves the active analysis and flushes the file. No-op when read-only.
    ///
    /// # Errors
    /// Returns an error if HDF5 I/O fails.
    pub fn save(&self) -> Result<()> {
        if !self.is_writable() {
            return Ok(());
        }
        if let Some(analysis) = &self.analysis {
            analysis.save()?;
        }
        self.h5.flush()?;
        Ok(())
    }
}

impl Drop for File {
    fn drop(&mut self) {
        if let Err(e) = self.save() {
            log::error!("failed to save {}: {e}", self.path.display());
        }
    }
}
