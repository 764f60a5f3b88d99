//! Cached per-event metrics for one named analysis.
//!
//! Layout of an analysis group:
//!
//! ```text
//! <name>/                 attr num_analyzed: u32
//!   parameters/<setting>  attrs kind, value, description
//!   <metric>              f64 [max_events], attrs description, min, max, sum
//! ```

use crate::metric::Metric;
use crate::raw_log::to_usize;
use crate::store::{
    child_group, read_attr_opt, read_attr_opt_string, set_attr, set_attr_str, to_var_len_unicode,
};
use crate::{Error, Result};
use hdf5::types::VarLenUnicode;
use hdf5::Group;
use nmx_core::{Event, MetricEngine, MetricSet, Setting, SettingValue, Settings};
use std::collections::BTreeMap;

const NUM_ANALYZED_ATTR: &str = "num_analyzed";
const PARAMETERS_GROUP: &str = "parameters";

/// One analysis: frozen parameters, a high-water mark and metric arrays.
///
/// Metric values live in memory until [`save`](Self::save).
#[derive(Debug)]
pub struct Analysis {
    group: Group,
    name: String,
    max_events: u64,
    num_analyzed: u64,
    params: Settings,
    metrics: BTreeMap<String, Metric>,
}

impl Analysis {
    /// Creates group `name` under `parent` with the given parameters.
    ///
    /// # Errors
    /// Returns an error if the group exists or cannot be created.
    pub fn create(parent: &Group, name: &str, max_events: u64, params: Settings) -> Result<Self> {
        if parent.link_exists(name) {
            return Err(Error::InvalidFormat(format!("analysis '{name}' already exists")));
        }
        let group = parent.create_group(name)?;
        let analysis = Self {
            group,
            name: name.to_string(),
            max_events,
            num_analyzed: 0,
            params,
            metrics: BTreeMap::new(),
        };
        analysis.save()?;
        log::debug!("created analysis '{name}' for {max_events} events");
        Ok(analysis)
    }

    /// Loads group `name` under `parent`, growing metric arrays to
    /// `max_events` if the raw source has grown.
    ///
    /// # Errors
    /// Returns `NotFound` if the group does not exist.
    pub fn open(parent: &Group, name: &str, max_events: u64) -> Result<Self> {
        let group = child_group(parent, name)?
            .ok_or_else(|| Error::NotFound(format!("analysis '{name}'")))?;
        let num_analyzed = u64::from(read_attr_opt::<u32>(&group, NUM_ANALYZED_ATTR)?.unwrap_or(0));
        let params = match child_group(&group, PARAMETERS_GROUP)? {
            Some(g) => load_parameters(&g)?,
            None => Settings::new(),
        };

        let len = to_usize(max_events)?;
        let mut metrics = BTreeMap::new();
        for member in group.member_names()? {
            if member == PARAMETERS_GROUP || group.group(&member).is_ok() {
                continue;
            }
            let mut metric = Metric::load(&group, &member)?;
            metric.ensure_len(len);
            metrics.insert(member, metric);
        }
        log::debug!(
            "loaded analysis '{name}': {num_analyzed} analyzed, {} metrics",
            metrics.len()
        );
        Ok(Self {
            group,
            name: name.to_string(),
            max_events: max_events.max(num_analyzed),
            num_analyzed,
            params,
            metrics,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Events `[0, num_analyzed)` have stored metrics.
    #[must_use]
    pub fn num_analyzed(&self) -> u64 {
        self.num_analyzed
    }

    #[must_use]
    pub fn max_events(&self) -> u64 {
        self.max_events
    }

    /// Grows capacity to `max_events`. Never shrinks.
    ///
    /// # Errors
    /// Returns an error if the count does not fit in memory.
    pub fn ensure_capacity(&mut self, max_events: u64) -> Result<()> {
        if max_events > self.max_events {
            let len = to_usize(max_events)?;
            for metric in self.metrics.values_mut() {
                metric.ensure_len(len);
            }
            self.max_events = max_events;
        }
        Ok(())
    }

    #[must_use]
    pub fn parameters(&self) -> &Settings {
        &self.params
    }

    /// Replaces the parameters. Ignored once any event has been analyzed;
    /// returns whether the parameters were applied.
    pub fn set_parameters(&mut self, params: Settings) -> bool {
        if self.num_analyzed > 0 {
            log::warn!(
                "analysis '{}' already has {} events; parameters left unchanged",
                self.name,
                self.num_analyzed
            );
            return false;
        }
        self.params = params;
        true
    }

    /// Computes metrics for event `index` and stores them.
    ///
    /// # Errors
    /// Returns `OutOfRange` if `index >= max_events()`.
    pub fn analyze_event(&mut self, index: u64, event: &Event, engine: &dyn MetricEngine) -> Result<()> {
        if index >= self.max_events {
            return Err(Error::OutOfRange {
                index,
                len: self.max_events,
            });
        }
        let i = to_usize(index)?;
        let len = to_usize(self.max_events)?;
        let values = engine.compute(event, &self.params);
        for (name, value) in values.iter() {
            self.metrics
                .entry(name.to_string())
                .or_insert_with(|| Metric::new(len, &value.description))
                .set(i, value.value);
        }
        self.num_analyzed = self.num_analyzed.max(index + 1);
        Ok(())
    }

    /// Metrics of event `index`: stored values when already analyzed,
    /// otherwise computed without being stored.
    pub fn gather_metrics(&self, index: u64, event: &Event, engine: &dyn MetricEngine) -> MetricSet {
        if index >= self.num_analyzed {
            return engine.compute(event, &self.params);
        }
        let mut set = MetricSet::new();
        let Ok(i) = to_usize(index) else {
            return set;
        };
        for (name, metric) in &self.metrics {
            if let Some(v) = metric.get(i) {
                set.set(name, v, &metric.description);
            }
        }
        set
    }

    /// Names of metrics seen so far.
    #[must_use]
    pub fn metric_names(&self) -> Vec<String> {
        self.metrics.keys().cloned().collect()
    }

    /// Metric `name` limited to analyzed events.
    #[must_use]
    pub fn metric(&self, name: &str) -> Option<Metric> {
        let len = usize::try_from(self.num_analyzed).unwrap_or(usize::MAX);
        self.metrics.get(name).map(|m| m.truncated(len))
    }

    /// Persists the high-water mark, parameters and every metric array.
    ///
    /// # Errors
    /// Returns an error if HDF5 I/O fails.
    pub fn save(&self) -> Result<()> {
        let num = u32::try_from(self.num_analyzed).map_err(|_| {
            Error::InvalidFormat(format!("{} analyzed events exceed u32", self.num_analyzed))
        })?;
        set_attr(&self.group, NUM_ANALYZED_ATTR, &num)?;

        if self.group.link_exists(PARAMETERS_GROUP) {
            self.group.unlink(PARAMETERS_GROUP)?;
        }
        let params = self.group.create_group(PARAMETERS_GROUP)?;
        save_parameters(&params, &self.params)?;

        for (name, metric) in &self.metrics {
            metric.save(&self.group, name)?;
        }
        Ok(())
    }
}

fn save_parameters(group: &Group, params: &Settings) -> Result<()> {
    for (name, setting) in params.iter() {
        let g = group.create_group(name)?;
        set_attr_str(&g, "kind", setting.value.kind())?;
        set_attr_str(&g, "description", &setting.description)?;
        match &setting.value {
            SettingValue::Bool(v) => set_attr(&g, "value", &u8::from(*v))?,
            SettingValue::Int(v) => set_attr(&g, "value", v)?,
            SettingValue::Float(v) => set_attr(&g, "value", v)?,
            SettingValue::Text(v) => set_attr(&g, "value", &to_var_len_unicode(v)?)?,
        }
    }
    Ok(())
}

fn load_parameters(group: &Group) -> Result<Settings> {
    let mut params = Settings::new();
    for name in group.member_names()? {
        let g = group.group(&name)?;
        let kind = read_attr_opt_string(&g, "kind")?.unwrap_or_default();
        let value = match kind.as_str() {
            "bool" => read_attr_opt::<u8>(&g, "value")?.map(|v| SettingValue::Bool(v != 0)),
            "int" => read_attr_opt::<i64>(&g, "value")?.map(SettingValue::Int),
            "float" => read_attr_opt::<f64>(&g, "value")?.map(SettingValue::Float),
            "text" => read_attr_opt::<VarLenUnicode>(&g, "value")?
                .map(|v| SettingValue::Text(v.to_string())),
            other => {
                log::warn!("parameter '{name}' has unknown kind '{other}', skipped");
                None
            }
        };
        if let Some(value) = value {
            let description = read_attr_opt_string(&g, "description")?.unwrap_or_default();
            params.insert(&name, Setting { value, description });
        }
    }
    Ok(params)
}
