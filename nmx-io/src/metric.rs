//! One persisted metric array with its running summary.

use crate::store::{
    create_extendable_vec, read_attr_opt, read_attr_opt_string, set_attr, set_attr_str, write_vec,
};
use crate::Result;
use hdf5::Group;
use std::collections::BTreeMap;

const HISTOGRAM_TARGET_BINS: f64 = 100.0;

/// Per-event values of one metric plus min/max/sum over written entries.
#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    pub description: String,
    pub min: f64,
    pub max: f64,
    pub sum: f64,
    pub data: Vec<f64>,
}

impl Metric {
    /// A zero-filled metric of `len` entries with an empty summary.
    #[must_use]
    pub fn new(len: usize, description: &str) -> Self {
        Self {
            description: description.to_string(),
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            sum: 0.0,
            data: vec![0.0; len],
        }
    }

    /// True until a value has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.min > self.max
    }

    /// Writes `value` at `index`, growing the array if needed. Overwrites
    /// correct the sum; min and max only widen.
    pub fn set(&mut self, index: usize, value: f64) {
        if index >= self.data.len() {
            self.data.resize(index + 1, 0.0);
        }
        self.sum += value - self.data[index];
        self.data[index] = value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<f64> {
        self.data.get(index).copied()
    }

    /// Grows the array to `len` entries. Never shrinks.
    pub fn ensure_len(&mut self, len: usize) {
        if len > self.data.len() {
            self.data.resize(len, 0.0);
        }
    }

    /// Copy limited to the first `len` entries.
    #[must_use]
    pub fn truncated(&self, len: usize) -> Metric {
        let mut m = self.clone();
        m.data.truncate(len);
        m
    }

    /// Suggested histogram bin width: 1 for narrow ranges, otherwise about
    /// a hundredth of the range.
    #[must_use]
    pub fn normalizer(&self) -> f64 {
        if self.is_empty() {
            return 1.0;
        }
        let range = self.max - self.min;
        if range <= HISTOGRAM_TARGET_BINS {
            1.0
        } else {
            range / HISTOGRAM_TARGET_BINS
        }
    }

    /// Counts values per bin of width `norm`, keyed by `floor(value / norm)`.
    /// Non-finite values are skipped.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn make_histogram(&self, norm: f64) -> BTreeMap<i64, u64> {
        let norm = if norm > 0.0 { norm } else { 1.0 };
        let mut hist = BTreeMap::new();
        for v in self.data.iter().filter(|v| v.is_finite()) {
            *hist.entry((v / norm).floor() as i64).or_insert(0) += 1;
        }
        hist
    }

    /// Loads dataset `name` of `group` with its summary attributes.
    ///
    /// # Errors
    /// Returns an error if HDF5 I/O fails.
    pub fn load(group: &Group, name: &str) -> Result<Self> {
        let dataset = group.dataset(name)?;
        let data = dataset.read_raw::<f64>()?;
        Ok(Self {
            description: read_attr_opt_string(&dataset, "description")?.unwrap_or_default(),
            min: read_attr_opt::<f64>(&dataset, "min")?.unwrap_or(f64::INFINITY),
            max: read_attr_opt::<f64>(&dataset, "max")?.unwrap_or(f64::NEG_INFINITY),
            sum: read_attr_opt::<f64>(&dataset, "sum")?.unwrap_or(0.0),
            data,
        })
    }

    /// Writes the array and summary as dataset `name` of `group`.
    ///
    /// # Errors
    /// Returns an error if HDF5 I/O fails.
    pub fn save(&self, group: &Group, name: &str) -> Result<()> {
        let dataset = if group.link_exists(name) {
            group.dataset(name)?
        } else {
            create_extendable_vec::<f64>(group, name, self.data.len().clamp(1, 4096))?
        };
        write_vec(&dataset, &self.data)?;
        set_attr_str(&dataset, "description", &self.description)?;
        set_attr(&dataset, "min", &self.min)?;
        set_attr(&dataset, "max", &self.max)?;
        set_attr(&dataset, "sum", &self.sum)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use tempfile::NamedTempFile;

    #[test]
    fn test_summary_tracks_writes() {
        let mut m = Metric::new(4, "width");
        assert!(m.is_empty());
        m.set(0, 3.0);
        m.set(2, -1.0);
        m.set(0, 5.0);
        assert_relative_eq!(m.sum, 4.0);
        assert_relative_eq!(m.min, -1.0);
        assert_relative_eq!(m.max, 5.0);
        m.set(6, 1.0);
        assert_eq!(m.data.len(), 7);
    }

    #[test]
    fn test_histogram() {
        let mut m = Metric::new(0, "");
        for (i, v) in [0.5, 1.5, 1.7, 250.0].into_iter().enumerate() {
            m.set(i, v);
        }
        let norm = m.normalizer();
        assert_relative_eq!(norm, 2.495);
        let hist = m.make_histogram(1.0);
        assert_eq!(hist.get(&1), Some(&2));
        assert_eq!(hist.values().sum::<u64>(), 4);
    }

    #[test]
    fn test_save_and_load() {
        let tmp = NamedTempFile::new().unwrap();
        let file = hdf5::File::create(tmp.path()).unwrap();
        let mut m = Metric::new(3, "strip span");
        m.set(1, 7.0);
        m.save(&file, "x_strip_span").unwrap();
        m.set(2, 9.0);
        m.save(&file, "x_strip_span").unwrap();

        let loaded = Metric::load(&file, "x_strip_span").unwrap();
        assert_eq!(loaded, m);
    }
}
