//! Per-event strip × timebin planes.

use crate::eventlet::{Eventlet, TIMEBIN_BITS};
use crate::{Error, Result};
use ndarray::Array2;
use std::collections::BTreeMap;

/// Sparse strip → timebin → amplitude map for one readout plane of one event.
///
/// Zero amplitudes are never stored, so a plane built from a dense matrix
/// and one built from eventlets compare equal when they carry the same hits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plane {
    strips: BTreeMap<u16, BTreeMap<u16, i16>>,
}

impl Plane {
    /// Creates an empty plane.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the amplitude at `(strip, timebin)`. A zero amplitude clears it.
    pub fn set(&mut self, strip: u16, timebin: u16, adc: i16) {
        if adc == 0 {
            if let Some(bins) = self.strips.get_mut(&strip) {
                bins.remove(&timebin);
                if bins.is_empty() {
                    self.strips.remove(&strip);
                }
            }
            return;
        }
        self.strips.entry(strip).or_default().insert(timebin, adc);
    }

    /// Amplitude at `(strip, timebin)`, zero when unset.
    #[must_use]
    pub fn get(&self, strip: u16, timebin: u16) -> i16 {
        self.strips
            .get(&strip)
            .and_then(|bins| bins.get(&timebin))
            .copied()
            .unwrap_or(0)
    }

    /// Returns true if the plane holds no hits.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.strips.is_empty()
    }

    /// Number of non-zero points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.strips.values().map(BTreeMap::len).sum()
    }

    /// Iterates `(strip, timebin, adc)` in strip-major order.
    pub fn points(&self) -> impl Iterator<Item = (u16, u16, i16)> + '_ {
        self.strips
            .iter()
            .flat_map(|(&s, bins)| bins.iter().map(move |(&t, &v)| (s, t, v)))
    }

    /// Iterates strips that carry at least one hit.
    pub fn strips(&self) -> impl Iterator<Item = u16> + '_ {
        self.strips.keys().copied()
    }

    /// Lowest and highest hit strip.
    #[must_use]
    pub fn strip_bounds(&self) -> Option<(u16, u16)> {
        let first = *self.strips.keys().next()?;
        let last = *self.strips.keys().next_back()?;
        Some((first, last))
    }

    /// Earliest and latest hit timebin.
    #[must_use]
    pub fn timebin_bounds(&self) -> Option<(u16, u16)> {
        let mut bounds: Option<(u16, u16)> = None;
        for bins in self.strips.values() {
            let (Some(&lo), Some(&hi)) = (bins.keys().next(), bins.keys().next_back()) else {
                continue;
            };
            bounds = Some(match bounds {
                None => (lo, hi),
                Some((a, b)) => (a.min(lo), b.max(hi)),
            });
        }
        bounds
    }

    /// Sum of all amplitudes.
    #[must_use]
    pub fn integral(&self) -> i64 {
        self.points().map(|(_, _, v)| i64::from(v)).sum()
    }

    /// Builds a plane from a dense `[strips, timebins]` matrix.
    #[must_use]
    pub fn from_matrix(matrix: &Array2<i16>) -> Self {
        let mut plane = Self::new();
        for ((s, t), &v) in matrix.indexed_iter() {
            if v != 0 {
                plane.set(s as u16, t as u16, v);
            }
        }
        plane
    }

    /// Renders into a dense `[strips, timebins]` matrix. Points outside the
    /// shape are dropped.
    #[must_use]
    pub fn to_matrix(&self, strips: usize, timebins: usize) -> Array2<i16> {
        let mut matrix = Array2::zeros((strips, timebins));
        for (s, t, v) in self.points() {
            let (s, t) = (usize::from(s), usize::from(t));
            if s < strips && t < timebins {
                matrix[[s, t]] = v;
            }
        }
        matrix
    }

    /// Builds a plane from hits, binning time by its low 8 bits.
    ///
    /// Later hits in the same cell overwrite earlier ones.
    #[must_use]
    pub fn from_eventlets<'a, I>(eventlets: I) -> Self
    where
        I: IntoIterator<Item = &'a Eventlet>,
    {
        let mut plane = Self::new();
        for e in eventlets {
            plane.set(e.strip, e.timebin(), e.adc as i16);
        }
        plane
    }

    /// Expands into hits stamped `event_index << 8 | timebin`.
    #[must_use]
    pub fn to_eventlets(&self, event_index: u64, plane: u8) -> Vec<Eventlet> {
        let base = event_index << TIMEBIN_BITS;
        self.points()
            .map(|(strip, timebin, adc)| {
                Eventlet::new(base | u64::from(timebin & 0xFF), plane, strip, adc as u16)
            })
            .collect()
    }
}

/// Raw data of one event: the X plane and the Y plane.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Event {
    /// Plane 0.
    pub x: Plane,
    /// Plane 1.
    pub y: Plane,
}

impl Event {
    /// Creates an event from its two planes.
    #[must_use]
    pub fn new(x: Plane, y: Plane) -> Self {
        Self { x, y }
    }

    /// Returns the plane with the given index.
    ///
    /// # Errors
    /// Returns an error for indices other than 0 and 1.
    pub fn plane(&self, index: usize) -> Result<&Plane> {
        match index {
            0 => Ok(&self.x),
            1 => Ok(&self.y),
            other => Err(Error::InvalidPlane(other)),
        }
    }

    /// Returns true if neither plane holds hits.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.x.is_empty() && self.y.is_empty()
    }
}
