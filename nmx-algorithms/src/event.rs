//! Assembled events produced by the clusterer.

use nmx_core::Eventlet;
use std::collections::BTreeSet;

/// Eventlets of one plane of an assembled event, with running sums and the
/// entry-point estimate computed by [`SimplePlane::analyze`].
#[derive(Debug, Clone)]
pub struct SimplePlane {
    /// Eventlets in this plane.
    pub entries: Vec<Eventlet>,
    pub time_start: u64,
    pub time_end: u64,
    pub strip_start: u16,
    pub strip_end: u16,
    /// Sum of amplitudes.
    pub integral: f64,
    pub time_sum: f64,
    pub time_wsum: f64,
    /// Entry strip estimate.
    pub center: f64,
    /// Strip span of the latest timebin.
    pub uncert_lower: i32,
    /// Strip span across the latest few timebins.
    pub uncert_upper: i32,
    /// Percentage of strips within the span that were hit.
    pub density: f64,
}

impl Default for SimplePlane {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            time_start: 0,
            time_end: 0,
            strip_start: 0,
            strip_end: 0,
            integral: 0.0,
            time_sum: 0.0,
            time_wsum: 0.0,
            center: f64::NAN,
            uncert_lower: -1,
            uncert_upper: -1,
            density: 0.0,
        }
    }
}

impl SimplePlane {
    /// Adds an eventlet. Zero-amplitude eventlets are ignored.
    #[allow(clippy::cast_precision_loss)]
    pub fn insert_eventlet(&mut self, e: Eventlet) {
        if e.adc == 0 {
            return;
        }
        if self.entries.is_empty() {
            self.time_start = e.time;
            self.time_end = e.time;
            self.strip_start = e.strip;
            self.strip_end = e.strip;
        }
        self.integral += f64::from(e.adc);
        self.time_sum += e.time as f64;
        self.time_wsum += f64::from(e.adc) * e.time as f64;

        self.time_start = self.time_start.min(e.time);
        self.time_end = self.time_end.max(e.time);
        self.strip_start = self.strip_start.min(e.strip);
        self.strip_end = self.strip_end.max(e.strip);
        self.entries.push(e);
    }

    /// Estimates the particle entry strip.
    ///
    /// `center` is the (optionally amplitude-weighted) mean strip of the
    /// latest timebin. `uncert_upper` looks back over at most
    /// `max_timebins` distinct timebins no more than `max_timedif` before
    /// the latest one.
    pub fn analyze(&mut self, weighted: bool, max_timebins: u16, max_timedif: u16) {
        if self.entries.is_empty() {
            return;
        }
        self.entries.sort_by_key(|e| e.time);

        let mut center_sum = 0.0;
        let mut center_count = 0.0;
        let mut lspan = (i32::MAX, i32::MIN);
        let mut uspan = (i32::MAX, i32::MIN);
        let earliest = self
            .time_start
            .max(self.time_end.saturating_sub(u64::from(max_timedif)));
        let mut timebins = BTreeSet::new();
        let mut collecting_upper = true;

        for e in self.entries.iter().rev() {
            let strip = i32::from(e.strip);
            if e.time == self.time_end {
                if weighted {
                    center_sum += f64::from(e.strip) * f64::from(e.adc);
                    center_count += f64::from(e.adc);
                } else {
                    center_sum += f64::from(e.strip);
                    center_count += 1.0;
                }
                lspan = (lspan.0.min(strip), lspan.1.max(strip));
            }
            if !collecting_upper {
                continue;
            }
            if e.time >= earliest
                && (timebins.len() < usize::from(max_timebins) || timebins.contains(&e.time))
            {
                timebins.insert(e.time);
                uspan = (uspan.0.min(strip), uspan.1.max(strip));
            } else {
                collecting_upper = false;
            }
        }

        self.center = center_sum / center_count;
        self.uncert_lower = lspan.1 - lspan.0 + 1;
        self.uncert_upper = if uspan.0 <= uspan.1 {
            uspan.1 - uspan.0 + 1
        } else {
            -1
        };

        let strips: BTreeSet<u16> = self.entries.iter().map(|e| e.strip).collect();
        let span = f64::from(self.strip_end - self.strip_start) + 1.0;
        #[allow(clippy::cast_precision_loss)]
        let hit = strips.len() as f64;
        self.density = hit / span * 100.0;
    }

    /// Unweighted mean time.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn time_avg(&self) -> f64 {
        self.time_sum / self.entries.len() as f64
    }

    /// Amplitude-weighted mean time.
    #[must_use]
    pub fn time_center(&self) -> f64 {
        self.time_wsum / self.integral
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A fully assembled event: correlated clusters partitioned by plane.
#[derive(Debug, Clone, Default)]
pub struct SimpleEvent {
    pub x: SimplePlane,
    pub y: SimplePlane,
    good: bool,
}

impl SimpleEvent {
    /// Assembles an event, routing plane 0 eventlets to X and all others to Y.
    #[must_use]
    pub fn from_eventlets<I: IntoIterator<Item = Eventlet>>(eventlets: I) -> Self {
        let mut event = Self::default();
        for e in eventlets {
            event.insert_eventlet(e);
        }
        event
    }

    pub fn insert_eventlet(&mut self, e: Eventlet) {
        if e.plane == 0 {
            self.x.insert_eventlet(e);
        } else {
            self.y.insert_eventlet(e);
        }
    }

    /// Runs [`SimplePlane::analyze`] on both planes and marks the event good
    /// when both planes have entries.
    pub fn analyze(&mut self, weighted: bool, max_timebins: u16, max_timedif: u16) {
        self.x.analyze(weighted, max_timebins, max_timedif);
        self.y.analyze(weighted, max_timebins, max_timedif);
        self.good = !self.x.is_empty() && !self.y.is_empty();
    }

    /// True once analyzed with entries in both planes.
    #[must_use]
    pub fn good(&self) -> bool {
        self.good
    }

    /// Earliest timestamp across both planes.
    #[must_use]
    pub fn time_start(&self) -> u64 {
        match (self.x.is_empty(), self.y.is_empty()) {
            (false, false) => self.x.time_start.min(self.y.time_start),
            (false, true) => self.x.time_start,
            (true, false) => self.y.time_start,
            (true, true) => 0,
        }
    }

    /// Total number of eventlets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.x.entries.len() + self.y.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.x.is_empty() && self.y.is_empty()
    }
}
