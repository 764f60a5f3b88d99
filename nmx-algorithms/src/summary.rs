//! Default metric engine: per-plane amplitude and extent summaries.

use nmx_core::{Event, MetricEngine, MetricSet, Plane, Settings};

/// Summarizes each plane of an event.
///
/// Produces `x_*` and `y_*` metrics (`integral`, `hits`, `strip_span`,
/// `timebin_span`, `center`) plus `total_integral`. An empty plane reports
/// zeros and a center of -1.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaneSummary;

impl PlaneSummary {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    #[allow(clippy::cast_precision_loss)]
    fn plane_metrics(plane: &Plane, weighted: bool) -> MetricSet {
        let mut m = MetricSet::new();
        m.set("integral", plane.integral() as f64, "sum of amplitudes");
        m.set("hits", plane.len() as f64, "number of non-zero points");

        let strip_span = plane
            .strip_bounds()
            .map_or(0.0, |(lo, hi)| f64::from(hi - lo) + 1.0);
        m.set("strip_span", strip_span, "strips between first and last hit");

        let timebin_span = plane
            .timebin_bounds()
            .map_or(0.0, |(lo, hi)| f64::from(hi - lo) + 1.0);
        m.set("timebin_span", timebin_span, "timebins between first and last hit");

        m.set(
            "center",
            latest_center(plane, weighted),
            "mean strip of the latest timebin",
        );
        m
    }
}

fn latest_center(plane: &Plane, weighted: bool) -> f64 {
    let Some((_, latest)) = plane.timebin_bounds() else {
        return -1.0;
    };
    let (mut sum, mut norm) = (0.0, 0.0);
    for (strip, timebin, adc) in plane.points() {
        if timebin != latest {
            continue;
        }
        let w = if weighted { f64::from(adc) } else { 1.0 };
        sum += f64::from(strip) * w;
        norm += w;
    }
    if norm == 0.0 {
        -1.0
    } else {
        sum / norm
    }
}

impl MetricEngine for PlaneSummary {
    fn default_parameters(&self) -> Settings {
        let mut params = Settings::new();
        params.set("weighted", true, "weight strip center by amplitude");
        params
    }

    #[allow(clippy::cast_precision_loss)]
    fn compute(&self, event: &Event, params: &Settings) -> MetricSet {
        let weighted = params.get_bool("weighted").unwrap_or(true);
        let mut all = MetricSet::new();
        all.merge(&Self::plane_metrics(&event.x, weighted), "x_");
        all.merge(&Self::plane_metrics(&event.y, weighted), "y_");
        all.set(
            "total_integral",
            (event.x.integral() + event.y.integral()) as f64,
            "sum of amplitudes in both planes",
        );
        all
    }
}
