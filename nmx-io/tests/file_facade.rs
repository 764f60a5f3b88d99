use nmx_core::{Event, Eventlet, MetricEngine, MetricSet, Plane, Settings};
use nmx_io::{
    Access, ClusteredLayout, ClusteredRaw, Error, File, RasterShape, RawSource, CLUSTERED_GROUP,
};
use std::cell::Cell;
use std::rc::Rc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;
use tempfile::tempdir;

fn event(strip: u16, adc: i16) -> Event {
    let mut x = Plane::new();
    x.set(strip, 3, adc);
    x.set(strip + 1, 4, adc / 2);
    let mut y = Plane::new();
    y.set(strip * 2, 3, adc);
    Event::new(x, y)
}

struct Counting {
    calls: Rc<Cell<usize>>,
}

impl MetricEngine for Counting {
    fn default_parameters(&self) -> Settings {
        Settings::new()
    }

    #[allow(clippy::cast_precision_loss)]
    fn compute(&self, event: &Event, _params: &Settings) -> MetricSet {
        self.calls.set(self.calls.get() + 1);
        let mut m = MetricSet::new();
        m.set("x_integral", event.x.integral() as f64, "");
        m
    }
}

#[test]
fn test_clustered_file_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("run.h5");
    {
        let mut file = File::open(&path, Access::Create).unwrap();
        file.create_clustered_raw(ClusteredLayout::default()).unwrap();
        for i in 0..3 {
            file.write_event(i, &event(10 + i as u16, 100)).unwrap();
        }
    }
    let file = File::open(&path, Access::ReadOnly).unwrap();
    assert_eq!(file.raw().unwrap().kind(), "clustered");
    assert_eq!(file.event_count().unwrap(), 3);
    assert_eq!(file.get_event(2).unwrap(), event(12, 100));
}

#[test]
fn test_orphaned_log_tail_is_ignored() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("crash.h5");
    {
        let mut file = File::open(&path, Access::Create).unwrap();
        file.create_clustered_raw(ClusteredLayout::default()).unwrap();
        file.write_event(0, &event(5, 40)).unwrap();
    }
    {
        // Records appended without an index row, as after an interrupted write.
        let h5 = hdf5::File::open_rw(&path).unwrap();
        let raw = ClusteredRaw::open(&h5.group(CLUSTERED_GROUP).unwrap()).unwrap();
        raw.log()
            .append_batch(&[Eventlet::new(1, 0, 99, 7), Eventlet::new(2, 1, 98, 7)])
            .unwrap();
        assert_eq!(raw.event_count().unwrap(), 1);
    }
    let file = File::open(&path, Access::ReadWrite).unwrap();
    assert_eq!(file.event_count().unwrap(), 1);
    file.write_event(1, &event(20, 60)).unwrap();
    assert_eq!(file.get_event(0).unwrap(), event(5, 40));
    assert_eq!(file.get_event(1).unwrap(), event(20, 60));
}

#[test]
fn test_dense_file_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("apv.h5");
    {
        let mut file = File::open(&path, Access::Create).unwrap();
        file.create_dense_raw(RasterShape::new(5, 64, 8)).unwrap();
        file.write_event(4, &event(30, -20)).unwrap();
    }
    let file = File::open(&path, Access::ReadOnly).unwrap();
    assert_eq!(file.raw().unwrap().kind(), "dense");
    assert_eq!(file.event_count().unwrap(), 5);
    assert_eq!(file.get_event(4).unwrap(), event(30, -20));
    assert!(file.get_event(0).unwrap().is_empty());
}

#[test]
fn test_read_only_rejects_writes() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ro.h5");
    {
        let mut file = File::open(&path, Access::Create).unwrap();
        file.create_dense_raw(RasterShape::new(2, 4, 4)).unwrap();
    }
    let mut file = File::open(&path, Access::ReadOnly).unwrap();
    assert!(matches!(
        file.write_event(0, &Event::default()),
        Err(Error::StoreUnavailable(_))
    ));
    assert!(matches!(
        file.create_analysis("a"),
        Err(Error::StoreUnavailable(_))
    ));
    assert!(matches!(file.load_analysis("a"), Err(Error::NotFound(_))));
}

#[test]
fn test_analysis_management() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("an.h5");
    let mut file = File::open(&path, Access::Create).unwrap();
    file.create_dense_raw(RasterShape::new(3, 32, 8)).unwrap();
    file.write_event(0, &event(1, 10)).unwrap();

    file.create_analysis("first").unwrap();
    file.analyze_event(0).unwrap();
    file.load_analysis("second").unwrap();
    assert_eq!(file.current_analysis().unwrap().name(), "second");
    assert_eq!(file.current_analysis().unwrap().num_analyzed(), 0);

    let mut names = file.analyses().unwrap();
    names.sort();
    assert_eq!(names, vec!["first", "second"]);

    file.load_analysis("first").unwrap();
    assert_eq!(file.current_analysis().unwrap().num_analyzed(), 1);
    assert!(file.metrics().contains(&"x_integral".to_string()));
    assert_eq!(file.metric("x_integral").unwrap().data, vec![15.0]);

    file.delete_analysis("first").unwrap();
    assert!(file.current_analysis().is_none());
    assert_eq!(file.analyses().unwrap(), vec!["second"]);
    assert!(matches!(
        file.delete_analysis("first"),
        Err(Error::NotFound(_))
    ));
}

#[test]
fn test_parameters_persist_and_freeze() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("params.h5");
    {
        let mut file = File::open(&path, Access::Create).unwrap();
        file.create_dense_raw(RasterShape::new(2, 16, 8)).unwrap();
        file.create_analysis("a").unwrap();
        let mut params = Settings::new();
        params.set("weighted", false, "unweighted centers");
        assert!(file.set_parameters(params).unwrap());
        file.analyze_event(0).unwrap();
        assert!(!file.set_parameters(Settings::new()).unwrap());
    }
    let mut file = File::open(&path, Access::ReadOnly).unwrap();
    let analysis = file.load_analysis("a").unwrap();
    assert!(!analysis.parameters().get_bool("weighted").unwrap());
    assert_eq!(analysis.num_analyzed(), 1);
}

#[test]
fn test_gather_after_analyze_does_not_recompute() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("count.h5");
    let calls = Rc::new(Cell::new(0));
    let mut file = File::open(&path, Access::Create)
        .unwrap()
        .with_engine(Box::new(Counting {
            calls: Rc::clone(&calls),
        }));
    file.create_dense_raw(RasterShape::new(2, 16, 8)).unwrap();
    file.write_event(0, &event(2, 8)).unwrap();
    file.create_analysis("a").unwrap();

    file.analyze_event(0).unwrap();
    assert_eq!(calls.get(), 1);
    let m = file.gather_metrics(0).unwrap();
    assert_eq!(calls.get(), 1);
    assert_eq!(m.value("x_integral"), Some(12.0));

    file.gather_metrics(1).unwrap();
    assert_eq!(calls.get(), 2);
}

#[test]
fn test_analyze_pending_resumes_and_reports() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("pending.h5");
    let mut file = File::open(&path, Access::Create).unwrap();
    file.create_clustered_raw(ClusteredLayout::default()).unwrap();
    for i in 0..6 {
        file.write_event(i, &event(i as u16, 10)).unwrap();
    }
    file.create_analysis("a").unwrap();
    file.analyze_event(0).unwrap();
    file.analyze_event(1).unwrap();

    let cancel = AtomicBool::new(false);
    let mut reports = Vec::new();
    let n = file
        .analyze_pending(&cancel, Duration::from_secs(3600), |p| reports.push(*p))
        .unwrap();
    assert_eq!(n, 4);
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].done, 6);
    assert_eq!(reports[0].total, 6);

    let again = file
        .analyze_pending(&cancel, Duration::ZERO, |_| {})
        .unwrap();
    assert_eq!(again, 0);
}

#[test]
fn test_analyze_pending_honours_cancel() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cancel.h5");
    let mut file = File::open(&path, Access::Create).unwrap();
    file.create_dense_raw(RasterShape::new(4, 8, 8)).unwrap();
    file.create_analysis("a").unwrap();

    let cancel = AtomicBool::new(true);
    let n = file
        .analyze_pending(&cancel, Duration::ZERO, |_| {})
        .unwrap();
    assert_eq!(n, 0);
    assert_eq!(file.current_analysis().unwrap().num_analyzed(), 0);
}

#[test]
fn test_raw_source_trait_object() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("dyn.h5");
    let mut file = File::open(&path, Access::Create).unwrap();
    let raw: &dyn RawSource = file.create_dense_raw(RasterShape::new(1, 4, 4)).unwrap();
    assert_eq!(raw.event_count().unwrap(), 1);
}
