//! nmx: cluster raw eventlet logs and run analyses over NMX data files.
#![allow(
    clippy::uninlined_format_args,
    clippy::cast_precision_loss,
    clippy::too_many_lines
)]

use clap::{Parser, Subcommand};
use nmx_algorithms::{Clusterer, ClustererConfig, SimpleEvent};
use nmx_core::{Eventlet, Settings};
use nmx_io::{Access, ClusteredLayout, ClusteredRaw, File, Raw, RawLog, CLUSTERED_GROUP};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Eventlets read from the input log per clustering step.
const PACKET_SIZE: u64 = 500;

/// Entry-point estimate used to keep only good events.
const ANALYZE_WEIGHTED: bool = true;
const ANALYZE_MAX_TIMEBINS: u16 = 3;
const ANALYZE_MAX_TIMEDIF: u16 = 6;

const PROGRESS_CADENCE: Duration = Duration::from_secs(2);

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage error: {0}")]
    NmxIo(#[from] nmx_io::Error),

    #[error("HDF5 error: {0}")]
    Hdf5(#[from] hdf5::Error),

    #[error("parameter file error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// NMX strip detector data processor.
#[derive(Parser)]
#[command(name = "nmx")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbose output (debug logging)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Cluster an unclustered eventlet log into events
    Cluster {
        /// Input HDF5 file with a RawVMM/points log
        input: PathBuf,

        /// Output file (default: <input stem>_clustered.h5)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Chunk size of the output datasets
        #[arg(long, default_value = "20")]
        chunk: usize,

        /// Time slack within one plane
        #[arg(long, default_value = "28")]
        tsep: u64,

        /// Strip slack within one plane
        #[arg(long, default_value = "18")]
        ssep: u16,

        /// Time slack for correlating the two planes
        #[arg(long, default_value = "3")]
        csep: u64,
    },

    /// Run analyses over data files, resuming where each left off
    Analyze {
        /// Files or directories to analyze
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// JSON parameter file or HDF5 file whose analyses are cloned
        #[arg(short, long)]
        params: PathBuf,

        /// Descend into subdirectories
        #[arg(short, long)]
        recursive: bool,
    },

    /// Show raw source and analyses of a data file
    Info {
        /// Input HDF5 file
        path: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    match cli.command {
        Commands::Cluster {
            input,
            output,
            chunk,
            tsep,
            ssep,
            csep,
        } => {
            let output = output.unwrap_or_else(|| clustered_output_path(&input));
            let config = ClustererConfig::new()
                .with_time_slack(tsep)
                .with_strip_slack(ssep)
                .with_correlation_slack(csep);
            run_cluster(&input, &output, ClusteredLayout::default().with_chunk_size(chunk), config)
        }
        Commands::Analyze {
            paths,
            params,
            recursive,
        } => run_analyze(&paths, &params, recursive),
        Commands::Info { path } => run_info(&path),
    }
}

/// `<dir>/<stem>_clustered.h5` next to the input.
fn clustered_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map_or_else(|| "output".to_string(), |s| s.to_string_lossy().into_owned());
    input.with_file_name(format!("{stem}_clustered.h5"))
}

fn run_cluster(input: &Path, output: &Path, layout: ClusteredLayout, config: ClustererConfig) -> Result<()> {
    let source = hdf5::File::open(input)?;
    let log = RawLog::open(&source.group(CLUSTERED_GROUP)?)?;
    let total = log.entry_count()?;
    let windows = if total == 0 {
        None
    } else {
        Some((log.read(0)?.coarse_time(), log.read(total - 1)?.coarse_time()))
    };

    let mut file = File::open(output, Access::Create)?;
    let sink = match file.create_clustered_raw(layout)? {
        Raw::Clustered(raw) => raw.clone(),
        Raw::Dense(_) => {
            return Err(CliError::InvalidInput(
                "expected clustered output storage".to_string(),
            ))
        }
    };

    log::info!(
        "clustering {} eventlets from {} into {}",
        total,
        input.display(),
        output.display()
    );
    log::debug!("{:?}", config);

    let start = Instant::now();
    let mut clusterer = Clusterer::new(config);
    let mut kept = 0u64;
    let mut dropped = 0u64;
    let mut last_report = start;

    let mut offset = 0;
    while offset < total {
        let end = (offset + PACKET_SIZE).min(total);
        let mut packet = log.read_range(offset..end)?;
        packet.sort_by(Eventlet::cmp_time_strip);
        clusterer.insert_all(packet);
        let (k, d) = store_events(&sink, clusterer.pop_events())?;
        kept += k;
        dropped += d;
        offset = end;

        if last_report.elapsed() >= PROGRESS_CADENCE {
            last_report = Instant::now();
            log::info!(
                "{:.1}% read, {} events stored, {} clusters pending",
                offset as f64 / total as f64 * 100.0,
                kept,
                clusterer.pending_len()
            );
        }
    }

    clusterer.dump();
    let (k, d) = store_events(&sink, clusterer.pop_events())?;
    kept += k;
    dropped += d;
    file.save()?;

    let stats = clusterer.statistics();
    let elapsed = start.elapsed();
    println!(
        "Clustered {} eventlets in {:.2}s",
        stats.eventlets_seen,
        elapsed.as_secs_f64()
    );
    if let Some((first, last)) = windows {
        println!("Coarse time windows: {} to {}", first, last);
    }
    println!("Rejected (zero amplitude): {}", stats.eventlets_rejected);
    println!(
        "Clusters: {} started, {} merged, {} retired",
        stats.clusters_started, stats.clusters_merged, stats.clusters_retired
    );
    println!("Events: {} stored, {} discarded", kept, dropped);
    println!("Output: {}", output.display());
    Ok(())
}

/// Analyzes events and appends the good ones. Returns (stored, discarded).
fn store_events(sink: &ClusteredRaw, events: Vec<SimpleEvent>) -> Result<(u64, u64)> {
    let (mut kept, mut dropped) = (0, 0);
    for mut event in events {
        event.analyze(ANALYZE_WEIGHTED, ANALYZE_MAX_TIMEBINS, ANALYZE_MAX_TIMEDIF);
        if event.good() {
            sink.append_simple_event(&event)?;
            kept += 1;
        } else {
            dropped += 1;
        }
    }
    Ok((kept, dropped))
}

/// Analysis name → parameters, from JSON or from the analyses of an HDF5
/// file.
fn load_parameter_sets(path: &Path) -> Result<BTreeMap<String, Settings>> {
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if is_json {
        let text = std::fs::read_to_string(path)?;
        return parse_parameter_sets(&text);
    }

    let mut template = File::open(path, Access::ReadOnly)?;
    let mut sets = BTreeMap::new();
    for name in template.analyses()? {
        let analysis = template.load_analysis(&name)?;
        sets.insert(name, analysis.parameters().clone());
    }
    Ok(sets)
}

fn parse_parameter_sets(text: &str) -> Result<BTreeMap<String, Settings>> {
    Ok(serde_json::from_str(text)?)
}

/// Data files under `paths`; directories contribute their `.h5` files.
fn collect_files(paths: &[PathBuf], recursive: bool) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            walk_dir(path, recursive, &mut files)?;
        } else {
            files.push(path.clone());
        }
    }
    files.sort();
    Ok(files)
}

fn walk_dir(dir: &Path, recursive: bool, files: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            if recursive {
                walk_dir(&path, recursive, files)?;
            }
        } else if path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("h5"))
        {
            files.push(path);
        }
    }
    Ok(())
}

fn run_analyze(paths: &[PathBuf], params: &Path, recursive: bool) -> Result<()> {
    let sets = load_parameter_sets(params)?;
    if sets.is_empty() {
        return Err(CliError::InvalidInput(format!(
            "no analyses defined in {}",
            params.display()
        )));
    }
    let files = collect_files(paths, recursive)?;
    log::info!("{} files, {} analyses", files.len(), sets.len());

    let start = Instant::now();
    let cancel = AtomicBool::new(false);
    let mut total_events = 0u64;
    let mut processed = 0usize;
    let mut skipped = 0usize;

    for path in &files {
        match analyze_file(path, &sets, &cancel) {
            Ok(n) => {
                total_events += n;
                processed += 1;
            }
            Err(e) => {
                log::warn!("skipping {}: {e}", path.display());
                skipped += 1;
            }
        }
    }

    println!(
        "Analyzed {} events in {} files ({} skipped) in {:.2}s",
        total_events,
        processed,
        skipped,
        start.elapsed().as_secs_f64()
    );
    Ok(())
}

/// Runs every analysis in `sets` over one file and returns the number of
/// newly analyzed events.
fn analyze_file(path: &Path, sets: &BTreeMap<String, Settings>, cancel: &AtomicBool) -> Result<u64> {
    let mut file = File::open(path, Access::ReadWrite)?;
    if file.raw().is_none() {
        return Err(CliError::InvalidInput("no raw data".to_string()));
    }

    let mut analyzed = 0;
    for (name, settings) in sets {
        file.load_analysis(name)?;
        file.set_parameters(settings.clone())?;
        analyzed += file.analyze_pending(cancel, PROGRESS_CADENCE, |p| {
            log::info!(
                "{} [{}]: {}/{} events",
                path.display(),
                name,
                p.done,
                p.total
            );
        })?;
    }
    file.save()?;
    Ok(analyzed)
}

fn run_info(path: &Path) -> Result<()> {
    let mut file = File::open(path, Access::ReadOnly)?;
    println!("File: {}", path.display());
    match file.raw() {
        Some(raw) => println!("Raw data: {} ({} events)", raw.kind(), file.event_count()?),
        None => println!("Raw data: none"),
    }

    let names = file.analyses()?;
    if names.is_empty() {
        println!("Analyses: none");
    }
    for name in names {
        let analysis = file.load_analysis(&name)?;
        println!(
            "Analysis '{}': {}/{} events analyzed",
            name,
            analysis.num_analyzed(),
            analysis.max_events()
        );
        print!("{}", analysis.parameters().describe("    "));
        for metric in analysis.metric_names() {
            if let Some(m) = analysis.metric(&metric) {
                println!(
                    "  {:<24} min {:>12.3} max {:>12.3}  {}",
                    metric, m.min, m.max, m.description
                );
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_clustered_output_path() {
        assert_eq!(
            clustered_output_path(Path::new("/data/run_12.h5")),
            PathBuf::from("/data/run_12_clustered.h5")
        );
    }

    #[test]
    fn test_parse_parameter_sets() {
        let sets = parse_parameter_sets(
            r#"{"default": {"weighted": {"value": false, "description": "plain mean"}},
                "wide": {"window": {"value": 12}}}"#,
        )
        .unwrap();
        assert_eq!(sets.len(), 2);
        assert!(!sets["default"].get_bool("weighted").unwrap());
        assert_eq!(sets["wide"].get_int("window").unwrap(), 12);
    }

    #[test]
    fn test_collect_files_recursion() {
        let dir = tempdir().unwrap();
        let sub = dir.path().join("sub");
        std::fs::create_dir(&sub).unwrap();
        std::fs::write(dir.path().join("a.h5"), b"").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"").unwrap();
        std::fs::write(sub.join("b.h5"), b"").unwrap();

        let flat = collect_files(&[dir.path().to_path_buf()], false).unwrap();
        assert_eq!(flat, vec![dir.path().join("a.h5")]);

        let deep = collect_files(&[dir.path().to_path_buf()], true).unwrap();
        assert_eq!(deep.len(), 2);
    }

    #[test]
    fn test_cluster_end_to_end() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("raw.h5");
        {
            let h5 = hdf5::File::create(&input).unwrap();
            let group = h5.create_group(CLUSTERED_GROUP).unwrap();
            let log = RawLog::create(&group, 64).unwrap();
            let mut hits = Vec::new();
            for (base, strip) in [(1_000_u64, 100_u16), (9_000, 400)] {
                for i in 0..4_u16 {
                    let t = base + u64::from(i) * 3;
                    hits.push(Eventlet::new(t, 0, strip + i, 40));
                    hits.push(Eventlet::new(t + 1, 1, strip + i, 30));
                }
            }
            // A lone X hit never pairs with Y and is discarded.
            hits.push(Eventlet::new(20_000, 0, 5, 10));
            log.append_batch(&hits).unwrap();
        }

        let output = clustered_output_path(&input);
        run_cluster(
            &input,
            &output,
            ClusteredLayout::default(),
            ClustererConfig::default(),
        )
        .unwrap();

        let file = File::open(&output, Access::ReadOnly).unwrap();
        assert_eq!(file.event_count().unwrap(), 2);
        let event = file.get_event(1).unwrap();
        assert_eq!(event.x.len(), 4);
        assert_eq!(event.y.len(), 4);
    }

    #[test]
    fn test_analyze_skips_unreadable_files() {
        let dir = tempdir().unwrap();
        let good = dir.path().join("good.h5");
        {
            let mut file = File::open(&good, Access::Create).unwrap();
            file.create_clustered_raw(ClusteredLayout::default()).unwrap();
            for i in 0..3_u16 {
                let mut x = nmx_core::Plane::new();
                x.set(10 + i, 2, 50);
                let mut y = nmx_core::Plane::new();
                y.set(20 + i, 2, 40);
                file.write_event(u64::from(i), &nmx_core::Event::new(x, y))
                    .unwrap();
            }
        }
        // Sorted before good.h5, so it is visited first.
        std::fs::write(dir.path().join("broken.h5"), b"not an hdf5 file").unwrap();
        let params = dir.path().join("params.json");
        std::fs::write(&params, r#"{"summary": {"weighted": {"value": true}}}"#).unwrap();

        run_analyze(&[dir.path().to_path_buf()], &params, false).unwrap();

        let mut file = File::open(&good, Access::ReadOnly).unwrap();
        assert_eq!(file.analyses().unwrap(), vec!["summary"]);
        assert_eq!(file.load_analysis("summary").unwrap().num_analyzed(), 3);
    }

    #[test]
    fn test_cluster_sorts_each_packet() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("shuffled.h5");
        {
            let h5 = hdf5::File::create(&input).unwrap();
            let group = h5.create_group(CLUSTERED_GROUP).unwrap();
            let log = RawLog::create(&group, 64).unwrap();
            let mut hits = Vec::new();
            for (base, strip) in [(2_000_u64, 50_u16), (7_000, 300)] {
                for i in 0..3_u16 {
                    let t = base + u64::from(i) * 2;
                    hits.push(Eventlet::new(t, 0, strip + i, 25));
                    hits.push(Eventlet::new(t, 1, strip + i, 35));
                }
            }
            hits.reverse();
            log.append_batch(&hits).unwrap();
        }

        let output = dir.path().join("sorted.h5");
        run_cluster(
            &input,
            &output,
            ClusteredLayout::default(),
            ClustererConfig::default(),
        )
        .unwrap();

        let file = File::open(&output, Access::ReadOnly).unwrap();
        assert_eq!(file.event_count().unwrap(), 2);
        assert_eq!(file.get_event(0).unwrap().x.len(), 3);
        assert_eq!(file.get_event(1).unwrap().y.len(), 3);
    }
}
