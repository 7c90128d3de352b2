use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::Parser;
use flate2::read::GzDecoder;
use nav_fusion_rs::config::TrackerConfig;
use nav_fusion_rs::error::{AcquisitionErrorKind, TrackerError};
use nav_fusion_rs::sensor_fusion::{FusionPipeline, TrackerOutput};
use nav_fusion_rs::types::{RawFix, RawMotion, RawOrientation};
use serde::Deserialize;
use serde_json::json;

#[derive(Parser, Debug)]
#[command(name = "replay")]
#[command(about = "Replay a recorded sensor log through the fusion pipeline", long_about = None)]
struct Args {
    /// Path to a session log (.json or .json.gz)
    #[arg(long, conflicts_with = "golden_dir")]
    log: Option<PathBuf>,

    /// Directory of logs to batch replay (*.json, *.json.gz)
    #[arg(long)]
    golden_dir: Option<PathBuf>,

    /// Tracker config JSON; defaults apply otherwise
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the tick interval (ms)
    #[arg(long)]
    tick_ms: Option<u64>,

    /// Print every output as one JSON line
    #[arg(long, default_value_t = false)]
    dump_outputs: bool,
}

#[derive(Deserialize)]
struct ErrorRecord {
    kind: AcquisitionErrorKind,
    #[serde(default)]
    message: String,
}

/// Older logs store fixes in the location provider's own shape.
#[derive(Deserialize)]
struct GpsRecord {
    timestamp: f64,
    latitude: f64,
    longitude: f64,
    accuracy: f64,
    #[serde(default)]
    speed: Option<f64>,
    #[serde(default)]
    bearing: Option<f64>,
}

#[derive(Deserialize)]
struct Reading {
    timestamp: f64,
    #[serde(default)]
    fix: Option<RawFix>,
    #[serde(default)]
    gps: Option<GpsRecord>,
    #[serde(default)]
    orientation: Option<RawOrientation>,
    #[serde(default)]
    motion: Option<RawMotion>,
    #[serde(default)]
    error: Option<ErrorRecord>,
}

#[derive(Deserialize)]
struct LogFile {
    readings: Vec<Reading>,
}

fn load_log(path: &Path) -> anyhow::Result<LogFile> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    if path.extension().map(|e| e == "gz").unwrap_or(false) {
        let gz = GzDecoder::new(file);
        let reader = BufReader::new(gz);
        Ok(serde_json::from_reader(reader)?)
    } else {
        let reader = BufReader::new(file);
        Ok(serde_json::from_reader(reader)?)
    }
}

impl GpsRecord {
    fn into_fix(self) -> RawFix {
        let fix = RawFix::new(self.timestamp, self.latitude, self.longitude, self.accuracy);
        match (self.bearing, self.speed) {
            (Some(bearing), Some(speed)) => fix.with_course(bearing, speed),
            _ => fix,
        }
    }
}

#[derive(Default)]
struct Tally {
    real_fixes: u64,
    predicted: u64,
    headings: u64,
    confidence_sum: f64,
    errors: Vec<String>,
    distance_m: f64,
    max_speed: f64,
}

impl Tally {
    fn record(&mut self, output: &TrackerOutput, dump: bool) {
        if dump {
            if let Ok(line) = serde_json::to_string(output) {
                println!("{line}");
            }
        }
        match output {
            TrackerOutput::Position(update) if update.meta.is_real_fix => {
                self.real_fixes += 1;
                if let Some(v) = update.velocity {
                    self.distance_m += v.distance;
                    self.max_speed = self.max_speed.max(v.speed);
                }
            }
            TrackerOutput::Position(_) => self.predicted += 1,
            TrackerOutput::Heading(result) => {
                self.headings += 1;
                self.confidence_sum += result.confidence;
            }
            TrackerOutput::Error(err) => self.errors.push(error_label(err).to_string()),
        }
    }
}

fn error_label(err: &TrackerError) -> &'static str {
    match err {
        TrackerError::InvalidSample(_) => "invalid_sample",
        TrackerError::DegenerateGeometry { .. } => "degenerate_geometry",
        TrackerError::AcquisitionUnavailable { .. } => "acquisition_unavailable",
        TrackerError::AcquisitionTimeout(_) => "acquisition_timeout",
        TrackerError::PositionStale { .. } => "position_stale",
        TrackerError::NotRunning => "not_running",
    }
}

fn run_once(path: &Path, config: &TrackerConfig, dump: bool) -> anyhow::Result<serde_json::Value> {
    let mut log = load_log(path)?;
    if log.readings.is_empty() {
        bail!("{} has no readings", path.display());
    }
    log.readings.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));

    let tick = config.session.tick_interval_ms as f64 / 1000.0;
    let mut pipeline = FusionPipeline::new(config.clone())?;
    pipeline.start();

    let mut tally = Tally::default();
    let mut next_tick = log.readings[0].timestamp;
    let mut last_ts = next_tick;

    for reading in log.readings {
        while next_tick <= reading.timestamp {
            for output in pipeline.tick(next_tick) {
                tally.record(&output, dump);
            }
            next_tick += tick;
        }
        last_ts = reading.timestamp;

        let fix = reading.fix.or_else(|| reading.gps.map(GpsRecord::into_fix));
        if let Some(fix) = fix {
            for output in pipeline.feed_fix(&fix) {
                tally.record(&output, dump);
            }
        }
        if let Some(orientation) = reading.orientation.as_ref() {
            pipeline.feed_orientation(orientation);
        }
        if let Some(motion) = reading.motion.as_ref() {
            pipeline.feed_motion(motion);
        }
        if let Some(err) = reading.error {
            for output in pipeline.feed_acquisition_error(err.kind, &err.message) {
                tally.record(&output, dump);
            }
        }
        if !pipeline.is_running() {
            eprintln!("[replay] pipeline stopped at t={:.2}", reading.timestamp);
            break;
        }
    }

    let status = pipeline.status(last_ts);
    pipeline.stop();

    let mean_confidence = if tally.headings > 0 {
        tally.confidence_sum / tally.headings as f64
    } else {
        0.0
    };

    Ok(json!({
        "log": path.display().to_string(),
        "real_fixes": tally.real_fixes,
        "predicted_positions": tally.predicted,
        "fused_headings": tally.headings,
        "mean_heading_confidence": mean_confidence,
        "distance_m": tally.distance_m,
        "max_speed_mps": tally.max_speed,
        "errors": tally.errors,
        "final_status": status,
    }))
}

fn collect_logs(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut logs: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            let name = p.file_name().and_then(|n| n.to_str()).unwrap_or("");
            name.ends_with(".json") || name.ends_with(".json.gz")
        })
        .collect();
    logs.sort();
    Ok(logs)
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => TrackerConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => TrackerConfig::default(),
    };
    if let Some(ms) = args.tick_ms {
        config.session.tick_interval_ms = ms;
        config.validate()?;
    }

    let logs = match (&args.log, &args.golden_dir) {
        (Some(log), _) => vec![log.clone()],
        (None, Some(dir)) => collect_logs(dir)?,
        (None, None) => bail!("pass --log <file> or --golden-dir <dir>"),
    };
    if logs.is_empty() {
        bail!("no logs found");
    }

    let mut summaries = Vec::new();
    for path in &logs {
        match run_once(path, &config, args.dump_outputs) {
            Ok(summary) => summaries.push(summary),
            Err(err) => eprintln!("[replay] {}: {err:#}", path.display()),
        }
    }

    println!("{}", serde_json::to_string_pretty(&summaries)?);
    Ok(())
}
