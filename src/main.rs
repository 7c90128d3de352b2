use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use env_logger::Env;
use tokio::time::{interval, sleep, Duration};

use nav_fusion_rs::config::TrackerConfig;
use nav_fusion_rs::sensor_fusion::TrackerOutput;
use nav_fusion_rs::sensors::{self, SyntheticWalk};
use nav_fusion_rs::session::TrackingSession;
use nav_fusion_rs::status::TrackerStatus;

#[derive(Parser, Debug)]
#[command(name = "nav_fusion")]
#[command(about = "Position and heading fusion over a simulated walk", long_about = None)]
struct Args {
    /// Duration in seconds
    #[arg(value_name = "SECONDS", default_value = "30")]
    duration: u64,

    /// Tracker config JSON
    #[arg(long)]
    config: Option<String>,

    /// Where the status snapshot is written
    #[arg(long, default_value = "status.json")]
    status_path: String,

    #[arg(long, default_value = "51.5007")]
    lat: f64,

    #[arg(long, default_value = "-0.1246")]
    lon: f64,

    /// Walking direction (deg from north)
    #[arg(long, default_value = "45.0")]
    heading: f64,

    /// Walking speed (m/s)
    #[arg(long, default_value = "1.4")]
    speed: f64,

    /// Seconds between fixes
    #[arg(long, default_value = "1.0")]
    fix_interval: f64,

    /// Drop the coordinates of every n-th fix (0 = never)
    #[arg(long, default_value = "0")]
    dropout_every: u64,

    /// Stop sending fixes after this many seconds to exercise dead reckoning
    #[arg(long)]
    fix_outage_after: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => TrackerConfig::from_json_file(path).with_context(|| format!("loading config {path}"))?,
        None => TrackerConfig::default(),
    };
    if args.fix_interval.is_nan() || args.fix_interval <= 0.0 {
        anyhow::bail!("--fix-interval must be positive");
    }

    println!("[{}] nav_fusion starting", ts_now());
    println!("  Duration: {} seconds", args.duration);
    println!("  Origin: {:.6}, {:.6}", args.lat, args.lon);
    println!("  Walk: {:.1}° at {:.1} m/s", args.heading, args.speed);
    println!("  Status file: {}", args.status_path);

    let (mut session, mut outputs) = TrackingSession::start(config)?;
    let clock = session.clock();

    let mut walk = SyntheticWalk::new(args.lat, args.lon, clock.now());
    walk.heading_deg = args.heading;
    walk.speed_mps = args.speed;
    walk.dropout_every = args.dropout_every;

    let fix_task = tokio::spawn(sensors::fix_loop(
        session.sender(),
        walk.clone(),
        clock,
        Duration::from_secs_f64(args.fix_interval),
    ));
    let _orientation_task = tokio::spawn(sensors::orientation_loop(
        session.sender(),
        walk.clone(),
        clock,
        Duration::from_millis(200),
    ));
    let _motion_task = tokio::spawn(sensors::motion_loop(
        session.sender(),
        walk,
        clock,
        Duration::from_millis(20),
    ));

    let deadline = sleep(Duration::from_secs(args.duration));
    tokio::pin!(deadline);
    let outage = sleep(Duration::from_secs(args.fix_outage_after.unwrap_or(0)));
    tokio::pin!(outage);
    let mut outage_armed = args.fix_outage_after.is_some();
    let mut save_timer = interval(Duration::from_secs(2));

    let mut status = TrackerStatus::new(session.state());
    let mut heading_count = 0u64;

    loop {
        tokio::select! {
            _ = &mut deadline => {
                println!("[{}] Duration reached, stopping...", ts_now());
                break;
            }
            _ = &mut outage, if outage_armed => {
                println!("[{}] Simulating fix outage", ts_now());
                fix_task.abort();
                outage_armed = false;
            }
            output = outputs.recv() => match output {
                Some(output) => {
                    print_output(&output, &mut heading_count);
                    match &output {
                        TrackerOutput::Position(update) => status.apply_position(update),
                        TrackerOutput::Heading(result) => status.apply_heading(result),
                        TrackerOutput::Error(_) => status.errors_reported += 1,
                    }
                }
                None => {
                    println!("[{}] Session ended", ts_now());
                    break;
                }
            },
            _ = save_timer.tick() => {
                status.state = session.state();
                status.timestamp = clock.now();
                if let Err(err) = status.save(&args.status_path) {
                    log::warn!("could not write {}: {err}", args.status_path);
                }
            }
        }
    }

    if let Some(final_status) = session.stop().await {
        final_status
            .save(&args.status_path)
            .with_context(|| format!("writing {}", args.status_path))?;

        println!("\n=== Session summary ===");
        println!("State: {}", final_status.state);
        println!("Fixes: {} accepted, {} rejected", final_status.fixes_accepted, final_status.fixes_rejected);
        println!("Position updates: {}", final_status.position_updates);
        println!("Fused headings: {}", final_status.headings_fused);
        if let Some(heading) = final_status.heading_deg {
            println!(
                "Last heading: {:.1}° (confidence {:.2})",
                heading,
                final_status.heading_confidence.unwrap_or(0.0)
            );
        }
        if let Some(pdop) = final_status.pdop_like {
            println!("Satellites: {} visible, pdop-like {:.2}", final_status.satellites_visible, pdop);
        }
    }

    Ok(())
}

fn print_output(output: &TrackerOutput, heading_count: &mut u64) {
    match output {
        TrackerOutput::Position(update) => {
            let tag = if update.meta.predicted { "DR " } else { "FIX" };
            let speed = update.velocity.map(|v| v.speed).unwrap_or(0.0);
            println!(
                "[{}] {} #{:<5} {:.6}, {:.6} ±{:.1} m  {:.2} m/s",
                ts_now(),
                tag,
                update.meta.update_count,
                update.latitude,
                update.longitude,
                update.accuracy,
                speed
            );
        }
        TrackerOutput::Heading(result) => {
            // every tick carries one; print one per second
            *heading_count += 1;
            if *heading_count % 10 == 1 {
                let tags: Vec<&str> = result.sources.iter().map(|s| s.tag.label()).collect();
                println!(
                    "[{}] HDG {:6.1}°  conf {:.2}  agree {:.2}  [{}]",
                    ts_now(),
                    result.heading,
                    result.confidence,
                    result.agreement,
                    tags.join(",")
                );
            }
        }
        TrackerOutput::Error(err) => println!("[{}] ERR {err}", ts_now()),
    }
}

fn ts_now() -> String {
    Utc::now().format("%H:%M:%S").to_string()
}
