// src/main.rs

use anyhow::{Context, Result};
use clap::Parser;
use excavator_monitor::config::Config;
use excavator_monitor::detection::{build_model, ModelKind};
use excavator_monitor::pipeline::{run_stream, ActivityMonitor};
use excavator_monitor::source::{build_source, DirectoryConfig, MjpegConfig, SourceConfig};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "excavator-monitor", version, about = "Excavator loading-cycle monitor")]
struct Args {
    /// YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Read an MJPEG stream from this URL instead of the configured source
    #[arg(long, env = "EXCAVATOR_SOURCE_URL")]
    source_url: Option<String>,

    /// Replay image files from this folder instead of the configured source
    #[arg(long, conflicts_with = "source_url")]
    frames_dir: Option<PathBuf>,

    /// Pre-computed detections (JSON lines); selects the replay model
    #[arg(long)]
    detections: Option<PathBuf>,

    #[arg(long)]
    max_frames: Option<u64>,

    /// Where the summary JSON is written
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config_found = args.config.exists();
    let mut config = if config_found {
        Config::load(&args.config)?
    } else {
        Config::default()
    };
    apply_overrides(&mut config, &args);
    config.validate().context("invalid configuration after CLI overrides")?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_filter()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("🚜 Excavator Activity Monitor starting");
    if config_found {
        info!("✓ Configuration loaded from {}", args.config.display());
    } else {
        warn!("{} not found, using built-in defaults", args.config.display());
    }
    info!(
        "Thresholds: overlap={:.2}, dilation={}px, motion arm/bucket={:.2}, cabin={:.2}",
        config.analysis.min_overlap,
        config.analysis.dilation_px,
        config.analysis.min_motion_arm_bucket,
        config.analysis.min_motion_cabin
    );
    info!(
        "Cycle: window={:.0}s, dead time={:.0}s, min load={:.0}s",
        config.cycle.active_cycle_window_s,
        config.cycle.dead_time_s,
        config.cycle.min_load_duration_s
    );

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        ctrlc::set_handler(move || {
            stop.store(true, Ordering::Relaxed);
        })
        .context("install Ctrl-C handler")?;
    }

    let mut source = build_source(&config.source)?;
    let mut model = build_model(&config.model)?;
    info!("✓ Model ready: {}", model.name());

    let mut monitor = ActivityMonitor::new(&config);
    let stats = run_stream(
        source.as_mut(),
        model.as_mut(),
        &mut monitor,
        &config.runtime,
        &stop,
    )?;

    let report = monitor.finalize();

    info!("\n========================================");
    info!("  Frames read: {}", stats.frames_read);
    info!("  Frames analyzed: {}", stats.frames_processed);
    if stats.frames_skipped > 0 {
        warn!("  ⚠️  Frames skipped: {}", stats.frames_skipped);
    }
    info!("  Reconnects: {}", stats.reconnects);
    info!("  State changes: {}", stats.transitions);
    info!("  Stream duration: {:.1}s", report.stream_duration_s);
    info!("  Processing Speed: {:.1} FPS", stats.avg_fps);
    info!("========================================");

    if report.timeline.is_empty() {
        warn!("No activity intervals recorded");
    } else {
        for line in report.summary_table().lines() {
            info!("  {}", line);
        }
    }

    if config.output.write_report {
        let stem = format!("activity_{}", report.generated_at.format("%Y%m%d_%H%M%S"));
        report.write_json(Path::new(&config.output.dir), &stem)?;
    }

    Ok(())
}

fn apply_overrides(config: &mut Config, args: &Args) {
    if let Some(url) = &args.source_url {
        let mut mjpeg = match &config.source {
            SourceConfig::Mjpeg(c) => c.clone(),
            _ => MjpegConfig::default(),
        };
        mjpeg.url = url.clone();
        config.source = SourceConfig::Mjpeg(mjpeg);
    }
    if let Some(dir) = &args.frames_dir {
        let mut directory = match &config.source {
            SourceConfig::Directory(c) => c.clone(),
            _ => DirectoryConfig::default(),
        };
        directory.path = dir.to_string_lossy().into_owned();
        config.source = SourceConfig::Directory(directory);
    }
    if let Some(path) = &args.detections {
        config.model.kind = ModelKind::Replay;
        config.model.path = path.to_string_lossy().into_owned();
    }
    if args.max_frames.is_some() {
        config.runtime.max_frames = args.max_frames;
    }
    if let Some(dir) = &args.output_dir {
        config.output.dir = dir.to_string_lossy().into_owned();
    }
}
