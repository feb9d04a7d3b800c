use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, error, info, warn};

use grabcam::{AcquisitionEvent, GrabcamConfig, HeadlessPlan, Station};

#[derive(Parser, Debug)]
#[command(name = "grabcam")]
#[command(about = "Machine-vision camera station with burst capture and flush-to-disk")]
#[command(version)]
#[command(long_about = "Runs a capture session against the simulated camera: starts \
acquisition, optionally saves a single shot, collects a burst in continuous shooting, \
flushes it to a timestamped directory as numbered PNG files and stops.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "grabcam.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit without starting a session")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    /// Frames to collect in continuous shooting
    #[arg(long, value_name = "N", default_value_t = 0, help = "Collect N frames in continuous shooting and flush them")]
    burst_frames: usize,

    /// Directory bursts are flushed into
    #[arg(long, value_name = "DIR", help = "Flush destination (defaults to capture.output_dir)")]
    output: Option<PathBuf>,

    /// Save one frame before the burst
    #[arg(long, value_name = "PATH", help = "Save a single shot to PATH (.png or .jpg)")]
    snapshot: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    init_logging(&args)?;

    info!("Starting Grabcam v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let config = match GrabcamConfig::load_from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        if args.validate_config {
            eprintln!("✗ Configuration validation failed: {}", e);
            std::process::exit(1);
        }
        return Err(e.into());
    }

    if args.validate_config {
        info!("Configuration validation successful");
        println!("✓ Configuration is valid");
        return Ok(());
    }

    let plan = HeadlessPlan {
        snapshot: args.snapshot.clone(),
        burst_frames: args.burst_frames,
        output_dir: args
            .output
            .clone()
            .unwrap_or_else(|| PathBuf::from(&config.capture.output_dir)),
    };

    let mut station = Station::new(config).map_err(|e| {
        error!("Failed to set up station: {}", e);
        e
    })?;
    let logger = tokio::spawn(log_events(station.event_bus().subscribe()));

    // The session blocks on the acquisition thread; keep it off the runtime.
    let outcome = tokio::task::spawn_blocking(move || station.run(&plan)).await?;
    if let Err(e) = logger.await {
        warn!("Event logger ended abnormally: {}", e);
    }

    let summary = outcome.map_err(|e| {
        error!("Session failed: {}", e);
        e
    })?;

    info!(
        "Session finished: {} frames delivered, last rate {}",
        summary.frames_delivered,
        summary
            .last_rate
            .map(|fps| format!("{:.1} fps", fps))
            .unwrap_or_else(|| "n/a".to_string())
    );
    if let Some(path) = &summary.snapshot {
        println!("Snapshot: {}", path.display());
    }
    if let Some(report) = &summary.flush {
        match &report.directory {
            Some(dir) => println!("Burst: {} frames in {}", report.written(), dir.display()),
            None => println!("Burst: no frames written"),
        }
    }

    Ok(())
}

async fn log_events(mut receiver: broadcast::Receiver<AcquisitionEvent>) {
    loop {
        match receiver.recv().await {
            Ok(AcquisitionEvent::Rate { frame_id, fps }) => {
                info!("Frame {}: {:.1} fps", frame_id, fps)
            }
            Ok(event) => debug!("{}", event.description()),
            Err(RecvError::Lagged(skipped)) => {
                warn!("Event logger lagged by {} events; continuing", skipped);
            }
            Err(RecvError::Closed) => break,
        }
    }
}

fn init_logging(args: &Args) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("grabcam={}", log_level)));

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_names(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_names(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_target(true)
                .with_thread_names(args.debug)
                .boxed()
        }
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .init();

    Ok(())
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    println!("# Grabcam Configuration File");
    println!("# This is the default configuration with all available options");
    println!("# Values can be overridden with GRABCAM-prefixed environment variables");
    println!();
    println!("{}", toml::to_string_pretty(&GrabcamConfig::default())?);
    Ok(())
}
