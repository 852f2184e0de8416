//! # SPLEBO Control Unit
//!
//! Connects a robot session from a TOML configuration, optionally homes
//! every axis, reports the live pose and idles until Ctrl-C, then stops
//! all motion and releases the hardware.

use clap::Parser;
use splebo_common::axis::axis_name;
use splebo_common::config::{ConfigLoader, LogLevel, RobotConfig};
use splebo_control_unit::RobotSession;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tracing::{Level, error, info, warn};
use tracing_subscriber::EnvFilter;

/// Main loop wake-up interval while waiting for Ctrl-C.
const IDLE_INTERVAL: Duration = Duration::from_millis(200);

/// SPLEBO Control Unit: robot motion and I/O core
#[derive(Parser, Debug)]
#[command(name = "splebo_control_unit")]
#[command(version)]
#[command(about = "Motion, homing, jog and I/O core of the SPLEBO assembly robot")]
struct Args {
    /// Path to the robot configuration TOML.
    #[arg(long, default_value = "config/robot.toml")]
    config: PathBuf,

    /// Use the simulated motion controller and CAN network.
    #[arg(long)]
    simulate: bool,

    /// Home all axes after connecting.
    #[arg(long)]
    home: bool,

    /// Enable verbose logging (DEBUG level).
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format.
    #[arg(long)]
    json: bool,
}

fn main() {
    let args = Args::parse();
    let loaded = load_config(&args.config);
    let level = match &loaded {
        Ok(config) if !args.verbose => config.shared.log_level,
        _ if args.verbose => LogLevel::Debug,
        _ => LogLevel::Info,
    };
    setup_tracing(&args, level);

    info!("SPLEBO Control Unit v{} starting...", env!("CARGO_PKG_VERSION"));

    let result = loaded.and_then(|config| run(&args, config));
    if let Err(e) = result {
        error!("FATAL: {e}");
        process::exit(1);
    }

    info!("SPLEBO Control Unit shutdown complete");
}

fn load_config(path: &Path) -> Result<RobotConfig, Box<dyn std::error::Error>> {
    let mut config = RobotConfig::load(path)
        .map_err(|e| format!("cannot load {}: {e}", path.display()))?;
    if let Some(base) = path.parent() {
        config.resolve_paths(base);
    }
    config.validate()?;
    Ok(config)
}

fn run(args: &Args, mut config: RobotConfig) -> Result<(), Box<dyn std::error::Error>> {
    if args.simulate {
        config.motion.driver = "simulation".to_string();
    }
    info!(
        "Config OK: driver={}, boards={:?}, positions={}",
        config.motion.driver,
        config.can.boards,
        config.storage.positions.display()
    );

    let session = RobotSession::new(config);
    session.connect()?;

    if args.home {
        let report = session.home_all()?;
        info!("Homing complete: {} axes homed", report.homed.len());
    }

    let positions = session.get_positions()?;
    let limits = session.get_config()?;
    for axis in limits.axes.iter().filter(|a| a.configured) {
        info!(
            "Axis {}: position={:.2} mm, limits=[{}, {}]",
            axis_name(axis.axis),
            positions[axis.axis as usize],
            axis.limit_minus,
            axis.limit_plus
        );
    }
    info!(
        "{} teaching points loaded",
        session.get_position_table_all()?.len()
    );

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
    })?;

    while running.load(Ordering::SeqCst) {
        thread::sleep(IDLE_INTERVAL);
    }

    if let Err(e) = session.stop_all() {
        warn!("stop_all failed: {e}");
    }
    session.close()?;
    Ok(())
}

/// Setup tracing subscriber based on CLI arguments and configured level.
fn setup_tracing(args: &Args, level: LogLevel) {
    let level = match level {
        LogLevel::Trace => Level::TRACE,
        LogLevel::Debug => Level::DEBUG,
        LogLevel::Info => Level::INFO,
        LogLevel::Warn => Level::WARN,
        LogLevel::Error => Level::ERROR,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .init();
    }
}
