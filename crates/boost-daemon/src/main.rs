//! input-boost daemon entry point.
//!
//! Wires the boost engine to the Linux backends (or the simulated platform),
//! attaches input devices, serves the control socket and handles signals.

mod control;
mod diagnostics;
mod signals;

use anyhow::{Context, Result};
use boost_common::config::BoostConfig;
use boost_core::platform::{FrequencyGovernor, SchedulerBoost};
use boost_core::realtime::log_rt_capabilities;
use boost_core::simulated::{SimulatedGovernor, SimulatedSchedBoost, StaticTopology};
use boost_core::CpuBoost;
use boost_sysfs::{NoSchedBoost, ProcSchedBoost, SysfsGovernor, SysfsTopology};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::control::ControlServer;
use crate::diagnostics::format_prometheus_metrics;
use crate::signals::SignalHandler;

const STATUS_INTERVAL: Duration = Duration::from_secs(60);

/// input-boost daemon command-line arguments.
#[derive(Parser, Debug)]
#[command(
    name = "input-boostd",
    about = "Raise CPU frequency floors for a short window after user input",
    version,
    long_about = None
)]
struct Args {
    /// Path to a configuration file (TOML).
    #[arg(long, short = 'c', value_name = "FILE")]
    config: Option<PathBuf>,

    /// Run against the simulated platform (no sysfs, no input devices).
    #[arg(long, short = 's')]
    simulated: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, short = 'l', default_value = "info")]
    log_level: String,

    /// Boost frequency, e.g. "1300000" or "0:1300000 4:800000".
    #[arg(long, value_name = "SPEC")]
    boost_freq: Option<String>,

    /// Boost window in milliseconds.
    #[arg(long, value_name = "MS")]
    boost_ms: Option<u32>,

    /// Request the scheduler boost during windows.
    #[arg(long, value_name = "BOOL")]
    sched_boost: Option<bool>,

    /// Control socket path.
    #[arg(long, value_name = "PATH")]
    socket: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level);

    info!(version = env!("CARGO_PKG_VERSION"), "Starting input-boost daemon");

    let config = load_effective_config(&args)?;
    info!(
        boost_freq = %config.input_boost_freq,
        window_ms = config.window_ms(),
        sched_boost = config.sched_boost_on_input,
        simulated = args.simulated,
        "Configuration loaded"
    );

    let signal_handler = SignalHandler::install().context("Failed to set up signal handlers")?;

    run_daemon(&args, &config, &signal_handler)
}

/// Initialize logging with the specified log level.
fn init_logging(level: &str) {
    let filter = format!(
        "input_boostd={level},boost_core={level},boost_sysfs={level},boost_common={level}"
    );

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&filter)),
        )
        .with_target(true)
        .with_thread_ids(true)
        .init();
}

/// Load configuration from file or use defaults.
///
/// Resolution priority (first existing file wins):
/// 1. Command-line `--config` argument
/// 2. `BOOST_CONFIG_PATH` environment variable
/// 3. `/etc/input-boost/config.toml` (system path)
/// 4. `config/default.toml` (local development)
/// 5. Built-in defaults
fn load_config(args: &Args) -> Result<BoostConfig> {
    if let Some(config_path) = &args.config {
        info!(?config_path, "Loading config from command-line argument");
        return BoostConfig::from_file(config_path)
            .with_context(|| format!("Failed to load config from {config_path:?}"));
    }

    if let Ok(env_path) = std::env::var("BOOST_CONFIG_PATH") {
        let config_path = PathBuf::from(&env_path);
        if config_path.exists() {
            info!(?config_path, "Loading config from BOOST_CONFIG_PATH");
            return BoostConfig::from_file(&config_path).with_context(|| {
                format!("Failed to load config from BOOST_CONFIG_PATH={env_path:?}")
            });
        }
        warn!(
            path = %env_path,
            "BOOST_CONFIG_PATH set but file does not exist, checking other locations"
        );
    }

    for (path, origin) in [
        ("/etc/input-boost/config.toml", "system path"),
        ("config/default.toml", "local path"),
    ] {
        let config_path = PathBuf::from(path);
        if config_path.exists() {
            info!(?config_path, "Loading config from {origin}");
            return BoostConfig::from_file(&config_path)
                .with_context(|| format!("Failed to load config from {config_path:?}"));
        }
    }

    info!("No config file found, using built-in defaults");
    Ok(BoostConfig::default())
}

/// Configuration file plus command-line overrides.
fn load_effective_config(args: &Args) -> Result<BoostConfig> {
    let mut config = load_config(args)?;
    if let Some(freq) = &args.boost_freq {
        config.input_boost_freq.clone_from(freq);
    }
    if let Some(ms) = args.boost_ms {
        config.input_boost_ms = Duration::from_millis(u64::from(ms));
    }
    if let Some(enable) = args.sched_boost {
        config.sched_boost_on_input = enable;
    }
    if let Some(socket) = &args.socket {
        config.control.socket_path.clone_from(socket);
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Build collaborators and start the engine.
fn start_boost(config: &BoostConfig, simulated: bool) -> Result<CpuBoost> {
    if simulated {
        info!(clusters = ?config.simulated.clusters, "Using simulated platform");
        let governor = SimulatedGovernor::from_config(&config.simulated)
            .context("Invalid simulated platform")?;
        return CpuBoost::start(
            &StaticTopology::from_config(&config.simulated),
            Arc::new(governor),
            Arc::new(SimulatedSchedBoost::default()),
            config,
        )
        .context("Failed to start input boost");
    }

    let sysfs = &config.sysfs;
    let governor: Arc<dyn FrequencyGovernor> = Arc::new(SysfsGovernor::new(&sysfs.cpu_root));
    let sched_boost: Arc<dyn SchedulerBoost> = match &sysfs.sched_boost_path {
        Some(path) => Arc::new(ProcSchedBoost::new(path)),
        None => {
            debug!("No sched_boost knob configured");
            Arc::new(NoSchedBoost)
        }
    };
    CpuBoost::start(&SysfsTopology::new(&sysfs.cpu_root), governor, sched_boost, config)
        .context("Failed to start input boost")
}

/// Attach input devices. Missing devices are not fatal.
#[cfg(target_os = "linux")]
fn start_input(config: &BoostConfig, boost: &CpuBoost) -> Option<boost_sysfs::EvdevInputSource> {
    match boost_sysfs::EvdevInputSource::attach(&config.sysfs.input_dir, boost.input_filter()) {
        Ok(source) => {
            info!(devices = source.devices().len(), "Input source started");
            Some(source)
        }
        Err(e) => {
            error!(error = %e, "Cannot attach input devices; boosting only via control socket");
            None
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn start_input(_config: &BoostConfig, _boost: &CpuBoost) -> Option<()> {
    warn!("Input devices are only supported on Linux");
    None
}

/// Main daemon run loop.
fn run_daemon(args: &Args, config: &BoostConfig, signal_handler: &SignalHandler) -> Result<()> {
    let started = Instant::now();
    log_rt_capabilities(&config.realtime);

    let boost = Arc::new(start_boost(config, args.simulated)?);

    let input = if args.simulated { None } else { start_input(config, &boost) };

    let mut control = if config.control.enabled {
        let server = ControlServer::start(&config.control.socket_path, Arc::clone(&boost), started)
            .with_context(|| format!("Failed to bind control socket {:?}", config.control.socket_path))?;
        Some(server)
    } else {
        None
    };

    info!(workers = boost.worker_count(), "Daemon running");

    let mut last_status = Instant::now();
    while !signal_handler.shutdown_requested() {
        signal_handler.wait(Duration::from_secs(1));

        if signal_handler.take_reload_request() {
            reload(args, &boost);
        }

        if last_status.elapsed() >= STATUS_INTERVAL {
            last_status = Instant::now();
            let stats = boost.stats();
            debug!(
                phase = %stats.phase,
                triggers = stats.triggers_accepted,
                debounced = stats.triggers_debounced,
                "Periodic status"
            );
        }
    }

    info!("Shutting down...");
    drop(input);
    if let Some(server) = control.as_mut() {
        server.stop();
    }

    let stats = boost.stats();
    debug!("{}", format_prometheus_metrics(&stats, started.elapsed()));

    match Arc::try_unwrap(boost) {
        Ok(mut boost) => boost.shutdown(),
        Err(_) => warn!("Engine still referenced at shutdown"),
    }

    info!(
        triggers = stats.triggers_accepted,
        debounced = stats.triggers_debounced,
        expiries = stats.expiries_fired,
        signals = signal_handler.signal_count(),
        uptime_secs = started.elapsed().as_secs(),
        "Daemon shutdown complete"
    );
    Ok(())
}

/// Re-read the configuration and apply its tunables.
fn reload(args: &Args, boost: &CpuBoost) {
    info!("Reload signal received, re-reading configuration");
    let config = match load_effective_config(args) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %format!("{e:#}"), "Reload failed, keeping current configuration");
            return;
        }
    };
    match boost.reconfigure(&config) {
        Ok(()) => info!(boost_freq = %boost.boost_freq().trim_end(), window_ms = boost.window_ms(), "Configuration reloaded"),
        Err(e) => error!(error = %e, "Reload rejected"),
    }
}
