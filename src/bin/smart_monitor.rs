//! smart-monitor: disk S.M.A.R.T. health states
//!
//! Polls every whole disk (or one configured device) and prints the health
//! summaries as JSON, one document per cycle.
//!
//! Run: `smart-monitor --once`
//! Logs: `RUST_LOG=smart_monitor=debug smart-monitor`

use anyhow::{Context, Result};
use clap::Parser;
use smart_monitor::{Agent, Config, DiskCollection, ProcDiskstats, TempUnit};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// smart-monitor: disk S.M.A.R.T. health states
#[derive(Parser, Debug)]
#[command(name = "smart-monitor")]
#[command(version)]
#[command(about = "Disk S.M.A.R.T. health monitor", long_about = None)]
struct Cli {
    /// Config file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Monitor only this device (e.g. /dev/sda)
    #[arg(short, long)]
    device: Option<PathBuf>,

    /// Refresh interval in milliseconds
    #[arg(short, long)]
    interval: Option<u64>,

    /// Print one status and exit
    #[arg(long)]
    once: bool,

    /// Temperature scale (celsius, fahrenheit, kelvin)
    #[arg(short, long)]
    scale: Option<TempUnit>,

    /// Print full agent properties instead of summaries
    #[arg(long)]
    properties: bool,
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => Config::default_path().map(Config::load_or_default).unwrap_or_default(),
    };

    if let Some(device) = &cli.device {
        config.disk.device_name = Some(device.clone());
    }
    if let Some(interval) = cli.interval {
        config.global.update_ms = interval;
    }
    if let Some(scale) = cli.scale {
        config.global.temp_scale = scale;
    }
    config.validate()?;
    Ok(config)
}

fn print_cycle(disks: &mut DiskCollection, properties: bool) -> Result<()> {
    let status = disks.status();
    let json = if properties {
        serde_json::to_string_pretty(&disks.child_properties())?
    } else {
        serde_json::to_string_pretty(&status)?
    };
    println!("{json}");
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    let opener = Arc::new(config.smartctl());
    let lister = Arc::new(ProcDiskstats::new());
    let mut disks =
        DiskCollection::discover(&config, opener, lister).context("enumerating disks")?;

    if disks.is_empty() {
        log::warn!("no whole disks found");
    }

    loop {
        print_cycle(&mut disks, cli.properties)?;
        if cli.once {
            return Ok(());
        }
        std::thread::sleep(disks.interval_hint().max(Duration::from_millis(100)));
    }
}
