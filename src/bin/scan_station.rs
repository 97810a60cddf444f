//! `scan-station` entry point.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use scan_station::builders::StationBuilder;
use scan_station::config::StationConfig;
use scan_station::core::{AppResult, DeviceError, StationError, StatusReporter};
use scan_station::infra::analysis_process::ConfiguredExecutor;
use scan_station::infra::simulated::{SimulatedPositioner, SimulatedSensor, SystemClockSource};
use scan_station::util::init_tracing;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "scan-station", about = "Autonomous scanning station controller")]
struct Cli {
    /// JSON station configuration
    #[arg(long)]
    config: Option<PathBuf>,
    /// Legacy `name;value;<class 'type'>` settings applied on top of the configuration
    #[arg(long)]
    settings: Option<PathBuf>,
    /// Run against simulated devices
    #[arg(long)]
    simulate: bool,
    /// Site latitude reported by the simulated location source
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    latitude: f64,
    /// Site longitude reported by the simulated location source
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    longitude: f64,
    /// Site altitude in metres reported by the simulated location source
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    altitude: f64,
}

fn load_config(cli: &Cli) -> AppResult<StationConfig> {
    let config = match &cli.config {
        Some(path) => StationConfig::from_json_file(path).map_err(anyhow::Error::msg)?,
        None => StationConfig::default(),
    };
    match &cli.settings {
        Some(path) => {
            let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
            config.with_settings_str(&text).map_err(anyhow::Error::msg)
        }
        None => {
            config.validate().map_err(anyhow::Error::msg)?;
            Ok(config)
        }
    }
}

fn main() -> AppResult<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let config = load_config(&cli).context("loading station configuration")?;
    init_tracing(config.log_dir.as_deref()).context("initialising logging")?;
    info!(station = %config.station_name, simulate = cli.simulate, "Starting scan station");

    if !cli.simulate {
        let err = StationError::DeviceUnavailable(DeviceError::Disconnected(
            "no hardware backend available; run with --simulate".into(),
        ));
        error!(error = %err, "Startup failed");
        return Err(err.into());
    }

    let executor = ConfiguredExecutor::from_config(&config.analysis)?;
    let mut station = StationBuilder::new(&config).build(
        SimulatedPositioner::default(),
        SimulatedSensor::default(),
        SystemClockSource::new(cli.latitude, cli.longitude, cli.altitude),
        executor,
    )?;

    let _reporter = config
        .status_file
        .as_ref()
        .map(|path| {
            StatusReporter::spawn(
                station.status_board(),
                path,
                Duration::from_secs(config.status_interval_secs),
            )
        })
        .transpose()?;

    let err = match station.run() {
        Ok(never) => match never {},
        Err(e) => e,
    };
    error!(error = %err, "Station stopped");
    let finished = station.shutdown(Duration::from_secs(10));
    let unfinished = station.dispatcher().active_count();
    info!(finished = finished.len(), unfinished, "Analysis drained");
    Err(err.into())
}
