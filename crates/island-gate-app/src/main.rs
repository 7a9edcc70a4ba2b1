#![warn(missing_docs)]
//! # island-gate binary
//!
//! Command-line entry point for inspecting and exercising the location gate
//! against the file-backed store.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use island_gate_app::{
    AppError, GateConfig, LocationSession, app_version, build_detector, init_logging,
    render_report,
};
use island_gate_core::Coordinate;
use island_gate_detect::{FixedSensor, SensorFailure};
use island_gate_store::{FileStore, SystemClock};

/// Location gate for the island bulletin board.
#[derive(Parser, Debug)]
#[command(name = "island-gate", version = app_version(), about, long_about = None)]
struct Cli {
    /// Persistence directory (overrides ISLAND_GATE_DATA_DIR)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the cached location and current capabilities
    Status,

    /// Run one detection and apply its side effects
    Check {
        /// Latitude of a manual position fix
        #[arg(long, requires = "lng", allow_hyphen_values = true)]
        lat: Option<f64>,

        /// Longitude of a manual position fix
        #[arg(long, requires = "lat", allow_hyphen_values = true)]
        lng: Option<f64>,

        /// Simulate a refused location permission
        #[arg(long, conflicts_with_all = ["lat", "lng"])]
        denied: bool,
    },

    /// Clear the cached location
    Reset {
        /// Also clear the access history
        #[arg(long)]
        history: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("island-gate: {error}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), AppError> {
    let mut config = GateConfig::from_env();
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }

    let sensor = match &cli.command {
        Command::Check { denied: true, .. } => {
            FixedSensor::failing(SensorFailure::PermissionDenied)
        }
        Command::Check {
            lat: Some(lat),
            lng: Some(lng),
            ..
        } => {
            let coordinate =
                Coordinate::new(*lat, *lng).map_err(|error| AppError::Usage(error.to_string()))?;
            FixedSensor::fix(coordinate)
        }
        _ => FixedSensor::unsupported(),
    };

    let detector = build_detector(&config, Arc::new(sensor))?;
    let store = Arc::new(FileStore::new(config.data_dir.clone()));
    let mut session = LocationSession::start(&config, store, Arc::new(SystemClock), detector);

    match cli.command {
        Command::Status => {}
        Command::Check { .. } => {
            session.request_detection().await;
        }
        Command::Reset { history } => {
            session.reset_location()?;
            if history {
                session.reset_access_history()?;
            }
        }
    }

    print_report(&session)
}

fn print_report(session: &LocationSession) -> Result<(), AppError> {
    println!("{}", render_report(session)?);
    Ok(())
}
