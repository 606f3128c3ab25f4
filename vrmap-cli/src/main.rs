//! VRMap CLI - headless driver for the map core.

mod commands;
mod error;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use vrmap::logging::{default_log_file, init_logging, LoggingConfig};

use commands::config::ConfigCommands;
use commands::run::RunArgs;
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "vrmap")]
#[command(about = "Camera-to-geography sync and feature streaming for VR maps")]
#[command(version)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Also write logs to ~/.vrmap/vrmap.log (or the given file)
    #[arg(long, global = true, num_args = 0..=1)]
    log_file: Option<Option<PathBuf>>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run a headless session with a scripted camera and the tile producer
    Run(RunCommand),

    /// List configured location presets
    Presets {
        /// Configuration file (defaults to ~/.vrmap/config.ini)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Configuration file commands
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Debug, Args)]
struct RunCommand {
    /// Configuration file (defaults to ~/.vrmap/config.ini)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Start at the named preset
    #[arg(long, conflicts_with_all = ["lat", "lon"])]
    preset: Option<String>,

    /// Start at this latitude
    #[arg(long, requires = "lon", allow_hyphen_values = true)]
    lat: Option<f64>,

    /// Start at this longitude
    #[arg(long, requires = "lat", allow_hyphen_values = true)]
    lon: Option<f64>,

    /// Stop after this many ticks (0 runs until Ctrl+C)
    #[arg(long, default_value_t = 300)]
    ticks: u64,

    /// Camera speed in meters per tick
    #[arg(long, default_value_t = 5.0)]
    speed: f64,

    /// Camera turn rate in degrees per tick
    #[arg(long, default_value_t = 0.2, allow_hyphen_values = true)]
    turn_rate: f64,

    /// Override max_feature_add_per_tick
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    max_add: Option<u64>,
}

impl From<RunCommand> for RunArgs {
    fn from(cmd: RunCommand) -> Self {
        RunArgs {
            config: cmd.config,
            preset: cmd.preset,
            latitude: cmd.lat,
            longitude: cmd.lon,
            ticks: cmd.ticks,
            speed: cmd.speed,
            turn_rate: cmd.turn_rate,
            max_add: cmd.max_add.map(|n| n as usize),
        }
    }
}

fn logging_config(cli: &Cli) -> Result<LoggingConfig, CliError> {
    let file = match &cli.log_file {
        None => None,
        Some(None) => Some(
            default_log_file()
                .ok_or_else(|| CliError::Config("Could not determine home directory".to_string()))?,
        ),
        Some(Some(path)) => Some(path.clone()),
    };
    Ok(LoggingConfig {
        level: if cli.verbose { "debug" } else { "info" }.to_string(),
        file,
    })
}

fn run(cli: Cli) -> Result<(), CliError> {
    let _guard = init_logging(&logging_config(&cli)?)?;

    match cli.command {
        Commands::Run(cmd) => commands::run::run(cmd.into()),
        Commands::Presets { config } => commands::presets::run(config.as_deref()),
        Commands::Config { command } => commands::config::run(command),
    }
}

fn main() -> ExitCode {
    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
