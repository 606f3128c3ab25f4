//! Configuration management CLI commands.
//!
//! Provides `config check` and `config path`.

use std::path::PathBuf;

use clap::Subcommand;

use super::common::resolve_config_path;
use crate::error::CliError;
use vrmap::config::MapConfig;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Validate a configuration file and print its settings
    Check {
        /// Configuration file (defaults to ~/.vrmap/config.ini)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Show the configuration file path
    Path,
}

/// Run a config subcommand.
pub fn run(command: ConfigCommands) -> Result<(), CliError> {
    match command {
        ConfigCommands::Check { config } => run_check(config),
        ConfigCommands::Path => run_path(),
    }
}

/// Validate a configuration file.
fn run_check(path: Option<PathBuf>) -> Result<(), CliError> {
    let path = resolve_config_path(path.as_deref())?;
    let config = MapConfig::load(&path)?;

    println!("{}: OK", path.display());
    println!();
    println!("[map]");
    println!("  max_feature_add_per_tick = {}", config.max_feature_add_per_tick);
    println!(
        "  modules = {}",
        config
            .modules
            .iter()
            .map(|m| m.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!("  drain_order = {}", config.drain_order);
    println!("[producer]");
    println!("  zoom = {}", config.producer.zoom);
    println!("  radius = {}", config.producer.radius);
    println!("presets = {}", config.presets.len());

    Ok(())
}

/// Show the configuration file path.
fn run_path() -> Result<(), CliError> {
    println!("{}", resolve_config_path(None)?.display());
    Ok(())
}
