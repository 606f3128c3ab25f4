//! Presets command - list configured scene centers.

use std::path::Path;

use super::common::load_config;
use crate::error::CliError;

/// Run the presets command.
pub fn run(config_path: Option<&Path>) -> Result<(), CliError> {
    let (config, source) = load_config(config_path)?;

    match source {
        Some(path) => println!("Presets from {}", path.display()),
        None => println!("Built-in presets"),
    }
    println!();

    for (index, preset) in config.presets.iter().enumerate() {
        let marker = if index == 0 { " (startup)" } else { "" };
        println!(
            "  {:<20} {:>10.4} {:>10.4}{}",
            preset.title, preset.latitude, preset.longitude, marker
        );
    }

    Ok(())
}
