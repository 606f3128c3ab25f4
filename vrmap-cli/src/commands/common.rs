//! Common types and utilities shared across CLI commands.

use std::path::{Path, PathBuf};

use vrmap::config::{config_file_path, MapConfig};

use crate::error::CliError;

/// Resolve the configuration file: `--config` if given, else the default path.
pub fn resolve_config_path(cli_path: Option<&Path>) -> Result<PathBuf, CliError> {
    match cli_path {
        Some(path) => Ok(path.to_path_buf()),
        None => config_file_path()
            .ok_or_else(|| CliError::Config("Could not determine home directory".to_string())),
    }
}

/// Load the map configuration.
///
/// An explicit `--config` must exist. A missing default file falls back to
/// built-in defaults; an existing but malformed file is always an error.
pub fn load_config(cli_path: Option<&Path>) -> Result<(MapConfig, Option<PathBuf>), CliError> {
    let path = resolve_config_path(cli_path)?;

    if cli_path.is_none() && !path.exists() {
        tracing::info!(path = %path.display(), "No configuration file; using defaults");
        return Ok((MapConfig::default(), None));
    }

    let config = MapConfig::load(&path)?;
    Ok((config, Some(path)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_missing_config_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.ini");
        assert!(matches!(
            load_config(Some(&path)),
            Err(CliError::ConfigFile(_))
        ));
    }

    #[test]
    fn test_explicit_config_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.ini");
        std::fs::write(
            &path,
            "[map]\nmax_feature_add_per_tick = 7\nmodules = tiles\n\n[preset.Home]\nlatitude = 10\nlongitude = 20\n",
        )
        .unwrap();

        let (config, source) = load_config(Some(&path)).unwrap();
        assert_eq!(config.max_feature_add_per_tick, 7);
        assert_eq!(source.as_deref(), Some(path.as_path()));
    }

    #[test]
    fn test_malformed_config_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.ini");
        std::fs::write(&path, "[map]\nmodules = tiles\n").unwrap();
        assert!(load_config(Some(&path)).is_err());
    }
}
