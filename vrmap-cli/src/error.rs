//! CLI error type.

use std::fmt;

use vrmap::app::AppError;
use vrmap::config::ConfigError;
use vrmap::logging::LoggingError;
use vrmap::session::SessionError;

/// Errors reported by CLI commands.
#[derive(Debug)]
pub enum CliError {
    /// Invalid arguments or missing configuration.
    Config(String),

    /// The configuration file could not be used.
    ConfigFile(ConfigError),

    /// The map core failed to start.
    App(AppError),

    /// The scene could not be loaded.
    Scene(SessionError),

    /// Logging could not be set up.
    Logging(LoggingError),

    /// Failed to install the Ctrl+C handler.
    Signal(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "{}", msg),
            CliError::ConfigFile(e) => write!(f, "{}", e),
            CliError::App(e) => write!(f, "{}", e),
            CliError::Scene(e) => write!(f, "Failed to load scene: {}", e),
            CliError::Logging(e) => write!(f, "{}", e),
            CliError::Signal(msg) => write!(f, "Failed to set signal handler: {}", msg),
        }
    }
}

impl std::error::Error for CliError {}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::ConfigFile(e)
    }
}

impl From<AppError> for CliError {
    fn from(e: AppError) -> Self {
        CliError::App(e)
    }
}

impl From<SessionError> for CliError {
    fn from(e: SessionError) -> Self {
        CliError::Scene(e)
    }
}

impl From<LoggingError> for CliError {
    fn from(e: LoggingError) -> Self {
        CliError::Logging(e)
    }
}
