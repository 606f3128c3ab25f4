//! Application error types.

use std::fmt;

use crate::config::ConfigError;
use crate::layer::LayerError;
use crate::session::SessionError;

/// Errors that can occur during application lifecycle.
#[derive(Debug)]
pub enum AppError {
    /// Configuration could not be loaded or is invalid.
    Config(ConfigError),

    /// The map session could not be started or a scene could not be loaded.
    Session(SessionError),

    /// Layer resources failed to load.
    LayerLoad(LayerError),

    /// Failed to create the Tokio runtime.
    RuntimeCreation(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(e) => write!(f, "Configuration error: {}", e),
            AppError::Session(e) => write!(f, "Map session error: {}", e),
            AppError::LayerLoad(e) => write!(f, "Failed to load layers: {}", e),
            AppError::RuntimeCreation(msg) => {
                write!(f, "Failed to create Tokio runtime: {}", msg)
            }
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(e) => Some(e),
            AppError::Session(e) => Some(e),
            AppError::LayerLoad(e) => Some(e),
            AppError::RuntimeCreation(_) => None,
        }
    }
}

impl From<ConfigError> for AppError {
    fn from(e: ConfigError) -> Self {
        AppError::Config(e)
    }
}

impl From<SessionError> for AppError {
    fn from(e: SessionError) -> Self {
        AppError::Session(e)
    }
}

impl From<LayerError> for AppError {
    fn from(e: LayerError) -> Self {
        AppError::LayerLoad(e)
    }
}
