//! Application bootstrap and lifecycle management.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                        VrMapApp                          │
//! │                                                          │
//! │  caller thread                 tokio runtime             │
//! │  ┌────────────┐   mpsc x2    ┌──────────────────┐        │
//! │  │ MapSession │ ◄──────────► │ TileGridProducer │        │
//! │  └────────────┘              └──────────────────┘        │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use vrmap::app::{AppConfig, VrMapApp};
//!
//! let app = VrMapApp::start(AppConfig::default()).await?;
//! // ... drive app.session_mut() ...
//! app.shutdown().await;
//! ```

mod bootstrap;
mod config;
mod error;

pub use bootstrap::VrMapApp;
pub use config::{AppConfig, DEFAULT_WORKER_THREADS};
pub use error::AppError;
