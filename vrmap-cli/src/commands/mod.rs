//! CLI command implementations.

pub mod common;
pub mod config;
pub mod presets;
pub mod run;
