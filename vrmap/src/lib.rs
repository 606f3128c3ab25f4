//! VRMap - camera-to-geography sync and feature streaming core
//!
//! This library keeps a geographic map aligned with a VR camera moving through
//! a local Cartesian scene, while a background producer streams map features
//! (tiles, points of interest) in and out of a set of layers.
//!
//! ```text
//!  render tick ──► CameraSyncLoop ──► GeoTransform ──► FeatureChannel ──► producer
//!                        │                                   │
//!                        ▼                                   ▼
//!                  LayerRegistry ◄──── AdmissionController ◄─ add/remove
//! ```
//!
//! [`session::MapSession`] owns all of the above for one running map;
//! [`app::VrMapApp`] wires a session to a producer on a Tokio runtime.

pub mod admission;
pub mod app;
pub mod channel;
pub mod config;
pub mod geo;
pub mod layer;
pub mod logging;
pub mod producer;
pub mod session;
pub mod sync;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
