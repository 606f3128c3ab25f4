//! Feature layers and the registry that drives them.
//!
//! A layer renders and stores one category of map feature (tiles, POIs,
//! paths, ...). The core never looks inside a layer; it only calls the
//! [`Layer`] contract. Concrete renderers live outside this crate and are
//! registered at startup, typically through a [`LayerFactory`].
//!
//! # Example
//!
//! ```
//! use serde_json::json;
//! use vrmap::layer::{InMemoryLayer, LayerId, LayerRegistry};
//!
//! let mut registry = LayerRegistry::new();
//! registry.register(LayerId::from("pois"), Box::new(InMemoryLayer::new())).unwrap();
//!
//! registry.add(&LayerId::from("pois"), "n1", json!({"name": "Cafe"})).unwrap();
//! assert!(registry.add(&LayerId::from("paths"), "w1", json!({})).is_err());
//! ```

mod factory;
mod memory;
mod registry;

pub use factory::{LayerConstructor, LayerFactory};
pub use memory::InMemoryLayer;
pub use registry::{LayerRegistry, UpdateReport};

use std::borrow::Borrow;
use std::fmt;
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Identifier of a registered layer (e.g. `"tiles"`, `"pois"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayerId(String);

impl LayerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LayerId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for LayerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl Borrow<str> for LayerId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Errors raised by layers and the layer registry.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LayerError {
    /// A feature event or call referenced a layer that is not registered.
    #[error("Unknown layer '{0}'")]
    UnknownLayer(LayerId),

    /// A layer id was registered twice.
    #[error("Layer '{0}' is already registered")]
    DuplicateLayer(LayerId),

    /// The layer already holds a feature with this id.
    #[error("Feature '{0}' is already present")]
    DuplicateFeature(String),

    /// The layer holds no feature with this id.
    #[error("Feature '{0}' is not present")]
    UnknownFeature(String),

    /// A layer failed to load its resources.
    #[error("Layer '{id}' failed to load: {reason}")]
    LoadFailed { id: LayerId, reason: String },

    /// Any other layer-specific failure.
    #[error("{0}")]
    Failed(String),
}

/// Future returned by [`Layer::load`].
pub type LoadFuture<'a> = Pin<Box<dyn Future<Output = Result<(), LayerError>> + Send + 'a>>;

/// Capability interface every feature layer implements.
///
/// Calls arrive on the main loop only, one at a time.
pub trait Layer: Send {
    /// Add a feature produced for this layer.
    fn add(&mut self, feature_id: &str, feature: Value) -> Result<(), LayerError>;

    /// Remove a previously added feature.
    fn remove(&mut self, feature_id: &str) -> Result<(), LayerError>;

    /// Called once per confirmed camera movement.
    fn update(&mut self) -> Result<(), LayerError>;

    /// Drop every feature. Afterwards the layer must behave as if it had
    /// just been registered.
    fn clear(&mut self);

    /// Load static resources (models, textures) before the first scene.
    fn load(&mut self) -> LoadFuture<'_> {
        Box::pin(async { Ok(()) })
    }

    /// Filter descriptor sent to the producer. Layers without one are never
    /// registered with the producer.
    fn query(&self) -> Option<Value> {
        None
    }

    /// Transform descriptor applied by the producer to this layer's features.
    fn worker_modifier(&self) -> Option<Value> {
        None
    }
}
