//! Builds a [`LayerRegistry`] from the modules enabled in the configuration.

use std::collections::HashMap;

use super::{InMemoryLayer, Layer, LayerId, LayerRegistry};
use crate::config::ConfigError;

/// Creates a fresh layer instance.
pub type LayerConstructor = Box<dyn Fn() -> Box<dyn Layer> + Send + Sync>;

/// Maps module names to layer constructors.
#[derive(Default)]
pub struct LayerFactory {
    constructors: HashMap<LayerId, LayerConstructor>,
}

impl LayerFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Factory that backs every listed module with an [`InMemoryLayer`]
    /// registered with the producer using an empty query.
    pub fn in_memory<I, S>(modules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<LayerId>,
    {
        let mut factory = Self::new();
        for module in modules {
            factory.register(module, || {
                Box::new(InMemoryLayer::new().with_query(serde_json::json!({})))
            });
        }
        factory
    }

    /// Make `module` available. A later registration replaces an earlier one.
    pub fn register<F>(&mut self, module: impl Into<LayerId>, constructor: F) -> &mut Self
    where
        F: Fn() -> Box<dyn Layer> + Send + Sync + 'static,
    {
        self.constructors.insert(module.into(), Box::new(constructor));
        self
    }

    pub fn supports(&self, module: &str) -> bool {
        self.constructors.contains_key(module)
    }

    /// Instantiate every enabled module, in the given order.
    pub fn build(&self, modules: &[LayerId]) -> Result<LayerRegistry, ConfigError> {
        let mut registry = LayerRegistry::new();
        for module in modules {
            let constructor = self
                .constructors
                .get(module)
                .ok_or_else(|| ConfigError::UnknownModule(module.to_string()))?;

            // Modules listed twice are set up once.
            if registry.contains(module.as_str()) {
                tracing::warn!(module = %module, "Module listed more than once");
                continue;
            }
            registry
                .register(module.clone(), constructor())
                .map_err(|e| ConfigError::InvalidValue {
                    key: "modules".to_string(),
                    value: module.to_string(),
                    reason: e.to_string(),
                })?;
        }
        Ok(registry)
    }
}
