//! Layer registry: id → layer handle, with fan-out helpers.

use std::collections::HashMap;

use futures::future::try_join_all;
use serde_json::Value;

use super::{Layer, LayerError, LayerId};

/// Outcome of [`LayerRegistry::update`].
#[derive(Debug, Default)]
pub struct UpdateReport {
    /// Layers whose `update()` succeeded.
    pub updated: usize,
    /// Layers whose `update()` failed, with the error.
    pub failed: Vec<(LayerId, LayerError)>,
}

impl UpdateReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Registered layers in registration order.
#[derive(Default)]
pub struct LayerRegistry {
    layers: Vec<(LayerId, Box<dyn Layer>)>,
    index: HashMap<LayerId, usize>,
}

impl std::fmt::Debug for LayerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.layers.iter().map(|(id, _)| id))
            .finish()
    }
}

impl LayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a layer under a unique id.
    pub fn register(&mut self, id: LayerId, layer: Box<dyn Layer>) -> Result<(), LayerError> {
        if self.index.contains_key(&id) {
            return Err(LayerError::DuplicateLayer(id));
        }
        self.index.insert(id.clone(), self.layers.len());
        self.layers.push((id, layer));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Layer ids in registration order.
    pub fn ids(&self) -> impl Iterator<Item = &LayerId> {
        self.layers.iter().map(|(id, _)| id)
    }

    /// Borrow a layer by id.
    pub fn get(&self, id: &str) -> Option<&dyn Layer> {
        self.index.get(id).map(|&i| self.layers[i].1.as_ref())
    }

    fn get_mut(&mut self, id: &LayerId) -> Result<&mut Box<dyn Layer>, LayerError> {
        let i = *self
            .index
            .get(id)
            .ok_or_else(|| LayerError::UnknownLayer(id.clone()))?;
        Ok(&mut self.layers[i].1)
    }

    /// Producer registrations: `(id, query, modifier)` for every layer that
    /// exposes a query.
    pub fn registrations(&self) -> Vec<(LayerId, Value, Option<Value>)> {
        self.layers
            .iter()
            .filter_map(|(id, layer)| {
                layer
                    .query()
                    .map(|query| (id.clone(), query, layer.worker_modifier()))
            })
            .collect()
    }

    /// Forward a feature to its layer.
    pub fn add(
        &mut self,
        id: &LayerId,
        feature_id: &str,
        feature: Value,
    ) -> Result<(), LayerError> {
        self.get_mut(id)?.add(feature_id, feature)
    }

    /// Forward a removal to its layer.
    pub fn remove(&mut self, id: &LayerId, feature_id: &str) -> Result<(), LayerError> {
        self.get_mut(id)?.remove(feature_id)
    }

    /// Call `update()` on every layer. A failing layer does not stop the others.
    pub fn update(&mut self) -> UpdateReport {
        let mut report = UpdateReport::default();
        for (id, layer) in &mut self.layers {
            match layer.update() {
                Ok(()) => report.updated += 1,
                Err(e) => {
                    tracing::warn!(layer = %id, error = %e, "Layer update failed");
                    report.failed.push((id.clone(), e));
                }
            }
        }
        report
    }

    /// Reset every layer to its freshly registered state.
    pub fn clear(&mut self) {
        for (_, layer) in &mut self.layers {
            layer.clear();
        }
        tracing::debug!(layers = self.layers.len(), "Cleared all layers");
    }

    /// Load every layer concurrently.
    ///
    /// Completes when all loads finish, or with the first error.
    pub async fn load_all(&mut self) -> Result<(), LayerError> {
        let loads = self.layers.iter_mut().map(|(id, layer)| async move {
            layer.load().await.map_err(|e| match e {
                LayerError::LoadFailed { .. } => e,
                other => LayerError::LoadFailed {
                    id: id.clone(),
                    reason: other.to_string(),
                },
            })
        });

        try_join_all(loads).await?;
        tracing::info!(layers = self.layers.len(), "All layers loaded");
        Ok(())
    }
}
