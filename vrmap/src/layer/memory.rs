//! Store-only layer.
//!
//! Keeps features in a map and renders nothing. Used for headless runs and
//! as a stand-in wherever a real renderer is not available.

use std::collections::HashMap;

use serde_json::Value;

use super::{Layer, LayerError, LoadFuture};

#[derive(Debug, Default, Clone)]
pub struct InMemoryLayer {
    features: HashMap<String, Value>,
    query: Option<Value>,
    modifier: Option<Value>,
    updates: u64,
    loaded: bool,
}

impl InMemoryLayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register this layer with the producer using `query`.
    pub fn with_query(mut self, query: Value) -> Self {
        self.query = Some(query);
        self
    }

    pub fn with_modifier(mut self, modifier: Value) -> Self {
        self.modifier = Some(modifier);
        self
    }

    pub fn feature(&self, feature_id: &str) -> Option<&Value> {
        self.features.get(feature_id)
    }

    pub fn contains(&self, feature_id: &str) -> bool {
        self.features.contains_key(feature_id)
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Number of `update()` calls since registration or the last `clear()`.
    pub fn update_count(&self) -> u64 {
        self.updates
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }
}

impl Layer for InMemoryLayer {
    fn add(&mut self, feature_id: &str, feature: Value) -> Result<(), LayerError> {
        if self.features.contains_key(feature_id) {
            return Err(LayerError::DuplicateFeature(feature_id.to_string()));
        }
        self.features.insert(feature_id.to_string(), feature);
        Ok(())
    }

    fn remove(&mut self, feature_id: &str) -> Result<(), LayerError> {
        self.features
            .remove(feature_id)
            .map(|_| ())
            .ok_or_else(|| LayerError::UnknownFeature(feature_id.to_string()))
    }

    fn update(&mut self) -> Result<(), LayerError> {
        self.updates += 1;
        Ok(())
    }

    fn clear(&mut self) {
        self.features.clear();
        self.updates = 0;
    }

    fn load(&mut self) -> LoadFuture<'_> {
        self.loaded = true;
        Box::pin(async { Ok(()) })
    }

    fn query(&self) -> Option<Value> {
        self.query.clone()
    }

    fn worker_modifier(&self) -> Option<Value> {
        self.modifier.clone()
    }
}
