//! Tile-grid producer: streams the tiles around the camera.

use std::collections::BTreeSet;
use std::future::Future;
use std::pin::Pin;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::tile::{tiles_around, TileCoord};
use super::FeatureProducer;
use crate::channel::{ChannelError, Outbound, ProducerEndpoint};
use crate::config::{ProducerSettings, MAX_PRODUCER_RADIUS, MAX_PRODUCER_ZOOM};
use crate::geo::GeoPosition;
use crate::layer::LayerId;

/// Counters for what the producer has emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProducerStats {
    pub camera_updates: u64,
    pub adds: u64,
    pub removes: u64,
}

/// Keeps every registered layer filled with the tiles within
/// `radius` tiles of the camera.
///
/// On each camera update the visible tile set is recomputed and diffed
/// against the previous one: tiles that left the set are removed first,
/// then new tiles are added. An unchanged set emits nothing.
#[derive(Debug, Default)]
pub struct TileGridProducer {
    settings: ProducerSettings,
    layers: Vec<LayerId>,
    visible: BTreeSet<TileCoord>,
    initialized: bool,
    stats: ProducerStats,
}

impl TileGridProducer {
    pub fn new(settings: ProducerSettings) -> Self {
        Self {
            settings: clamp(settings),
            ..Self::default()
        }
    }

    pub fn settings(&self) -> ProducerSettings {
        self.settings
    }

    pub fn layers(&self) -> &[LayerId] {
        &self.layers
    }

    pub fn visible_tiles(&self) -> &BTreeSet<TileCoord> {
        &self.visible
    }

    pub fn stats(&self) -> ProducerStats {
        self.stats
    }

    /// Process one command from the main loop.
    pub fn handle(
        &mut self,
        command: Outbound,
        endpoint: &ProducerEndpoint,
    ) -> Result<(), ChannelError> {
        match command {
            Outbound::Init { config } => {
                self.apply_init(&config);
                Ok(())
            }
            Outbound::AddLayer { id, .. } => self.add_layer(id, endpoint),
            Outbound::CameraPos { camera_pos } => self.move_camera(camera_pos, endpoint),
        }
    }

    fn apply_init(&mut self, config: &Value) {
        if self.initialized {
            tracing::warn!("Duplicate init ignored");
            return;
        }
        self.initialized = true;

        if let Some(producer) = config.get("producer") {
            match serde_json::from_value::<ProducerSettings>(producer.clone()) {
                Ok(settings) => self.settings = clamp(settings),
                Err(e) => tracing::warn!(error = %e, "Invalid producer settings; using defaults"),
            }
        }
        tracing::debug!(
            zoom = self.settings.zoom,
            radius = self.settings.radius,
            "Tile producer initialized"
        );
    }

    fn add_layer(&mut self, id: LayerId, endpoint: &ProducerEndpoint) -> Result<(), ChannelError> {
        if self.layers.contains(&id) {
            return Ok(());
        }
        // A late layer catches up on tiles already visible.
        for tile in &self.visible {
            endpoint.send_add(id.clone(), tile.feature_id(), tile.to_feature())?;
            self.stats.adds += 1;
        }
        tracing::debug!(layer = %id, "Layer registered with producer");
        self.layers.push(id);
        Ok(())
    }

    fn move_camera(
        &mut self,
        position: GeoPosition,
        endpoint: &ProducerEndpoint,
    ) -> Result<(), ChannelError> {
        self.stats.camera_updates += 1;

        let center = TileCoord::containing(position.point(), self.settings.zoom);
        let next = tiles_around(center, self.settings.radius);

        let gone: Vec<TileCoord> = self.visible.difference(&next).copied().collect();
        let new: Vec<TileCoord> = next.difference(&self.visible).copied().collect();
        if gone.is_empty() && new.is_empty() {
            return Ok(());
        }

        for layer in &self.layers {
            for tile in &gone {
                endpoint.send_remove(layer.clone(), tile.feature_id())?;
                self.stats.removes += 1;
            }
            for tile in &new {
                endpoint.send_add(layer.clone(), tile.feature_id(), tile.to_feature())?;
                self.stats.adds += 1;
            }
        }

        tracing::debug!(
            center = %center,
            added = new.len(),
            removed = gone.len(),
            "Tile set changed"
        );
        self.visible = next;
        Ok(())
    }
}

fn clamp(settings: ProducerSettings) -> ProducerSettings {
    ProducerSettings {
        zoom: settings.zoom.min(MAX_PRODUCER_ZOOM),
        radius: settings.radius.min(MAX_PRODUCER_RADIUS),
    }
}

impl FeatureProducer for TileGridProducer {
    fn run(
        mut self: Box<Self>,
        mut endpoint: ProducerEndpoint,
        cancellation_token: CancellationToken,
    ) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(async move {
            tracing::info!(
                zoom = self.settings.zoom,
                radius = self.settings.radius,
                "Tile producer started"
            );

            loop {
                tokio::select! {
                    biased;

                    _ = cancellation_token.cancelled() => break,

                    command = endpoint.recv() => {
                        let Some(command) = command else { break };
                        if let Err(e) = self.handle(command, &endpoint) {
                            tracing::debug!(error = %e, "Main loop gone");
                            break;
                        }
                    }
                }
            }

            tracing::info!(
                adds = self.stats.adds,
                removes = self.stats.removes,
                "Tile producer stopped"
            );
        })
    }

    fn name(&self) -> &'static str {
        "tile-grid"
    }
}
