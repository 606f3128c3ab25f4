//! The map session: one owner for all per-scene state.
//!
//! `MapSession` owns the transform, the producer channel, the admission
//! controller, the layer registry and the camera sync loop. The host's render
//! loop drives it:
//!
//! ```text
//!  frame N:  tick(pose) ──► sync camera ──► admit inbound events
//!            ...render...
//!            tock()      ──► drain pending additions
//!  frame N+1: tick(pose) ...
//! ```
//!
//! Both calls take `&mut self`, so the direct-admission phase and the drain
//! phase can never interleave.
//!
//! # Scene reloads
//!
//! [`MapSession::load_scene`] sets a new origin, clears every layer and
//! forces one synchronization. Feature events the producer emitted for the
//! previous scene may still be in flight; they are delivered to the cleared
//! layers like any other event.

use thiserror::Error;

use crate::admission::{Admission, AdmissionController, AdmissionStats, DrainReport};
use crate::channel::{ChannelError, FeatureChannel};
use crate::config::MapConfig;
use crate::geo::{CenterSource, GeoError, GeoPosition, GeoTransform, LocationProvider, SceneOrigin};
use crate::layer::{LayerError, LayerRegistry};
use crate::sync::{CameraSyncLoop, PoseSource, SyncError, SyncOutcome};

/// Errors raised by session setup and scene loading.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    Geo(#[from] GeoError),

    #[error(transparent)]
    Layer(#[from] LayerError),

    #[error(transparent)]
    Sync(#[from] SyncError),
}

/// What happened during one [`MapSession::tick`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TickReport {
    /// Camera sync outcome, `None` if the sync could not run (no pose or no
    /// origin yet).
    pub sync: Option<SyncOutcome>,
    /// Inbound events taken from the channel.
    pub received: usize,
    /// Events delivered to layers.
    pub delivered: usize,
    /// Additions parked for later ticks.
    pub queued: usize,
    /// Events a layer rejected.
    pub rejected: usize,
    /// Removals that cancelled a still-queued addition.
    pub cancelled: usize,
}

/// Result of [`MapSession::load_scene`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneLoad {
    pub origin: SceneOrigin,
    /// Position from the immediate forced sync, `None` if the camera pose was
    /// not available yet (the sync then happens on the next tick).
    pub position: Option<GeoPosition>,
}

/// Explicit context object for one running map.
#[derive(Debug)]
pub struct MapSession {
    config: MapConfig,
    transform: GeoTransform,
    channel: FeatureChannel,
    admission: AdmissionController,
    layers: LayerRegistry,
    sync: CameraSyncLoop,
    producer_gone: bool,
    ticks: u64,
    scene_loads: u64,
}

impl MapSession {
    /// Handshake with the producer and register every layer that has a query.
    pub fn start(
        config: MapConfig,
        layers: LayerRegistry,
        mut channel: FeatureChannel,
    ) -> Result<Self, SessionError> {
        channel.init(&config)?;
        for (id, query, modifier) in layers.registrations() {
            channel.register_layer(id, query, modifier)?;
        }

        let admission =
            AdmissionController::new(config.max_feature_add_per_tick, config.drain_order);

        tracing::info!(
            layers = layers.len(),
            max_add_per_tick = admission.limit(),
            drain_order = %admission.drain_order(),
            "Map session started"
        );

        Ok(Self {
            config,
            transform: GeoTransform::new(),
            channel,
            admission,
            layers,
            sync: CameraSyncLoop::new(),
            producer_gone: false,
            ticks: 0,
            scene_loads: 0,
        })
    }

    /// Load every layer's resources concurrently.
    pub async fn load_layers(&mut self) -> Result<(), LayerError> {
        self.layers.load_all().await
    }

    /// Center a new scene on `center`.
    ///
    /// The host resets its camera rig to the scene origin before calling
    /// this. Layers are cleared before the forced synchronization, so no
    /// layer sees a post-reload `update()` while still holding old features.
    pub fn load_scene(
        &mut self,
        center: &CenterSource,
        location: Option<&dyn LocationProvider>,
        pose: &dyn PoseSource,
    ) -> Result<SceneLoad, SessionError> {
        let point = center.resolve(&self.config.presets, location)?;
        let origin = self.transform.set_origin(point)?;

        self.layers.clear();
        self.sync.force_next();
        self.scene_loads += 1;

        let position = match self
            .sync
            .sample(pose, &self.transform, &self.channel, &mut self.layers)
        {
            Ok(SyncOutcome::Synced(geo)) => Some(geo),
            Ok(SyncOutcome::Unchanged) => None,
            Err(SyncError::PoseUnavailable) => {
                tracing::debug!("Camera not ready; forced sync deferred to next tick");
                None
            }
            Err(e) => return Err(e.into()),
        };

        tracing::info!(origin = %point, scene = self.scene_loads, "Scene loaded");
        Ok(SceneLoad { origin, position })
    }

    /// First half of a frame: synchronize the camera, then admit every
    /// inbound event currently queued on the channel.
    pub fn tick(&mut self, pose: &dyn PoseSource) -> TickReport {
        self.ticks += 1;
        let mut report = TickReport::default();

        match self
            .sync
            .sample(pose, &self.transform, &self.channel, &mut self.layers)
        {
            Ok(outcome) => report.sync = Some(outcome),
            Err(e) => tracing::debug!(error = %e, "Camera sync skipped"),
        }

        loop {
            let message = match self.channel.try_recv_event() {
                Ok(Some(message)) => message,
                Ok(None) => break,
                Err(_) => {
                    if !self.producer_gone {
                        tracing::warn!(
                            "Feature producer disconnected; no further features will arrive"
                        );
                        self.producer_gone = true;
                    }
                    break;
                }
            };

            report.received += 1;
            match self.admission.offer(message, &mut self.layers) {
                Admission::Delivered => report.delivered += 1,
                Admission::Queued => report.queued += 1,
                Admission::Rejected(_) => report.rejected += 1,
                Admission::Cancelled => report.cancelled += 1,
            }
        }

        report
    }

    /// Second half of a frame, after rendering: drain pending additions.
    pub fn tock(&mut self) -> DrainReport {
        self.admission.end_tick(&mut self.layers)
    }

    pub fn config(&self) -> &MapConfig {
        &self.config
    }

    pub fn origin(&self) -> Option<&SceneOrigin> {
        self.transform.origin()
    }

    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    /// Last synchronized camera position.
    pub fn camera_position(&self) -> Option<GeoPosition> {
        self.sync.last_geo()
    }

    pub fn layers(&self) -> &LayerRegistry {
        &self.layers
    }

    pub fn admission_stats(&self) -> AdmissionStats {
        self.admission.stats()
    }

    pub fn pending_additions(&self) -> usize {
        self.admission.pending_len()
    }

    /// Whether the producer side of the channel has gone away.
    pub fn producer_disconnected(&self) -> bool {
        self.producer_gone
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{Outbound, ProducerEndpoint};
    use crate::geo::GeoPoint;
    use crate::layer::{Layer, LayerId};
    use crate::sync::CameraPose;
    use glam::DVec3;
    use serde_json::{json, Value};
    use std::sync::{Arc, Mutex};

    type CallLog = Arc<Mutex<Vec<String>>>;

    /// Layer that records every contract call.
    struct LoggingLayer {
        log: CallLog,
    }

    impl Layer for LoggingLayer {
        fn add(&mut self, feature_id: &str, _: Value) -> Result<(), LayerError> {
            self.log.lock().unwrap().push(format!("add {}", feature_id));
            Ok(())
        }
        fn remove(&mut self, feature_id: &str) -> Result<(), LayerError> {
            self.log.lock().unwrap().push(format!("remove {}", feature_id));
            Ok(())
        }
        fn update(&mut self) -> Result<(), LayerError> {
            self.log.lock().unwrap().push("update".to_string());
            Ok(())
        }
        fn clear(&mut self) {
            self.log.lock().unwrap().push("clear".to_string());
        }
        fn query(&self) -> Option<Value> {
            Some(json!({"kind": "test"}))
        }
    }

    fn config(limit: usize) -> MapConfig {
        MapConfig {
            max_feature_add_per_tick: limit,
            ..MapConfig::default()
        }
    }

    fn session(limit: usize) -> (MapSession, ProducerEndpoint, CallLog) {
        let log = CallLog::default();
        let mut layers = LayerRegistry::new();
        layers
            .register(
                LayerId::from("tiles"),
                Box::new(LoggingLayer {
                    log: Arc::clone(&log),
                }),
            )
            .unwrap();
        let (channel, endpoint) = FeatureChannel::new();
        let session = MapSession::start(config(limit), layers, channel).unwrap();
        (session, endpoint, log)
    }

    fn at_origin() -> CameraPose {
        CameraPose::new(DVec3::ZERO, DVec3::ZERO)
    }

    fn entries(log: &CallLog) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    #[tokio::test]
    async fn test_start_sends_init_then_layers() {
        let (_session, mut endpoint, _) = session(2);

        match endpoint.recv().await {
            Some(Outbound::Init { config }) => assert_eq!(config["maxFeatureAddPerTick"], 2),
            other => panic!("expected init, got {:?}", other),
        }
        match endpoint.recv().await {
            Some(Outbound::AddLayer { id, query, .. }) => {
                assert_eq!(id.as_str(), "tiles");
                assert_eq!(query["kind"], "test");
            }
            other => panic!("expected addLayer, got {:?}", other),
        }
    }

    #[test]
    fn test_reload_clears_before_update() {
        let (mut session, _endpoint, log) = session(2);

        let center = CenterSource::Point(GeoPoint::new(40.0, -74.0));
        let loaded = session.load_scene(&center, None, &at_origin()).unwrap();
        assert_eq!(
            loaded.position,
            Some(GeoPosition {
                latitude: 40.0,
                longitude: -74.0,
                heading: 0.0
            })
        );

        let center = CenterSource::Point(GeoPoint::new(51.5, -0.12));
        session.load_scene(&center, None, &at_origin()).unwrap();

        assert_eq!(entries(&log), vec!["clear", "update", "clear", "update"]);
    }

    #[test]
    fn test_reload_without_pose_syncs_on_next_tick() {
        let (mut session, _endpoint, log) = session(2);

        let center = CenterSource::Point(GeoPoint::new(40.0, -74.0));
        let loaded = session.load_scene(&center, None, &None::<CameraPose>).unwrap();
        assert!(loaded.position.is_none());
        assert_eq!(entries(&log), vec!["clear"]);

        let report = session.tick(&at_origin());
        assert!(matches!(report.sync, Some(SyncOutcome::Synced(_))));
        assert_eq!(entries(&log), vec!["clear", "update"]);
    }

    #[test]
    fn test_load_scene_by_preset() {
        let (mut session, _endpoint, _) = session(2);
        let loaded = session
            .load_scene(&CenterSource::Preset("vienna".into()), None, &at_origin())
            .unwrap();
        assert_eq!(loaded.origin.point(), GeoPoint::new(48.2082, 16.3738));
    }

    #[test]
    fn test_load_scene_unknown_preset() {
        let (mut session, _endpoint, log) = session(2);
        let err = session
            .load_scene(&CenterSource::Preset("Atlantis".into()), None, &at_origin())
            .unwrap_err();
        assert!(matches!(err, SessionError::Geo(GeoError::UnknownPreset(_))));
        assert!(entries(&log).is_empty(), "failed load must not clear layers");
    }

    #[test]
    fn test_tick_before_scene_still_admits_events() {
        let (mut session, endpoint, log) = session(2);
        endpoint
            .send_add(LayerId::from("tiles"), "early", Value::Null)
            .unwrap();

        let report = session.tick(&at_origin());
        assert!(report.sync.is_none());
        assert_eq!(report.delivered, 1);
        assert_eq!(entries(&log), vec!["add early"]);
    }

    #[test]
    fn test_burst_is_spread_over_ticks() {
        let (mut session, endpoint, log) = session(2);
        session
            .load_scene(&CenterSource::Preset("Innsbruck".into()), None, &at_origin())
            .unwrap();
        log.lock().unwrap().clear();

        for n in 0..5 {
            endpoint
                .send_add(LayerId::from("tiles"), format!("f{}", n), Value::Null)
                .unwrap();
        }

        let report = session.tick(&at_origin());
        assert_eq!((report.received, report.delivered, report.queued), (5, 2, 3));
        assert_eq!(session.tock().delivered, 2);
        session.tick(&at_origin());
        assert_eq!(session.tock().delivered, 1);
        assert_eq!(session.pending_additions(), 0);

        let adds = entries(&log).iter().filter(|e| e.starts_with("add")).count();
        assert_eq!(adds, 5);
    }

    #[test]
    fn test_removals_not_throttled() {
        let (mut session, endpoint, log) = session(1);
        let tiles = LayerId::from("tiles");
        endpoint.send_add(tiles.clone(), "a", Value::Null).unwrap();
        endpoint.send_add(tiles.clone(), "b", Value::Null).unwrap();
        endpoint.send_remove(tiles, "a").unwrap();

        let report = session.tick(&at_origin());
        assert_eq!(report.delivered, 2);
        assert_eq!(report.queued, 1);
        assert_eq!(entries(&log), vec!["add a", "remove a"]);
    }

    #[test]
    fn test_removal_of_queued_tile_never_reaches_layer() {
        let (mut session, endpoint, log) = session(1);
        let tiles = LayerId::from("tiles");
        endpoint.send_add(tiles.clone(), "a", Value::Null).unwrap();
        endpoint.send_add(tiles.clone(), "b", Value::Null).unwrap();
        endpoint.send_remove(tiles, "b").unwrap();

        let report = session.tick(&at_origin());
        assert_eq!(report.delivered, 1);
        assert_eq!(report.queued, 1);
        assert_eq!(report.cancelled, 1);
        assert_eq!(report.rejected, 0);

        assert_eq!(session.tock().delivered, 0);
        assert_eq!(session.pending_additions(), 0);
        assert_eq!(entries(&log), vec!["add a"]);
    }

    #[test]
    fn test_unknown_layer_event_does_not_stop_tick() {
        let (mut session, endpoint, log) = session(5);
        endpoint
            .send_add(LayerId::from("buildings"), "b1", Value::Null)
            .unwrap();
        endpoint
            .send_add(LayerId::from("tiles"), "t1", Value::Null)
            .unwrap();

        let report = session.tick(&at_origin());
        assert_eq!(report.rejected, 1);
        assert_eq!(report.delivered, 1);
        assert_eq!(entries(&log), vec!["add t1"]);
    }

    #[test]
    fn test_producer_disconnect_detected() {
        let (mut session, endpoint, _) = session(5);
        drop(endpoint);

        session.tick(&at_origin());
        assert!(session.producer_disconnected());
        assert_eq!(session.ticks(), 1);
    }
}
