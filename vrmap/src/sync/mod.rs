//! Per-frame camera synchronization.
//!
//! Every render tick the [`CameraSyncLoop`] samples the camera pose and
//! compares it with the last synchronized pose. Only when the pose actually
//! changed (or a sync is forced after a scene reload) does it:
//!
//! 1. convert the pose to a [`GeoPosition`],
//! 2. send the position to the producer,
//! 3. call `update()` on every layer.
//!
//! Poses are compared by their canonical string form (`"x y z"`), not by
//! float equality. An unchanged pose is the common case and costs two small
//! string formats per frame.

use glam::DVec3;
use thiserror::Error;

use crate::channel::{ChannelError, FeatureChannel};
use crate::geo::{GeoError, GeoPosition, GeoTransform};
use crate::layer::LayerRegistry;

/// Errors that prevent a sync step from running.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The render runtime has no camera pose yet.
    #[error("Camera pose is not available")]
    PoseUnavailable,

    #[error("Transform failed: {0}")]
    Transform(#[from] GeoError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),
}

/// Camera pose as reported by the render runtime.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CameraPose {
    /// World-space position in meters.
    pub world_position: DVec3,
    /// Euler rotation in degrees (`y` is yaw).
    pub world_rotation: DVec3,
}

impl CameraPose {
    pub fn new(world_position: DVec3, world_rotation: DVec3) -> Self {
        Self {
            world_position,
            world_rotation,
        }
    }

    /// Canonical `"x y z"` form of the position.
    pub fn position_key(&self) -> String {
        stringify(self.world_position)
    }

    /// Canonical `"x y z"` form of the rotation.
    pub fn rotation_key(&self) -> String {
        stringify(self.world_rotation)
    }
}

fn stringify(v: DVec3) -> String {
    format!("{} {} {}", v.x, v.y, v.z)
}

/// Camera pose accessor provided by the render runtime.
pub trait PoseSource {
    /// The current camera pose, or `None` before the camera exists.
    fn camera_pose(&self) -> Option<CameraPose>;
}

impl PoseSource for CameraPose {
    fn camera_pose(&self) -> Option<CameraPose> {
        Some(*self)
    }
}

impl PoseSource for Option<CameraPose> {
    fn camera_pose(&self) -> Option<CameraPose> {
        *self
    }
}

/// Result of one sync step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SyncOutcome {
    /// The pose changed (or the step was forced) and was synchronized.
    Synced(GeoPosition),
    /// Same pose as last time; nothing was done.
    Unchanged,
}

/// Detects camera movement and pushes it to the producer and the layers.
#[derive(Debug, Default)]
pub struct CameraSyncLoop {
    last_position: Option<String>,
    last_rotation: Option<String>,
    last_geo: Option<GeoPosition>,
    force: bool,
}

impl CameraSyncLoop {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next step synchronize even if the camera has not moved.
    pub fn force_next(&mut self) {
        self.force = true;
    }

    pub fn is_forced(&self) -> bool {
        self.force
    }

    /// Last synchronized geographic position.
    pub fn last_geo(&self) -> Option<GeoPosition> {
        self.last_geo
    }

    /// Sample the pose from `source` and synchronize if it changed.
    pub fn sample(
        &mut self,
        source: &dyn PoseSource,
        transform: &GeoTransform,
        channel: &FeatureChannel,
        layers: &mut LayerRegistry,
    ) -> Result<SyncOutcome, SyncError> {
        let pose = source.camera_pose().ok_or(SyncError::PoseUnavailable)?;
        self.step(&pose, transform, channel, layers)
    }

    /// Synchronize `pose` if it differs from the last synchronized pose.
    ///
    /// The baseline is only recorded after a successful transform, so a step
    /// that fails (no origin yet) is retried on the next tick.
    pub fn step(
        &mut self,
        pose: &CameraPose,
        transform: &GeoTransform,
        channel: &FeatureChannel,
        layers: &mut LayerRegistry,
    ) -> Result<SyncOutcome, SyncError> {
        let position_key = pose.position_key();
        let rotation_key = pose.rotation_key();

        let changed = self.last_position.as_deref() != Some(position_key.as_str())
            || self.last_rotation.as_deref() != Some(rotation_key.as_str());
        if !self.force && !changed {
            return Ok(SyncOutcome::Unchanged);
        }

        let geo = transform.to_geo(pose.world_position, pose.world_rotation)?;

        if let Err(e) = channel.send_camera_position(geo) {
            tracing::warn!(error = %e, "Camera position not delivered to producer");
        }
        let report = layers.update();

        tracing::debug!(
            lat = geo.latitude,
            lon = geo.longitude,
            heading = geo.heading,
            forced = self.force,
            layer_failures = report.failed.len(),
            "Camera synchronized"
        );

        self.last_position = Some(position_key);
        self.last_rotation = Some(rotation_key);
        self.last_geo = Some(geo);
        self.force = false;

        Ok(SyncOutcome::Synced(geo))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::Outbound;
    use crate::geo::GeoPoint;
    use crate::layer::{Layer, LayerError, LayerId};
    use serde_json::Value;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    /// Layer that only counts `update()` calls.
    struct CountingLayer {
        updates: Arc<AtomicU64>,
    }

    impl Layer for CountingLayer {
        fn add(&mut self, _: &str, _: Value) -> Result<(), LayerError> {
            Ok(())
        }
        fn remove(&mut self, _: &str) -> Result<(), LayerError> {
            Ok(())
        }
        fn update(&mut self) -> Result<(), LayerError> {
            self.updates.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn clear(&mut self) {}
    }

    struct Fixture {
        sync: CameraSyncLoop,
        transform: GeoTransform,
        channel: FeatureChannel,
        endpoint: crate::channel::ProducerEndpoint,
        layers: LayerRegistry,
        updates: Arc<AtomicU64>,
    }

    impl Fixture {
        fn new() -> Self {
            let mut transform = GeoTransform::new();
            transform.set_origin(GeoPoint::new(40.0, -74.0)).unwrap();
            let (channel, endpoint) = FeatureChannel::new();
            let updates = Arc::new(AtomicU64::new(0));
            let mut layers = LayerRegistry::new();
            layers
                .register(
                    LayerId::from("tiles"),
                    Box::new(CountingLayer {
                        updates: Arc::clone(&updates),
                    }),
                )
                .unwrap();
            Self {
                sync: CameraSyncLoop::new(),
                transform,
                channel,
                endpoint,
                layers,
                updates,
            }
        }

        fn step(&mut self, pose: CameraPose) -> Result<SyncOutcome, SyncError> {
            self.sync
                .step(&pose, &self.transform, &self.channel, &mut self.layers)
        }

        fn updates(&self) -> u64 {
            self.updates.load(Ordering::SeqCst)
        }
    }

    fn pose(x: f64, z: f64, yaw: f64) -> CameraPose {
        CameraPose::new(DVec3::new(x, 1.6, z), DVec3::new(0.0, yaw, 0.0))
    }

    #[test]
    fn test_unchanged_pose_is_noop() {
        let mut f = Fixture::new();

        assert!(matches!(f.step(pose(0.0, 0.0, 0.0)), Ok(SyncOutcome::Synced(_))));
        assert_eq!(f.step(pose(0.0, 0.0, 0.0)).unwrap(), SyncOutcome::Unchanged);
        assert_eq!(f.updates(), 1);
    }

    #[test]
    fn test_rotation_change_triggers_sync() {
        let mut f = Fixture::new();
        f.step(pose(0.0, 0.0, 0.0)).unwrap();

        match f.step(pose(0.0, 0.0, -90.0)).unwrap() {
            SyncOutcome::Synced(geo) => assert_eq!(geo.heading, 270.0),
            other => panic!("expected sync, got {:?}", other),
        }
        assert_eq!(f.updates(), 2);
    }

    #[test]
    fn test_force_syncs_same_pose_once() {
        let mut f = Fixture::new();
        f.step(pose(5.0, 5.0, 0.0)).unwrap();

        f.sync.force_next();
        assert!(f.sync.is_forced());
        assert!(matches!(f.step(pose(5.0, 5.0, 0.0)), Ok(SyncOutcome::Synced(_))));
        assert!(!f.sync.is_forced());
        assert_eq!(f.step(pose(5.0, 5.0, 0.0)).unwrap(), SyncOutcome::Unchanged);
    }

    #[test]
    fn test_scenario_origin_pose() {
        let mut f = Fixture::new();
        let outcome = f
            .step(CameraPose::new(DVec3::ZERO, DVec3::ZERO))
            .unwrap();

        assert_eq!(
            outcome,
            SyncOutcome::Synced(GeoPosition {
                latitude: 40.0,
                longitude: -74.0,
                heading: 0.0
            })
        );
    }

    #[test]
    fn test_without_origin_fails_and_retries() {
        let mut f = Fixture::new();
        f.transform = GeoTransform::new();

        assert!(matches!(
            f.step(pose(0.0, 0.0, 0.0)),
            Err(SyncError::Transform(GeoError::OriginNotSet))
        ));
        assert_eq!(f.updates(), 0);

        // Baseline was not recorded, so the same pose syncs once an origin exists
        f.transform.set_origin(GeoPoint::new(1.0, 1.0)).unwrap();
        assert!(matches!(f.step(pose(0.0, 0.0, 0.0)), Ok(SyncOutcome::Synced(_))));
    }

    #[test]
    fn test_sample_without_pose() {
        let mut f = Fixture::new();
        let no_camera: Option<CameraPose> = None;
        let result = f
            .sync
            .sample(&no_camera, &f.transform, &f.channel, &mut f.layers);
        assert!(matches!(result, Err(SyncError::PoseUnavailable)));
    }

    #[tokio::test]
    async fn test_sends_position_once_per_change() {
        let mut f = Fixture::new();
        f.step(pose(0.0, 0.0, 0.0)).unwrap();
        f.step(pose(0.0, 0.0, 0.0)).unwrap();
        f.step(pose(1.0, 0.0, 0.0)).unwrap();

        let mut sent = 0;
        while let Ok(Some(msg)) =
            tokio::time::timeout(std::time::Duration::from_millis(10), f.endpoint.recv()).await
        {
            if let Outbound::CameraPos { .. } = msg {
                sent += 1;
            }
        }
        assert_eq!(sent, 2);
    }

    #[test]
    fn test_position_key_format() {
        let p = CameraPose::new(DVec3::new(1.5, -2.0, 0.0), DVec3::ZERO);
        assert_eq!(p.position_key(), "1.5 -2 0");
        assert_eq!(p.rotation_key(), "0 0 0");
    }
}
