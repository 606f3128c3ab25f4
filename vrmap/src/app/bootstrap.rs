//! Application bootstrap implementation.
//!
//! `VrMapApp` wires the pieces together in a fixed order:
//!
//! 1. build the layer registry from the enabled modules,
//! 2. open the feature channel and spawn the producer on the runtime,
//! 3. start the session (`init`, then `addLayer` per layer),
//! 4. load layer resources (all layers concurrently).

use tokio::runtime::{Handle, Runtime};
use tracing::info;

use super::config::AppConfig;
use super::error::AppError;
use crate::channel::FeatureChannel;
use crate::layer::LayerFactory;
use crate::producer::{spawn_producer, ProducerHandle, TileGridProducer};
use crate::session::MapSession;

/// A running VRMap core: session on the caller's thread, producer on tokio.
///
/// # Example
///
/// ```ignore
/// let mut app = VrMapApp::start_sync(AppConfig::default())?;
///
/// let center = CenterSource::Preset("Innsbruck".into());
/// app.session_mut().load_scene(&center, None, &camera)?;
/// loop {
///     app.session_mut().tick(&camera);
///     // render
///     app.session_mut().tock();
/// }
///
/// app.shutdown_sync();
/// ```
pub struct VrMapApp {
    session: MapSession,
    producer: ProducerHandle,
    config: AppConfig,

    /// Owned runtime when created via `start_sync()`.
    runtime: Option<Runtime>,
}

impl std::fmt::Debug for VrMapApp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VrMapApp")
            .field("session", &self.session)
            .field("producer", &self.producer.name())
            .field("owns_runtime", &self.runtime.is_some())
            .finish()
    }
}

impl VrMapApp {
    /// Start on the current Tokio runtime, with in-memory layers for every
    /// enabled module.
    pub async fn start(config: AppConfig) -> Result<Self, AppError> {
        let factory = LayerFactory::in_memory(config.map.modules.clone());
        Self::start_with_factory(config, &factory).await
    }

    /// Start on the current Tokio runtime with custom layer implementations.
    pub async fn start_with_factory(
        config: AppConfig,
        factory: &LayerFactory,
    ) -> Result<Self, AppError> {
        info!(
            modules = config.map.modules.len(),
            source = ?config.source,
            "Starting VRMap"
        );

        let layers = factory.build(&config.map.modules)?;

        let (channel, endpoint) = FeatureChannel::new();
        let producer = spawn_producer(
            Box::new(TileGridProducer::new(config.map.producer)),
            endpoint,
            &Handle::current(),
        );

        let mut session = match MapSession::start(config.map.clone(), layers, channel) {
            Ok(session) => session,
            Err(e) => {
                producer.shutdown();
                return Err(e.into());
            }
        };
        if let Err(e) = session.load_layers().await {
            producer.shutdown();
            return Err(e.into());
        }

        info!(producer = producer.name(), "VRMap started");

        Ok(Self {
            session,
            producer,
            config,
            runtime: None,
        })
    }

    /// Start synchronously on an app-owned runtime.
    pub fn start_sync(config: AppConfig) -> Result<Self, AppError> {
        let factory = LayerFactory::in_memory(config.map.modules.clone());
        Self::start_sync_with_factory(config, &factory)
    }

    /// Start synchronously on an app-owned runtime with custom layers.
    pub fn start_sync_with_factory(
        config: AppConfig,
        factory: &LayerFactory,
    ) -> Result<Self, AppError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(config.worker_threads)
            .thread_name("vrmap-producer")
            .enable_all()
            .build()
            .map_err(|e| AppError::RuntimeCreation(e.to_string()))?;

        let mut app = runtime.block_on(Self::start_with_factory(config, factory))?;
        app.runtime = Some(runtime);
        Ok(app)
    }

    pub fn session(&self) -> &MapSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut MapSession {
        &mut self.session
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn producer(&self) -> &ProducerHandle {
        &self.producer
    }

    /// Handle to the runtime the producer runs on.
    pub fn runtime_handle(&self) -> Handle {
        match &self.runtime {
            Some(runtime) => runtime.handle().clone(),
            None => Handle::current(),
        }
    }

    /// Stop the producer and wait for it (async-started apps).
    pub async fn shutdown(self) {
        self.producer.stop().await;
        info!("VRMap shutdown complete");
    }

    /// Stop the producer and tear down the owned runtime.
    ///
    /// Must not be called from within an async context.
    pub fn shutdown_sync(self) {
        match self.runtime {
            Some(runtime) => {
                runtime.block_on(self.producer.stop());
                runtime.shutdown_timeout(std::time::Duration::from_secs(1));
            }
            None => self.producer.shutdown(),
        }
        info!("VRMap shutdown complete");
    }
}
