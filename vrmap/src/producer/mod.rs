//! Background feature producers.
//!
//! A producer runs on the tokio runtime, owns a [`ProducerEndpoint`] and
//! answers camera updates with feature `add`/`remove` events:
//!
//! ```text
//!   main loop ──init/addLayer/cameraPos──► producer task
//!             ◄────────add/remove─────────
//! ```
//!
//! The reference implementation is [`TileGridProducer`], which streams the
//! Web Mercator tiles surrounding the camera.
//!
//! # Example
//!
//! ```ignore
//! let (channel, endpoint) = FeatureChannel::new();
//! let handle = spawn_producer(
//!     Box::new(TileGridProducer::default()),
//!     endpoint,
//!     runtime.handle(),
//! );
//! // ... drive the MapSession ...
//! handle.shutdown();
//! ```

mod grid;
mod tile;

pub use grid::{ProducerStats, TileGridProducer};
pub use tile::{tiles_around, TileCoord, MAX_MERCATOR_LAT};

use std::future::Future;
use std::pin::Pin;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::channel::ProducerEndpoint;

/// A feature producer.
///
/// Uses a boxed future return type so producers can be selected at runtime
/// as trait objects.
pub trait FeatureProducer: Send {
    /// Serve commands from `endpoint` until cancelled or the main loop drops
    /// its side of the channel.
    fn run(
        self: Box<Self>,
        endpoint: ProducerEndpoint,
        cancellation_token: CancellationToken,
    ) -> Pin<Box<dyn Future<Output = ()> + Send>>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

/// Handle to a spawned producer task.
#[derive(Debug)]
pub struct ProducerHandle {
    name: &'static str,
    cancellation_token: CancellationToken,
    task: JoinHandle<()>,
}

impl ProducerHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Token that stops the producer when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Signal the producer to stop without waiting for it.
    pub fn shutdown(&self) {
        self.cancellation_token.cancel();
    }

    /// Signal the producer to stop and wait for the task to end.
    pub async fn stop(self) {
        self.cancellation_token.cancel();
        if let Err(e) = self.task.await {
            tracing::warn!(producer = self.name, error = %e, "Producer task ended abnormally");
        }
    }
}

/// Spawn `producer` on `runtime`.
pub fn spawn_producer(
    producer: Box<dyn FeatureProducer>,
    endpoint: ProducerEndpoint,
    runtime: &Handle,
) -> ProducerHandle {
    let name = producer.name();
    let cancellation_token = CancellationToken::new();
    let task = runtime.spawn(producer.run(endpoint, cancellation_token.clone()));

    tracing::debug!(producer = name, "Producer spawned");

    ProducerHandle {
        name,
        cancellation_token,
        task,
    }
}
