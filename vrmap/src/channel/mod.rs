//! Asynchronous channel between the main loop and the feature producer.
//!
//! This is the only asynchronous boundary in the core. The main loop owns a
//! [`FeatureChannel`]; the producer owns the matching [`ProducerEndpoint`].
//! Each direction is a single unbounded FIFO queue, so messages about the
//! same feature arrive in the order the producer emitted them.
//!
//! ```text
//! ┌──────────────┐   Outbound (init, addLayer, cameraPos)   ┌──────────────────┐
//! │ FeatureChannel│ ───────────────────────────────────────► │ ProducerEndpoint │
//! │  (main loop) │ ◄─────────────────────────────────────── │   (background)   │
//! └──────────────┘        FeatureMessage (add, remove)      └──────────────────┘
//! ```
//!
//! Sends never block. The main loop pulls inbound events with
//! [`FeatureChannel::try_recv_event`] or hands them to the single handler
//! installed by [`FeatureChannel::on_feature_event`]. A
//! [`MapSession`](crate::session::MapSession) owns its channel and always
//! pulls, feeding each event through admission control; the handler path is
//! for hosts that drive a `FeatureChannel` without a session.

mod message;

pub use message::{FeatureMessage, Outbound};

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TryRecvError};

use crate::geo::GeoPosition;
use crate::layer::LayerId;

/// Errors raised by the feature channel.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// `register_layer` was called before `init`.
    #[error("Channel has not been initialized")]
    NotInitialized,

    /// `init` was called a second time.
    #[error("Channel is already initialized")]
    AlreadyInitialized,

    /// The other side of the channel has been dropped.
    #[error("Channel peer has disconnected")]
    Disconnected,

    /// A message could not be encoded or decoded.
    #[error("Message codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Inbound event handler. Only the most recently installed one is called.
pub type FeatureHandler = Box<dyn FnMut(FeatureMessage) + Send>;

/// Main-loop side of the producer channel.
pub struct FeatureChannel {
    commands: mpsc::UnboundedSender<Outbound>,
    events: mpsc::UnboundedReceiver<FeatureMessage>,
    initialized: bool,
    handler: Option<FeatureHandler>,
}

impl std::fmt::Debug for FeatureChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureChannel")
            .field("initialized", &self.initialized)
            .field("has_handler", &self.handler.is_some())
            .finish()
    }
}

impl FeatureChannel {
    /// Create a connected channel pair.
    pub fn new() -> (Self, ProducerEndpoint) {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let channel = Self {
            commands: commands_tx,
            events: events_rx,
            initialized: false,
            handler: None,
        };
        let endpoint = ProducerEndpoint {
            commands: commands_rx,
            events: events_tx,
        };
        (channel, endpoint)
    }

    /// Whether the `init` handshake has been sent.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Send the one-shot `init` handshake.
    pub fn init<C: Serialize + ?Sized>(&mut self, config: &C) -> Result<(), ChannelError> {
        if self.initialized {
            return Err(ChannelError::AlreadyInitialized);
        }
        let config = serde_json::to_value(config)?;
        self.send(Outbound::Init { config })?;
        self.initialized = true;
        tracing::debug!("Feature channel initialized");
        Ok(())
    }

    /// Declare interest in a feature layer.
    pub fn register_layer(
        &mut self,
        id: LayerId,
        query: Value,
        modifier: Option<Value>,
    ) -> Result<(), ChannelError> {
        if !self.initialized {
            return Err(ChannelError::NotInitialized);
        }
        tracing::debug!(layer = %id, "Registering layer with producer");
        self.send(Outbound::AddLayer {
            id,
            query,
            modifier,
        })
    }

    /// Tell the producer where the camera is. Fire-and-forget.
    pub fn send_camera_position(&self, position: GeoPosition) -> Result<(), ChannelError> {
        self.send(Outbound::CameraPos {
            camera_pos: position,
        })
    }

    fn send(&self, message: Outbound) -> Result<(), ChannelError> {
        self.commands
            .send(message)
            .map_err(|_| ChannelError::Disconnected)
    }

    /// Install the inbound event handler, returning the one it replaces.
    ///
    /// Only for hosts that use the channel directly. Events handed to the
    /// handler bypass admission control.
    pub fn on_feature_event(&mut self, handler: FeatureHandler) -> Option<FeatureHandler> {
        self.handler.replace(handler)
    }

    /// Hand every queued inbound event to the installed handler.
    ///
    /// Returns the number of events dispatched. Without a handler nothing is
    /// consumed and events stay queued.
    pub fn dispatch_pending(&mut self) -> usize {
        let Some(handler) = self.handler.as_mut() else {
            return 0;
        };

        let mut dispatched = 0;
        while let Ok(event) = self.events.try_recv() {
            handler(event);
            dispatched += 1;
        }
        dispatched
    }

    /// Take the next queued inbound event without waiting.
    ///
    /// `Ok(None)` means nothing is queued right now. `Disconnected` is only
    /// reported once the producer is gone and its queue has been drained.
    pub fn try_recv_event(&mut self) -> Result<Option<FeatureMessage>, ChannelError> {
        match self.events.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(ChannelError::Disconnected),
        }
    }
}

/// Producer side of the channel.
#[derive(Debug)]
pub struct ProducerEndpoint {
    commands: mpsc::UnboundedReceiver<Outbound>,
    events: mpsc::UnboundedSender<FeatureMessage>,
}

impl ProducerEndpoint {
    /// Wait for the next command. `None` once the main loop has dropped its side.
    pub async fn recv(&mut self) -> Option<Outbound> {
        self.commands.recv().await
    }

    /// Emit a feature event.
    pub fn send(&self, event: FeatureMessage) -> Result<(), ChannelError> {
        self.events.send(event).map_err(|_| ChannelError::Disconnected)
    }

    pub fn send_add(
        &self,
        id: LayerId,
        feature_id: impl Into<String>,
        feature: Value,
    ) -> Result<(), ChannelError> {
        self.send(FeatureMessage::add(id, feature_id, feature))
    }

    pub fn send_remove(
        &self,
        id: LayerId,
        feature_id: impl Into<String>,
    ) -> Result<(), ChannelError> {
        self.send(FeatureMessage::remove(id, feature_id))
    }
}
