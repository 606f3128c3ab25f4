//! Wire messages exchanged with the feature producer.
//!
//! Field and tag names are the wire contract and must not change:
//!
//! ```text
//! main loop → producer   {fun:'init', config}
//!                        {fun:'addLayer', id, query, modifier}
//!                        {fun:'cameraPos', cameraPos: {latitude, longitude, heading}}
//! producer → main loop   {fun:'add', id, featureId, feature}
//!                        {fun:'remove', id, featureId}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ChannelError;
use crate::geo::GeoPosition;
use crate::layer::LayerId;

/// Commands sent from the main loop to the producer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "fun", rename_all = "camelCase")]
pub enum Outbound {
    /// One-shot handshake carrying the full map configuration.
    Init { config: Value },

    /// Declares interest in a feature layer.
    AddLayer {
        id: LayerId,
        query: Value,
        #[serde(default)]
        modifier: Option<Value>,
    },

    /// The camera moved.
    #[serde(rename_all = "camelCase")]
    CameraPos { camera_pos: GeoPosition },
}

impl Outbound {
    pub fn to_json(&self) -> Result<String, ChannelError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, ChannelError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Feature lifecycle events sent from the producer to the main loop.
///
/// Every message is delivered to its layer at most once, either as soon as
/// it arrives or after waiting in the admission queue. A removal that
/// arrives while its addition is still queued cancels the pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "fun", rename_all = "camelCase")]
pub enum FeatureMessage {
    #[serde(rename_all = "camelCase")]
    Add {
        id: LayerId,
        feature_id: String,
        #[serde(default)]
        feature: Value,
    },

    #[serde(rename_all = "camelCase")]
    Remove { id: LayerId, feature_id: String },
}

impl FeatureMessage {
    pub fn add(id: impl Into<LayerId>, feature_id: impl Into<String>, feature: Value) -> Self {
        FeatureMessage::Add {
            id: id.into(),
            feature_id: feature_id.into(),
            feature,
        }
    }

    pub fn remove(id: impl Into<LayerId>, feature_id: impl Into<String>) -> Self {
        FeatureMessage::Remove {
            id: id.into(),
            feature_id: feature_id.into(),
        }
    }

    /// The layer this message targets.
    pub fn layer_id(&self) -> &LayerId {
        match self {
            FeatureMessage::Add { id, .. } | FeatureMessage::Remove { id, .. } => id,
        }
    }

    pub fn feature_id(&self) -> &str {
        match self {
            FeatureMessage::Add { feature_id, .. } | FeatureMessage::Remove { feature_id, .. } => {
                feature_id
            }
        }
    }

    pub fn is_add(&self) -> bool {
        matches!(self, FeatureMessage::Add { .. })
    }

    pub fn to_json(&self) -> Result<String, ChannelError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, ChannelError> {
        Ok(serde_json::from_str(json)?)
    }
}
