//! Inbound activity fields the authenticator reads.
//!
//! The full activity schema belongs to the messaging layer. Only `type`,
//! `serviceUrl` and `channelId` matter here; every other field is kept as
//! opaque JSON.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Minimal view of an inbound activity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundActivity {
    /// Activity type (`message`, `conversationUpdate`, ...)
    #[serde(rename = "type", default)]
    pub activity_type: String,
    /// Endpoint replies for this conversation are sent to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_url: Option<String>,
    /// Channel the activity arrived from (`msteams`, `emulator`, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    /// All remaining fields
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl InboundActivity {
    /// Activity with just the fields authentication needs.
    pub fn new(
        activity_type: impl Into<String>,
        service_url: impl Into<String>,
        channel_id: impl Into<String>,
    ) -> Self {
        Self {
            activity_type: activity_type.into(),
            service_url: Some(service_url.into()),
            channel_id: Some(channel_id.into()),
            extra: Map::new(),
        }
    }

    /// Service URL, if present and non-blank.
    pub fn service_url(&self) -> Option<&str> {
        self.service_url.as_deref().filter(|url| !url.trim().is_empty())
    }

    /// Channel id, if present and non-blank.
    pub fn channel_id(&self) -> Option<&str> {
        self.channel_id.as_deref().filter(|id| !id.trim().is_empty())
    }
}
