//! Push collaborator boundary.
//!
//! The retry engine only sees [`PushClient`]: one publish call per attempt,
//! returning the API's message identifier or a [`PushError`] whose kind can
//! be classified. [`crate::sns::SnsClient`] is the production
//! implementation.

use pushbridge_core::OutboundMessage;
use serde_json::{json, Map, Value};

use crate::error::PushError;

/// A single notification to publish.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishRequest {
    /// Endpoint the notification is addressed to.
    pub target_endpoint: String,
    /// Notification title, may be empty.
    pub title: String,
    /// Notification body.
    pub body: String,
    /// Auxiliary data, omitted from the payload when empty.
    pub data: Option<Map<String, Value>>,
}

impl PublishRequest {
    /// Builds the `MessageStructure=json` message document.
    ///
    /// The `default` entry carries the plain body for protocols without a
    /// specific entry. The `GCM` entry is itself a JSON string with a
    /// `notification` object and, when present, the auxiliary `data`.
    pub fn message_payload(&self) -> String {
        let mut gcm = json!({
            "notification": {
                "title": self.title,
                "body": self.body,
            }
        });
        if let Some(data) = self.data.as_ref().filter(|data| !data.is_empty()) {
            gcm["data"] = Value::Object(data.clone());
        }

        json!({
            "default": self.body,
            "GCM": gcm.to_string(),
        })
        .to_string()
    }
}

impl From<&OutboundMessage> for PublishRequest {
    fn from(message: &OutboundMessage) -> Self {
        Self {
            target_endpoint: message.target_endpoint.clone(),
            title: message.title.clone(),
            body: message.body.clone(),
            data: message.non_empty_data().cloned(),
        }
    }
}

/// Outbound push API.
///
/// Implementations are shared by every partition loop and must be safe for
/// concurrent calls.
#[async_trait::async_trait]
pub trait PushClient: Send + Sync + std::fmt::Debug {
    /// Publishes one notification and returns the API's message identifier.
    ///
    /// # Errors
    ///
    /// Returns a [`PushError`] whose kind identifies the failure.
    async fn publish(&self, request: &PublishRequest) -> Result<String, PushError>;
}
