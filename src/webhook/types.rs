//! Push webhook wire types (spec §6).

use serde::{Deserialize, Serialize};

/// Pub/Sub push delivery envelope. Google wraps the actual notification in
/// `message`; `subscription` identifies which subscription delivered it but
/// is not used for routing.
#[derive(Debug, Clone, Deserialize)]
pub struct PubSubEnvelope {
    pub message: PubSubMessage,
    #[serde(default)]
    #[allow(dead_code)]
    pub subscription: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PubSubMessage {
    /// Base64-encoded JSON, typically `{"emailAddress":"…","historyId":"…"}`.
    pub data: Option<String>,
    #[serde(default)]
    #[allow(dead_code)]
    pub message_id: Option<String>,
    #[serde(default)]
    #[allow(dead_code)]
    pub publish_time: Option<String>,
}

/// `{ok:true}` response body for benign/accepted conditions (spec §6).
#[derive(Debug, Clone, Serialize)]
pub struct WebhookAck {
    pub ok: bool,
}

impl WebhookAck {
    pub fn ok() -> Self {
        Self { ok: true }
    }
}
