//! Push-channel event shapes. The transport and framing are the platform's
//! concern; only the decoded event payloads are consumed here.

use serde::Deserialize;

use crate::api::MessageRecord;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum PushEvent {
    #[serde(rename = "message.created", rename_all = "camelCase")]
    MessageCreated {
        conversation_id: String,
        message: MessageRecord,
        #[serde(default)]
        timestamp: i64,
    },
    /// Conversation-level read receipt.
    #[serde(rename = "message.read", rename_all = "camelCase")]
    MessageRead {
        conversation_id: String,
        reader_id: String,
    },
}

impl PushEvent {
    pub fn parse(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }

    pub fn tag(&self) -> &'static str {
        match self {
            PushEvent::MessageCreated { .. } => "message.created",
            PushEvent::MessageRead { .. } => "message.read",
        }
    }
}
