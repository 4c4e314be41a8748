// Outgoing message lifecycle: Pending -> Confirmed | Failed.

use std::collections::HashMap;

use crate::api::MessageRecord;
use crate::state::{DeliveryState, MessageEnvelope};

/// Owns every in-flight send until confirmation, keyed by the client
/// correlation id. The confirmed envelope replaces the pending one in place
/// in whatever view shows it; this tracker only decides the transitions.
#[derive(Debug, Default)]
pub(super) struct DeliveryTracker {
    // conversation id -> client_ref -> tracked send
    sends: HashMap<String, HashMap<String, OutgoingSend>>,
}

#[derive(Debug, Clone)]
struct OutgoingSend {
    sender_id: String,
    content: String,
    timestamp: i64,
    state: DeliveryState,
}

impl DeliveryTracker {
    /// Starts tracking a new optimistic send and returns the Pending
    /// envelope to show immediately.
    pub(super) fn begin_send(
        &mut self,
        conversation_id: &str,
        sender_id: &str,
        content: String,
        timestamp: i64,
        client_ref: String,
    ) -> MessageEnvelope {
        self.sends
            .entry(conversation_id.to_string())
            .or_default()
            .insert(
                client_ref.clone(),
                OutgoingSend {
                    sender_id: sender_id.to_string(),
                    content: content.clone(),
                    timestamp,
                    state: DeliveryState::Pending,
                },
            );
        MessageEnvelope {
            id: client_ref.clone(),
            conversation_id: conversation_id.to_string(),
            sender_id: sender_id.to_string(),
            content,
            timestamp,
            delivery: DeliveryState::Pending,
            is_read: false,
            is_own: true,
            client_ref: Some(client_ref),
        }
    }

    /// Server confirmation. Returns the Confirmed replacement envelope
    /// carrying the server-assigned id, or None for an unknown send.
    pub(super) fn confirm(
        &mut self,
        conversation_id: &str,
        client_ref: &str,
        record: &MessageRecord,
    ) -> Option<MessageEnvelope> {
        let send = self.sends.get_mut(conversation_id)?.get_mut(client_ref)?;
        send.state = DeliveryState::Confirmed;
        Some(MessageEnvelope {
            id: record.id.clone(),
            conversation_id: conversation_id.to_string(),
            sender_id: send.sender_id.clone(),
            content: record.content.clone(),
            timestamp: record.timestamp,
            delivery: DeliveryState::Confirmed,
            is_read: false,
            is_own: true,
            client_ref: Some(client_ref.to_string()),
        })
    }

    /// Send failure. The envelope stays visible in Failed state and is never
    /// retried automatically.
    pub(super) fn fail(
        &mut self,
        conversation_id: &str,
        client_ref: &str,
        reason: String,
    ) -> Option<MessageEnvelope> {
        let send = self.sends.get_mut(conversation_id)?.get_mut(client_ref)?;
        send.state = DeliveryState::Failed {
            reason: reason.clone(),
        };
        Some(MessageEnvelope {
            id: client_ref.to_string(),
            conversation_id: conversation_id.to_string(),
            sender_id: send.sender_id.clone(),
            content: send.content.clone(),
            timestamp: send.timestamp,
            delivery: DeliveryState::Failed { reason },
            is_read: false,
            is_own: true,
            client_ref: Some(client_ref.to_string()),
        })
    }

    /// User-initiated retry: only Failed sends re-enter the pipeline, with
    /// the same content and correlation id. Returns the refreshed Pending
    /// envelope and the content to resend.
    pub(super) fn begin_retry(
        &mut self,
        conversation_id: &str,
        client_ref: &str,
    ) -> Option<(MessageEnvelope, String)> {
        let send = self.sends.get_mut(conversation_id)?.get_mut(client_ref)?;
        if !matches!(send.state, DeliveryState::Failed { .. }) {
            return None;
        }
        send.state = DeliveryState::Pending;
        let envelope = MessageEnvelope {
            id: client_ref.to_string(),
            conversation_id: conversation_id.to_string(),
            sender_id: send.sender_id.clone(),
            content: send.content.clone(),
            timestamp: send.timestamp,
            delivery: DeliveryState::Pending,
            is_read: false,
            is_own: true,
            client_ref: Some(client_ref.to_string()),
        };
        Some((envelope, send.content.clone()))
    }

    /// Whether a live `message.created` is the echo of a tracked send and
    /// must be folded into the existing envelope instead of appended.
    pub(super) fn matches_send(&self, conversation_id: &str, client_ref: &str) -> bool {
        self.sends
            .get(conversation_id)
            .map(|m| m.contains_key(client_ref))
            .unwrap_or(false)
    }

    pub(super) fn clear(&mut self) {
        self.sends.clear();
    }
}
