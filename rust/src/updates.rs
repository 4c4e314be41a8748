use crate::api::{ApiError, ConversationSnapshot, MessageRecord};
use crate::state::AppState;
use crate::AppAction;

#[derive(uniffi::Enum, Clone, Debug)]
pub enum AppUpdate {
    FullState(AppState),
    /// The pull channel reported an expired session. Fatal: the external
    /// session owner is expected to tear the screen down.
    SessionExpired { rev: u64 },
}

impl AppUpdate {
    pub fn rev(&self) -> u64 {
        match self {
            AppUpdate::FullState(s) => s.rev,
            AppUpdate::SessionExpired { rev } => *rev,
        }
    }
}

#[derive(Debug)]
pub enum CoreMsg {
    Action(AppAction),
    Internal(Box<InternalEvent>),
}

#[derive(Debug)]
pub enum InternalEvent {
    /// One raw push-channel payload, in arrival order.
    PushPayload {
        payload: String,
    },

    // Async results
    SnapshotFetched {
        token: u64,
        result: Result<ConversationSnapshot, ApiError>,
    },
    MarkReadResult {
        conversation_id: String,
        result: Result<(), ApiError>,
    },
    SendResult {
        conversation_id: String,
        client_ref: String,
        result: Result<MessageRecord, ApiError>,
    },
    HideResult {
        conversation_ids: Vec<String>,
        result: Result<(), ApiError>,
    },

    Toast(String),
}
