#[derive(uniffi::Record, Clone, Debug)]
pub struct AppState {
    pub rev: u64,
    pub router: Router,
    pub session: SessionState,
    pub busy: BusyState,
    pub conversation_list: Vec<ConversationSummary>,
    pub current_conversation: Option<ConversationViewState>,
    pub sync_error: Option<String>,
    pub toast: Option<String>,
}

impl AppState {
    pub fn empty() -> Self {
        Self {
            rev: 0,
            router: Router {
                default_screen: Screen::ConversationList,
                screen_stack: vec![],
            },
            session: SessionState::Inactive,
            busy: BusyState::idle(),
            conversation_list: vec![],
            current_conversation: None,
            sync_error: None,
            toast: None,
        }
    }
}

#[derive(uniffi::Enum, Clone, Debug, PartialEq, Eq)]
pub enum SessionState {
    Inactive,
    Active { user_id: String },
}

/// "In flight" flags for long-ish operations the UI should reflect.
///
/// Per-message and per-conversation progress lives on the envelopes and the
/// read coordinator; these are only the list-level spinners.
#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq)]
pub struct BusyState {
    pub refreshing: bool,
    pub hiding: bool,
}

impl BusyState {
    pub fn idle() -> Self {
        Self {
            refreshing: false,
            hiding: false,
        }
    }
}

#[derive(uniffi::Record, Clone, Debug, PartialEq)]
pub struct Router {
    pub default_screen: Screen,
    pub screen_stack: Vec<Screen>,
}

/// Navigation payloads differ by conversation kind; everything else about
/// opening a conversation (mark-as-read, subscription) is kind-agnostic.
#[derive(uniffi::Enum, Clone, Debug, PartialEq)]
pub enum Screen {
    ConversationList,
    PrivateChat {
        conversation_id: String,
        peer_id: String,
        title: String,
    },
    GroupChat {
        conversation_id: String,
        title: String,
        participant_count: u32,
    },
}

#[derive(uniffi::Enum, Clone, Debug, PartialEq, Eq)]
pub enum ConversationKind {
    Private,
    Group,
}

#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq)]
pub struct Participant {
    pub id: String,
    pub display_name: Option<String>,
    pub role: Option<String>,
}

#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq)]
pub struct LastMessage {
    pub content: String,
    pub sender_id: String,
    pub timestamp: i64,
}

#[derive(uniffi::Record, Clone, Debug)]
pub struct ConversationSummary {
    pub id: String,
    pub kind: ConversationKind,
    pub display_name: String,
    pub last_message: Option<LastMessage>,
    pub unread_count: u32,
    pub last_activity_at: i64,
    pub created_at: i64,
    pub participants: Vec<Participant>,
}

#[derive(uniffi::Record, Clone, Debug)]
pub struct ConversationViewState {
    pub conversation_id: String,
    pub kind: ConversationKind,
    pub title: String,
    pub messages: Vec<MessageEnvelope>,
}

#[derive(uniffi::Record, Clone, Debug)]
pub struct MessageEnvelope {
    /// Client correlation id while Pending; server-assigned once Confirmed.
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub content: String,
    pub timestamp: i64,
    pub delivery: DeliveryState,
    /// Recipient-read indicator, meaningful only for own messages.
    pub is_read: bool,
    pub is_own: bool,
    /// Correlation id, retained after confirmation so live-channel echoes of
    /// our own sends can be matched and folded in.
    pub client_ref: Option<String>,
}

#[derive(uniffi::Enum, Clone, Debug, PartialEq, Eq)]
pub enum DeliveryState {
    Pending,
    Confirmed,
    Failed { reason: String },
}

pub fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Ordering timestamp fallback: last message → explicit activity marker →
/// creation time.
pub(crate) fn derive_last_activity(
    last_message: Option<&LastMessage>,
    activity_marker: Option<i64>,
    created_at: i64,
) -> i64 {
    last_message
        .map(|m| m.timestamp)
        .or(activity_marker)
        .unwrap_or(created_at)
}

#[cfg(test)]
mod tests {
    use super::{derive_last_activity, LastMessage};

    fn msg(ts: i64) -> LastMessage {
        LastMessage {
            content: "hey".to_string(),
            sender_id: "u-2".to_string(),
            timestamp: ts,
        }
    }

    #[test]
    fn last_activity_prefers_last_message_timestamp() {
        assert_eq!(derive_last_activity(Some(&msg(300)), Some(200), 100), 300);
    }

    #[test]
    fn last_activity_falls_back_to_activity_marker() {
        assert_eq!(derive_last_activity(None, Some(200), 100), 200);
    }

    #[test]
    fn last_activity_falls_back_to_creation_time() {
        assert_eq!(derive_last_activity(None, None, 100), 100);
    }
}
