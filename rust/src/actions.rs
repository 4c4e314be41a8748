use crate::state::Screen;

#[derive(uniffi::Enum, Debug, Clone)]
pub enum AppAction {
    // Session lifecycle. The user identity is owned by an external
    // collaborator (auth/session storage) and handed in on activation.
    StartSession {
        user_id: String,
    },
    EndSession,
    Foregrounded,

    // Conversation list
    RefreshConversations,
    OpenConversation {
        conversation_id: String,
    },
    MarkConversationRead {
        conversation_id: String,
    },
    HideConversations {
        conversation_ids: Vec<String>,
    },

    // Messaging
    SendMessage {
        conversation_id: String,
        content: String,
    },
    RetryMessage {
        conversation_id: String,
        client_ref: String,
    },

    // Navigation
    UpdateScreenStack {
        stack: Vec<Screen>,
    },

    // UI
    ClearToast,
}

impl AppAction {
    /// Log-safe action tag (never includes message content).
    pub fn tag(&self) -> &'static str {
        match self {
            AppAction::StartSession { .. } => "StartSession",
            AppAction::EndSession => "EndSession",
            AppAction::Foregrounded => "Foregrounded",

            AppAction::RefreshConversations => "RefreshConversations",
            AppAction::OpenConversation { .. } => "OpenConversation",
            AppAction::MarkConversationRead { .. } => "MarkConversationRead",
            AppAction::HideConversations { .. } => "HideConversations",

            AppAction::SendMessage { .. } => "SendMessage",
            AppAction::RetryMessage { .. } => "RetryMessage",

            AppAction::UpdateScreenStack { .. } => "UpdateScreenStack",

            AppAction::ClearToast => "ClearToast",
        }
    }
}
