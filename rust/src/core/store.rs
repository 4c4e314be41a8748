// Conversation collection ownership + ordering.

use std::collections::HashSet;

use crate::state::{ConversationSummary, LastMessage};

/// Exclusive owner of the visible conversation collection. All mutation goes
/// through the methods below; the collection is re-sorted after any mutation
/// that can change ordering or membership, never left stale.
#[derive(Debug, Default)]
pub(super) struct ConversationStore {
    conversations: Vec<ConversationSummary>,
}

impl ConversationStore {
    pub(super) fn list(&self) -> &[ConversationSummary] {
        &self.conversations
    }

    pub(super) fn get(&self, conversation_id: &str) -> Option<&ConversationSummary> {
        self.conversations.iter().find(|c| c.id == conversation_id)
    }

    pub(super) fn contains(&self, conversation_id: &str) -> bool {
        self.get(conversation_id).is_some()
    }

    pub(super) fn unread_count(&self, conversation_id: &str) -> u32 {
        self.get(conversation_id).map(|c| c.unread_count).unwrap_or(0)
    }

    pub(super) fn clear(&mut self) {
        self.conversations.clear();
    }

    /// Atomically replaces the collection from a snapshot fetch.
    ///
    /// A snapshot may have been issued before live events that have already
    /// been applied here, so it can never win against the tracked state with
    /// stale values: per id, unread = max(incoming, current), the last
    /// message with the later timestamp wins, and activity never moves
    /// backwards. Duplicate ids in the snapshot keep the first occurrence.
    pub(super) fn replace_snapshot(&mut self, incoming: Vec<ConversationSummary>) {
        let mut next: Vec<ConversationSummary> = Vec::with_capacity(incoming.len());
        let mut seen: HashSet<String> = HashSet::new();
        for mut summary in incoming {
            if !seen.insert(summary.id.clone()) {
                continue;
            }
            if let Some(current) = self.get(&summary.id) {
                summary.unread_count = summary.unread_count.max(current.unread_count);
                let incoming_ts = summary.last_message.as_ref().map(|m| m.timestamp);
                let current_ts = current.last_message.as_ref().map(|m| m.timestamp);
                if current_ts > incoming_ts {
                    summary.last_message = current.last_message.clone();
                }
                summary.last_activity_at = summary.last_activity_at.max(current.last_activity_at);
            }
            next.push(summary);
        }
        self.conversations = next;
        self.sort();
    }

    /// Applies a live message to the target conversation: preview, activity,
    /// and the unread counter (senders other than the local user only).
    ///
    /// Unknown ids are a no-op and return false; the caller is expected to
    /// trigger a snapshot refresh to discover the conversation.
    pub(super) fn apply_new_message(
        &mut self,
        conversation_id: &str,
        message: LastMessage,
        is_own_message: bool,
    ) -> bool {
        let Some(entry) = self
            .conversations
            .iter_mut()
            .find(|c| c.id == conversation_id)
        else {
            return false;
        };
        entry.last_activity_at = entry.last_activity_at.max(message.timestamp);
        entry.last_message = Some(message);
        if !is_own_message {
            entry.unread_count += 1;
        }
        self.sort();
        true
    }

    pub(super) fn reset_unread(&mut self, conversation_id: &str) -> bool {
        let Some(entry) = self
            .conversations
            .iter_mut()
            .find(|c| c.id == conversation_id)
        else {
            return false;
        };
        let changed = entry.unread_count != 0;
        entry.unread_count = 0;
        changed
    }

    /// Client-side visibility hide; shared history is untouched.
    pub(super) fn remove_conversations(&mut self, ids: &[String]) -> bool {
        let before = self.conversations.len();
        self.conversations.retain(|c| !ids.contains(&c.id));
        self.conversations.len() != before
    }

    fn sort(&mut self) {
        self.conversations.sort_by(|a, b| {
            b.last_activity_at
                .cmp(&a.last_activity_at)
                .then_with(|| a.id.cmp(&b.id))
        });
    }
}
