// Read-receipt reconciliation: optimistic unread zeroing vs server acks.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadState {
    Read,
    Unread,
    MarkingInFlight,
}

#[derive(Debug, PartialEq, Eq)]
pub(super) enum MarkDecision {
    /// Reset the count optimistically and issue the mark-read request.
    Issue,
    /// Nothing to mark; no request, no visible change.
    AlreadyClean,
    /// A mark-read for this conversation is already in flight.
    InFlight,
}

/// Reconciles local "mark as read" with the unread counter and with
/// concurrent live events for the same conversation. The unread counter
/// itself lives in the conversation store; this machine only decides when a
/// request goes out and what the settled state is.
#[derive(Debug, Default)]
pub(super) struct ReadReceiptCoordinator {
    states: HashMap<String, ReadState>,
}

impl ReadReceiptCoordinator {
    /// Idempotent entry point: a conversation that is already clean or
    /// already being marked issues nothing.
    pub(super) fn begin_mark(&mut self, conversation_id: &str, unread_count: u32) -> MarkDecision {
        match self.states.get(conversation_id) {
            Some(ReadState::MarkingInFlight) => MarkDecision::InFlight,
            _ if unread_count == 0 => {
                self.states
                    .insert(conversation_id.to_string(), ReadState::Read);
                MarkDecision::AlreadyClean
            }
            _ => {
                self.states
                    .insert(conversation_id.to_string(), ReadState::MarkingInFlight);
                MarkDecision::Issue
            }
        }
    }

    /// The mark-read request resolved (either way). The optimistic zero is
    /// never rolled back on failure; the machine settles on whatever the
    /// store shows now, which may already include newer increments.
    pub(super) fn finish_mark(&mut self, conversation_id: &str, unread_now: u32) {
        let next = if unread_now > 0 {
            ReadState::Unread
        } else {
            ReadState::Read
        };
        self.states.insert(conversation_id.to_string(), next);
    }

    /// A live message landed. Increments are never suppressed, even while a
    /// mark-read for earlier messages is in flight: that message is unread
    /// at the moment it arrives regardless.
    pub(super) fn note_new_message(&mut self, conversation_id: &str) {
        let entry = self
            .states
            .entry(conversation_id.to_string())
            .or_insert(ReadState::Unread);
        if *entry != ReadState::MarkingInFlight {
            *entry = ReadState::Unread;
        }
    }

    /// Another device of the local user read the conversation.
    pub(super) fn note_remote_read(&mut self, conversation_id: &str) {
        let entry = self
            .states
            .entry(conversation_id.to_string())
            .or_insert(ReadState::Read);
        if *entry != ReadState::MarkingInFlight {
            *entry = ReadState::Read;
        }
    }

    pub(super) fn clear(&mut self) {
        self.states.clear();
    }
}
