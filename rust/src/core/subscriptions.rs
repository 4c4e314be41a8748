// At-most-once live-channel subscription bookkeeping.

use std::collections::HashSet;

/// Tracks which conversation channels this session has already subscribed
/// to. Re-issuing a subscribe is at best wasteful and on some backends
/// produces duplicate event delivery; this set is the single source of
/// truth preventing that.
#[derive(Debug, Default)]
pub(super) struct SubscriptionRegistry {
    subscribed: HashSet<String>,
}

impl SubscriptionRegistry {
    /// Returns true when the caller should perform the subscribe side
    /// effect; repeated calls for the same id are no-ops until `clear`.
    pub(super) fn ensure_subscribed(&mut self, conversation_id: &str) -> bool {
        self.subscribed.insert(conversation_id.to_string())
    }

    /// Session teardown: the whole set goes at once, never partially.
    pub(super) fn clear(&mut self) {
        self.subscribed.clear();
    }
}
