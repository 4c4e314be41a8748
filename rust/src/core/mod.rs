mod config;
mod delivery;
mod receipts;
mod session;
mod store;
mod subscriptions;

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use flume::Sender;

use crate::actions::AppAction;
use crate::api::{
    ApiError, ConversationApi, ConversationRecord, ConversationSnapshot, HttpConversationApi,
    MessageRecord,
};
use crate::events::PushEvent;
use crate::state::{
    derive_last_activity, now_millis, AppState, BusyState, ConversationKind, ConversationSummary,
    ConversationViewState, DeliveryState, LastMessage, MessageEnvelope, Participant, Screen,
    SessionState,
};
use crate::updates::{AppUpdate, CoreMsg, InternalEvent};
use crate::{LiveChannel, SharedConversationApi, SharedLiveChannel};

use delivery::DeliveryTracker;
use receipts::{MarkDecision, ReadReceiptCoordinator};
use store::ConversationStore;
use subscriptions::SubscriptionRegistry;

// Session-local message buffers cap. The canonical history belongs to the
// message-list view; this only has to cover what a session can produce.
const VIEW_BUFFER_MAX: usize = 200;

pub struct AppCore {
    pub state: AppState,
    rev: u64,
    last_outgoing_ts: i64,

    update_sender: Sender<AppUpdate>,
    core_sender: Sender<CoreMsg>,
    shared_state: Arc<RwLock<AppState>>,

    data_dir: String,
    runtime: tokio::runtime::Runtime,

    default_api: Arc<dyn ConversationApi>,
    api_override: SharedConversationApi,
    live_channel: SharedLiveChannel,

    store: ConversationStore,
    delivery: DeliveryTracker,
    receipts: ReadReceiptCoordinator,
    subscriptions: SubscriptionRegistry,

    snapshot_in_flight: bool,
    snapshot_dirty: bool,
    snapshot_token: u64,

    // Session-local messages backing the open conversation view
    // (optimistic sends + live deliveries), per conversation id.
    view_buffers: HashMap<String, Vec<MessageEnvelope>>,

    // Hidden conversation ids -- removed from the visible list only; later
    // snapshots must not resurrect them.
    hidden: HashSet<String>,
}

impl AppCore {
    pub fn new(
        update_sender: Sender<AppUpdate>,
        core_sender: Sender<CoreMsg>,
        data_dir: String,
        shared_state: Arc<RwLock<AppState>>,
        api_override: SharedConversationApi,
        live_channel: SharedLiveChannel,
    ) -> Self {
        let config = config::load_app_config(&data_dir);
        let state = AppState::empty();

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_time()
            .enable_io()
            .build()
            .expect("tokio runtime");

        let default_api = Self::build_default_api(&config);
        let hidden = load_hidden_conversations(&data_dir);

        let this = Self {
            state,
            rev: 0,
            last_outgoing_ts: 0,
            update_sender,
            core_sender,
            shared_state,
            data_dir,
            runtime,
            default_api,
            api_override,
            live_channel,
            store: ConversationStore::default(),
            delivery: DeliveryTracker::default(),
            receipts: ReadReceiptCoordinator::default(),
            subscriptions: SubscriptionRegistry::default(),
            snapshot_in_flight: false,
            snapshot_dirty: false,
            snapshot_token: 0,
            view_buffers: HashMap::new(),
            hidden,
        };

        // Ensure FfiApp.state() has an immediately-available snapshot.
        let snapshot = this.state.clone();
        this.commit_state_snapshot(&snapshot);
        this
    }

    fn next_rev(&mut self) -> u64 {
        self.rev += 1;
        self.state.rev = self.rev;
        self.rev
    }

    fn commit_state_snapshot(&self, snapshot: &AppState) {
        match self.shared_state.write() {
            Ok(mut g) => *g = snapshot.clone(),
            Err(poison) => *poison.into_inner() = snapshot.clone(),
        }
    }

    fn emit_state(&mut self) {
        self.next_rev();
        let snapshot = self.state.clone();
        self.commit_state_snapshot(&snapshot);
        let _ = self.update_sender.send(AppUpdate::FullState(snapshot));
    }

    fn emit_session_expired(&mut self) {
        let rev = self.next_rev();
        // Keep snapshot rev in sync with the update stream even though this
        // is a side-effect update.
        let snapshot = self.state.clone();
        self.commit_state_snapshot(&snapshot);
        let _ = self.update_sender.send(AppUpdate::SessionExpired { rev });
    }

    fn toast(&mut self, msg: impl Into<String>) {
        // Keep the toast in state until the UI explicitly clears it.
        self.state.toast = Some(msg.into());
        self.emit_state();
    }

    fn set_busy(&mut self, f: impl FnOnce(&mut BusyState)) {
        let mut next = self.state.busy.clone();
        f(&mut next);
        if next != self.state.busy {
            self.state.busy = next;
            self.emit_state();
        }
    }

    fn session_active(&self) -> bool {
        matches!(self.state.session, SessionState::Active { .. })
    }

    fn user_id(&self) -> Option<String> {
        match &self.state.session {
            SessionState::Active { user_id } => Some(user_id.clone()),
            SessionState::Inactive => None,
        }
    }

    fn sync_list_to_state(&mut self) {
        self.state.conversation_list = self.store.list().to_vec();
    }

    fn hidden_conversations_path(&self) -> PathBuf {
        Path::new(&self.data_dir).join("hidden_conversations.json")
    }

    fn save_hidden_conversations(&self) {
        if let Ok(json) = serde_json::to_string(&self.hidden) {
            let _ = std::fs::write(self.hidden_conversations_path(), json);
        }
    }

    fn push_screen(&mut self, screen: Screen) {
        if self.state.router.screen_stack.last() != Some(&screen) {
            self.state.router.screen_stack.push(screen);
        }
    }

    fn set_current_view(&mut self, summary: &ConversationSummary) {
        self.state.current_conversation = Some(ConversationViewState {
            conversation_id: summary.id.clone(),
            kind: summary.kind.clone(),
            title: summary.display_name.clone(),
            messages: self
                .view_buffers
                .get(&summary.id)
                .cloned()
                .unwrap_or_default(),
        });
    }

    fn sync_current_view_to_router(&mut self) {
        let top = self.state.router.screen_stack.last().cloned();
        match top {
            Some(Screen::PrivateChat {
                conversation_id, ..
            })
            | Some(Screen::GroupChat {
                conversation_id, ..
            }) => {
                let needs_refresh = self
                    .state
                    .current_conversation
                    .as_ref()
                    .map(|v| v.conversation_id != conversation_id)
                    .unwrap_or(true);
                if needs_refresh {
                    if let Some(summary) = self.store.get(&conversation_id).cloned() {
                        self.set_current_view(&summary);
                    } else {
                        self.state.current_conversation = None;
                    }
                }
            }
            _ => {
                self.state.current_conversation = None;
            }
        }
    }

    fn append_to_view(&mut self, conversation_id: &str, envelope: MessageEnvelope) {
        let buf = self
            .view_buffers
            .entry(conversation_id.to_string())
            .or_default();
        buf.push(envelope);
        if buf.len() > VIEW_BUFFER_MAX {
            let excess = buf.len() - VIEW_BUFFER_MAX;
            buf.drain(..excess);
        }
        self.refresh_view_if_open(conversation_id);
    }

    /// In-place replacement matched by correlation id, never an append, so
    /// a confirmed send cannot produce a duplicate bubble.
    fn replace_in_view(&mut self, conversation_id: &str, client_ref: &str, envelope: MessageEnvelope) {
        let Some(buf) = self.view_buffers.get_mut(conversation_id) else {
            return;
        };
        if let Some(slot) = buf
            .iter_mut()
            .find(|m| m.client_ref.as_deref() == Some(client_ref))
        {
            *slot = envelope;
        }
        self.refresh_view_if_open(conversation_id);
    }

    fn refresh_view_if_open(&mut self, conversation_id: &str) {
        if let Some(view) = self.state.current_conversation.as_mut() {
            if view.conversation_id == conversation_id {
                view.messages = self
                    .view_buffers
                    .get(conversation_id)
                    .cloned()
                    .unwrap_or_default();
            }
        }
    }

    pub fn handle_message(&mut self, msg: CoreMsg) {
        match msg {
            CoreMsg::Action(ref action) => {
                // Never log `?action` directly: it can contain message content.
                tracing::info!(action = action.tag(), "dispatch");
                self.handle_action(action.clone());
            }
            CoreMsg::Internal(internal) => self.handle_internal(*internal),
        }
    }

    fn handle_action(&mut self, action: AppAction) {
        match action {
            AppAction::StartSession { user_id } => {
                let user_id = user_id.trim().to_string();
                if user_id.is_empty() {
                    self.toast("Missing user identity");
                    return;
                }
                self.start_session(user_id);
            }
            AppAction::EndSession => {
                self.stop_session();
                self.state.session = SessionState::Inactive;
                self.state.router.screen_stack.clear();
                self.state.current_conversation = None;
                self.state.conversation_list = vec![];
                self.state.busy = BusyState::idle();
                self.state.sync_error = None;
                self.emit_state();
            }
            AppAction::Foregrounded => {
                // Native sends lifecycle signals as actions; Rust owns all
                // state changes.
                if self.session_active() {
                    self.refresh_conversations();
                }
            }
            AppAction::RefreshConversations => {
                if !self.session_active() {
                    self.toast("No active session");
                    return;
                }
                self.refresh_conversations();
            }
            AppAction::OpenConversation { conversation_id } => {
                self.open_conversation(&conversation_id);
            }
            AppAction::MarkConversationRead { conversation_id } => {
                if !self.session_active() {
                    return;
                }
                self.mark_as_read(&conversation_id);
            }
            AppAction::HideConversations { conversation_ids } => {
                self.hide_conversations(conversation_ids);
            }
            AppAction::SendMessage {
                conversation_id,
                content,
            } => {
                self.send_message(&conversation_id, content);
            }
            AppAction::RetryMessage {
                conversation_id,
                client_ref,
            } => {
                if !self.session_active() {
                    return;
                }
                let Some((envelope, content)) =
                    self.delivery.begin_retry(&conversation_id, &client_ref)
                else {
                    self.toast("Nothing to retry");
                    return;
                };
                self.replace_in_view(&conversation_id, &client_ref, envelope);
                self.emit_state();
                self.issue_send(&conversation_id, content, client_ref);
            }
            AppAction::UpdateScreenStack { stack } => {
                self.state.router.screen_stack = stack;
                self.sync_current_view_to_router();
                self.emit_state();
            }
            AppAction::ClearToast => {
                if self.state.toast.is_some() {
                    self.state.toast = None;
                    self.emit_state();
                }
            }
        }
    }

    /// Kind-agnostic read path shared by OpenConversation and the explicit
    /// mark-read action; only navigation payloads differ by kind.
    fn mark_as_read(&mut self, conversation_id: &str) {
        if !self.store.contains(conversation_id) {
            return;
        }
        let unread = self.store.unread_count(conversation_id);
        match self.receipts.begin_mark(conversation_id, unread) {
            MarkDecision::Issue => {
                // Optimistic: the UI zeroes instantly; a failed server ack
                // is a harmless undercount, not data loss.
                self.store.reset_unread(conversation_id);
                self.sync_list_to_state();
                self.emit_state();
                self.issue_mark_read(conversation_id);
            }
            MarkDecision::AlreadyClean | MarkDecision::InFlight => {}
        }
    }

    fn open_conversation(&mut self, conversation_id: &str) {
        if !self.session_active() {
            self.toast("No active session");
            return;
        }
        let Some(summary) = self.store.get(conversation_id).cloned() else {
            self.toast("Conversation not found");
            return;
        };

        if summary.unread_count > 0 {
            self.mark_as_read(conversation_id);
        }

        let screen = match summary.kind {
            ConversationKind::Private => {
                let peer = summary
                    .participants
                    .iter()
                    .find(|p| Some(p.id.as_str()) != self.user_id().as_deref());
                Screen::PrivateChat {
                    conversation_id: summary.id.clone(),
                    peer_id: peer.map(|p| p.id.clone()).unwrap_or_default(),
                    title: summary.display_name.clone(),
                }
            }
            ConversationKind::Group => Screen::GroupChat {
                conversation_id: summary.id.clone(),
                title: summary.display_name.clone(),
                participant_count: summary.participants.len() as u32,
            },
        };
        self.push_screen(screen);
        self.set_current_view(&summary);
        self.emit_state();
    }

    fn send_message(&mut self, conversation_id: &str, content: String) {
        if !self.session_active() {
            self.toast("No active session");
            return;
        }
        let content = content.trim().to_string();
        if content.is_empty() {
            return;
        }
        if !self.store.contains(conversation_id) {
            self.toast("Conversation not found");
            return;
        }
        let Some(user_id) = self.user_id() else {
            return;
        };

        // Millisecond clocks can still collide under rapid sends; keep
        // outgoing timestamps monotonic so ordering ties cannot occur.
        let ts = {
            let now = now_millis();
            if now <= self.last_outgoing_ts {
                self.last_outgoing_ts += 1;
            } else {
                self.last_outgoing_ts = now;
            }
            self.last_outgoing_ts
        };

        let client_ref = uuid::Uuid::new_v4().to_string();
        let envelope = self.delivery.begin_send(
            conversation_id,
            &user_id,
            content.clone(),
            ts,
            client_ref.clone(),
        );
        self.append_to_view(conversation_id, envelope);
        self.store.apply_new_message(
            conversation_id,
            LastMessage {
                content: content.clone(),
                sender_id: user_id,
                timestamp: ts,
            },
            true,
        );
        self.sync_list_to_state();
        self.emit_state();

        self.issue_send(conversation_id, content, client_ref);
    }

    fn hide_conversations(&mut self, conversation_ids: Vec<String>) {
        if !self.session_active() {
            self.toast("No active session");
            return;
        }
        let ids: Vec<String> = conversation_ids
            .into_iter()
            .filter(|id| self.store.contains(id))
            .collect();
        if ids.is_empty() {
            return;
        }

        for id in &ids {
            self.hidden.insert(id.clone());
        }
        self.save_hidden_conversations();
        self.store.remove_conversations(&ids);

        // Drop any open screens/views for the hidden conversations.
        self.state.router.screen_stack.retain(|s| match s {
            Screen::PrivateChat {
                conversation_id, ..
            }
            | Screen::GroupChat {
                conversation_id, ..
            } => !ids.contains(conversation_id),
            _ => true,
        });
        self.sync_current_view_to_router();
        self.sync_list_to_state();
        self.set_busy(|b| b.hiding = true);
        self.emit_state();

        self.issue_hide(ids);
    }

    fn handle_internal(&mut self, internal: InternalEvent) {
        match internal {
            InternalEvent::Toast(ref msg) => {
                tracing::info!(%msg, "toast");
                self.toast(msg.clone());
            }
            InternalEvent::PushPayload { payload } => {
                self.dispatch_push_event(&payload);
            }
            InternalEvent::SnapshotFetched { token, result } => {
                // Ignore results superseded by a newer fetch or a session
                // change while the request was in flight.
                if token != self.snapshot_token {
                    return;
                }
                self.snapshot_in_flight = false;
                self.set_busy(|b| b.refreshing = false);

                match result {
                    Ok(snapshot) => {
                        let Some(user_id) = self.user_id() else {
                            return;
                        };
                        let summaries = self.snapshot_to_summaries(snapshot, &user_id);
                        let ids: Vec<String> = summaries.iter().map(|c| c.id.clone()).collect();
                        tracing::info!(count = ids.len(), "snapshot applied");

                        self.store.replace_snapshot(summaries);
                        self.state.sync_error = None;
                        for id in &ids {
                            self.ensure_subscribed(id);
                        }
                        self.sync_list_to_state();
                        self.emit_state();

                        if self.snapshot_dirty {
                            self.snapshot_dirty = false;
                            self.refresh_conversations();
                        }
                    }
                    Err(ApiError::Auth) => {
                        tracing::warn!("snapshot fetch unauthorized; surfacing session expiry");
                        self.emit_session_expired();
                    }
                    Err(e) => {
                        // Stale-but-available: the previous snapshot stays
                        // visible behind an error indicator; retry is an
                        // explicit user action, never automatic.
                        tracing::warn!(%e, "snapshot fetch failed; keeping stale list");
                        self.state.sync_error = Some(e.to_string());
                        self.emit_state();
                    }
                }
            }
            InternalEvent::MarkReadResult {
                conversation_id,
                result,
            } => {
                match &result {
                    Ok(()) => {
                        tracing::debug!(%conversation_id, "mark_read acknowledged");
                    }
                    Err(ApiError::Auth) => {
                        tracing::warn!(%conversation_id, "mark_read unauthorized");
                        self.emit_session_expired();
                    }
                    Err(e) => {
                        // The optimistic zero stays in place.
                        tracing::warn!(%conversation_id, %e, "mark_read failed; keeping local zero");
                    }
                }
                let unread_now = self.store.unread_count(&conversation_id);
                self.receipts.finish_mark(&conversation_id, unread_now);
            }
            InternalEvent::SendResult {
                conversation_id,
                client_ref,
                result,
            } => match result {
                Ok(record) => {
                    tracing::debug!(%conversation_id, message_id = %record.id, "send confirmed");
                    if let Some(envelope) =
                        self.delivery.confirm(&conversation_id, &client_ref, &record)
                    {
                        self.replace_in_view(&conversation_id, &client_ref, envelope);
                        self.emit_state();
                    }
                }
                Err(e) => {
                    tracing::warn!(%conversation_id, %e, "send failed");
                    if matches!(e, ApiError::Auth) {
                        self.emit_session_expired();
                    }
                    // Failures stay on the message itself; the rest of the
                    // conversation list is unaffected.
                    if let Some(envelope) =
                        self.delivery.fail(&conversation_id, &client_ref, e.to_string())
                    {
                        self.replace_in_view(&conversation_id, &client_ref, envelope);
                        self.emit_state();
                    }
                }
            },
            InternalEvent::HideResult {
                conversation_ids,
                result,
            } => {
                self.set_busy(|b| b.hiding = false);
                match result {
                    Ok(()) => {
                        tracing::info!(count = conversation_ids.len(), "conversations hidden");
                    }
                    Err(ApiError::Auth) => {
                        self.emit_session_expired();
                    }
                    Err(e) => {
                        // The local hide stands; the server copy catches up
                        // on the next successful hide or device.
                        tracing::warn!(%e, "hide request failed; keeping local hide");
                        self.toast("Couldn't update the server; conversations stay hidden on this device");
                    }
                }
            }
        }
    }

    /// Single entry point for live-channel events. Payloads are parsed
    /// fully before any mutation so a malformed event can never leave the
    /// store half-updated, and a bad event never takes down the dispatcher.
    fn dispatch_push_event(&mut self, payload: &str) {
        let event = match PushEvent::parse(payload) {
            Ok(ev) => ev,
            Err(e) => {
                tracing::warn!(%e, payload_len = payload.len(), "dropping malformed push event");
                return;
            }
        };
        tracing::debug!(event = event.tag(), "push event");
        match event {
            PushEvent::MessageCreated {
                conversation_id,
                message,
                ..
            } => self.on_message_created(conversation_id, message),
            PushEvent::MessageRead {
                conversation_id,
                reader_id,
            } => self.on_remote_read_signal(conversation_id, reader_id),
        }
    }

    fn on_message_created(&mut self, conversation_id: String, message: MessageRecord) {
        let Some(user_id) = self.user_id() else {
            tracing::debug!(%conversation_id, "message event before session start ignored");
            return;
        };
        if self.hidden.contains(&conversation_id) {
            tracing::debug!(%conversation_id, "message for hidden conversation ignored");
            return;
        }
        let is_own = message.sender_id == user_id;

        // Echo of one of our own optimistic sends: fold it into the tracked
        // envelope instead of treating it as a new message.
        if is_own {
            if let Some(client_ref) = message.client_ref.clone() {
                if self.delivery.matches_send(&conversation_id, &client_ref) {
                    if let Some(envelope) =
                        self.delivery.confirm(&conversation_id, &client_ref, &message)
                    {
                        self.replace_in_view(&conversation_id, &client_ref, envelope);
                        self.emit_state();
                    }
                    return;
                }
            }
        }

        // Relay layers can redeliver; an id already buffered is a duplicate.
        let duplicate = self
            .view_buffers
            .get(&conversation_id)
            .map(|buf| buf.iter().any(|m| m.id == message.id))
            .unwrap_or(false);
        if duplicate {
            tracing::debug!(%conversation_id, message_id = %message.id, "duplicate message event ignored");
            return;
        }

        if !self.store.contains(&conversation_id) {
            // Unknown conversation: discover it through a fresh snapshot.
            tracing::info!(%conversation_id, "message for unknown conversation; scheduling snapshot refresh");
            self.refresh_conversations();
            return;
        }

        self.store.apply_new_message(
            &conversation_id,
            LastMessage {
                content: message.content.clone(),
                sender_id: message.sender_id.clone(),
                timestamp: message.timestamp,
            },
            is_own,
        );
        if !is_own {
            self.receipts.note_new_message(&conversation_id);
        }

        // Deliver straight into the session buffer (and the open view, if
        // this conversation is the one on screen) so it updates without a
        // refetch.
        let envelope = MessageEnvelope {
            id: message.id,
            conversation_id: conversation_id.clone(),
            sender_id: message.sender_id,
            content: message.content,
            timestamp: message.timestamp,
            delivery: DeliveryState::Confirmed,
            is_read: false,
            is_own,
            client_ref: message.client_ref,
        };
        self.append_to_view(&conversation_id, envelope);
        self.sync_list_to_state();
        self.emit_state();
    }

    fn on_remote_read_signal(&mut self, conversation_id: String, reader_id: String) {
        let Some(user_id) = self.user_id() else {
            return;
        };
        if reader_id == user_id {
            // Another device of ours read the conversation; fold the local
            // count away.
            self.receipts.note_remote_read(&conversation_id);
            if self.store.reset_unread(&conversation_id) {
                self.sync_list_to_state();
                self.emit_state();
            }
            return;
        }

        // Recipient read receipt: flip the indicator on our own envelopes.
        let mut changed = false;
        if let Some(buf) = self.view_buffers.get_mut(&conversation_id) {
            for m in buf.iter_mut().filter(|m| m.is_own && !m.is_read) {
                m.is_read = true;
                changed = true;
            }
        }
        if changed {
            self.refresh_view_if_open(&conversation_id);
            self.emit_state();
        }
    }

    fn snapshot_to_summaries(
        &self,
        snapshot: ConversationSnapshot,
        user_id: &str,
    ) -> Vec<ConversationSummary> {
        let ConversationSnapshot {
            private_list,
            group_list,
        } = snapshot;
        private_list
            .into_iter()
            .map(|r| summary_from_record(r, ConversationKind::Private, user_id))
            .chain(
                group_list
                    .into_iter()
                    .map(|r| summary_from_record(r, ConversationKind::Group, user_id)),
            )
            .filter(|c| !self.hidden.contains(&c.id))
            .collect()
    }
}

fn summary_from_record(
    record: ConversationRecord,
    kind: ConversationKind,
    user_id: &str,
) -> ConversationSummary {
    let display_name = match kind {
        ConversationKind::Private => record
            .participants
            .iter()
            .find(|p| p.id != user_id)
            .map(|p| p.display_name.clone().unwrap_or_else(|| p.id.clone()))
            .or_else(|| record.name.clone())
            .unwrap_or_else(|| record.id.clone()),
        ConversationKind::Group => record
            .name
            .clone()
            .unwrap_or_else(|| "Group".to_string()),
    };
    let last_message = record.last_message.map(|m| LastMessage {
        content: m.content,
        sender_id: m.sender_id,
        timestamp: m.timestamp,
    });
    let last_activity_at = derive_last_activity(
        last_message.as_ref(),
        record.last_activity_at,
        record.created_at,
    );
    ConversationSummary {
        id: record.id,
        kind,
        display_name,
        last_message,
        unread_count: record.unread_count,
        last_activity_at,
        created_at: record.created_at,
        participants: record
            .participants
            .into_iter()
            .map(|p| Participant {
                id: p.id,
                display_name: p.display_name,
                role: p.role,
            })
            .collect(),
    }
}

fn load_hidden_conversations(data_dir: &str) -> HashSet<String> {
    let path = Path::new(data_dir).join("hidden_conversations.json");
    if let Ok(data) = std::fs::read_to_string(&path) {
        if let Ok(set) = serde_json::from_str::<HashSet<String>>(&data) {
            return set;
        }
    }
    HashSet::new()
}
