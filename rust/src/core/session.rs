// Session lifecycle + pull-channel side effects.

use super::*;

use async_trait::async_trait;

/// Stands in for the HTTP client when networking is disabled so offline
/// runs fail the same way a dead connection would.
struct DisabledConversationApi;

#[async_trait]
impl ConversationApi for DisabledConversationApi {
    async fn fetch_private(&self) -> Result<Vec<ConversationRecord>, ApiError> {
        Err(ApiError::Network("network disabled".to_string()))
    }

    async fn fetch_group(&self) -> Result<Vec<ConversationRecord>, ApiError> {
        Err(ApiError::Network("network disabled".to_string()))
    }

    async fn mark_read(&self, _conversation_id: &str) -> Result<(), ApiError> {
        Err(ApiError::Network("network disabled".to_string()))
    }

    async fn send_message(
        &self,
        _conversation_id: &str,
        _content: &str,
        _client_ref: &str,
    ) -> Result<MessageRecord, ApiError> {
        Err(ApiError::Network("network disabled".to_string()))
    }

    async fn hide_conversations(&self, _conversation_ids: &[String]) -> Result<(), ApiError> {
        Err(ApiError::Network("network disabled".to_string()))
    }
}

impl AppCore {
    pub(super) fn build_default_api(config: &config::AppConfig) -> Arc<dyn ConversationApi> {
        if config::network_enabled(config) {
            Arc::new(HttpConversationApi::new(config::api_base_url(config)))
        } else {
            Arc::new(DisabledConversationApi)
        }
    }

    /// The pull channel currently in effect: the injected test double when
    /// present, otherwise the configured HTTP client.
    pub(super) fn conversation_api(&self) -> Arc<dyn ConversationApi> {
        let slot = match self.api_override.read() {
            Ok(g) => g.clone(),
            Err(poison) => poison.into_inner().clone(),
        };
        slot.unwrap_or_else(|| self.default_api.clone())
    }

    pub(super) fn live_channel(&self) -> Option<Arc<dyn LiveChannel>> {
        match self.live_channel.read() {
            Ok(g) => g.clone(),
            Err(poison) => poison.into_inner().clone(),
        }
    }

    pub(super) fn start_session(&mut self, user_id: String) {
        // Tear down any existing session first.
        self.stop_session();

        tracing::info!(user_id = %user_id, "start_session");
        self.state.session = SessionState::Active { user_id };
        self.state.router.default_screen = Screen::ConversationList;
        self.state.router.screen_stack.clear();
        self.state.current_conversation = None;
        self.state.sync_error = None;
        self.emit_state();

        self.refresh_conversations();
    }

    pub(super) fn stop_session(&mut self) {
        // Invalidate any in-flight snapshot fetch.
        self.snapshot_token = self.snapshot_token.wrapping_add(1);
        self.snapshot_in_flight = false;
        self.snapshot_dirty = false;

        self.subscriptions.clear();
        self.delivery.clear();
        self.receipts.clear();
        self.view_buffers.clear();
        self.store.clear();
        self.last_outgoing_ts = 0;
    }

    /// Snapshot fetch over the pull channel. One fetch in flight at a time;
    /// a request made meanwhile marks the state dirty and re-fetches on
    /// completion instead of piling up requests.
    pub(super) fn refresh_conversations(&mut self) {
        if !self.session_active() {
            return;
        }
        if self.snapshot_in_flight {
            self.snapshot_dirty = true;
            return;
        }
        self.snapshot_in_flight = true;
        self.snapshot_dirty = false;
        self.snapshot_token = self.snapshot_token.wrapping_add(1);
        let token = self.snapshot_token;
        self.set_busy(|b| b.refreshing = true);

        let api = self.conversation_api();
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            let result = async {
                let (private_list, group_list) =
                    tokio::try_join!(api.fetch_private(), api.fetch_group())?;
                Ok(ConversationSnapshot {
                    private_list,
                    group_list,
                })
            }
            .await;
            let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::SnapshotFetched {
                token,
                result,
            })));
        });
    }

    pub(super) fn issue_mark_read(&mut self, conversation_id: &str) {
        let api = self.conversation_api();
        let tx = self.core_sender.clone();
        let conversation_id = conversation_id.to_string();
        self.runtime.spawn(async move {
            let result = api.mark_read(&conversation_id).await;
            let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::MarkReadResult {
                conversation_id,
                result,
            })));
        });
    }

    pub(super) fn issue_send(&mut self, conversation_id: &str, content: String, client_ref: String) {
        let api = self.conversation_api();
        let tx = self.core_sender.clone();
        let conversation_id = conversation_id.to_string();
        self.runtime.spawn(async move {
            let result = api
                .send_message(&conversation_id, &content, &client_ref)
                .await;
            let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::SendResult {
                conversation_id,
                client_ref,
                result,
            })));
        });
    }

    pub(super) fn issue_hide(&mut self, conversation_ids: Vec<String>) {
        let api = self.conversation_api();
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            let result = api.hide_conversations(&conversation_ids).await;
            let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::HideResult {
                conversation_ids,
                result,
            })));
        });
    }

    /// Subscribe side effect, at most once per conversation per session.
    /// Without an attached live channel there is nothing to subscribe on;
    /// the id stays unregistered so a later attach can still subscribe.
    pub(super) fn ensure_subscribed(&mut self, conversation_id: &str) {
        let Some(channel) = self.live_channel() else {
            tracing::debug!(%conversation_id, "no live channel attached; skipping subscribe");
            return;
        };
        if self.subscriptions.ensure_subscribed(conversation_id) {
            tracing::debug!(%conversation_id, "subscribing to conversation channel");
            channel.subscribe(conversation_id.to_string());
        }
    }
}
