//! Pull-channel client: snapshot queries and write requests against the
//! conventional REST backend. The push channel never goes through here.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Failure taxonomy for the pull channel. Malformed push events are not an
/// `ApiError`; they are dropped at the dispatch boundary.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ApiError {
    #[error("network failure: {0}")]
    Network(String),
    /// Expired session. Fatal: surfaced to the session owner, never retried.
    #[error("session expired")]
    Auth,
    #[error("invalid request: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub content: String,
    pub timestamp: i64,
    /// Echo of the client correlation id for messages this client sent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_ref: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantRecord {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationRecord {
    pub id: String,
    /// Room name; absent for private conversations.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub participants: Vec<ParticipantRecord>,
    #[serde(default)]
    pub last_message: Option<MessageRecord>,
    /// Pre-computed server-side.
    #[serde(default)]
    pub unread_count: u32,
    #[serde(default)]
    pub last_activity_at: Option<i64>,
    #[serde(default)]
    pub created_at: i64,
}

#[derive(Debug, Clone, Default)]
pub struct ConversationSnapshot {
    pub private_list: Vec<ConversationRecord>,
    pub group_list: Vec<ConversationRecord>,
}

#[async_trait]
pub trait ConversationApi: Send + Sync + 'static {
    async fn fetch_private(&self) -> Result<Vec<ConversationRecord>, ApiError>;
    async fn fetch_group(&self) -> Result<Vec<ConversationRecord>, ApiError>;
    /// Idempotent server-side.
    async fn mark_read(&self, conversation_id: &str) -> Result<(), ApiError>;
    async fn send_message(
        &self,
        conversation_id: &str,
        content: &str,
        client_ref: &str,
    ) -> Result<MessageRecord, ApiError>;
    /// Removes the conversations from the caller's visible list only.
    async fn hide_conversations(&self, conversation_ids: &[String]) -> Result<(), ApiError>;
}

pub struct HttpConversationApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpConversationApi {
    pub fn new(base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }
}

fn transport_err(e: reqwest::Error) -> ApiError {
    ApiError::Network(e.to_string())
}

async fn status_err(resp: reqwest::Response) -> ApiError {
    let status = resp.status();
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return ApiError::Auth;
    }
    let mut body = resp.text().await.unwrap_or_default();
    body.truncate(256);
    if status == reqwest::StatusCode::BAD_REQUEST
        || status == reqwest::StatusCode::UNPROCESSABLE_ENTITY
    {
        ApiError::Validation(if body.is_empty() {
            status.to_string()
        } else {
            body
        })
    } else {
        ApiError::Network(format!("{status}: {body}"))
    }
}

#[async_trait]
impl ConversationApi for HttpConversationApi {
    async fn fetch_private(&self) -> Result<Vec<ConversationRecord>, ApiError> {
        let resp = self
            .client
            .get(self.url("conversations/private"))
            .send()
            .await
            .map_err(transport_err)?;
        if !resp.status().is_success() {
            return Err(status_err(resp).await);
        }
        resp.json().await.map_err(transport_err)
    }

    async fn fetch_group(&self) -> Result<Vec<ConversationRecord>, ApiError> {
        let resp = self
            .client
            .get(self.url("conversations/group"))
            .send()
            .await
            .map_err(transport_err)?;
        if !resp.status().is_success() {
            return Err(status_err(resp).await);
        }
        resp.json().await.map_err(transport_err)
    }

    async fn mark_read(&self, conversation_id: &str) -> Result<(), ApiError> {
        let resp = self
            .client
            .post(self.url(&format!("conversations/{conversation_id}/read")))
            .send()
            .await
            .map_err(transport_err)?;
        if !resp.status().is_success() {
            return Err(status_err(resp).await);
        }
        Ok(())
    }

    async fn send_message(
        &self,
        conversation_id: &str,
        content: &str,
        client_ref: &str,
    ) -> Result<MessageRecord, ApiError> {
        let body = serde_json::json!({
            "content": content,
            "clientRef": client_ref,
        });
        let resp = self
            .client
            .post(self.url(&format!("conversations/{conversation_id}/messages")))
            .json(&body)
            .send()
            .await
            .map_err(transport_err)?;
        if !resp.status().is_success() {
            return Err(status_err(resp).await);
        }
        resp.json().await.map_err(transport_err)
    }

    async fn hide_conversations(&self, conversation_ids: &[String]) -> Result<(), ApiError> {
        let body = serde_json::json!({
            "conversationIds": conversation_ids,
        });
        let resp = self
            .client
            .post(self.url("conversations/hide"))
            .json(&body)
            .send()
            .await
            .map_err(transport_err)?;
        if !resp.status().is_success() {
            return Err(status_err(resp).await);
        }
        Ok(())
    }
}
