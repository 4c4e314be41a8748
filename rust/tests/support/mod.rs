#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use pigeon_core::{
    ApiError, AppReconciler, AppUpdate, ConversationApi, ConversationRecord, LiveChannel,
    MessageRecord, ParticipantRecord,
};

/// The local user identity every test session runs as.
pub const ME: &str = "me";

pub fn wait_until(what: &str, timeout: Duration, mut f: impl FnMut() -> bool) {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if f() {
            return;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    panic!("{what}: condition not met within {timeout:?}");
}

pub fn write_config(data_dir: &str) {
    let path = std::path::Path::new(data_dir).join("pigeon_config.json");
    let v = serde_json::json!({
        "disable_network": true,
    });
    std::fs::write(path, serde_json::to_vec(&v).unwrap()).unwrap();
}

pub struct TestReconciler {
    updates: Arc<Mutex<Vec<AppUpdate>>>,
}

impl TestReconciler {
    pub fn new() -> (Self, Arc<Mutex<Vec<AppUpdate>>>) {
        let updates = Arc::new(Mutex::new(vec![]));
        (
            Self {
                updates: updates.clone(),
            },
            updates,
        )
    }
}

impl AppReconciler for TestReconciler {
    fn reconcile(&self, update: AppUpdate) {
        self.updates.lock().unwrap().push(update);
    }
}

/// Records subscribe side effects so tests can assert the at-most-once
/// discipline.
#[derive(Clone, Default)]
pub struct RecordingLiveChannel {
    pub subscribed: Arc<Mutex<Vec<String>>>,
}

impl RecordingLiveChannel {
    pub fn subscribed_ids(&self) -> Vec<String> {
        self.subscribed.lock().unwrap().clone()
    }
}

impl LiveChannel for RecordingLiveChannel {
    fn subscribe(&self, conversation_id: String) {
        self.subscribed.lock().unwrap().push(conversation_id);
    }
}

/// Programmable pull-channel double. Snapshot contents and per-call errors
/// are swappable mid-test; calls are counted for storm/dedup assertions.
#[derive(Clone, Default)]
pub struct MockConversationApi {
    pub private_list: Arc<Mutex<Vec<ConversationRecord>>>,
    pub group_list: Arc<Mutex<Vec<ConversationRecord>>>,
    pub snapshot_error: Arc<Mutex<Option<ApiError>>>,
    pub mark_read_error: Arc<Mutex<Option<ApiError>>>,
    pub send_error: Arc<Mutex<Option<ApiError>>>,
    pub snapshot_calls: Arc<Mutex<u32>>,
    pub mark_read_calls: Arc<Mutex<Vec<String>>>,
    pub hidden_batches: Arc<Mutex<Vec<Vec<String>>>>,
}

impl MockConversationApi {
    pub fn snapshot_count(&self) -> u32 {
        *self.snapshot_calls.lock().unwrap()
    }

    pub fn mark_read_count(&self) -> usize {
        self.mark_read_calls.lock().unwrap().len()
    }

    pub fn set_private(&self, list: Vec<ConversationRecord>) {
        *self.private_list.lock().unwrap() = list;
    }

    pub fn set_group(&self, list: Vec<ConversationRecord>) {
        *self.group_list.lock().unwrap() = list;
    }
}

#[async_trait]
impl ConversationApi for MockConversationApi {
    async fn fetch_private(&self) -> Result<Vec<ConversationRecord>, ApiError> {
        *self.snapshot_calls.lock().unwrap() += 1;
        if let Some(e) = self.snapshot_error.lock().unwrap().clone() {
            return Err(e);
        }
        Ok(self.private_list.lock().unwrap().clone())
    }

    async fn fetch_group(&self) -> Result<Vec<ConversationRecord>, ApiError> {
        if let Some(e) = self.snapshot_error.lock().unwrap().clone() {
            return Err(e);
        }
        Ok(self.group_list.lock().unwrap().clone())
    }

    async fn mark_read(&self, conversation_id: &str) -> Result<(), ApiError> {
        self.mark_read_calls
            .lock()
            .unwrap()
            .push(conversation_id.to_string());
        if let Some(e) = self.mark_read_error.lock().unwrap().clone() {
            return Err(e);
        }
        Ok(())
    }

    async fn send_message(
        &self,
        conversation_id: &str,
        content: &str,
        client_ref: &str,
    ) -> Result<MessageRecord, ApiError> {
        if let Some(e) = self.send_error.lock().unwrap().clone() {
            return Err(e);
        }
        Ok(MessageRecord {
            id: format!("srv-{client_ref}"),
            conversation_id: conversation_id.to_string(),
            sender_id: ME.to_string(),
            content: content.to_string(),
            timestamp: 1_700_000_999_000,
            client_ref: Some(client_ref.to_string()),
        })
    }

    async fn hide_conversations(&self, conversation_ids: &[String]) -> Result<(), ApiError> {
        self.hidden_batches
            .lock()
            .unwrap()
            .push(conversation_ids.to_vec());
        Ok(())
    }
}

pub fn private_record(
    id: &str,
    peer_id: &str,
    peer_name: &str,
    unread: u32,
    ts: i64,
) -> ConversationRecord {
    ConversationRecord {
        id: id.to_string(),
        name: None,
        participants: vec![
            ParticipantRecord {
                id: ME.to_string(),
                display_name: Some("Me".to_string()),
                role: None,
            },
            ParticipantRecord {
                id: peer_id.to_string(),
                display_name: Some(peer_name.to_string()),
                role: None,
            },
        ],
        last_message: Some(MessageRecord {
            id: format!("{id}-last"),
            conversation_id: id.to_string(),
            sender_id: peer_id.to_string(),
            content: "hi".to_string(),
            timestamp: ts,
            client_ref: None,
        }),
        unread_count: unread,
        last_activity_at: None,
        created_at: ts - 1_000,
    }
}

pub fn group_record(id: &str, name: &str, unread: u32, ts: i64) -> ConversationRecord {
    ConversationRecord {
        id: id.to_string(),
        name: Some(name.to_string()),
        participants: vec![
            ParticipantRecord {
                id: ME.to_string(),
                display_name: Some("Me".to_string()),
                role: Some("member".to_string()),
            },
            ParticipantRecord {
                id: "u-2".to_string(),
                display_name: Some("Bea".to_string()),
                role: Some("admin".to_string()),
            },
            ParticipantRecord {
                id: "u-3".to_string(),
                display_name: Some("Cem".to_string()),
                role: Some("member".to_string()),
            },
        ],
        last_message: Some(MessageRecord {
            id: format!("{id}-last"),
            conversation_id: id.to_string(),
            sender_id: "u-2".to_string(),
            content: "hello all".to_string(),
            timestamp: ts,
            client_ref: None,
        }),
        unread_count: unread,
        last_activity_at: None,
        created_at: ts - 1_000,
    }
}

pub fn message_created_payload(
    conversation_id: &str,
    message_id: &str,
    sender_id: &str,
    content: &str,
    timestamp: i64,
    client_ref: Option<&str>,
) -> String {
    let mut message = serde_json::json!({
        "id": message_id,
        "conversationId": conversation_id,
        "senderId": sender_id,
        "content": content,
        "timestamp": timestamp,
    });
    if let Some(r) = client_ref {
        message["clientRef"] = serde_json::Value::String(r.to_string());
    }
    serde_json::json!({
        "type": "message.created",
        "conversationId": conversation_id,
        "timestamp": timestamp,
        "message": message,
    })
    .to_string()
}

pub fn message_read_payload(conversation_id: &str, reader_id: &str) -> String {
    serde_json::json!({
        "type": "message.read",
        "conversationId": conversation_id,
        "readerId": reader_id,
    })
    .to_string()
}
