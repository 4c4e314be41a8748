mod actions;
mod api;
mod core;
mod events;
mod logging;
mod state;
mod updates;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::thread;

use flume::{Receiver, Sender};

pub use actions::AppAction;
pub use api::{
    ApiError, ConversationApi, ConversationRecord, ConversationSnapshot, HttpConversationApi,
    MessageRecord, ParticipantRecord,
};
pub use events::PushEvent;
pub use state::*;
pub use updates::*;

uniffi::setup_scaffolding!();

#[uniffi::export(callback_interface)]
pub trait AppReconciler: Send + Sync + 'static {
    fn reconcile(&self, update: AppUpdate);
}

/// Platform-side handle to the live event channel (client -> server
/// direction). The core guarantees `subscribe` is invoked at most once per
/// conversation per session; implementations only have to forward it.
#[uniffi::export(callback_interface)]
pub trait LiveChannel: Send + Sync + 'static {
    fn subscribe(&self, conversation_id: String);
}

pub type SharedConversationApi = Arc<RwLock<Option<Arc<dyn ConversationApi>>>>;
pub type SharedLiveChannel = Arc<RwLock<Option<Arc<dyn LiveChannel>>>>;

#[derive(uniffi::Object)]
pub struct FfiApp {
    core_tx: Sender<CoreMsg>,
    update_rx: Receiver<AppUpdate>,
    listening: AtomicBool,
    shared_state: Arc<RwLock<AppState>>,
    conversation_api: SharedConversationApi,
    live_channel: SharedLiveChannel,
}

#[uniffi::export]
impl FfiApp {
    #[uniffi::constructor]
    pub fn new(data_dir: String) -> Arc<Self> {
        logging::init_logging();
        tracing::info!(data_dir = %data_dir, "FfiApp::new() starting");

        let (update_tx, update_rx) = flume::unbounded();
        let (core_tx, core_rx) = flume::unbounded::<CoreMsg>();
        let shared_state = Arc::new(RwLock::new(AppState::empty()));
        let conversation_api: SharedConversationApi = Arc::new(RwLock::new(None));
        let live_channel: SharedLiveChannel = Arc::new(RwLock::new(None));

        // Actor loop thread (single threaded "app actor").
        let core_tx_for_core = core_tx.clone();
        let shared_for_core = shared_state.clone();
        let api_for_core = conversation_api.clone();
        let channel_for_core = live_channel.clone();
        thread::spawn(move || {
            let mut core = crate::core::AppCore::new(
                update_tx,
                core_tx_for_core,
                data_dir,
                shared_for_core,
                api_for_core,
                channel_for_core,
            );
            while let Ok(msg) = core_rx.recv() {
                core.handle_message(msg);
            }
        });

        Arc::new(Self {
            core_tx,
            update_rx,
            listening: AtomicBool::new(false),
            shared_state,
            conversation_api,
            live_channel,
        })
    }

    pub fn state(&self) -> AppState {
        match self.shared_state.read() {
            Ok(g) => g.clone(),
            Err(poison) => poison.into_inner().clone(),
        }
    }

    pub fn dispatch(&self, action: AppAction) {
        // Contract: never block caller.
        let _ = self.core_tx.send(CoreMsg::Action(action));
    }

    /// Feed one raw push-channel payload into the dispatcher. Payloads are
    /// processed strictly in the order they are handed in; malformed ones
    /// are dropped with a logged diagnostic.
    pub fn push_event(&self, payload: String) {
        let _ = self.core_tx.send(CoreMsg::Internal(Box::new(
            InternalEvent::PushPayload { payload },
        )));
    }

    pub fn listen_for_updates(&self, reconciler: Box<dyn AppReconciler>) {
        if self
            .listening
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            // Avoid multiple listeners that would split messages.
            return;
        }

        let rx = self.update_rx.clone();
        thread::spawn(move || {
            while let Ok(update) = rx.recv() {
                reconciler.reconcile(update);
            }
        });
    }

    pub fn set_live_channel(&self, channel: Box<dyn LiveChannel>) {
        let channel: Arc<dyn LiveChannel> = Arc::from(channel);
        match self.live_channel.write() {
            Ok(mut slot) => {
                *slot = Some(channel);
            }
            Err(poison) => {
                *poison.into_inner() = Some(channel);
            }
        }
    }
}

impl FfiApp {
    pub fn set_conversation_api_for_tests(&self, api: Arc<dyn ConversationApi>) {
        match self.conversation_api.write() {
            Ok(mut slot) => {
                *slot = Some(api);
            }
            Err(poison) => {
                *poison.into_inner() = Some(api);
            }
        }
    }
}
