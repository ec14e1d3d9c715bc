#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use bazaar_api::chat::{ChatSession, EventRouter};
use bazaar_api::config::ServerConfig;
use bazaar_api::router::build_app_router;
use bazaar_api::state::AppState;
use bazaar_db::{ChatStore, MemoryChatStore};
use bazaar_events::{Backplane, EventBus, Frame, FrameReceiver, LocalBackplane, TopicHub};
use bazaar_presence::{MemoryPresenceDirectory, PresenceCounter, PresenceDirectory};
use serde_json::Value;

/// Build a test `ServerConfig` with safe defaults and no external services.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
        heartbeat_interval_secs: 30,
        presence_ttl_secs: 90,
        database_url: None,
        redis_url: None,
        redis_key_prefix: "bazaar-test:".to_string(),
    }
}

/// A chat router wired to in-memory collaborators.
pub struct Harness {
    pub chat: Arc<EventRouter>,
    pub event_bus: Arc<EventBus>,
    memory: Option<Arc<MemoryChatStore>>,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(MemoryChatStore::new());
        let mut harness = Self::with(store.clone(), Arc::new(MemoryPresenceDirectory::new()));
        harness.memory = Some(store);
        harness
    }

    /// Wire the router to a custom store and presence directory.
    pub fn with(store: Arc<dyn ChatStore>, presence: Arc<dyn PresenceDirectory>) -> Self {
        Self::build(store, presence, |hub| Arc::new(LocalBackplane::new(hub)))
    }

    /// In-memory store and presence, with a backplane built over the
    /// router's hub by `backplane`.
    pub fn with_backplane(backplane: impl FnOnce(Arc<TopicHub>) -> Arc<dyn Backplane>) -> Self {
        let store = Arc::new(MemoryChatStore::new());
        let mut harness =
            Self::build(store.clone(), Arc::new(MemoryPresenceDirectory::new()), backplane);
        harness.memory = Some(store);
        harness
    }

    fn build(
        store: Arc<dyn ChatStore>,
        presence: Arc<dyn PresenceDirectory>,
        backplane: impl FnOnce(Arc<TopicHub>) -> Arc<dyn Backplane>,
    ) -> Self {
        let hub = Arc::new(TopicHub::new());
        let event_bus = Arc::new(EventBus::default());
        let chat = Arc::new(EventRouter::new(
            backplane(hub),
            presence,
            store,
            Arc::new(PresenceCounter::new()),
            Arc::clone(&event_bus),
        ));
        Self {
            chat,
            event_bus,
            memory: None,
        }
    }

    /// The in-memory store behind a harness built with [`Harness::new`].
    pub fn store(&self) -> &MemoryChatStore {
        self.memory.as_deref().expect("harness was built with a custom store")
    }

    pub async fn connect(&self) -> Client {
        let (session, rx) = self.chat.connect().await;
        Client {
            chat: Arc::clone(&self.chat),
            session,
            rx,
        }
    }

    /// Connect and identify as `user_id`, discarding the `login` reply.
    pub async fn login(&self, user_id: &str) -> Client {
        let mut client = self.connect().await;
        client
            .emit("set_usernames", serde_json::json!({ "from": user_id }))
            .await;
        client.drain();
        client
    }

    pub fn app(&self) -> Router {
        let config = test_config();
        let state = AppState {
            config: Arc::new(config.clone()),
            chat: Arc::clone(&self.chat),
        };
        build_app_router(state, &config)
    }
}

/// One simulated client connection.
pub struct Client {
    chat: Arc<EventRouter>,
    pub session: ChatSession,
    rx: FrameReceiver,
}

impl Client {
    pub async fn emit(&mut self, event: &str, data: Value) {
        let frame = serde_json::json!({ "event": event, "data": data }).to_string();
        self.chat.handle_text(&mut self.session, &frame).await;
    }

    pub async fn send_raw(&mut self, text: &str) {
        self.chat.handle_text(&mut self.session, text).await;
    }

    pub async fn disconnect(&mut self) {
        self.chat.disconnect(&mut self.session).await;
    }

    /// Every event frame queued for this connection so far.
    pub fn drain(&mut self) -> Vec<Value> {
        let mut events = Vec::new();
        while let Ok(frame) = self.rx.try_recv() {
            if let Frame::Event(text) = frame {
                events.push(serde_json::from_str(&text).expect("frames are JSON"));
            }
        }
        events
    }

    /// Queued events named `name`.
    pub fn drain_named(&mut self, name: &str) -> Vec<Value> {
        self.drain()
            .into_iter()
            .filter(|e| e["event"] == name)
            .collect()
    }
}
