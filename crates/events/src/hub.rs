use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use bazaar_core::types::ConnectionId;
use indexmap::IndexSet;
use tokio::sync::{mpsc, RwLock};

use crate::topic::{Envelope, OutboundEvent, Topic};

/// What the hub pushes down a connection's channel.
///
/// The WebSocket layer maps these onto transport frames; the hub itself
/// knows nothing about axum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Serialized `{"event", "data"}` text, shared across all recipients.
    Event(Arc<str>),
    Ping,
    Close,
}

pub type FrameSender = mpsc::UnboundedSender<Frame>;
pub type FrameReceiver = mpsc::UnboundedReceiver<Frame>;

struct HubConnection {
    sender: FrameSender,
    topics: HashSet<Topic>,
}

#[derive(Default)]
struct HubInner {
    connections: HashMap<ConnectionId, HubConnection>,
    topics: HashMap<Topic, IndexSet<ConnectionId>>,
}

impl HubInner {
    fn unsubscribe(&mut self, conn_id: ConnectionId, topic: &Topic) {
        if let Some(members) = self.topics.get_mut(topic) {
            members.shift_remove(&conn_id);
            if members.is_empty() {
                self.topics.remove(topic);
            }
        }
    }
}

/// The live connections attached to this process and the topics they
/// listen on.
///
/// Thread-safe via interior `RwLock`; designed to be wrapped in `Arc` and
/// shared between the WebSocket handlers, the backplane listener, and the
/// heartbeat task. Topics with no members are removed.
pub struct TopicHub {
    inner: RwLock<HubInner>,
}

impl TopicHub {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HubInner::default()),
        }
    }

    /// Register a new connection with no subscriptions.
    ///
    /// Returns the receiver half of its frame channel so the caller can
    /// forward frames to the socket.
    pub async fn attach(&self, conn_id: ConnectionId) -> FrameReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = HubConnection {
            sender: tx,
            topics: HashSet::new(),
        };
        self.inner.write().await.connections.insert(conn_id, conn);
        rx
    }

    /// Drop a connection and every subscription it held.
    pub async fn detach(&self, conn_id: ConnectionId) {
        let mut inner = self.inner.write().await;
        if let Some(conn) = inner.connections.remove(&conn_id) {
            for topic in &conn.topics {
                inner.unsubscribe(conn_id, topic);
            }
        }
    }

    /// Subscribe an attached connection to `topic`. Idempotent.
    ///
    /// Returns `false` if the connection is not attached.
    pub async fn subscribe(&self, conn_id: ConnectionId, topic: Topic) -> bool {
        let mut inner = self.inner.write().await;
        let Some(conn) = inner.connections.get_mut(&conn_id) else {
            return false;
        };
        conn.topics.insert(topic.clone());
        inner.topics.entry(topic).or_default().insert(conn_id);
        true
    }

    pub async fn unsubscribe(&self, conn_id: ConnectionId, topic: &Topic) {
        let mut inner = self.inner.write().await;
        if let Some(conn) = inner.connections.get_mut(&conn_id) {
            conn.topics.remove(topic);
        }
        inner.unsubscribe(conn_id, topic);
    }

    /// Push an envelope to every local subscriber of its topic, skipping
    /// the excluded connection.
    ///
    /// The event is serialized once. Closed channels are skipped; their
    /// connections are cleaned up when their receive loop ends. Returns the
    /// number of connections the frame was queued for.
    pub async fn deliver(&self, envelope: &Envelope) -> usize {
        let text: Arc<str> = match serde_json::to_string(&envelope.event) {
            Ok(text) => text.into(),
            Err(e) => {
                tracing::error!(error = %e, event = %envelope.event.event, "Failed to serialize outbound event");
                return 0;
            }
        };

        let inner = self.inner.read().await;
        let Some(members) = inner.topics.get(&envelope.topic) else {
            return 0;
        };

        let mut count = 0;
        for conn_id in members {
            if envelope.exclude == Some(*conn_id) {
                continue;
            }
            if let Some(conn) = inner.connections.get(conn_id) {
                if conn.sender.send(Frame::Event(Arc::clone(&text))).is_ok() {
                    count += 1;
                }
            }
        }
        count
    }

    /// Send an event to exactly one connection, bypassing topics.
    pub async fn send_to(&self, conn_id: ConnectionId, event: &OutboundEvent) -> bool {
        let text = match serde_json::to_string(event) {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(error = %e, event = %event.event, "Failed to serialize outbound event");
                return false;
            }
        };
        let inner = self.inner.read().await;
        match inner.connections.get(&conn_id) {
            Some(conn) => conn.sender.send(Frame::Event(text.into())).is_ok(),
            None => false,
        }
    }

    pub async fn subscriber_count(&self, topic: &Topic) -> usize {
        self.inner
            .read()
            .await
            .topics
            .get(topic)
            .map_or(0, IndexSet::len)
    }

    pub async fn connection_count(&self) -> usize {
        self.inner.read().await.connections.len()
    }

    /// Members of every personal topic, grouped by user.
    pub async fn user_handles(&self) -> Vec<(String, Vec<ConnectionId>)> {
        let inner = self.inner.read().await;
        inner
            .topics
            .iter()
            .filter_map(|(topic, members)| match topic {
                Topic::User(user_id) => Some((user_id.clone(), members.iter().copied().collect())),
                Topic::All => None,
            })
            .collect()
    }

    /// Send a Ping frame to every attached connection.
    pub async fn ping_all(&self) {
        let inner = self.inner.read().await;
        for conn in inner.connections.values() {
            let _ = conn.sender.send(Frame::Ping);
        }
    }

    /// Send a Close frame to every connection, then clear all state.
    ///
    /// Used during graceful shutdown.
    pub async fn shutdown_all(&self) {
        let mut inner = self.inner.write().await;
        let count = inner.connections.len();
        for conn in inner.connections.values() {
            let _ = conn.sender.send(Frame::Close);
        }
        inner.connections.clear();
        inner.topics.clear();
        tracing::info!(count, "Closed all WebSocket connections");
    }
}

impl Default for TopicHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn text_of(frame: Frame) -> serde_json::Value {
        match frame {
            Frame::Event(text) => serde_json::from_str(&text).unwrap(),
            other => panic!("expected event frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn deliver_reaches_only_topic_members() {
        let hub = TopicHub::new();
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        let mut rx_a = hub.attach(a).await;
        let mut rx_b = hub.attach(b).await;
        hub.subscribe(a, Topic::user("alice")).await;
        hub.subscribe(b, Topic::user("bob")).await;

        let envelope = Envelope::new(
            Topic::user("alice"),
            OutboundEvent::new("typing").with_data(json!({"from": "bob"})),
        );
        assert_eq!(hub.deliver(&envelope).await, 1);

        assert_eq!(text_of(rx_a.try_recv().unwrap())["event"], "typing");
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn deliver_skips_excluded_connection() {
        let hub = TopicHub::new();
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        let mut rx_a = hub.attach(a).await;
        let mut rx_b = hub.attach(b).await;
        hub.subscribe(a, Topic::All).await;
        hub.subscribe(b, Topic::All).await;

        let envelope = Envelope::new(Topic::All, OutboundEvent::new("user joined")).excluding(a);
        assert_eq!(hub.deliver(&envelope).await, 1);
        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_ok());
    }

    #[tokio::test]
    async fn detach_removes_empty_topics() {
        let hub = TopicHub::new();
        let a = ConnectionId::new();
        let _rx = hub.attach(a).await;
        hub.subscribe(a, Topic::user("alice")).await;
        hub.subscribe(a, Topic::user("alice")).await;
        assert_eq!(hub.subscriber_count(&Topic::user("alice")).await, 1);

        hub.detach(a).await;
        assert_eq!(hub.subscriber_count(&Topic::user("alice")).await, 0);
        assert_eq!(hub.connection_count().await, 0);
        assert!(hub.inner.read().await.topics.is_empty());
    }

    #[tokio::test]
    async fn user_handles_lists_personal_topics_only() {
        let hub = TopicHub::new();
        let phone = ConnectionId::new();
        let laptop = ConnectionId::new();
        let anonymous = ConnectionId::new();
        for conn in [phone, laptop, anonymous] {
            let _ = hub.attach(conn).await;
            hub.subscribe(conn, Topic::All).await;
        }
        hub.subscribe(phone, Topic::user("alice")).await;
        hub.subscribe(laptop, Topic::user("alice")).await;

        assert_eq!(
            hub.user_handles().await,
            vec![("alice".to_string(), vec![phone, laptop])]
        );

        hub.detach(phone).await;
        assert_eq!(
            hub.user_handles().await,
            vec![("alice".to_string(), vec![laptop])]
        );
    }

    #[tokio::test]
    async fn subscribe_unknown_connection_is_rejected() {
        let hub = TopicHub::new();
        assert!(!hub.subscribe(ConnectionId::new(), Topic::All).await);
        assert_eq!(hub.subscriber_count(&Topic::All).await, 0);
    }

    #[tokio::test]
    async fn send_to_targets_one_connection() {
        let hub = TopicHub::new();
        let a = ConnectionId::new();
        let mut rx = hub.attach(a).await;

        assert!(hub.send_to(a, &OutboundEvent::new("login")).await);
        assert!(!hub.send_to(ConnectionId::new(), &OutboundEvent::new("login")).await);
        assert_eq!(text_of(rx.try_recv().unwrap())["event"], "login");
    }

    #[tokio::test]
    async fn shutdown_sends_close_and_clears() {
        let hub = TopicHub::new();
        let a = ConnectionId::new();
        let mut rx = hub.attach(a).await;
        hub.subscribe(a, Topic::All).await;

        hub.ping_all().await;
        hub.shutdown_all().await;

        assert_eq!(rx.try_recv().unwrap(), Frame::Ping);
        assert_eq!(rx.try_recv().unwrap(), Frame::Close);
        assert_eq!(hub.connection_count().await, 0);
        assert_eq!(hub.subscriber_count(&Topic::All).await, 0);
    }
}
