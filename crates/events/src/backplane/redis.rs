use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio_util::sync::CancellationToken;

use super::{Backplane, BackplaneError};
use crate::hub::TopicHub;
use crate::topic::{Envelope, Topic};

/// Delay before re-subscribing after the pub/sub connection drops.
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Multi-process backplane over Redis pub/sub.
///
/// Every envelope is published to `{prefix}topic:{topic}`. Each process runs
/// one listener (see [`spawn_listener`](Self::spawn_listener)) pattern-
/// subscribed to `{prefix}topic:*` that hands decoded envelopes to its local
/// [`TopicHub`]. A process's own publishes come back through the same path.
pub struct RedisBackplane {
    hub: Arc<TopicHub>,
    client: redis::Client,
    conn: ConnectionManager,
    prefix: String,
}

impl RedisBackplane {
    pub async fn connect(
        url: &str,
        prefix: impl Into<String>,
        hub: Arc<TopicHub>,
    ) -> Result<Self, BackplaneError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client.clone()).await?;
        Ok(Self {
            hub,
            client,
            conn,
            prefix: prefix.into(),
        })
    }

    fn channel(&self, topic: &Topic) -> String {
        channel_name(&self.prefix, topic)
    }

    fn pattern(&self) -> String {
        format!("{}topic:*", self.prefix)
    }

    /// Run the subscription loop until `cancel` fires.
    ///
    /// A dropped pub/sub connection is re-established after
    /// [`RECONNECT_DELAY`]; envelopes published in the gap are lost.
    pub fn spawn_listener(&self, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        let client = self.client.clone();
        let hub = Arc::clone(&self.hub);
        let pattern = self.pattern();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    result = listen(&client, &pattern, &hub) => {
                        match result {
                            Ok(()) => tracing::warn!("Backplane subscription ended, reconnecting"),
                            Err(e) => tracing::error!(error = %e, "Backplane subscription failed, reconnecting"),
                        }
                    }
                }

                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(RECONNECT_DELAY) => {}
                }
            }
            tracing::info!("Backplane listener stopped");
        })
    }
}

fn channel_name(prefix: &str, topic: &Topic) -> String {
    format!("{prefix}topic:{topic}")
}

async fn listen(
    client: &redis::Client,
    pattern: &str,
    hub: &TopicHub,
) -> Result<(), redis::RedisError> {
    let mut pubsub = client.get_async_pubsub().await?;
    pubsub.psubscribe(pattern).await?;
    tracing::info!(pattern, "Backplane listener subscribed");

    let mut messages = pubsub.on_message();
    while let Some(msg) = messages.next().await {
        let payload: String = match msg.get_payload() {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(error = %e, "Failed to read backplane payload");
                continue;
            }
        };

        let envelope: Envelope = match serde_json::from_str(&payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::error!(error = %e, channel = msg.get_channel_name(), "Dropping malformed envelope");
                continue;
            }
        };

        let delivered = hub.deliver(&envelope).await;
        tracing::debug!(
            topic = %envelope.topic,
            event = %envelope.event.event,
            delivered,
            "Envelope delivered from backplane"
        );
    }
    Ok(())
}

#[async_trait]
impl Backplane for RedisBackplane {
    fn hub(&self) -> &Arc<TopicHub> {
        &self.hub
    }

    async fn publish(&self, envelope: Envelope) -> Result<(), BackplaneError> {
        let channel = self.channel(&envelope.topic);
        let payload = serde_json::to_string(&envelope)?;
        let mut conn = self.conn.clone();
        let receivers: i64 = conn.publish(&channel, payload).await?;
        tracing::debug!(%channel, receivers, "Envelope published");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    use bazaar_core::types::ConnectionId;

    use crate::hub::Frame;
    use crate::topic::OutboundEvent;

    fn redis_url() -> String {
        env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
    }

    #[test]
    fn channels_are_namespaced_by_prefix() {
        assert_eq!(channel_name("bazaar:", &Topic::user("bob")), "bazaar:topic:user:bob");
        assert_eq!(channel_name("bazaar:", &Topic::All), "bazaar:topic:all");
        assert_ne!(
            channel_name("a:", &Topic::All),
            channel_name("b:", &Topic::All)
        );
    }

    #[tokio::test]
    #[ignore] // Requires Redis
    async fn envelopes_reach_subscribers_on_another_process() {
        let prefix = format!("bazaar-test:{}:", ConnectionId::new());
        let sender = RedisBackplane::connect(&redis_url(), prefix.clone(), Arc::new(TopicHub::new()))
            .await
            .expect("Redis must be reachable");
        let receiver_hub = Arc::new(TopicHub::new());
        let receiver = RedisBackplane::connect(&redis_url(), prefix, Arc::clone(&receiver_hub))
            .await
            .expect("Redis must be reachable");

        let cancel = CancellationToken::new();
        let listener = receiver.spawn_listener(cancel.clone());

        let phone = ConnectionId::new();
        let laptop = ConnectionId::new();
        let mut phone_rx = receiver_hub.attach(phone).await;
        let mut laptop_rx = receiver_hub.attach(laptop).await;
        receiver_hub.subscribe(phone, Topic::user("bob")).await;
        receiver_hub.subscribe(laptop, Topic::user("bob")).await;

        // Give the listener time to PSUBSCRIBE; pub/sub does not replay.
        tokio::time::sleep(Duration::from_millis(300)).await;

        let event = OutboundEvent::encode("new_message", &serde_json::json!({"body": "hi"})).unwrap();
        sender
            .publish(Envelope::new(Topic::user("bob"), event).excluding(laptop))
            .await
            .unwrap();

        let frame = tokio::time::timeout(Duration::from_secs(2), phone_rx.recv())
            .await
            .expect("envelope should arrive within 2s")
            .expect("phone channel open");
        let Frame::Event(text) = frame else {
            panic!("expected an event frame, got {frame:?}");
        };
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["event"], "new_message");
        assert_eq!(value["data"]["body"], "hi");
        assert!(laptop_rx.try_recv().is_err());

        cancel.cancel();
        listener.await.unwrap();
    }
}
