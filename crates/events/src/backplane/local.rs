use std::sync::Arc;

use async_trait::async_trait;

use super::{Backplane, BackplaneError};
use crate::hub::TopicHub;
use crate::topic::Envelope;

/// Single-process backplane.
pub struct LocalBackplane {
    hub: Arc<TopicHub>,
}

impl LocalBackplane {
    pub fn new(hub: Arc<TopicHub>) -> Self {
        Self { hub }
    }
}

#[async_trait]
impl Backplane for LocalBackplane {
    fn hub(&self) -> &Arc<TopicHub> {
        &self.hub
    }

    async fn publish(&self, envelope: Envelope) -> Result<(), BackplaneError> {
        let delivered = self.hub.deliver(&envelope).await;
        tracing::debug!(
            topic = %envelope.topic,
            event = %envelope.event.event,
            delivered,
            "Envelope delivered locally"
        );
        Ok(())
    }
}
