//! Event publisher: serializes lifecycle events and hands them to the bus.
//!
//! No retries happen here. Whether a failed publish aborts the workflow is
//! decided by the caller.

use crate::error::{GatewayError, GatewayResult};
use crate::ports::MessageBus;
use std::sync::Arc;
use syncgate_types::{LifecycleEvent, Topic};
use tracing::debug;

pub struct EventPublisher {
    bus: Arc<dyn MessageBus>,
    mutation_topic: String,
    track_topic: String,
}

impl EventPublisher {
    pub fn new(
        bus: Arc<dyn MessageBus>,
        mutation_topic: impl Into<String>,
        track_topic: impl Into<String>,
    ) -> Self {
        Self {
            bus,
            mutation_topic: mutation_topic.into(),
            track_topic: track_topic.into(),
        }
    }

    /// Bus topic name for a logical topic.
    pub fn topic_name(&self, topic: Topic) -> &str {
        match topic {
            Topic::Mutation => &self.mutation_topic,
            Topic::Track => &self.track_topic,
        }
    }

    /// Publishes `event` and waits for the bus to accept it.
    pub async fn publish(&self, topic: Topic, event: &LifecycleEvent) -> GatewayResult<()> {
        let payload = event.to_json()?;
        let name = self.topic_name(topic);
        debug!(topic = name, op = ?event.op, bytes = payload.len(), "publishing event");

        self.bus
            .send(name, payload)
            .await
            .map_err(|e| GatewayError::Publish {
                topic,
                reason: e.to_string(),
            })
    }
}
