use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use crate::realtime::registry::SessionRegistry;

/// Fan-out point for real-time events. Knows nothing about workspaces or
/// payments: given a target user and a payload, it either pushes to the
/// user's live channel or drops the event.
///
/// Delivery is at-most-once with no queue, retry, or redelivery on
/// reconnect. A push failure never propagates to the caller whose action
/// produced the event.
#[derive(Clone)]
pub struct NotificationDispatcher {
    registry: SessionRegistry,
}

impl NotificationDispatcher {
    pub fn new(registry: SessionRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn notify(&self, user_id: &str, event: &str, payload: JsonValue) {
        let Some(channel) = self.registry.lookup(user_id) else {
            debug!(user_id, event, "recipient offline, dropping event");
            return;
        };

        if let Err(err) = channel.send(event, payload) {
            warn!(user_id, event, error = %err, "push failed, dropping event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::channel::QueueChannel;
    use serde_json::json;

    #[tokio::test]
    async fn delivers_to_registered_user() {
        let registry = SessionRegistry::new();
        let dispatcher = NotificationDispatcher::new(registry.clone());
        let (channel, mut receiver) = QueueChannel::open();
        registry.register("u2", channel);

        dispatcher.notify("u2", "receive_message", json!({"content": "hi"}));

        let event = receiver.recv().await.expect("event delivered");
        assert_eq!(event.event, "receive_message");
        assert_eq!(event.payload["content"], "hi");
    }

    #[test]
    fn offline_recipient_is_a_silent_no_op() {
        let registry = SessionRegistry::new();
        let dispatcher = NotificationDispatcher::new(registry);

        dispatcher.notify("offline", "receive_message", json!({}));
    }

    #[test]
    fn closed_channel_does_not_fail_the_caller() {
        let registry = SessionRegistry::new();
        let dispatcher = NotificationDispatcher::new(registry.clone());
        let (channel, receiver) = QueueChannel::open();
        registry.register("u2", channel);
        drop(receiver);

        dispatcher.notify("u2", "receive_message", json!({}));
    }
}
