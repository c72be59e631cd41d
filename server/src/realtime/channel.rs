use std::sync::Arc;

use anyhow::{Result, anyhow};
use serde_json::Value as JsonValue;
use tokio::sync::mpsc;
use uuid::Uuid;

/// A single event queued for delivery over a live connection.
#[derive(Debug, Clone)]
pub struct PushEvent {
    pub event: String,
    pub payload: JsonValue,
}

/// Live delivery handle installed by the external connection layer on
/// connect and torn down on disconnect. Implementations must never block
/// the caller: enqueueing is the whole contract, draining belongs to the
/// transport.
pub trait DeliveryChannel: Send + Sync {
    /// Stable identity of the underlying connection. Two registrations for
    /// the same user have distinct connection ids, which is what lets a
    /// stale disconnect be told apart from the live session.
    fn connection_id(&self) -> &str;

    fn send(&self, event: &str, payload: JsonValue) -> Result<()>;
}

/// Reference channel backed by an unbounded in-memory queue. The transport
/// holds the receiving half and drains it into the socket; tests read it
/// directly.
pub struct QueueChannel {
    connection_id: String,
    sender: mpsc::UnboundedSender<PushEvent>,
}

impl QueueChannel {
    pub fn open() -> (Arc<Self>, mpsc::UnboundedReceiver<PushEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let channel = Arc::new(Self {
            connection_id: Uuid::new_v4().to_string(),
            sender,
        });

        (channel, receiver)
    }
}

impl DeliveryChannel for QueueChannel {
    fn connection_id(&self) -> &str {
        &self.connection_id
    }

    fn send(&self, event: &str, payload: JsonValue) -> Result<()> {
        self.sender
            .send(PushEvent {
                event: event.to_owned(),
                payload,
            })
            .map_err(|_| anyhow!("connection {} is closed", self.connection_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn events_arrive_in_send_order() {
        let (channel, mut receiver) = QueueChannel::open();

        channel.send("first", json!({"n": 1})).expect("send first");
        channel.send("second", json!({"n": 2})).expect("send second");

        let first = receiver.recv().await.expect("first event");
        assert_eq!(first.event, "first");
        let second = receiver.recv().await.expect("second event");
        assert_eq!(second.event, "second");
    }

    #[tokio::test]
    async fn send_fails_after_receiver_drops() {
        let (channel, receiver) = QueueChannel::open();
        drop(receiver);

        assert!(channel.send("orphan", json!({})).is_err());
    }

    #[test]
    fn connection_ids_are_unique() {
        let (a, _rx_a) = QueueChannel::open();
        let (b, _rx_b) = QueueChannel::open();

        assert_ne!(a.connection_id(), b.connection_id());
    }
}
