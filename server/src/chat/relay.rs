//! Delivery of persisted chat messages to the recipient's live connection.
//!
//! At-most-once and best-effort: if the recipient has no registered
//! connection, or its writer has already shut down, the event is dropped.
//! Message history over REST is the only fallback.

use crate::db::models::ChatMessage;
use crate::ws::broadcast::send_to_connection;
use crate::ws::protocol::ServerEvent;
use crate::ws::{ConnectionHub, ConnectionRegistry};

/// Outcome of a relay attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Queued to the recipient's current connection.
    Delivered { connection_id: String },
    /// Recipient has no registered connection.
    Offline,
    /// Registered, but the connection's writer is gone.
    Stale { connection_id: String },
}

impl RelayOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }
}

/// Forward `message` as a `new-message` event to its receiver's connection only.
pub fn relay_new_message(
    registry: &ConnectionRegistry,
    hub: &ConnectionHub,
    message: &ChatMessage,
) -> RelayOutcome {
    let Some(connection_id) = registry.lookup(&message.receiver_id) else {
        tracing::debug!(
            message_id = %message.id,
            receiver_id = %message.receiver_id,
            "Receiver offline, dropping new-message"
        );
        return RelayOutcome::Offline;
    };

    if send_to_connection(hub, &connection_id, &ServerEvent::NewMessage(message.clone())) {
        tracing::debug!(
            message_id = %message.id,
            receiver_id = %message.receiver_id,
            connection_id = %connection_id,
            "Relayed new-message"
        );
        RelayOutcome::Delivered { connection_id }
    } else {
        tracing::debug!(
            message_id = %message.id,
            receiver_id = %message.receiver_id,
            connection_id = %connection_id,
            "Receiver connection closed, dropping new-message"
        );
        RelayOutcome::Stale { connection_id }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::new_connection_hub;
    use axum::extract::ws::Message;
    use tokio::sync::mpsc;

    fn message(sender: &str, receiver: &str) -> ChatMessage {
        ChatMessage {
            id: "m1".into(),
            sender_id: sender.into(),
            receiver_id: receiver.into(),
            text: Some("hello".into()),
            image: None,
            created_at: "2026-01-01T00:00:00+00:00".into(),
        }
    }

    #[test]
    fn test_relay_to_registered_recipient_emits_exactly_once() {
        let registry = ConnectionRegistry::new();
        let hub = new_connection_hub();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        hub.insert("c1".into(), tx1);
        hub.insert("c2".into(), tx2);
        registry.register("u1", "c1");
        registry.register("u2", "c2");

        let outcome = relay_new_message(&registry, &hub, &message("u1", "u2"));

        assert_eq!(outcome, RelayOutcome::Delivered { connection_id: "c2".into() });
        match rx2.try_recv() {
            Ok(Message::Text(text)) => {
                let json: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
                assert_eq!(json["event"], "new-message");
                assert_eq!(json["data"]["senderId"], "u1");
            }
            other => panic!("Expected text frame, got: {:?}", other),
        }
        assert!(rx2.try_recv().is_err(), "Exactly one event expected");
        assert!(rx1.try_recv().is_err(), "Sender must not receive the event");
    }

    #[test]
    fn test_relay_to_offline_recipient_emits_nothing() {
        let registry = ConnectionRegistry::new();
        let hub = new_connection_hub();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        hub.insert("c1".into(), tx1);
        registry.register("u1", "c1");

        let outcome = relay_new_message(&registry, &hub, &message("u1", "u2"));

        assert_eq!(outcome, RelayOutcome::Offline);
        assert!(!outcome.is_delivered());
        assert!(rx1.try_recv().is_err());
    }

    #[test]
    fn test_relay_follows_latest_registration() {
        let registry = ConnectionRegistry::new();
        let hub = new_connection_hub();
        let (tx_old, mut rx_old) = mpsc::unbounded_channel();
        let (tx_new, mut rx_new) = mpsc::unbounded_channel();
        hub.insert("c-old".into(), tx_old);
        hub.insert("c-new".into(), tx_new);
        registry.register("u2", "c-old");
        registry.register("u2", "c-new");

        assert!(relay_new_message(&registry, &hub, &message("u1", "u2")).is_delivered());
        assert!(rx_new.try_recv().is_ok());
        assert!(rx_old.try_recv().is_err());
    }

    #[test]
    fn test_relay_to_closed_connection_is_stale() {
        let registry = ConnectionRegistry::new();
        let hub = new_connection_hub();
        let (tx, rx) = mpsc::unbounded_channel();
        hub.insert("c2".into(), tx);
        drop(rx);
        registry.register("u2", "c2");

        assert_eq!(
            relay_new_message(&registry, &hub, &message("u1", "u2")),
            RelayOutcome::Stale { connection_id: "c2".into() }
        );
    }
}
