//! Wire format for server-to-client events.
//!
//! Every event is a JSON text frame shaped `{"event": <name>, "data": <payload>}`.
//! Clients send no commands; inbound data frames are logged and dropped.

use axum::extract::ws::Message;
use serde::Serialize;

use crate::db::models::ChatMessage;
use crate::ws::{ConnectionId, UserId};

/// Events pushed to clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// Full list of currently registered user ids, sorted.
    OnlineUsers(Vec<UserId>),
    /// A newly persisted chat message addressed to the receiving client.
    NewMessage(ChatMessage),
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::OnlineUsers(_) => "online-users",
            Self::NewMessage(_) => "new-message",
        }
    }

    /// Encode as a WebSocket text frame. Returns `None` if serialization fails.
    pub fn to_message(&self) -> Option<Message> {
        match serde_json::to_string(self) {
            Ok(json) => Some(Message::Text(json.into())),
            Err(e) => {
                tracing::warn!(event = self.name(), error = %e, "Failed to encode event");
                None
            }
        }
    }
}

/// Handle an inbound text frame. The relay defines no client commands.
pub fn handle_text_message(text: &str, connection_id: &ConnectionId) {
    tracing::debug!(
        connection_id = %connection_id,
        "Ignoring client text frame: {}",
        text.chars().take(100).collect::<String>()
    );
}

/// Handle an inbound binary frame. The relay defines no client commands.
pub fn handle_binary_message(data: &[u8], connection_id: &ConnectionId) {
    tracing::debug!(
        connection_id = %connection_id,
        bytes = data.len(),
        "Ignoring client binary frame"
    );
}
