pub mod actor;
pub mod broadcast;
pub mod handler;
pub mod protocol;
pub mod registry;

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

pub use registry::ConnectionRegistry;

/// Opaque handle for one live WebSocket session (UUID v4, assigned server-side).
pub type ConnectionId = String;

/// Opaque handle for one account, stable across sessions.
pub type UserId = String;

/// Type alias for the sender half of a WebSocket connection's channel.
/// Other parts of the system can clone this to push messages to a specific client.
pub type ConnectionSender = mpsc::UnboundedSender<axum::extract::ws::Message>;

/// Every live WebSocket, registered or anonymous, keyed by connection id.
/// Broadcasts fan out over this map; the user index lives in [`ConnectionRegistry`].
pub type ConnectionHub = Arc<DashMap<ConnectionId, ConnectionSender>>;

/// Create a new empty connection hub.
pub fn new_connection_hub() -> ConnectionHub {
    Arc::new(DashMap::new())
}

/// Allocate a fresh connection id.
pub fn new_connection_id() -> ConnectionId {
    uuid::Uuid::new_v4().to_string()
}
