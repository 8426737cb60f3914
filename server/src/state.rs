use std::sync::Arc;

use crate::db::DbPool;
use crate::ws::actor::Keepalive;
use crate::ws::{ConnectionHub, ConnectionRegistry};

/// Shared application state passed to all handlers via axum State extractor.
#[derive(Clone)]
pub struct AppState {
    /// SQLite connection wrapped in Arc<Mutex>
    pub db: DbPool,
    /// JWT verification secret (256-bit random key)
    pub jwt_secret: Vec<u8>,
    /// Every live WebSocket, keyed by connection id
    pub connections: ConnectionHub,
    /// User id <-> connection id presence index
    pub registry: Arc<ConnectionRegistry>,
    /// Trust a bare `?userId=` on the handshake when no token is given
    pub allow_unverified_user_id: bool,
    /// Ping/pong cadence applied to every new connection
    pub keepalive: Keepalive,
}

impl AppState {
    pub fn new(db: DbPool, jwt_secret: Vec<u8>) -> Self {
        Self {
            db,
            jwt_secret,
            connections: crate::ws::new_connection_hub(),
            registry: Arc::new(ConnectionRegistry::new()),
            allow_unverified_user_id: false,
            keepalive: Keepalive::default(),
        }
    }
}
