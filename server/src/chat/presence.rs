//! Server-side presence broadcast.
//!
//! Presence is the key set of the [`ConnectionRegistry`]. Every connect and
//! disconnect pushes the full, sorted list to every live connection as an
//! `online-users` event. No diffing, no rate limiting.

use std::sync::Arc;
use std::time::Duration;

use axum::{extract::State, Json};
use serde::Serialize;

use crate::auth::middleware::Claims;
use crate::state::AppState;
use crate::ws::broadcast::broadcast_to_all;
use crate::ws::protocol::ServerEvent;
use crate::ws::{ConnectionHub, ConnectionRegistry, UserId};

/// Current online user ids, sorted.
pub fn online_users(registry: &ConnectionRegistry) -> Vec<UserId> {
    registry.snapshot().into_iter().collect()
}

/// Broadcast the full online-user list to every live connection.
/// Returns the number of connections the event was queued to.
pub fn publish_online_users(registry: &ConnectionRegistry, hub: &ConnectionHub) -> usize {
    let users = online_users(registry);
    let online = users.len();
    let recipients = broadcast_to_all(hub, &ServerEvent::OnlineUsers(users));

    tracing::debug!(online, recipients, "Broadcast online-users");
    recipients
}

/// Unregister every connection id the registry still holds but whose
/// outbound channel is gone from the hub or closed. Returns evicted user ids.
pub fn evict_stale(registry: &ConnectionRegistry, hub: &ConnectionHub) -> Vec<UserId> {
    let mut evicted = Vec::new();

    for connection_id in registry.connections() {
        let live = hub
            .get(&connection_id)
            .map(|sender| !sender.value().is_closed())
            .unwrap_or(false);

        if !live {
            hub.remove(&connection_id);
            evicted.extend(registry.unregister(&connection_id));
        }
    }

    evicted
}

/// Spawn the background stale-registration sweep.
/// Re-broadcasts presence only when something was evicted.
pub fn spawn_stale_sweep(registry: Arc<ConnectionRegistry>, hub: ConnectionHub, interval_secs: u64) {
    let period = Duration::from_secs(interval_secs.max(1));

    tokio::spawn(async move {
        let mut timer = tokio::time::interval(period);
        // Skip the first immediate tick
        timer.tick().await;

        loop {
            timer.tick().await;

            let evicted = evict_stale(&registry, &hub);
            if !evicted.is_empty() {
                tracing::warn!(
                    count = evicted.len(),
                    users = ?evicted,
                    "Evicted stale presence registrations"
                );
                publish_online_users(&registry, &hub);
            }
        }
    });
}

// --- REST endpoint handlers ---

#[derive(Debug, Serialize)]
pub struct PresenceResponse {
    pub online_users: Vec<UserId>,
}

/// GET /api/presence: current online user ids. JWT auth required.
pub async fn get_presence(State(state): State<AppState>, _claims: Claims) -> Json<PresenceResponse> {
    Json(PresenceResponse {
        online_users: online_users(&state.registry),
    })
}
