//! User-to-connection index used for presence and targeted delivery.
//!
//! A user has at most one registered connection. Registering again for the
//! same user replaces the previous connection id without touching the
//! displaced socket. A secondary index from connection id back to user ids
//! lets `unregister` run without scanning the whole map; both maps sit behind
//! one lock so they never disagree.

use std::collections::{BTreeSet, HashMap, HashSet};

use parking_lot::RwLock;

use super::{ConnectionId, UserId};

#[derive(Debug, Default)]
struct Index {
    by_user: HashMap<UserId, ConnectionId>,
    by_connection: HashMap<ConnectionId, HashSet<UserId>>,
}

/// Process-wide presence registry. Owned by [`crate::state::AppState`] behind an `Arc`.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    index: RwLock<Index>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `user_id` to `connection_id`, overwriting any previous mapping.
    /// Returns the displaced connection id, if the user was already registered
    /// under a different one.
    pub fn register(&self, user_id: &str, connection_id: &str) -> Option<ConnectionId> {
        let mut index = self.index.write();

        let previous = index
            .by_user
            .insert(user_id.to_string(), connection_id.to_string());

        if let Some(old) = &previous {
            if let Some(users) = index.by_connection.get_mut(old) {
                users.remove(user_id);
                if users.is_empty() {
                    index.by_connection.remove(old);
                }
            }
        }

        index
            .by_connection
            .entry(connection_id.to_string())
            .or_default()
            .insert(user_id.to_string());

        previous.filter(|old| old != connection_id)
    }

    /// Remove every user currently mapped to `connection_id`.
    /// Unknown ids are a no-op. Returns the removed user ids.
    pub fn unregister(&self, connection_id: &str) -> Vec<UserId> {
        let mut index = self.index.write();

        let Some(users) = index.by_connection.remove(connection_id) else {
            return Vec::new();
        };

        let mut removed: Vec<UserId> = users.into_iter().collect();
        for user_id in &removed {
            index.by_user.remove(user_id);
        }
        removed.sort();
        removed
    }

    /// Current connection id for `user_id`, if registered.
    pub fn lookup(&self, user_id: &str) -> Option<ConnectionId> {
        self.index.read().by_user.get(user_id).cloned()
    }

    /// All registered user ids, sorted.
    pub fn snapshot(&self) -> BTreeSet<UserId> {
        self.index.read().by_user.keys().cloned().collect()
    }

    /// Connection ids that currently back at least one registration.
    pub fn connections(&self) -> Vec<ConnectionId> {
        self.index.read().by_connection.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.index.read().by_user.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.read().by_user.is_empty()
    }
}
