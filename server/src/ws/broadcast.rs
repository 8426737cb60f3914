use super::protocol::ServerEvent;
use super::ConnectionHub;

/// Broadcast an event to every live connection, registered or anonymous.
/// Returns the number of connections the frame was queued to.
pub fn broadcast_to_all(hub: &ConnectionHub, event: &ServerEvent) -> usize {
    let Some(msg) = event.to_message() else {
        return 0;
    };

    let mut queued = 0;
    for entry in hub.iter() {
        if entry.value().send(msg.clone()).is_ok() {
            queued += 1;
        }
    }
    queued
}

/// Send an event to one connection.
/// Returns false if the connection is gone or its writer has shut down.
pub fn send_to_connection(hub: &ConnectionHub, connection_id: &str, event: &ServerEvent) -> bool {
    let Some(sender) = hub.get(connection_id) else {
        return false;
    };
    let Some(msg) = event.to_message() else {
        return false;
    };
    sender.value().send(msg).is_ok()
}
