use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout};

use crate::chat::presence::publish_online_users;
use crate::state::AppState;
use crate::ws::{new_connection_id, protocol, ConnectionId, ConnectionSender, UserId};

/// How long the writer gets to flush queued frames (such as a close) after
/// the reader loop has ended.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Server-driven ping/pong cadence.
///
/// A transport that dies without a close frame stops answering pings; once
/// `pong_timeout` passes without a pong the connection is disconnected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Keepalive {
    pub ping_interval: Duration,
    pub pong_timeout: Duration,
}

impl Keepalive {
    pub fn from_secs(ping_interval_secs: u64, pong_timeout_secs: u64) -> Self {
        Self {
            ping_interval: Duration::from_secs(ping_interval_secs.max(1)),
            pong_timeout: Duration::from_secs(pong_timeout_secs.max(1)),
        }
    }
}

impl Default for Keepalive {
    fn default() -> Self {
        Self::from_secs(30, 10)
    }
}

/// Run the actor-per-connection pattern for an accepted WebSocket.
///
/// Splits the WebSocket into reader and writer halves:
/// - Writer task: owns the sink, forwards messages from an mpsc channel
/// - Ping task: keepalive, finishes when a pong is overdue
/// - Reader loop: answers pings, logs and drops data frames, exits on close
///   or when the ping task finishes
///
/// Lifecycle: the connection joins the hub, registers in presence when it
/// carries a user id, and triggers an `online-users` broadcast. On exit it
/// leaves the hub, is unregistered unconditionally, and presence is
/// broadcast again.
pub async fn run_connection(socket: WebSocket, state: AppState, user_id: Option<UserId>) {
    let (ws_sender, mut ws_receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel::<Message>();
    let connection_id = new_connection_id();

    state.connections.insert(connection_id.clone(), tx.clone());

    if let Some(user_id) = &user_id {
        register_presence(&state, user_id, &connection_id);
    }

    publish_online_users(&state.registry, &state.connections);

    tracing::info!(
        connection_id = %connection_id,
        user_id = user_id.as_deref().unwrap_or("-"),
        "WebSocket actor started"
    );

    let writer_handle = tokio::spawn(writer_task(ws_sender, rx));

    let (pong_tx, pong_rx) = mpsc::unbounded_channel::<()>();
    let mut ping_handle = tokio::spawn(ping_task(tx.clone(), pong_rx, state.keepalive));

    loop {
        let incoming = tokio::select! {
            _ = &mut ping_handle => {
                tracing::info!(connection_id = %connection_id, "Keepalive ended, disconnecting");
                break;
            }
            incoming = ws_receiver.next() => incoming,
        };

        match incoming {
            Some(Ok(msg)) => match msg {
                Message::Text(text) => {
                    protocol::handle_text_message(text.as_str(), &connection_id);
                }
                Message::Binary(data) => {
                    protocol::handle_binary_message(&data, &connection_id);
                }
                Message::Pong(_) => {
                    let _ = pong_tx.send(());
                }
                Message::Ping(data) => {
                    let _ = tx.send(Message::Pong(data));
                }
                Message::Close(frame) => {
                    tracing::info!(
                        connection_id = %connection_id,
                        reason = ?frame,
                        "Client initiated close"
                    );
                    break;
                }
            },
            Some(Err(e)) => {
                tracing::warn!(
                    connection_id = %connection_id,
                    error = %e,
                    "WebSocket receive error"
                );
                break;
            }
            None => {
                tracing::info!(connection_id = %connection_id, "WebSocket stream ended");
                break;
            }
        }
    }

    ping_handle.abort();

    state.connections.remove(&connection_id);
    unregister_presence(&state, &connection_id);

    publish_online_users(&state.registry, &state.connections);

    // Let the writer flush a pending close frame, then stop it
    drop(tx);
    drain_writer(writer_handle).await;

    tracing::info!(
        connection_id = %connection_id,
        user_id = user_id.as_deref().unwrap_or("-"),
        "WebSocket actor stopped"
    );
}

/// Ping task: sends a ping every interval and waits for the reader loop to
/// report a pong. Returns when the pong times out or the writer is gone.
async fn ping_task(
    tx: ConnectionSender,
    mut pong_rx: mpsc::UnboundedReceiver<()>,
    keepalive: Keepalive,
) {
    let mut ping_timer = interval(keepalive.ping_interval);
    // Skip the first immediate tick
    ping_timer.tick().await;

    loop {
        ping_timer.tick().await;

        if tx.send(Message::Ping(vec![1, 2, 3, 4].into())).is_err() {
            // Writer task has died, connection is gone
            return;
        }

        match timeout(keepalive.pong_timeout, pong_rx.recv()).await {
            Ok(Some(())) => {}
            _ => {
                tracing::warn!("Pong timeout, closing connection");
                let _ = tx.send(Message::Close(Some(CloseFrame {
                    code: 1001,
                    reason: "Pong timeout".into(),
                })));
                return;
            }
        }
    }
}

async fn drain_writer(mut writer_handle: JoinHandle<()>) {
    if timeout(WRITER_DRAIN_TIMEOUT, &mut writer_handle).await.is_err() {
        writer_handle.abort();
    }
}
/// Writer task: receives messages from mpsc channel and forwards them to the WebSocket sink.
async fn writer_task(
    mut ws_sender: futures_util::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(msg) = rx.recv().await {
        let closing = matches!(msg, Message::Close(_));
        if ws_sender.send(msg).await.is_err() || closing {
            break;
        }
    }
}

/// Register a connection in presence. A previous connection for the same
/// user is displaced silently; it stays open but no longer receives relays.
fn register_presence(state: &AppState, user_id: &str, connection_id: &ConnectionId) {
    let displaced = state.registry.register(user_id, connection_id);

    tracing::debug!(
        user_id = %user_id,
        connection_id = %connection_id,
        displaced = displaced.as_deref().unwrap_or("-"),
        online = state.registry.len(),
        "Connection registered"
    );
}

fn unregister_presence(state: &AppState, connection_id: &ConnectionId) {
    let removed = state.registry.unregister(connection_id);

    tracing::debug!(
        connection_id = %connection_id,
        users = ?removed,
        "Connection unregistered"
    );
}
