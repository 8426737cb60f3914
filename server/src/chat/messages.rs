//! REST endpoints for sending and reading direct chat messages.
//!
//! Sending persists the message first, then hands it to the relay. The HTTP
//! response does not depend on whether the receiver was online.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{SecondsFormat, Utc};
use rusqlite::Connection;
use serde::Deserialize;

use crate::auth::middleware::Claims;
use crate::chat::relay::relay_new_message;
use crate::db::models::ChatMessage;
use crate::state::AppState;

/// Maximum text length (chars).
const MAX_TEXT_LENGTH: usize = 4000;
/// Maximum image reference length (bytes).
const MAX_IMAGE_REF_LENGTH: usize = 2048;

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub text: Option<String>,
    /// Reference to an image already uploaded to the image host
    pub image: Option<String>,
}

/// Trim and drop empty strings.
fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Insert a message and return the stored row.
pub fn insert_message(
    conn: &Connection,
    sender_id: &str,
    receiver_id: &str,
    text: Option<String>,
    image: Option<String>,
) -> rusqlite::Result<ChatMessage> {
    let message = ChatMessage {
        id: uuid::Uuid::now_v7().to_string(),
        sender_id: sender_id.to_string(),
        receiver_id: receiver_id.to_string(),
        text,
        image,
        created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
    };

    conn.execute(
        "INSERT INTO messages (id, sender_id, receiver_id, text, image, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            message.id,
            message.sender_id,
            message.receiver_id,
            message.text,
            message.image,
            message.created_at,
        ],
    )?;

    Ok(message)
}

/// All messages exchanged between two users, oldest first.
pub fn conversation(conn: &Connection, user_a: &str, user_b: &str) -> rusqlite::Result<Vec<ChatMessage>> {
    let mut stmt = conn.prepare(
        "SELECT id, sender_id, receiver_id, text, image, created_at
         FROM messages
         WHERE (sender_id = ?1 AND receiver_id = ?2)
            OR (sender_id = ?2 AND receiver_id = ?1)
         ORDER BY created_at ASC, id ASC",
    )?;

    let messages = stmt
        .query_map(rusqlite::params![user_a, user_b], ChatMessage::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(messages)
}

// --- Handlers ---

/// POST /api/message/send/{receiver_id}
/// Persist a message from the authenticated user, then relay it to the
/// receiver's live connection if there is one. JWT auth required.
pub async fn send_message(
    State(state): State<AppState>,
    claims: Claims,
    Path(receiver_id): Path<String>,
    Json(body): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<ChatMessage>), StatusCode> {
    let receiver_id = receiver_id.trim().to_string();
    if receiver_id.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let text = non_empty(body.text);
    let image = non_empty(body.image);
    if text.is_none() && image.is_none() {
        return Err(StatusCode::BAD_REQUEST);
    }
    if text.as_ref().is_some_and(|t| t.chars().count() > MAX_TEXT_LENGTH)
        || image.as_ref().is_some_and(|i| i.len() > MAX_IMAGE_REF_LENGTH)
    {
        return Err(StatusCode::PAYLOAD_TOO_LARGE);
    }

    let db = state.db.clone();
    let sender_id = claims.sub.clone();
    let rid = receiver_id.clone();

    let message = tokio::task::spawn_blocking(move || {
        let conn = db.lock().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        insert_message(&conn, &sender_id, &rid, text, image).map_err(|e| {
            tracing::error!(error = %e, "Failed to persist message");
            StatusCode::INTERNAL_SERVER_ERROR
        })
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)??;

    let outcome = relay_new_message(&state.registry, &state.connections, &message);

    tracing::info!(
        message_id = %message.id,
        sender_id = %message.sender_id,
        receiver_id = %message.receiver_id,
        delivered = outcome.is_delivered(),
        "Message sent"
    );

    Ok((StatusCode::CREATED, Json(message)))
}

/// GET /api/message/{other_user_id}
/// Conversation history between the authenticated user and another user.
/// JWT auth required.
pub async fn get_messages(
    State(state): State<AppState>,
    claims: Claims,
    Path(other_user_id): Path<String>,
) -> Result<Json<Vec<ChatMessage>>, StatusCode> {
    let db = state.db.clone();
    let user_id = claims.sub.clone();

    let messages = tokio::task::spawn_blocking(move || {
        let conn = db.lock().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        conversation(&conn, &user_id, &other_user_id).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)??;

    Ok(Json(messages))
}
