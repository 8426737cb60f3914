use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use serde::Deserialize;

use crate::auth::jwt;
use crate::state::AppState;
use crate::ws::{actor, UserId};

/// Query parameters for WebSocket connection.
/// `token` is a JWT whose `sub` becomes the presence identity. `userId` is the
/// legacy unverified form, honoured only when the server allows it.
#[derive(Debug, Default, Deserialize)]
pub struct WsHandshakeQuery {
    pub token: Option<String>,
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
}

/// WebSocket close codes:
/// 4001 = token expired
/// 4002 = token invalid
pub const CLOSE_TOKEN_EXPIRED: u16 = 4001;
pub const CLOSE_TOKEN_INVALID: u16 = 4002;

/// Identity resolved from the handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handshake {
    /// Registered in presence under this user id.
    Identified(UserId),
    /// Receives broadcasts, never appears in presence.
    Anonymous,
    /// A token was supplied and did not verify; close with this code.
    Rejected { close_code: u16, reason: &'static str },
}

/// Resolve the identity for a handshake.
pub fn resolve_handshake(state: &AppState, params: &WsHandshakeQuery) -> Handshake {
    if let Some(token) = params.token.as_deref().filter(|t| !t.is_empty()) {
        return match jwt::validate_access_token(&state.jwt_secret, token) {
            Ok(claims) if !claims.sub.is_empty() => Handshake::Identified(claims.sub),
            Ok(_) => Handshake::Rejected {
                close_code: CLOSE_TOKEN_INVALID,
                reason: "Token invalid",
            },
            Err(err) => match err.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => Handshake::Rejected {
                    close_code: CLOSE_TOKEN_EXPIRED,
                    reason: "Token expired",
                },
                _ => Handshake::Rejected {
                    close_code: CLOSE_TOKEN_INVALID,
                    reason: "Token invalid",
                },
            },
        };
    }

    if state.allow_unverified_user_id {
        if let Some(user_id) = params.user_id.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
            return Handshake::Identified(user_id.to_string());
        }
    }

    Handshake::Anonymous
}

/// GET /ws?token=JWT
/// WebSocket upgrade endpoint. A missing token yields an anonymous connection.
/// On token failure, upgrades then immediately closes with the matching close code.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(params): Query<WsHandshakeQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    match resolve_handshake(&state, &params) {
        Handshake::Identified(user_id) => {
            tracing::info!(user_id = %user_id, "WebSocket handshake identified");
            ws.on_upgrade(move |socket| handle_connection(socket, state, Some(user_id)))
        }
        Handshake::Anonymous => {
            tracing::debug!("WebSocket handshake without identity, connecting anonymously");
            ws.on_upgrade(move |socket| handle_connection(socket, state, None))
        }
        Handshake::Rejected { close_code, reason } => {
            tracing::warn!(close_code = close_code, reason = reason, "WebSocket auth failed");

            ws.on_upgrade(move |mut socket| async move {
                let close_frame = CloseFrame {
                    code: close_code,
                    reason: reason.into(),
                };
                let _ = socket.send(Message::Close(Some(close_frame))).await;
            })
        }
    }
}

async fn handle_connection(socket: WebSocket, state: AppState, user_id: Option<UserId>) {
    actor::run_connection(socket, state, user_id).await;
}
