use axum::{middleware, Router};
use std::sync::Arc;
use tower_governor::key_extractor::PeerIpKeyExtractor;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};

use crate::auth::middleware::JwtSecret;
use crate::chat::{messages, presence};
use crate::config::RateLimitConfig;
use crate::state::AppState;
use crate::ws::handler as ws_handler;

/// Inject the JWT secret into request extensions so the Claims extractor can find it.
async fn inject_jwt_secret(
    axum::extract::State(state): axum::extract::State<AppState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: middleware::Next,
) -> axum::response::Response {
    req.extensions_mut()
        .insert(JwtSecret(state.jwt_secret.clone()));
    next.run(req).await
}

/// Build the full axum Router with all routes and middleware.
/// Must be called inside a tokio runtime (spawns the rate limiter cleanup task).
pub fn build_router(state: AppState, rate_limit: &RateLimitConfig) -> Router {
    // Per-IP rate limiting on message sends
    // Uses PeerIpKeyExtractor which reads from ConnectInfo<SocketAddr>
    let governor_config = Arc::new(
        GovernorConfigBuilder::default()
            .key_extractor(PeerIpKeyExtractor)
            .per_second(rate_limit.per_second.max(1))
            .burst_size(rate_limit.burst_size.max(1))
            .finish()
            .expect("Non-zero governor settings always build"),
    );
    let governor_limiter = governor_config.limiter().clone();

    // Spawn background task to clean up rate limiter state
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            governor_limiter.retain_recent();
        }
    });

    let send_routes = Router::new()
        .route(
            "/api/message/send/{receiver_id}",
            axum::routing::post(messages::send_message),
        )
        .layer(GovernorLayer {
            config: governor_config,
        });

    // Authenticated routes (JWT required, Claims extractor validates token)
    let authenticated_routes = Router::new()
        .route(
            "/api/message/{other_user_id}",
            axum::routing::get(messages::get_messages),
        )
        .route("/api/presence", axum::routing::get(presence::get_presence));

    // WebSocket endpoint (identity via query param, not JWT header)
    let ws_routes = Router::new().route("/ws", axum::routing::get(ws_handler::ws_upgrade));

    let health = Router::new().route("/health", axum::routing::get(health_check));

    Router::new()
        .merge(send_routes)
        .merge(authenticated_routes)
        .merge(ws_routes)
        .merge(health)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            inject_jwt_secret,
        ))
        .with_state(state)
}

/// Basic health check endpoint
async fn health_check() -> &'static str {
    "ok"
}
