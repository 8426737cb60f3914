use std::net::SocketAddr;
use tokio::net::TcpListener;

use parley_server::config::{generate_config_template, Config};
use parley_server::ws::actor::Keepalive;
use parley_server::{auth, chat, db, routes, state};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load config with layered precedence: defaults < TOML < env < CLI
    let config = Config::load()?;

    // Handle --generate-config: print template and exit
    if config.generate_config {
        print!("{}", generate_config_template());
        return Ok(());
    }

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("parley_server=info"));
    if config.json_logs {
        tracing_subscriber::fmt().json().with_env_filter(env_filter).init();
    } else {
        tracing_subscriber::fmt().pretty().with_env_filter(env_filter).init();
    }

    tracing::info!("Parley server v{} starting", env!("CARGO_PKG_VERSION"));

    let db = db::init_db(&config.data_dir)?;

    // Shared with the authentication service that mints handshake tokens
    let jwt_secret = auth::jwt::load_or_generate_jwt_secret(&config.data_dir)?;

    let ws_config = &config.ws;
    if ws_config.allow_unverified_user_id {
        tracing::warn!("Unverified ?userId= handshakes are enabled; presence identities are not authenticated");
    }

    let mut app_state = state::AppState::new(db, jwt_secret);
    app_state.allow_unverified_user_id = ws_config.allow_unverified_user_id;
    app_state.keepalive = Keepalive::from_secs(ws_config.ping_interval_secs, ws_config.pong_timeout_secs);

    chat::presence::spawn_stale_sweep(
        app_state.registry.clone(),
        app_state.connections.clone(),
        config.presence.sweep_interval_secs,
    );

    let app = routes::build_router(app_state, &config.rate_limit);

    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
