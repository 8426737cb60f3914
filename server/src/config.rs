use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Parley presence and message relay server
///
/// Flags left unset are skipped on serialization so they never mask a value
/// from the TOML file or the environment.
#[derive(Parser, Serialize, Debug)]
#[command(name = "parley-server", version, about = "Parley presence and message relay server")]
pub struct Cli {
    /// Port to listen on [default: 5001]
    #[arg(long, env = "PARLEY_PORT")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Bind address [default: 0.0.0.0]
    #[arg(long, env = "PARLEY_BIND_ADDRESS")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind_address: Option<String>,

    /// Path to TOML config file
    #[arg(long, default_value = "./parley.toml")]
    #[serde(skip)]
    pub config: String,

    /// Enable structured JSON logging (for Docker/production)
    #[arg(long)]
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub json_logs: bool,

    /// Output a commented TOML config template and exit
    #[arg(long)]
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub generate_config: bool,

    /// Data directory for persistent state (DB, JWT key) [default: ./data]
    #[arg(long, env = "PARLEY_DATA_DIR")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
}

/// Effective server configuration after all layers are merged.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub bind_address: String,
    pub json_logs: bool,
    pub generate_config: bool,
    pub data_dir: String,

    /// WebSocket handshake and keepalive settings ([ws] section)
    #[serde(default)]
    pub ws: WsConfig,

    /// Presence settings ([presence] section)
    #[serde(default)]
    pub presence: PresenceConfig,

    /// Message send rate limit ([rate_limit] section)
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

/// Handshake identity and keepalive settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsConfig {
    /// Accept a bare `?userId=` on the WebSocket handshake when no token is
    /// supplied. The id is trusted as given (default: false)
    #[serde(default)]
    pub allow_unverified_user_id: bool,

    /// Seconds between server pings (default: 30)
    #[serde(default = "default_ping_interval")]
    pub ping_interval_secs: u64,

    /// Seconds to wait for a pong before disconnecting (default: 10)
    #[serde(default = "default_pong_timeout")]
    pub pong_timeout_secs: u64,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            allow_unverified_user_id: false,
            ping_interval_secs: default_ping_interval(),
            pong_timeout_secs: default_pong_timeout(),
        }
    }
}

fn default_ping_interval() -> u64 {
    30
}

fn default_pong_timeout() -> u64 {
    10
}

/// Presence bookkeeping settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceConfig {
    /// Interval in seconds between stale-registration sweeps (default: 60)
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

fn default_sweep_interval() -> u64 {
    60
}

/// Per-IP limits on the message send endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Seconds to replenish one request token (default: 1)
    #[serde(default = "default_replenish_secs")]
    pub per_second: u64,

    /// Maximum burst of requests (default: 20)
    #[serde(default = "default_burst_size")]
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_second: default_replenish_secs(),
            burst_size: default_burst_size(),
        }
    }
}

fn default_replenish_secs() -> u64 {
    1
}

fn default_burst_size() -> u32 {
    20
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 5001,
            bind_address: "0.0.0.0".to_string(),
            json_logs: false,
            generate_config: false,
            data_dir: "./data".to_string(),
            ws: WsConfig::default(),
            presence: PresenceConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl Config {
    /// Load config with layered precedence:
    /// built-in defaults < TOML file < env vars (PARLEY_*) < CLI args
    pub fn load() -> Result<Self, figment::Error> {
        let cli = Cli::parse();
        let config_path = cli.config.clone();

        Self::figment(cli, &config_path).extract()
    }

    fn figment(cli: Cli, config_path: &str) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(config_path))
            .merge(Env::prefixed("PARLEY_").split("__"))
            .merge(Serialized::defaults(cli))
    }
}

/// Generate a commented TOML config template
pub fn generate_config_template() -> String {
    r#"# Parley Server Configuration
# Place this file at ./parley.toml or specify with --config <path>
# All settings can be overridden via environment variables (PARLEY_PORT,
# PARLEY_WS__ALLOW_UNVERIFIED_USER_ID, etc.) or CLI flags (--port, etc.)

# Server port (default: 5001)
# port = 5001

# Bind address (default: 0.0.0.0, all interfaces)
# bind_address = "0.0.0.0"

# Enable structured JSON logging for Docker/production
# json_logs = false

# Data directory for the SQLite database and JWT signing key
# data_dir = "./data"

# ---- WebSocket handshake ----
# [ws]

# Accept ?userId=<id> on /ws when no token is given. The id is NOT verified.
# allow_unverified_user_id = false

# Server ping cadence and how long to wait for the pong before disconnecting
# ping_interval_secs = 30
# pong_timeout_secs = 10

# ---- Presence ----
# [presence]

# Seconds between sweeps that evict registrations whose socket is gone
# sweep_interval_secs = 60

# ---- Message send rate limit (per client IP) ----
# [rate_limit]
# per_second = 1   # seconds to replenish one request
# burst_size = 20
"#
    .to_string()
}
