//! Client configuration loaded from environment variables.
//!
//! All settings have defaults pointing at a backend on localhost so the
//! client can start with zero configuration for local development.

use std::path::PathBuf;
use std::time::Duration;

use hubchat_shared::constants::{
    DEFAULT_HANDSHAKE_TIMEOUT_SECS, DEFAULT_KEEPALIVE_SECS, DEFAULT_SERVER_TIMEOUT_SECS,
};

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the REST API.
    /// Env: `HUBCHAT_API_URL`
    /// Default: `http://localhost:5000/api`
    pub api_base_url: String,

    /// URL of the real-time hub endpoint (http/https, converted to ws/wss).
    /// Env: `HUBCHAT_HUB_URL`
    /// Default: `http://localhost:5000/hubs/chat`
    pub hub_url: String,

    /// Directory holding the session file. `None` uses the platform data dir.
    /// Env: `HUBCHAT_DATA_DIR`
    pub data_dir: Option<PathBuf>,

    /// Bound on opening the hub socket and completing the handshake.
    /// Env: `HUBCHAT_HANDSHAKE_TIMEOUT_SECS`
    pub handshake_timeout: Duration,

    /// Interval between keep-alive pings sent to the hub.
    /// Env: `HUBCHAT_KEEPALIVE_SECS`
    pub keepalive_interval: Duration,

    /// Silence after which the hub connection is considered lost.
    /// Env: `HUBCHAT_SERVER_TIMEOUT_SECS`
    pub server_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:5000/api".to_string(),
            hub_url: "http://localhost:5000/hubs/chat".to_string(),
            data_dir: None,
            handshake_timeout: Duration::from_secs(DEFAULT_HANDSHAKE_TIMEOUT_SECS),
            keepalive_interval: Duration::from_secs(DEFAULT_KEEPALIVE_SECS),
            server_timeout: Duration::from_secs(DEFAULT_SERVER_TIMEOUT_SECS),
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("HUBCHAT_API_URL") {
            config.api_base_url = url.trim_end_matches('/').to_string();
        }

        if let Some(url) = lookup("HUBCHAT_HUB_URL") {
            config.hub_url = url;
        }

        if let Some(dir) = lookup("HUBCHAT_DATA_DIR") {
            if !dir.is_empty() {
                config.data_dir = Some(PathBuf::from(dir));
            }
        }

        if let Some(secs) = parse_secs(&lookup, "HUBCHAT_HANDSHAKE_TIMEOUT_SECS") {
            config.handshake_timeout = secs;
        }

        if let Some(secs) = parse_secs(&lookup, "HUBCHAT_KEEPALIVE_SECS") {
            config.keepalive_interval = secs;
        }

        if let Some(secs) = parse_secs(&lookup, "HUBCHAT_SERVER_TIMEOUT_SECS") {
            config.server_timeout = secs;
        }

        if config.server_timeout <= config.keepalive_interval {
            tracing::warn!(
                keepalive = ?config.keepalive_interval,
                server_timeout = ?config.server_timeout,
                "Server timeout should exceed the keep-alive interval"
            );
        }

        config
    }
}

fn parse_secs<F>(lookup: &F, key: &str) -> Option<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<u64>() {
        Ok(n) if n > 0 => Some(Duration::from_secs(n)),
        _ => {
            tracing::warn!(key, value = %raw, "Invalid duration, using default");
            None
        }
    }
}
