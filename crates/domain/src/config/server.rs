use super::{env_string, env_u64};

/// HTTP server settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address, `FATHOM_BIND` (default `0.0.0.0:8080`).
    pub bind: String,
    /// Idle keepalive cadence on the turn stream,
    /// `KEEPALIVE_INTERVAL_SECONDS` (default 15).
    pub keepalive_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: d_bind(),
            keepalive_interval_secs: 15,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            bind: env_string("FATHOM_BIND").unwrap_or_else(d_bind),
            keepalive_interval_secs: env_u64("KEEPALIVE_INTERVAL_SECONDS", 15),
        }
    }
}

fn d_bind() -> String {
    "0.0.0.0:8080".into()
}
