//! Network configuration for the front door.

use std::time::Duration;

/// Top-level network configuration.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Bind address for the server.
    pub host: String,
    /// Port to listen on. 0 means OS-assigned.
    pub port: u16,
    /// Allowed CORS origins.
    pub cors_origins: Vec<String>,
    /// Maximum time for a whole HTTP request, enforced by middleware.
    pub request_timeout: Duration,
    /// Maximum time a handler waits for the engine's reply before
    /// surfacing a request-timeout to its caller. The engine itself never
    /// times out; an expired wait leaves engine state untouched.
    pub reply_timeout: Duration,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            cors_origins: vec!["*".to_string()],
            request_timeout: Duration::from_secs(30),
            reply_timeout: Duration::from_secs(5),
        }
    }
}
