//! Listener, HTTP and channel-transport settings.

use std::time::Duration;

/// Settings of the axum server and its transports.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    pub host: String,
    /// Port to listen on. 0 means OS-assigned.
    pub port: u16,
    /// Per-connection settings for the channel transport.
    pub connection: ConnectionConfig,
    /// Allowed CORS origins; `"*"` allows any.
    pub cors_origins: Vec<String>,
    /// Requests still running after this are answered with `408`.
    pub request_timeout: Duration,
    /// Larger request bodies are answered with `413`.
    pub max_body_bytes: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 0,
            connection: ConnectionConfig::default(),
            cors_origins: vec!["*".to_string()],
            request_timeout: Duration::from_secs(30),
            max_body_bytes: 1024 * 1024,
        }
    }
}

/// Backpressure settings of one channel connection.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Replies buffered for the socket writer before senders wait.
    pub outbound_channel_capacity: usize,
    /// How long a reply may wait for buffer space before it is dropped.
    pub send_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            outbound_channel_capacity: 256,
            send_timeout: Duration::from_secs(5),
        }
    }
}
