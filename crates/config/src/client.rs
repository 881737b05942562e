//! Engine connection settings

use std::time::Duration;

use serde::Deserialize;

/// Connection settings for the engine servers
///
/// # Example
///
/// ```toml
/// [client]
/// servers = ["db1:21212", "db2:21212"]
/// username = "export"
/// password = "secret"
/// reconnect_delay = "1s"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Engine servers as `host:port`; one connection is kept per server
    /// Default: ["127.0.0.1:21212"]
    pub servers: Vec<String>,

    /// Service name sent in the handshake
    /// Default: "export"
    pub service: String,

    /// Default: "" (anonymous)
    pub username: String,

    /// Hashed before it leaves the process
    /// Default: ""
    pub password: String,

    /// TCP connect plus handshake timeout
    /// Default: 5s
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// First delay between reconnect attempts, doubled up to the maximum
    /// Default: 1s
    #[serde(with = "humantime_serde")]
    pub reconnect_delay: Duration,

    /// Default: 30s
    #[serde(with = "humantime_serde")]
    pub max_reconnect_delay: Duration,

    /// How often idle sinks are ticked to issue polls
    /// Default: 10ms
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,

    /// Capacity of each bounded per-connection channel
    /// Default: 1024
    pub queue_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            servers: vec!["127.0.0.1:21212".into()],
            service: "export".into(),
            username: String::new(),
            password: String::new(),
            connect_timeout: Duration::from_secs(5),
            reconnect_delay: Duration::from_secs(1),
            max_reconnect_delay: Duration::from_secs(30),
            poll_interval: Duration::from_millis(10),
            queue_size: 1024,
        }
    }
}
