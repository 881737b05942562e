//! Export Client Configuration
//!
//! TOML-based configuration loading with sensible defaults.
//! Minimal config should just work - only specify what you need to change.
//!
//! # Parsing
//!
//! Use the `FromStr` trait to parse configuration:
//!
//! ```
//! use export_config::Config;
//! use std::str::FromStr;
//!
//! let config = Config::from_str("[client]\nservers = [\"db1:21212\"]").unwrap();
//! assert_eq!(config.client.servers, vec!["db1:21212"]);
//! ```
//!
//! # Example Config
//!
//! ```toml
//! [client]
//! servers = ["db1:21212", "db2:21212"]
//!
//! [sink]
//! path = "/var/export"
//! period = "15m"
//! retention = "7d"
//! ```

mod client;
mod codec;
mod error;
mod logging;
mod replay;
mod sink;
mod validation;

use std::fs;
use std::path::Path;
use std::str::FromStr;

pub use client::ClientConfig;
pub use codec::CodecConfig;
pub use error::{ConfigError, Result};
pub use logging::{LogConfig, LogFormat, LogLevel};
pub use replay::ReplayConfig;
pub use sink::{OutputFormat, SinkConfig, SinkType};

use serde::Deserialize;

/// Main configuration structure
///
/// All sections are optional with sensible defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log: LogConfig,

    /// Engine servers and connection behavior
    pub client: ClientConfig,

    /// Backoff between block replays
    pub replay: ReplayConfig,

    pub codec: CodecConfig,

    /// Where decoded rows go
    pub sink: SinkConfig,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read, contains invalid TOML, or
    /// fails validation.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            path: path.display().to_string(),
            source: e,
        })?;

        Self::from_str(&contents)
    }

    fn parse(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
