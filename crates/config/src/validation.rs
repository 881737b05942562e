//! Configuration validation
//!
//! Validates config consistency:
//! - At least one server, each in `host:port` form
//! - Queue and period sizes are usable
//! - Backoff bounds are ordered
//! - File sinks have a path and nonce

use std::time::Duration;

use crate::Config;
use crate::error::{ConfigError, Result};
use crate::sink::SinkType;

/// Largest decimal scale an i128 unscaled value can carry
const MAX_DECIMAL_SCALE: u32 = 38;

/// Validate the entire configuration
pub fn validate_config(config: &Config) -> Result<()> {
    validate_client(config)?;
    validate_replay(config)?;
    validate_codec(config)?;
    validate_sink(config)?;
    Ok(())
}

fn validate_client(config: &Config) -> Result<()> {
    let client = &config.client;
    if client.servers.is_empty() {
        return Err(ConfigError::missing_field("client", "servers"));
    }
    for server in &client.servers {
        let port = server.rsplit_once(':').map(|(_, port)| port);
        if port.and_then(|p| p.parse::<u16>().ok()).is_none() {
            return Err(ConfigError::invalid_value(
                "client",
                "servers",
                format!("'{server}' is not host:port"),
            ));
        }
    }
    if client.queue_size == 0 {
        return Err(ConfigError::invalid_value(
            "client",
            "queue_size",
            "must be greater than zero",
        ));
    }
    if client.poll_interval == Duration::ZERO {
        return Err(ConfigError::invalid_value(
            "client",
            "poll_interval",
            "must be greater than zero",
        ));
    }
    if client.max_reconnect_delay < client.reconnect_delay {
        return Err(ConfigError::invalid_value(
            "client",
            "max_reconnect_delay",
            "must not be less than reconnect_delay",
        ));
    }
    Ok(())
}

fn validate_replay(config: &Config) -> Result<()> {
    let replay = &config.replay;
    if replay.max_backoff < replay.initial_backoff {
        return Err(ConfigError::invalid_value(
            "replay",
            "max_backoff",
            "must not be less than initial_backoff",
        ));
    }
    if replay.multiplier == 0 {
        return Err(ConfigError::invalid_value(
            "replay",
            "multiplier",
            "must be at least 1",
        ));
    }
    Ok(())
}

fn validate_codec(config: &Config) -> Result<()> {
    if config.codec.decimal_scale > MAX_DECIMAL_SCALE {
        return Err(ConfigError::invalid_value(
            "codec",
            "decimal_scale",
            format!("must be at most {MAX_DECIMAL_SCALE}"),
        ));
    }
    Ok(())
}

fn validate_sink(config: &Config) -> Result<()> {
    let sink = &config.sink;
    if sink.sink_type != SinkType::File {
        return Ok(());
    }
    if sink.path.is_empty() {
        return Err(ConfigError::missing_field("sink", "path"));
    }
    if sink.nonce.is_empty() {
        return Err(ConfigError::missing_field("sink", "nonce"));
    }
    // Nonces are the first dash-separated field of every unit name
    if sink.nonce.contains(['-', '/', '\\']) {
        return Err(ConfigError::invalid_value(
            "sink",
            "nonce",
            "must not contain '-' or path separators",
        ));
    }
    if sink.period == Duration::ZERO {
        return Err(ConfigError::invalid_value(
            "sink",
            "period",
            "must be greater than zero",
        ));
    }
    if sink.retention == Some(Duration::ZERO) {
        return Err(ConfigError::invalid_value(
            "sink",
            "retention",
            "must be greater than zero",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use crate::Config;
    use crate::error::ConfigError;

    fn invalid_field(toml: &str) -> &'static str {
        match Config::from_str(toml) {
            Err(ConfigError::InvalidValue { field, .. })
            | Err(ConfigError::MissingField { field, .. }) => field,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_servers() {
        assert_eq!(invalid_field("[client]\nservers = []"), "servers");
    }

    #[test]
    fn test_server_without_port() {
        assert_eq!(invalid_field("[client]\nservers = [\"db1\"]"), "servers");
        assert_eq!(invalid_field("[client]\nservers = [\"db1:http\"]"), "servers");
    }

    #[test]
    fn test_zero_queue_size() {
        assert_eq!(invalid_field("[client]\nqueue_size = 0"), "queue_size");
    }

    #[test]
    fn test_reconnect_bounds() {
        assert_eq!(
            invalid_field("[client]\nreconnect_delay = \"1m\"\nmax_reconnect_delay = \"1s\""),
            "max_reconnect_delay"
        );
    }

    #[test]
    fn test_backoff_bounds() {
        assert_eq!(
            invalid_field("[replay]\ninitial_backoff = \"10s\"\nmax_backoff = \"1s\""),
            "max_backoff"
        );
    }

    #[test]
    fn test_zero_multiplier() {
        assert_eq!(invalid_field("[replay]\nmultiplier = 0"), "multiplier");
    }

    #[test]
    fn test_decimal_scale_limit() {
        assert_eq!(invalid_field("[codec]\ndecimal_scale = 39"), "decimal_scale");
        assert!(Config::from_str("[codec]\ndecimal_scale = 38").is_ok());
    }

    #[test]
    fn test_file_sink_requires_nonce() {
        assert_eq!(invalid_field("[sink]\nnonce = \"\""), "nonce");
        assert_eq!(invalid_field("[sink]\nnonce = \"a-b\""), "nonce");
    }

    #[test]
    fn test_file_sink_requires_path() {
        assert_eq!(invalid_field("[sink]\npath = \"\""), "path");
    }

    #[test]
    fn test_zero_period() {
        assert_eq!(invalid_field("[sink]\nperiod = \"0s\""), "period");
    }

    #[test]
    fn test_stdout_sink_ignores_file_fields() {
        let config = Config::from_str("[sink]\ntype = \"stdout\"\nnonce = \"\"\npath = \"\"");
        assert!(config.is_ok());
    }
}
