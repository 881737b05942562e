//! Output sink settings

use std::time::Duration;

use serde::Deserialize;

/// Which adapter consumes decoded rows
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SinkType {
    /// Rolling delimited files under `path` (default)
    #[default]
    File,
    /// Delimited rows on stdout
    Stdout,
    /// Acknowledge and discard
    Null,
}

/// Delimited text flavor
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// RFC 4180 quoting (default)
    #[default]
    Csv,
    /// Tab separated, backslash escapes
    Tsv,
}

impl OutputFormat {
    /// File extension without the dot
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Tsv => "tsv",
        }
    }
}

/// Sink configuration
///
/// # Example
///
/// ```toml
/// [sink]
/// type = "file"
/// path = "/var/export"
/// nonce = "node1"
/// batched = true
/// period = "15m"
/// retention = "7d"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    #[serde(rename = "type")]
    pub sink_type: SinkType,

    /// Output directory (file sink)
    /// Default: "export"
    pub path: String,

    /// Prefix making unit names unique per client instance
    /// Default: "export"
    pub nonce: String,

    /// Default: csv
    pub format: OutputFormat,

    /// One directory per period holding a file per table, instead of a
    /// file per table per period
    /// Default: false
    pub batched: bool,

    /// Rollover period
    /// Default: 60m
    #[serde(with = "humantime_serde")]
    pub period: Duration,

    /// Delete finished units older than this
    /// Default: none
    #[serde(default, with = "humantime_serde")]
    pub retention: Option<Duration>,

    /// Keep at most this many finished units per table, 0 = unlimited
    /// Default: 0
    pub max_files_per_table: usize,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            sink_type: SinkType::File,
            path: "export".into(),
            nonce: "export".into(),
            format: OutputFormat::Csv,
            batched: false,
            period: Duration::from_secs(60 * 60),
            retention: None,
            max_files_per_table: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SinkConfig::default();
        assert_eq!(config.sink_type, SinkType::File);
        assert_eq!(config.period, Duration::from_secs(3600));
        assert!(config.retention.is_none());
        assert_eq!(config.format.extension(), "csv");
    }

    #[test]
    fn test_deserialize() {
        let config: SinkConfig = toml::from_str(
            r#"
type = "stdout"
format = "tsv"
retention = "7days"
max_files_per_table = 3
"#,
        )
        .unwrap();
        assert_eq!(config.sink_type, SinkType::Stdout);
        assert_eq!(config.format, OutputFormat::Tsv);
        assert_eq!(config.retention, Some(Duration::from_secs(7 * 24 * 3600)));
        assert_eq!(config.max_files_per_table, 3);
    }

    #[test]
    fn test_unknown_type_rejected() {
        assert!(toml::from_str::<SinkConfig>("type = \"kafka\"").is_err());
    }
}
