//! Command implementations for the export client CLI

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::info;

use export_config::Config;

pub mod prune;
pub mod run;

/// Config files tried when `--config` is not given
const DEFAULT_CONFIG_PATHS: [&str; 2] = ["configs/export-client.toml", "export-client.toml"];

/// Load the configuration file
///
/// An explicit path must exist. Without one, the default paths are tried
/// and built-in defaults are used when none exists.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    if let Some(path) = path {
        if !path.exists() {
            bail!("config file not found: {}", path.display());
        }
        return Config::from_file(path).context("failed to load configuration");
    }

    for candidate in DEFAULT_CONFIG_PATHS.iter().map(PathBuf::from) {
        if candidate.exists() {
            return Config::from_file(&candidate).with_context(|| {
                format!("failed to load configuration from {}", candidate.display())
            });
        }
    }

    info!("no config file found, using defaults");
    Ok(Config::default())
}
