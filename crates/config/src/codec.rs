//! Row codec settings

use serde::Deserialize;

/// Row codec settings
///
/// # Example
///
/// ```toml
/// [codec]
/// decimal_scale = 12
/// skip_internals = true
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    /// Implied fractional digits of DECIMAL columns
    /// Default: 12
    pub decimal_scale: u32,

    /// Leave the six engine metadata columns out of sink output
    /// Default: false
    pub skip_internals: bool,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            decimal_scale: 12,
            skip_internals: false,
        }
    }
}
