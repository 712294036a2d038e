//! Gateway configuration — TOML file with serde defaults.

use relaygate_codec::CodecOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Top-level gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Directory holding installed adapter manifests (`<name>.toml`).
    pub adapters_dir: PathBuf,
    /// Maximum concurrent in-flight calls per adapter process.
    pub max_inflight: usize,
    /// Overall deadline for one adapter call, seconds. Token refresh
    /// nested in a publish shares this budget.
    pub call_timeout_secs: u64,
    /// Warm processes idle longer than this are terminated.
    pub idle_ttl_secs: u64,
    /// How long a graceful shutdown waits before force-killing.
    pub shutdown_grace_secs: u64,
    /// Reliability-test success window, seconds. Source history disagrees
    /// between 3 and 5 minutes, so it is a setting.
    pub test_success_window_secs: u64,
    /// Codec knobs for the historically ambiguous V0 layout.
    pub codec: CodecSection,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            adapters_dir: PathBuf::from("adapters"),
            max_inflight: 1,
            call_timeout_secs: 15,
            idle_ttl_secs: 300,
            shutdown_grace_secs: 3,
            test_success_window_secs: 180,
            codec: CodecSection::default(),
        }
    }
}

/// Codec section of the config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecSection {
    /// Explicit V0 device-id length; unset means "remainder of buffer".
    pub v0_device_id_len: Option<usize>,
}

impl GatewayConfig {
    /// Codec options derived from the config.
    pub fn codec_options(&self) -> CodecOptions {
        CodecOptions {
            v0_device_id_len: self.codec.v0_device_id_len,
        }
    }

    /// Deadline for one adapter call.
    pub fn call_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.call_timeout_secs)
    }
}

/// Load configuration from a TOML file, falling back to defaults on any
/// failure (missing file, parse error) with a logged warning.
pub fn load_config(path: Option<&Path>) -> GatewayConfig {
    let Some(path) = path else {
        return GatewayConfig::default();
    };
    if !path.exists() {
        info!(path = %path.display(), "Config file not found, using defaults");
        return GatewayConfig::default();
    }
    match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str::<GatewayConfig>(&contents) {
            Ok(config) => {
                info!(path = %path.display(), "Loaded configuration");
                config
            }
            Err(e) => {
                warn!(error = %e, path = %path.display(), "Failed to parse config, using defaults");
                GatewayConfig::default()
            }
        },
        Err(e) => {
            warn!(error = %e, path = %path.display(), "Failed to read config file, using defaults");
            GatewayConfig::default()
        }
    }
}
