//! Configuration file support

use anyhow::Context;
use relay_agent::SessionConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Configuration for relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Tracing filter used when neither `--verbose` nor `RUST_LOG` is given
    pub log_filter: String,
    /// Settings applied to every session
    pub session: SessionConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_filter: "relay=info".to_string(),
            session: SessionConfig::default(),
        }
    }
}

impl Config {
    /// Get the config directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("relay")
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        // Check for RELAY_CONFIG_PATH env var first
        if let Ok(path) = std::env::var("RELAY_CONFIG_PATH") {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }

    /// Load config from a file; a missing file yields the defaults
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    /// Save config to file
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Create a default config file if it doesn't exist
    pub fn init(path: &Path) -> anyhow::Result<()> {
        if path.exists() {
            return Ok(());
        }
        Self::default().save_to(path)
    }
}

/// Generate example config content
pub fn example_config() -> &'static str {
    r#"# relay configuration file
# Place at ~/.config/relay/config.toml (Linux) or set RELAY_CONFIG_PATH

# Tracing filter when neither --verbose nor RUST_LOG is set
log_filter = "relay=info"

[session]
# Maximum model/tool round trips per backend invocation
max_steps = 20

# Tools whose call payloads are trimmed from resent history and whose
# results are also delivered to the client as reports
heavy_tools = ["generate_report"]

# Extra regexes marking backend errors as token-limit failures
# token_limit_patterns = ["(?i)budget exceeded"]

# Messages kept untouched at each end of the history when compacting
[session.compaction]
keep_first = 2
keep_last = 6
"#
}
