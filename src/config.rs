//! Server configuration
//!
//! Defaults, optionally overlaid by a JSON file. Command-line flags are
//! applied on top by the binary.

use crate::aof::AofConfig;
use anyhow::Context;
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Top-level configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address the RESP listener binds to
    pub bind: String,

    /// Default log filter when `RUST_LOG` is not set
    pub log_level: String,

    /// Persistence settings
    pub aof: AofConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind: "127.0.0.1:6379".to_string(),
            log_level: "info".to_string(),
            aof: AofConfig::default(),
        }
    }
}

impl Config {
    /// Load a JSON config file; missing keys keep their defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {:?}", path))?;

        Self::from_json(&raw).with_context(|| format!("invalid config file {:?}", path))
    }

    fn from_json(raw: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aof::SyncPolicy;
    use std::path::PathBuf;

    #[test]
    fn test_defaults() {
        let config = Config::default();

        assert_eq!(config.bind, "127.0.0.1:6379");
        assert!(config.aof.enabled);
        assert_eq!(config.aof.sync_policy, SyncPolicy::EverySecond);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = Config::from_json(
            r#"{"bind": "0.0.0.0:7000", "aof": {"path": "/var/lib/oxikv.aof", "sync_policy": "always"}}"#,
        )
        .unwrap();

        assert_eq!(config.bind, "0.0.0.0:7000");
        assert_eq!(config.log_level, "info");
        assert_eq!(config.aof.path, PathBuf::from("/var/lib/oxikv.aof"));
        assert_eq!(config.aof.sync_policy, SyncPolicy::Always);
        assert_eq!(config.aof.flush_interval_ms, 1000);
    }

    #[test]
    fn test_invalid_json_is_error() {
        assert!(Config::from_json(r#"{"aof": {"sync_policy": "sometimes"}}"#).is_err());
        assert!(Config::from_file("/nonexistent/oxikv.json").is_err());
    }
}
