//! Relay server configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub listen_addr: String,
    pub storage_path: PathBuf,
    /// Seconds an unread message stays in its slot.
    pub slot_ttl_secs: u64,
    pub max_payload_size: usize,
    /// Requests per minute per `key_id`.
    pub rate_limit_per_minute: u32,
    pub cleanup_interval_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8743".to_string(),
            storage_path: PathBuf::from("relay.db"),
            slot_ttl_secs: 300,
            max_payload_size: 65_536,
            rate_limit_per_minute: 60,
            cleanup_interval_secs: 60,
        }
    }
}

impl RelayConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.slot_ttl_secs > 0, "slot_ttl_secs must be at least 1");
        anyhow::ensure!(
            self.rate_limit_per_minute > 0,
            "rate_limit_per_minute must be at least 1"
        );
        anyhow::ensure!(
            self.cleanup_interval_secs > 0,
            "cleanup_interval_secs must be at least 1"
        );
        Ok(())
    }
}
