//! Pairing client configuration.

use crate::platform;
use crate::poller::DEFAULT_POLL_INTERVAL;
use crate::relay::http::DEFAULT_REQUEST_TIMEOUT;
use crate::{PairingError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PairingConfig {
    pub relay_url: String,
    pub device_name: String,
    pub device_type: String,
    pub poll_interval_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            relay_url: "http://127.0.0.1:8743".to_string(),
            device_name: platform::default_device_name(),
            device_type: platform::current_device_type().to_string(),
            poll_interval_secs: DEFAULT_POLL_INTERVAL.as_secs(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT.as_secs(),
        }
    }
}

impl PairingConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| PairingError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if it exists, defaults otherwise.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.relay_url.trim().is_empty() {
            return Err(PairingError::Config("relay_url must not be empty".to_string()));
        }
        if self.poll_interval_secs == 0 {
            return Err(PairingError::Config(
                "poll_interval_secs must be at least 1".to_string(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(PairingError::Config(
                "request_timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
