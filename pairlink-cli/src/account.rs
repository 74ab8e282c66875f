//! File-backed local account used by the CLI.
//!
//! Stores the recovery key and the devices this install knows about in a
//! JSON file. Transmissions go straight to the relay through the core
//! transmitters.

use async_trait::async_trait;
use pairlink_core::code::{ConnectKey, ExchangeKey, RecoveryKey};
use pairlink_core::crypto::SealedCrypter;
use pairlink_core::models::{ExchangeInfo, ExchangeMessage, RegisteredDevice};
use pairlink_core::relay::RelayTransport;
use pairlink_core::{transmit, AccountBridge, PairingError, Result};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::info;
use uuid::Uuid;

const PRIMARY_KEY_LEN: usize = 32;

#[derive(Default, Serialize, Deserialize)]
struct AccountFile {
    recovery_key: Option<RecoveryKey>,
    #[serde(default)]
    devices: Vec<RegisteredDevice>,
}

pub struct LocalAccount {
    path: PathBuf,
    state: Mutex<AccountFile>,
    transport: Arc<dyn RelayTransport>,
    crypter: SealedCrypter,
}

impl LocalAccount {
    /// Open the account file at `path`; a missing file means no account.
    pub fn open(path: &Path, transport: Arc<dyn RelayTransport>) -> Result<Self> {
        let state = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            serde_json::from_str(&content).map_err(|e| {
                PairingError::Account(format!("Invalid account file {}: {}", path.display(), e))
            })?
        } else {
            AccountFile::default()
        };

        Ok(Self {
            path: path.to_path_buf(),
            state: Mutex::new(state),
            transport,
            crypter: SealedCrypter::new(),
        })
    }

    pub fn recovery_key(&self) -> Option<RecoveryKey> {
        self.state().recovery_key.clone()
    }

    pub fn devices(&self) -> Vec<RegisteredDevice> {
        self.state().devices.clone()
    }

    fn state(&self) -> MutexGuard<'_, AccountFile> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn require_recovery_key(&self) -> Result<RecoveryKey> {
        self.recovery_key()
            .ok_or_else(|| PairingError::Account("No sync account on this device".to_string()))
    }

    fn save(&self, state: &AccountFile) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(state)
            .map_err(|e| PairingError::Account(format!("Serialize account: {}", e)))?;
        std::fs::write(&self.path, json)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))?;
        }

        Ok(())
    }

    /// Register this device in `state`, reusing its entry on re-login.
    fn register_device(state: &mut AccountFile, device_name: &str, device_type: &str) {
        let known = state
            .devices
            .iter()
            .any(|d| d.name == device_name && d.device_type == device_type);
        if !known {
            state.devices.push(RegisteredDevice {
                id: Uuid::new_v4().to_string(),
                name: device_name.to_string(),
                device_type: device_type.to_string(),
            });
        }
    }
}

#[async_trait]
impl AccountBridge for LocalAccount {
    fn has_account(&self) -> bool {
        self.state().recovery_key.is_some()
    }

    async fn login(
        &self,
        recovery_key: &RecoveryKey,
        device_name: &str,
        device_type: &str,
    ) -> Result<Vec<RegisteredDevice>> {
        let mut state = self.state();
        if let Some(current) = &state.recovery_key {
            if current.user_id != recovery_key.user_id {
                return Err(PairingError::Account(
                    "Already signed in to a different account".to_string(),
                ));
            }
        }

        state.recovery_key = Some(recovery_key.clone());
        Self::register_device(&mut state, device_name, device_type);
        self.save(&state)?;

        info!("Signed in to account {}", recovery_key.user_id);
        Ok(state.devices.clone())
    }

    async fn create_account(&self, device_name: &str, device_type: &str) -> Result<()> {
        let mut primary_key = vec![0u8; PRIMARY_KEY_LEN];
        OsRng
            .try_fill_bytes(&mut primary_key)
            .map_err(|e| PairingError::Account(format!("OS RNG failed: {}", e)))?;
        let recovery_key = RecoveryKey::new(Uuid::new_v4().to_string(), primary_key);

        let mut state = self.state();
        if state.recovery_key.is_some() {
            return Err(PairingError::Account(
                "This device already has an account".to_string(),
            ));
        }
        info!("Created account {}", recovery_key.user_id);
        state.recovery_key = Some(recovery_key);
        state.devices.clear();
        Self::register_device(&mut state, device_name, device_type);
        self.save(&state)
    }

    async fn transmit_recovery_key(&self, connect_key: &ConnectKey) -> Result<()> {
        let recovery_key = self.require_recovery_key()?;
        transmit::send_connect_recovery_key(
            self.transport.as_ref(),
            &self.crypter,
            &recovery_key,
            connect_key,
        )
        .await
    }

    async fn transmit_generated_exchange_info(
        &self,
        exchange_key: &ExchangeKey,
        device_name: &str,
    ) -> Result<ExchangeInfo> {
        transmit::send_generated_exchange_info(
            self.transport.as_ref(),
            &self.crypter,
            exchange_key,
            device_name,
        )
        .await
    }

    async fn transmit_exchange_recovery_key(&self, message: &ExchangeMessage) -> Result<()> {
        let recovery_key = self.require_recovery_key()?;
        transmit::send_exchange_recovery_key(
            self.transport.as_ref(),
            &self.crypter,
            &recovery_key,
            message,
        )
        .await
    }
}
