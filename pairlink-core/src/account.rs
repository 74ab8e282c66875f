//! Bridge to the sync-account service the pairing flows act on.

use crate::code::{ConnectKey, ExchangeKey, RecoveryKey};
use crate::models::{ExchangeInfo, ExchangeMessage, RegisteredDevice};
use crate::Result;
use async_trait::async_trait;

/// Account operations the connection controller sequences.
///
/// Implementations own the account state (stored recovery key, device
/// list) and the relay transport used for transmissions; the controller
/// only decides when each call happens and which event follows it.
#[async_trait]
pub trait AccountBridge: Send + Sync {
    /// Whether this device is already signed in to a sync account.
    fn has_account(&self) -> bool;

    /// Sign in with `recovery_key`, registering this device.
    async fn login(
        &self,
        recovery_key: &RecoveryKey,
        device_name: &str,
        device_type: &str,
    ) -> Result<Vec<RegisteredDevice>>;

    /// Create a brand-new account with this device as its first member.
    async fn create_account(&self, device_name: &str, device_type: &str) -> Result<()>;

    /// Seal this account's recovery key to `connect_key` and post it.
    async fn transmit_recovery_key(&self, connect_key: &ConnectKey) -> Result<()>;

    /// Generate a fresh key pair, seal an `ExchangeMessage` announcing it to
    /// `exchange_key` and post it. Returns the key pair the reply will be
    /// sealed to.
    async fn transmit_generated_exchange_info(
        &self,
        exchange_key: &ExchangeKey,
        device_name: &str,
    ) -> Result<ExchangeInfo>;

    /// Seal this account's recovery key to the key the scanner announced.
    async fn transmit_exchange_recovery_key(&self, message: &ExchangeMessage) -> Result<()>;
}
