//! One-shot sealed writes to a relay slot.
//!
//! Each transmitter seals a payload to the counterpart's public key and
//! posts it under the counterpart's `key_id`. None of them retry: a failed
//! write is reported once and the flow ends.

use crate::code::{ConnectKey, ExchangeKey, PairingCode, RecoveryKey};
use crate::crypto::SealedCrypter;
use crate::models::{ExchangeInfo, ExchangeMessage};
use crate::relay::RelayTransport;
use crate::{PairingError, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use tracing::info;

/// Exchange mode, scanning device: announce a freshly generated key pair to
/// the displaying device. Returns that key pair; its secret never leaves
/// this process.
pub async fn send_generated_exchange_info(
    transport: &dyn RelayTransport,
    crypter: &SealedCrypter,
    exchange_key: &ExchangeKey,
    device_name: &str,
) -> Result<ExchangeInfo> {
    let info = crypter.generate_exchange_info()?;
    let message = ExchangeMessage {
        key_id: info.key_id.clone(),
        public_key: info.public_key.clone(),
        device_name: device_name.to_string(),
    };
    let plaintext = serde_json::to_vec(&message)
        .map_err(|e| PairingError::InvalidPayload(format!("Serialize exchange message: {}", e)))?;

    post_sealed(
        transport,
        crypter,
        &exchange_key.key_id,
        &exchange_key.public_key,
        &plaintext,
    )
    .await?;

    info!(
        "Announced reply slot {} to slot {}",
        info.key_id, exchange_key.key_id
    );
    Ok(info)
}

/// Exchange mode, displaying device: send the recovery key back to the key
/// pair the scanner announced.
pub async fn send_exchange_recovery_key(
    transport: &dyn RelayTransport,
    crypter: &SealedCrypter,
    recovery_key: &RecoveryKey,
    message: &ExchangeMessage,
) -> Result<()> {
    send_recovery_key(
        transport,
        crypter,
        recovery_key,
        &message.key_id,
        &message.public_key,
    )
    .await
}

/// Connect mode, scanning device: send the recovery key to the displayed
/// connect key.
pub async fn send_connect_recovery_key(
    transport: &dyn RelayTransport,
    crypter: &SealedCrypter,
    recovery_key: &RecoveryKey,
    connect_key: &ConnectKey,
) -> Result<()> {
    send_recovery_key(
        transport,
        crypter,
        recovery_key,
        &connect_key.key_id,
        &connect_key.public_key,
    )
    .await
}

async fn send_recovery_key(
    transport: &dyn RelayTransport,
    crypter: &SealedCrypter,
    recovery_key: &RecoveryKey,
    key_id: &str,
    public_key: &[u8],
) -> Result<()> {
    let plaintext = PairingCode::Recovery(recovery_key.clone()).to_json()?;
    post_sealed(transport, crypter, key_id, public_key, &plaintext).await?;
    info!("Sent recovery key to slot {}", key_id);
    Ok(())
}

async fn post_sealed(
    transport: &dyn RelayTransport,
    crypter: &SealedCrypter,
    key_id: &str,
    public_key: &[u8],
    plaintext: &[u8],
) -> Result<()> {
    let sealed = crypter.seal(plaintext, public_key)?;
    transport
        .post_message(key_id, &STANDARD.encode(sealed))
        .await?;
    Ok(())
}
