//! Pairing data models: exchange key pairs, relay wire format, devices.

use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroize;

/// An ephemeral X25519 key pair plus the relay slot it listens on.
///
/// The secret key lives only in memory, is zeroized on drop and is never
/// serialized. A fresh `ExchangeInfo` is generated for every pairing attempt.
#[derive(Clone)]
pub struct ExchangeInfo {
    /// Relay routing key addressing this pair's `PairingSlot`.
    pub key_id: String,
    /// 32-byte X25519 public key.
    pub public_key: Vec<u8>,
    secret_key: [u8; 32],
}

impl ExchangeInfo {
    pub fn new(key_id: String, public_key: Vec<u8>, secret_key: [u8; 32]) -> Self {
        Self {
            key_id,
            public_key,
            secret_key,
        }
    }

    /// Get the raw secret key bytes (use sparingly)
    pub fn secret_key(&self) -> &[u8; 32] {
        &self.secret_key
    }
}

impl Drop for ExchangeInfo {
    fn drop(&mut self) {
        self.secret_key.zeroize();
    }
}

impl fmt::Debug for ExchangeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExchangeInfo")
            .field("key_id", &self.key_id)
            .field("public_key", &self.public_key.len())
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// Sealed payload a scanning device uploads in Exchange mode: where and to
/// whom the recovery key should be sent next.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeMessage {
    pub key_id: String,
    #[serde(with = "base64_bytes")]
    pub public_key: Vec<u8>,
    pub device_name: String,
}

/// A device registered with the sync account, as reported by `login`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredDevice {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub device_type: String,
}

/// `POST {base}/exchange` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeRequest {
    pub key_id: String,
    /// base64 of a sealed box.
    pub encrypted_message: String,
}

/// `GET {base}/exchange/{key_id}` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeResult {
    /// base64 of a sealed box.
    pub encrypted_message: String,
}

pub(crate) mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}
