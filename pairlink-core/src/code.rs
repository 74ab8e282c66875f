//! Pairing codes: the base64 strings shown as QR codes or pasted by users.
//!
//! A code is `base64(json)` where the JSON object carries exactly one of
//! `exchange_key`, `recovery` or `connect`.

use crate::models::base64_bytes;
use crate::{PairingError, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Public half of an Exchange-mode key pair, shown by the receiving device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeKey {
    pub key_id: String,
    #[serde(with = "base64_bytes")]
    pub public_key: Vec<u8>,
}

/// Public half of a Connect-mode key pair, shown by the receiving device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectKey {
    pub key_id: String,
    #[serde(with = "base64_bytes")]
    pub public_key: Vec<u8>,
}

/// The durable account secret that authenticates a login.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct RecoveryKey {
    pub user_id: String,
    #[serde(with = "base64_bytes")]
    pub primary_key: Vec<u8>,
}

impl RecoveryKey {
    pub fn new(user_id: impl Into<String>, primary_key: Vec<u8>) -> Self {
        Self {
            user_id: user_id.into(),
            primary_key,
        }
    }

    /// The pasteable recovery code for this key.
    pub fn to_code(&self) -> Result<String> {
        PairingCode::Recovery(self.clone()).encode()
    }
}

impl fmt::Debug for RecoveryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecoveryKey")
            .field("user_id", &self.user_id)
            .field("primary_key", &"<redacted>")
            .finish()
    }
}

/// Which variant a pairing code carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeKind {
    Exchange,
    Recovery,
    Connect,
}

/// A decoded pairing code. Exactly one payload kind is present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingCode {
    ExchangeKey(ExchangeKey),
    Recovery(RecoveryKey),
    Connect(ConnectKey),
}

#[derive(Default, Serialize, Deserialize)]
struct PairingCodeWire {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    exchange_key: Option<ExchangeKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    recovery: Option<RecoveryKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    connect: Option<ConnectKey>,
}

impl PairingCode {
    pub fn kind(&self) -> CodeKind {
        match self {
            Self::ExchangeKey(_) => CodeKind::Exchange,
            Self::Recovery(_) => CodeKind::Recovery,
            Self::Connect(_) => CodeKind::Connect,
        }
    }

    /// Serialize to the tagged JSON object (the sealed plaintext for
    /// recovery-key transmissions).
    pub fn to_json(&self) -> Result<Vec<u8>> {
        let wire = match self {
            Self::ExchangeKey(key) => PairingCodeWire {
                exchange_key: Some(key.clone()),
                ..Default::default()
            },
            Self::Recovery(key) => PairingCodeWire {
                recovery: Some(key.clone()),
                ..Default::default()
            },
            Self::Connect(key) => PairingCodeWire {
                connect: Some(key.clone()),
                ..Default::default()
            },
        };
        serde_json::to_vec(&wire)
            .map_err(|e| PairingError::InvalidPairingCode(format!("Serialize code: {}", e)))
    }

    /// Parse the tagged JSON object, enforcing exactly one populated variant.
    pub fn from_json(json: &[u8]) -> Result<Self> {
        let wire: PairingCodeWire = serde_json::from_slice(json)
            .map_err(|e| PairingError::InvalidPairingCode(format!("Invalid code JSON: {}", e)))?;

        match (wire.exchange_key, wire.recovery, wire.connect) {
            (Some(key), None, None) => Ok(Self::ExchangeKey(key)),
            (None, Some(key), None) => Ok(Self::Recovery(key)),
            (None, None, Some(key)) => Ok(Self::Connect(key)),
            (None, None, None) => Err(PairingError::InvalidPairingCode(
                "Code carries no payload".to_string(),
            )),
            _ => Err(PairingError::InvalidPairingCode(
                "Code carries more than one payload".to_string(),
            )),
        }
    }

    /// Encode as the human/QR-transportable base64 string.
    pub fn encode(&self) -> Result<String> {
        Ok(STANDARD.encode(self.to_json()?))
    }

    /// Decode a scanned or pasted code. Surrounding whitespace is ignored.
    pub fn decode(code: &str) -> Result<Self> {
        let json = STANDARD
            .decode(code.trim())
            .map_err(|e| PairingError::InvalidPairingCode(format!("Invalid base64: {}", e)))?;
        Self::from_json(&json)
    }
}
