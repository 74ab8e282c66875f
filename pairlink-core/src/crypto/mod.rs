//! Cryptographic primitives for pairing.
//!
//! This module provides:
//! - Ephemeral X25519 exchange key pairs (`ExchangeInfo`)
//! - Anonymous sealed-box encryption to a recipient public key
//! - Zeroization of secret key material on drop

pub mod sealed;

pub use sealed::{SealedCrypter, PUBLIC_KEY_LEN, SEAL_OVERHEAD};

use thiserror::Error;

/// Errors that can occur in cryptographic operations
#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Crypto primitives unavailable: {0}")]
    CryptoUnavailable(String),

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("Invalid key length: expected {expected}, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },
}

/// Result type for crypto operations
pub type Result<T> = std::result::Result<T, CryptoError>;
