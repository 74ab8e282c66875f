//! Anonymous sealed-box encryption for relay payloads.
//!
//! Wire format: `ephemeral_public_key(32) || ciphertext || auth_tag(16)`
//!
//! Sealing generates a one-off X25519 key pair, agrees a shared secret with
//! the recipient public key and derives an AES-256-GCM key with HKDF-SHA256,
//! salted with both public keys. The ephemeral secret is dropped straight
//! after sealing, so only the recipient key pair can open the box and the
//! box carries no sender identity.

use crate::crypto::{CryptoError, Result};
use crate::models::ExchangeInfo;
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use hkdf::Hkdf;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use uuid::Uuid;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroizing;

/// Length of an X25519 public or secret key.
pub const PUBLIC_KEY_LEN: usize = 32;

const TAG_LEN: usize = 16;

/// Bytes a sealed box adds on top of the plaintext.
pub const SEAL_OVERHEAD: usize = PUBLIC_KEY_LEN + TAG_LEN;

const SEAL_INFO: &[u8] = b"pairlink-sealed-box-v1";

// Every box is keyed by a fresh ephemeral secret, so the key never repeats.
const BOX_NONCE: [u8; 12] = [0u8; 12];

/// Generates exchange key pairs and seals/unseals relay payloads.
///
/// Stateless: no network, no disk, only CPU and the OS RNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct SealedCrypter;

impl SealedCrypter {
    pub fn new() -> Self {
        Self
    }

    /// Create a fresh X25519 key pair and a random relay `key_id`.
    ///
    /// Fails with `CryptoUnavailable` only when the OS RNG cannot be read.
    pub fn generate_exchange_info(&self) -> Result<ExchangeInfo> {
        let secret = random_secret()?;
        let public = PublicKey::from(&secret);
        Ok(ExchangeInfo::new(
            Uuid::new_v4().to_string(),
            public.as_bytes().to_vec(),
            secret.to_bytes(),
        ))
    }

    /// Seal `plaintext` so that only the holder of `recipient_public_key`'s
    /// secret can open it.
    pub fn seal(&self, plaintext: &[u8], recipient_public_key: &[u8]) -> Result<Vec<u8>> {
        let recipient = PublicKey::from(key_array(recipient_public_key)?);

        let ephemeral = random_secret()?;
        let ephemeral_public = PublicKey::from(&ephemeral);
        let shared = ephemeral.diffie_hellman(&recipient);
        if !shared.was_contributory() {
            return Err(CryptoError::EncryptionFailed(
                "Recipient public key is a low-order point".to_string(),
            ));
        }

        let key = derive_box_key(
            shared.as_bytes(),
            ephemeral_public.as_bytes(),
            recipient.as_bytes(),
        )?;
        let key_bytes: &[u8; 32] = &key;
        let cipher = Aes256Gcm::new(key_bytes.into());

        let ciphertext_with_tag = cipher
            .encrypt(&Nonce::from(BOX_NONCE), plaintext)
            .map_err(|e| CryptoError::EncryptionFailed(format!("Seal failed: {}", e)))?;

        let mut sealed = Vec::with_capacity(PUBLIC_KEY_LEN + ciphertext_with_tag.len());
        sealed.extend_from_slice(ephemeral_public.as_bytes());
        sealed.extend_from_slice(&ciphertext_with_tag);
        Ok(sealed)
    }

    /// Open a sealed box with the local key pair.
    ///
    /// Fails with `DecryptionFailed` when the box is truncated, tampered
    /// with, or was sealed to a different public key.
    pub fn unseal(&self, sealed: &[u8], public_key: &[u8], secret_key: &[u8]) -> Result<Vec<u8>> {
        if sealed.len() < SEAL_OVERHEAD {
            return Err(CryptoError::DecryptionFailed(
                "Sealed box too short".to_string(),
            ));
        }

        let own_public = key_array(public_key)?;
        let secret = StaticSecret::from(key_array(secret_key)?);

        let (ephemeral_bytes, ciphertext_with_tag) = sealed.split_at(PUBLIC_KEY_LEN);
        let ephemeral_bytes = key_array(ephemeral_bytes)?;
        let shared = secret.diffie_hellman(&PublicKey::from(ephemeral_bytes));
        if !shared.was_contributory() {
            return Err(CryptoError::DecryptionFailed(
                "Ephemeral key is a low-order point".to_string(),
            ));
        }

        let key = derive_box_key(shared.as_bytes(), &ephemeral_bytes, &own_public)?;
        let key_bytes: &[u8; 32] = &key;
        let cipher = Aes256Gcm::new(key_bytes.into());

        cipher
            .decrypt(&Nonce::from(BOX_NONCE), ciphertext_with_tag)
            .map_err(|_| {
                CryptoError::DecryptionFailed(
                    "Authentication failed - wrong key pair or tampered box".to_string(),
                )
            })
    }
}

fn random_secret() -> Result<StaticSecret> {
    let mut bytes = Zeroizing::new([0u8; 32]);
    OsRng
        .try_fill_bytes(&mut bytes[..])
        .map_err(|e| CryptoError::CryptoUnavailable(format!("OS RNG failed: {}", e)))?;
    Ok(StaticSecret::from(*bytes))
}

fn derive_box_key(
    shared: &[u8; 32],
    ephemeral_public: &[u8; 32],
    recipient_public: &[u8; 32],
) -> Result<Zeroizing<[u8; 32]>> {
    let mut salt = [0u8; 2 * PUBLIC_KEY_LEN];
    salt[..PUBLIC_KEY_LEN].copy_from_slice(ephemeral_public);
    salt[PUBLIC_KEY_LEN..].copy_from_slice(recipient_public);

    let hkdf = Hkdf::<Sha256>::new(Some(&salt), shared);
    let mut key = Zeroizing::new([0u8; 32]);
    hkdf.expand(SEAL_INFO, &mut key[..])
        .map_err(|e| CryptoError::EncryptionFailed(format!("HKDF expand failed: {}", e)))?;
    Ok(key)
}

fn key_array(bytes: &[u8]) -> Result<[u8; 32]> {
    bytes.try_into().map_err(|_| CryptoError::InvalidKeyLength {
        expected: PUBLIC_KEY_LEN,
        got: bytes.len(),
    })
}
