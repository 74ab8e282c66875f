//! Relay transport: the dumb store-and-forward endpoint both devices poll.
//!
//! The relay holds at most one sealed blob per `key_id`. An empty slot is
//! not an error, so `fetch_message` reports it as `Ok(None)`.

pub mod http;
pub mod memory;

pub use http::HttpRelayClient;
pub use memory::MemoryRelay;

use async_trait::async_trait;
use thiserror::Error;

/// Errors talking to the relay. "Slot empty" is never one of these.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Unexpected relay status: {0}")]
    UnexpectedStatus(u16),

    #[error("Invalid relay response: {0}")]
    InvalidResponse(String),

    #[error("Invalid relay URL: {0}")]
    InvalidUrl(String),
}

/// Read/write access to relay pairing slots.
#[async_trait]
pub trait RelayTransport: Send + Sync {
    /// Fetch the base64 sealed blob stored under `key_id`.
    ///
    /// Returns `Ok(None)` when nothing has been written yet.
    async fn fetch_message(&self, key_id: &str) -> Result<Option<String>, RelayError>;

    /// Store a base64 sealed blob under `key_id`.
    async fn post_message(&self, key_id: &str, encrypted_message: &str) -> Result<(), RelayError>;
}
