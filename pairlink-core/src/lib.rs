//! Device pairing core library
//!
//! Lets two devices establish a shared sync-account secret through a relay
//! that only ever sees sealed, opaque blobs. Provides the sealed-box
//! crypter, pairing codes, the relay pollers and the connection controller
//! that sequences the Exchange, Connect and Recovery-code flows.

pub mod account;
pub mod code;
pub mod config;
pub mod controller;
pub mod crypto;
pub mod dependencies;
pub mod events;
pub mod models;
pub mod platform;
pub mod poller;
pub mod relay;
pub mod transmit;

pub use account::AccountBridge;
pub use code::{CodeKind, ConnectKey, ExchangeKey, PairingCode, RecoveryKey};
pub use config::PairingConfig;
pub use controller::{ConnectionError, PairingConnectionController};
pub use crypto::{CryptoError, SealedCrypter};
pub use dependencies::{PairingDependencies, RelayDependencies};
pub use events::{dispatch_events, PairingDelegate, PairingEvent};
pub use models::{ExchangeInfo, ExchangeMessage, RegisteredDevice};
pub use poller::{PayloadPoller, PollState, RelayPoller};
pub use relay::{HttpRelayClient, MemoryRelay, RelayError, RelayTransport};

use thiserror::Error;

/// Result type for pairing operations
pub type Result<T> = std::result::Result<T, PairingError>;

/// General error type for pairing operations
#[derive(Error, Debug)]
pub enum PairingError {
    #[error("Crypto error: {0}")]
    Crypto(#[from] crypto::CryptoError),

    #[error("Relay error: {0}")]
    Relay(#[from] relay::RelayError),

    #[error("Invalid pairing code: {0}")]
    InvalidPairingCode(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Poller is already polling or has finished")]
    AlreadyPolling,

    #[error("Account error: {0}")]
    Account(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
