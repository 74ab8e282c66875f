//! Relay pollers: watch one pairing slot until a counterpart writes to it.
//!
//! One generic loop serves all three pollers (key exchanger, connector and
//! exchange recoverer); they differ only in the payload type decoded from
//! the unsealed blob.
//!
//! Lifecycle: `Idle -> Polling -> {Delivered | Cancelled | Failed}`. Every
//! right-hand state is terminal; a new attempt needs a new poller (and with
//! it a new key pair).

use crate::code::{CodeKind, ConnectKey, ExchangeKey, PairingCode, RecoveryKey};
use crate::crypto::SealedCrypter;
use crate::models::{ExchangeInfo, ExchangeMessage};
use crate::relay::RelayTransport;
use crate::{PairingError, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

/// Wait between reads of an empty slot.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// A payload a poller can decode from an unsealed relay blob.
pub trait PollPayload: Sized + Send + 'static {
    fn from_plaintext(plaintext: &[u8]) -> Result<Self>;
}

impl PollPayload for ExchangeMessage {
    fn from_plaintext(plaintext: &[u8]) -> Result<Self> {
        serde_json::from_slice(plaintext)
            .map_err(|e| PairingError::InvalidPayload(format!("Invalid exchange message: {}", e)))
    }
}

impl PollPayload for RecoveryKey {
    fn from_plaintext(plaintext: &[u8]) -> Result<Self> {
        match PairingCode::from_json(plaintext)? {
            PairingCode::Recovery(key) => Ok(key),
            other => Err(PairingError::InvalidPayload(format!(
                "Expected a recovery key, got {:?} code",
                other.kind()
            ))),
        }
    }
}

/// The controller's view of a poller.
#[async_trait]
pub trait PayloadPoller<P>: Send + Sync {
    /// The pairing code for this poller's key pair, fixed at construction.
    fn code(&self) -> &str;

    /// Poll until a payload arrives (`Some`), polling is stopped (`None`)
    /// or the relay/crypto fails (`Err`).
    async fn poll_for_payload(&self) -> Result<Option<P>>;

    /// Stop polling. Idempotent; never interrupts an in-flight request but
    /// guarantees no further request is issued.
    fn stop_polling(&self);
}

/// Poller lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Idle,
    Polling,
    Delivered,
    Cancelled,
    Failed,
}

/// Polls one relay slot with a locally held key pair.
pub struct RelayPoller<P> {
    code: String,
    info: ExchangeInfo,
    transport: Arc<dyn RelayTransport>,
    crypter: SealedCrypter,
    interval: Duration,
    state: Mutex<PollState>,
    wake: Notify,
    _payload: PhantomData<fn() -> P>,
}

/// Exchange mode, displaying device: waits for the scanner's public key.
pub type RemoteKeyExchanger = RelayPoller<ExchangeMessage>;
/// Connect mode, displaying device: waits for a recovery key.
pub type RemoteConnector = RelayPoller<RecoveryKey>;
/// Exchange mode, scanning device: waits for the recovery key reply.
pub type RemoteExchangeRecoverer = RelayPoller<RecoveryKey>;

impl RelayPoller<ExchangeMessage> {
    /// New key exchanger with a fresh key pair and an Exchange code.
    pub fn key_exchanger(transport: Arc<dyn RelayTransport>, interval: Duration) -> Result<Self> {
        let info = SealedCrypter::new().generate_exchange_info()?;
        Self::new(transport, info, CodeKind::Exchange, interval)
    }
}

impl RelayPoller<RecoveryKey> {
    /// New connector with a fresh key pair and a Connect code.
    pub fn connector(transport: Arc<dyn RelayTransport>, interval: Duration) -> Result<Self> {
        let info = SealedCrypter::new().generate_exchange_info()?;
        Self::new(transport, info, CodeKind::Connect, interval)
    }

    /// Recoverer listening on a key pair already announced to the
    /// counterpart via `send_generated_exchange_info`.
    pub fn exchange_recoverer(
        transport: Arc<dyn RelayTransport>,
        info: ExchangeInfo,
        interval: Duration,
    ) -> Result<Self> {
        Self::new(transport, info, CodeKind::Exchange, interval)
    }
}

impl<P: PollPayload> RelayPoller<P> {
    pub fn new(
        transport: Arc<dyn RelayTransport>,
        info: ExchangeInfo,
        kind: CodeKind,
        interval: Duration,
    ) -> Result<Self> {
        let code = match kind {
            CodeKind::Exchange => PairingCode::ExchangeKey(ExchangeKey {
                key_id: info.key_id.clone(),
                public_key: info.public_key.clone(),
            }),
            CodeKind::Connect => PairingCode::Connect(ConnectKey {
                key_id: info.key_id.clone(),
                public_key: info.public_key.clone(),
            }),
            CodeKind::Recovery => {
                return Err(PairingError::InvalidPairingCode(
                    "Recovery codes are not backed by a key pair".to_string(),
                ))
            }
        }
        .encode()?;

        Ok(Self {
            code,
            info,
            transport,
            crypter: SealedCrypter::new(),
            interval,
            state: Mutex::new(PollState::Idle),
            wake: Notify::new(),
            _payload: PhantomData,
        })
    }

    pub fn key_id(&self) -> &str {
        &self.info.key_id
    }

    pub fn state(&self) -> PollState {
        *self.lock_state()
    }

    fn lock_state(&self) -> MutexGuard<'_, PollState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_cancelled(&self) -> bool {
        self.state() == PollState::Cancelled
    }

    /// Move `Polling -> next`. Returns false if polling was stopped
    /// meanwhile, in which case the result must be discarded.
    fn finish(&self, next: PollState) -> bool {
        let mut state = self.lock_state();
        if *state == PollState::Polling {
            *state = next;
            true
        } else {
            false
        }
    }

    fn open(&self, encoded: &str) -> Result<P> {
        let sealed = STANDARD
            .decode(encoded)
            .map_err(|e| PairingError::InvalidPayload(format!("Invalid base64 in slot: {}", e)))?;
        let plaintext =
            self.crypter
                .unseal(&sealed, &self.info.public_key, self.info.secret_key())?;
        P::from_plaintext(&plaintext)
    }
}

#[async_trait]
impl<P: PollPayload> PayloadPoller<P> for RelayPoller<P> {
    fn code(&self) -> &str {
        &self.code
    }

    async fn poll_for_payload(&self) -> Result<Option<P>> {
        {
            let mut state = self.lock_state();
            match *state {
                PollState::Idle => *state = PollState::Polling,
                PollState::Cancelled => return Ok(None),
                _ => return Err(PairingError::AlreadyPolling),
            }
        }

        let key_id = self.info.key_id.as_str();
        loop {
            if self.is_cancelled() {
                debug!("Polling for {} cancelled", key_id);
                return Ok(None);
            }

            let fetched = self.transport.fetch_message(key_id).await;

            match fetched {
                Ok(Some(encoded)) => {
                    let opened = self.open(&encoded);
                    return match opened {
                        Ok(payload) if self.finish(PollState::Delivered) => {
                            info!("Received payload in slot {}", key_id);
                            Ok(Some(payload))
                        }
                        Err(e) if self.finish(PollState::Failed) => {
                            warn!("Could not open payload in slot {}: {}", key_id, e);
                            Err(e)
                        }
                        _ => {
                            debug!("Discarding slot {} result after cancellation", key_id);
                            Ok(None)
                        }
                    };
                }
                Ok(None) => {
                    if self.is_cancelled() {
                        return Ok(None);
                    }
                    debug!("Slot {} empty, retrying in {:?}", key_id, self.interval);
                }
                Err(e) => {
                    if !self.finish(PollState::Failed) {
                        return Ok(None);
                    }
                    warn!("Polling slot {} failed: {}", key_id, e);
                    return Err(e.into());
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = self.wake.notified() => {}
            }
        }
    }

    fn stop_polling(&self) {
        let mut state = self.lock_state();
        if matches!(*state, PollState::Idle | PollState::Polling) {
            *state = PollState::Cancelled;
            self.wake.notify_one();
        }
    }
}
