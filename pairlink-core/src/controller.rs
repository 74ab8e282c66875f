//! Pairing connection controller.
//!
//! Owns the active exchanger/connector, runs their poll loops as background
//! tasks and turns every outcome into exactly one `PairingEvent`.
//!
//! Flow summary:
//! - Exchange (displaying): poll for `ExchangeMessage` -> transmit recovery
//!   key to it -> finished.
//! - Connect (displaying): poll for `RecoveryKey` -> login.
//! - Code entry (scanning): decode -> one of
//!   - exchange key: announce own key pair -> poll for `RecoveryKey` -> login
//!   - recovery code: login
//!   - connect key: create account if needed -> transmit recovery key

use crate::account::AccountBridge;
use crate::code::{ConnectKey, ExchangeKey, PairingCode, RecoveryKey};
use crate::dependencies::PairingDependencies;
use crate::events::PairingEvent;
use crate::models::{ExchangeMessage, RegisteredDevice};
use crate::poller::PayloadPoller;
use crate::{PairingError, Result};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

/// Failure kinds reported through `PairingEvent::DidError`.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionError {
    #[error("Unable to recognize pairing code")]
    UnableToRecognizeCode,

    #[error("Failed to fetch the other device's public key")]
    FailedToFetchPublicKey,

    #[error("Failed to transmit recovery key in exchange mode")]
    FailedToTransmitExchangeRecoveryKey,

    #[error("Failed to fetch recovery key in connect mode")]
    FailedToFetchConnectRecoveryKey,

    #[error("Failed to log in")]
    FailedToLogIn,

    #[error("Failed to transmit exchange key")]
    FailedToTransmitExchangeKey,

    #[error("Failed to fetch recovery key in exchange mode")]
    FailedToFetchExchangeRecoveryKey,

    #[error("Failed to create sync account")]
    FailedToCreateAccount,

    #[error("Failed to transmit recovery key in connect mode")]
    FailedToTransmitConnectRecoveryKey,

    /// Never raised; two-account conflicts are reported with
    /// `PairingEvent::DidFindTwoAccountsDuringRecovery`.
    #[error("Found existing account")]
    FoundExistingAccount,
}

type PollerSlot<P> = Arc<Mutex<Option<Arc<dyn PayloadPoller<P>>>>>;

/// State shared between the controller and its background poll tasks.
struct FlowContext {
    device_name: String,
    device_type: String,
    account: Arc<dyn AccountBridge>,
    events: UnboundedSender<PairingEvent>,
}

impl FlowContext {
    fn emit(&self, event: PairingEvent) {
        if self.events.send(event).is_err() {
            debug!("Pairing event dropped, receiver closed");
        }
    }

    fn fail(&self, error: ConnectionError, cause: PairingError) {
        warn!("{}: {}", error, cause);
        self.emit(PairingEvent::DidError {
            error,
            underlying: Some(Arc::new(cause)),
        });
    }

    async fn run_exchange(&self, exchanger: Arc<dyn PayloadPoller<ExchangeMessage>>) {
        let message = match exchanger.poll_for_payload().await {
            Ok(Some(message)) => message,
            Ok(None) => return,
            Err(e) => {
                self.fail(ConnectionError::FailedToFetchPublicKey, e);
                return;
            }
        };

        info!(
            "Received exchange message from {}, sending recovery key",
            message.device_name
        );
        self.emit(PairingEvent::WillBeginTransmittingRecoveryKey);
        if let Err(e) = self.account.transmit_exchange_recovery_key(&message).await {
            self.fail(ConnectionError::FailedToTransmitExchangeRecoveryKey, e);
        }
        self.emit(PairingEvent::DidFinishTransmittingRecoveryKey);
        exchanger.stop_polling();
    }

    async fn run_connect(&self, connector: Arc<dyn PayloadPoller<RecoveryKey>>) {
        let recovery_key = match connector.poll_for_payload().await {
            Ok(Some(key)) => key,
            Ok(None) => return,
            Err(e) => {
                self.fail(ConnectionError::FailedToFetchConnectRecoveryKey, e);
                return;
            }
        };

        self.emit(PairingEvent::DidReceiveRecoveryKey);
        if let Err(e) = self.login_and_show_device_connected(&recovery_key, false).await {
            self.fail(ConnectionError::FailedToLogIn, e);
        }
    }

    async fn login_and_show_device_connected(
        &self,
        recovery_key: &RecoveryKey,
        is_recovery: bool,
    ) -> Result<Vec<RegisteredDevice>> {
        let registered_devices = self
            .account
            .login(recovery_key, &self.device_name, &self.device_type)
            .await?;

        info!(
            "Logged in as {} with {} registered devices",
            recovery_key.user_id,
            registered_devices.len()
        );
        self.emit(PairingEvent::DidCompleteLogin {
            registered_devices: registered_devices.clone(),
            is_recovery,
        });
        Ok(registered_devices)
    }

    async fn handle_recovery_key(&self, recovery_key: &RecoveryKey, is_recovery: bool) -> bool {
        match self
            .login_and_show_device_connected(recovery_key, is_recovery)
            .await
        {
            Ok(_) => true,
            Err(e) if self.account.has_account() => {
                warn!("Login failed while another account is active: {}", e);
                self.emit(PairingEvent::DidFindTwoAccountsDuringRecovery(
                    recovery_key.clone(),
                ));
                false
            }
            Err(e) => {
                self.fail(ConnectionError::FailedToLogIn, e);
                false
            }
        }
    }
}

/// Sequences the Exchange, Connect and code-entry pairing flows.
///
/// Must be used from within a tokio runtime: `start_*_mode` spawn their
/// poll loops with `tokio::spawn`.
pub struct PairingConnectionController {
    flow: Arc<FlowContext>,
    dependencies: Arc<dyn PairingDependencies>,
    exchanger: PollerSlot<ExchangeMessage>,
    connector: PollerSlot<RecoveryKey>,
}

impl PairingConnectionController {
    /// Create a controller and the receiver its events are delivered on.
    pub fn new(
        device_name: impl Into<String>,
        device_type: impl Into<String>,
        account: Arc<dyn AccountBridge>,
        dependencies: Arc<dyn PairingDependencies>,
    ) -> (Self, UnboundedReceiver<PairingEvent>) {
        let (events, receiver) = unbounded_channel();
        let controller = Self {
            flow: Arc::new(FlowContext {
                device_name: device_name.into(),
                device_type: device_type.into(),
                account,
                events,
            }),
            dependencies,
            exchanger: Arc::default(),
            connector: Arc::default(),
        };
        (controller, receiver)
    }

    /// Start Exchange mode and return the code to display.
    ///
    /// An already running exchanger is stopped and replaced.
    pub fn start_exchange_mode(&self) -> Result<String> {
        let exchanger = self.dependencies.create_key_exchanger()?;
        let code = exchanger.code().to_string();

        if let Some(previous) = lock(&self.exchanger).replace(exchanger.clone()) {
            debug!("Replacing active exchanger");
            previous.stop_polling();
        }

        let flow = self.flow.clone();
        let slot = self.exchanger.clone();
        tokio::spawn(async move {
            flow.run_exchange(exchanger.clone()).await;
            release(&*slot, &exchanger);
        });

        info!("Exchange mode started");
        Ok(code)
    }

    pub fn stop_exchange_mode(&self) {
        if let Some(exchanger) = lock(&self.exchanger).take() {
            exchanger.stop_polling();
            info!("Exchange mode stopped");
        }
    }

    /// Start Connect mode and return the code to display.
    ///
    /// An already running connector is stopped and replaced.
    pub fn start_connect_mode(&self) -> Result<String> {
        let connector = self.dependencies.create_connector()?;
        let code = connector.code().to_string();

        if let Some(previous) = lock(&self.connector).replace(connector.clone()) {
            debug!("Replacing active connector");
            previous.stop_polling();
        }

        let flow = self.flow.clone();
        let slot = self.connector.clone();
        tokio::spawn(async move {
            flow.run_connect(connector.clone()).await;
            release(&*slot, &connector);
        });

        info!("Connect mode started");
        Ok(code)
    }

    pub fn stop_connect_mode(&self) {
        if let Some(connector) = lock(&self.connector).take() {
            connector.stop_polling();
            info!("Connect mode stopped");
        }
    }

    /// Whether an exchanger is still waiting. Turns false once the flow
    /// has finished, failed or been stopped.
    pub fn is_exchange_mode_active(&self) -> bool {
        lock(&self.exchanger).is_some()
    }

    pub fn is_connect_mode_active(&self) -> bool {
        lock(&self.connector).is_some()
    }

    /// Handle a scanned or pasted code and run its flow to completion.
    ///
    /// Returns whether the flow succeeded. Dropping the returned future
    /// abandons the flow, including any poll it is waiting on.
    pub async fn sync_code_entered(&self, code: &str) -> bool {
        let code = match PairingCode::decode(code) {
            Ok(code) => code,
            Err(e) => {
                self.flow.fail(ConnectionError::UnableToRecognizeCode, e);
                return false;
            }
        };

        info!("Recognized {:?} code", code.kind());
        self.flow.emit(PairingEvent::DidRecognizeScannedCode);

        match code {
            PairingCode::ExchangeKey(exchange_key) => self.handle_exchange_key(&exchange_key).await,
            PairingCode::Recovery(recovery_key) => {
                self.flow.handle_recovery_key(&recovery_key, true).await
            }
            PairingCode::Connect(connect_key) => self.handle_connect_key(&connect_key).await,
        }
    }

    /// Log in with `recovery_key` and report the registered devices.
    pub async fn login_and_show_device_connected(
        &self,
        recovery_key: &RecoveryKey,
        is_recovery: bool,
    ) -> Result<Vec<RegisteredDevice>> {
        self.flow
            .login_and_show_device_connected(recovery_key, is_recovery)
            .await
    }

    /// Log in with `recovery_key`. A failure while another account is active
    /// is reported as a two-account conflict instead of a login failure.
    pub async fn handle_recovery_key(&self, recovery_key: &RecoveryKey, is_recovery: bool) -> bool {
        self.flow.handle_recovery_key(recovery_key, is_recovery).await
    }

    async fn handle_exchange_key(&self, exchange_key: &ExchangeKey) -> bool {
        let info = match self
            .flow
            .account
            .transmit_generated_exchange_info(exchange_key, &self.flow.device_name)
            .await
        {
            Ok(info) => info,
            Err(e) => {
                self.flow.fail(ConnectionError::FailedToTransmitExchangeKey, e);
                return false;
            }
        };

        let recoverer = match self.dependencies.create_exchange_recoverer(info) {
            Ok(recoverer) => recoverer,
            Err(e) => {
                self.flow
                    .fail(ConnectionError::FailedToFetchExchangeRecoveryKey, e);
                return false;
            }
        };

        let recovery_key = match recoverer.poll_for_payload().await {
            Ok(Some(key)) => key,
            Ok(None) => return false,
            Err(e) => {
                self.flow
                    .fail(ConnectionError::FailedToFetchExchangeRecoveryKey, e);
                return false;
            }
        };

        self.flow.handle_recovery_key(&recovery_key, false).await
    }

    async fn handle_connect_key(&self, connect_key: &ConnectKey) -> bool {
        let account = &self.flow.account;
        let mut should_show_sync_enabled = true;

        if !account.has_account() {
            if let Err(e) = account
                .create_account(&self.flow.device_name, &self.flow.device_type)
                .await
            {
                self.flow.fail(ConnectionError::FailedToCreateAccount, e);
                return false;
            }
            info!("Created sync account for connect request");
            self.flow.emit(PairingEvent::DidCreateSyncAccount);
            should_show_sync_enabled = false;
        }

        if let Err(e) = account.transmit_recovery_key(connect_key).await {
            self.flow
                .fail(ConnectionError::FailedToTransmitConnectRecoveryKey, e);
            return false;
        }

        self.flow.emit(PairingEvent::DidCompleteAccountConnection {
            should_show_sync_enabled,
        });
        true
    }
}

impl Drop for PairingConnectionController {
    fn drop(&mut self) {
        self.stop_exchange_mode();
        self.stop_connect_mode();
    }
}

fn lock<T>(slot: &Mutex<T>) -> MutexGuard<'_, T> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Empty `slot` if it still holds `finished`; a replacement stays.
fn release<P: ?Sized>(slot: &Mutex<Option<Arc<P>>>, finished: &Arc<P>) {
    let mut current = lock(slot);
    if current.as_ref().is_some_and(|p| Arc::ptr_eq(p, finished)) {
        *current = None;
    }
}
