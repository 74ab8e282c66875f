//! Controller-to-UI notifications.
//!
//! The controller emits `PairingEvent`s on an unbounded channel. Hosts
//! either consume the receiver directly or hand it to `dispatch_events`
//! with a `PairingDelegate`.

use crate::code::RecoveryKey;
use crate::controller::ConnectionError;
use crate::models::RegisteredDevice;
use crate::PairingError;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

/// A notification from the connection controller.
#[derive(Debug, Clone)]
pub enum PairingEvent {
    /// Exchange mode: about to send the recovery key to the scanner.
    WillBeginTransmittingRecoveryKey,
    /// Exchange mode: the recovery-key send ended, successfully or not.
    DidFinishTransmittingRecoveryKey,
    /// Connect mode: a recovery key arrived and login is starting.
    DidReceiveRecoveryKey,
    /// A pasted or scanned code decoded successfully.
    DidRecognizeScannedCode,
    /// Connect mode: a new account was created before transmitting.
    DidCreateSyncAccount,
    /// Connect mode: the recovery key was delivered to the other device.
    DidCompleteAccountConnection { should_show_sync_enabled: bool },
    /// Login finished.
    DidCompleteLogin {
        registered_devices: Vec<RegisteredDevice>,
        is_recovery: bool,
    },
    /// Login with a recovered key failed while another account is active.
    DidFindTwoAccountsDuringRecovery(RecoveryKey),
    /// A flow failed. `underlying` carries the cause when there is one.
    DidError {
        error: ConnectionError,
        underlying: Option<Arc<PairingError>>,
    },
}

/// Callback-style consumer of `PairingEvent`s.
///
/// Every method defaults to doing nothing, so hosts implement only what
/// they render.
pub trait PairingDelegate: Send {
    fn will_begin_transmitting_recovery_key(&mut self) {}

    fn did_finish_transmitting_recovery_key(&mut self) {}

    fn did_receive_recovery_key(&mut self) {}

    fn did_recognize_scanned_code(&mut self) {}

    fn did_create_sync_account(&mut self) {}

    fn did_complete_account_connection(&mut self, _should_show_sync_enabled: bool) {}

    fn did_complete_login(&mut self, _registered_devices: &[RegisteredDevice], _is_recovery: bool) {
    }

    fn did_find_two_accounts_during_recovery(&mut self, _recovery_key: &RecoveryKey) {}

    fn did_error(&mut self, _error: ConnectionError, _underlying: Option<&PairingError>) {}
}

impl PairingEvent {
    /// Invoke the matching delegate method.
    pub fn deliver<D: PairingDelegate + ?Sized>(&self, delegate: &mut D) {
        match self {
            Self::WillBeginTransmittingRecoveryKey => delegate.will_begin_transmitting_recovery_key(),
            Self::DidFinishTransmittingRecoveryKey => delegate.did_finish_transmitting_recovery_key(),
            Self::DidReceiveRecoveryKey => delegate.did_receive_recovery_key(),
            Self::DidRecognizeScannedCode => delegate.did_recognize_scanned_code(),
            Self::DidCreateSyncAccount => delegate.did_create_sync_account(),
            Self::DidCompleteAccountConnection {
                should_show_sync_enabled,
            } => delegate.did_complete_account_connection(*should_show_sync_enabled),
            Self::DidCompleteLogin {
                registered_devices,
                is_recovery,
            } => delegate.did_complete_login(registered_devices, *is_recovery),
            Self::DidFindTwoAccountsDuringRecovery(key) => {
                delegate.did_find_two_accounts_during_recovery(key)
            }
            Self::DidError { error, underlying } => {
                delegate.did_error(*error, underlying.as_deref())
            }
        }
    }
}

/// Forward every event from `events` to `delegate` until all senders (the
/// controller and its background tasks) are dropped.
pub async fn dispatch_events<D: PairingDelegate + ?Sized>(
    mut events: UnboundedReceiver<PairingEvent>,
    delegate: &mut D,
) {
    while let Some(event) = events.recv().await {
        event.deliver(delegate);
    }
}
