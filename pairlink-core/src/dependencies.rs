//! Poller factory used by the connection controller.

use crate::code::RecoveryKey;
use crate::models::{ExchangeInfo, ExchangeMessage};
use crate::poller::{PayloadPoller, RelayPoller, DEFAULT_POLL_INTERVAL};
use crate::relay::{HttpRelayClient, RelayTransport};
use crate::{PairingConfig, PairingError, Result};
use std::sync::Arc;
use std::time::Duration;

/// Creates the pollers a pairing flow needs.
///
/// Every call returns a new poller with its own lifecycle; the controller
/// never reuses one across attempts.
pub trait PairingDependencies: Send + Sync {
    /// Exchange mode, displaying device.
    fn create_key_exchanger(&self) -> Result<Arc<dyn PayloadPoller<ExchangeMessage>>>;

    /// Connect mode, displaying device.
    fn create_connector(&self) -> Result<Arc<dyn PayloadPoller<RecoveryKey>>>;

    /// Exchange mode, scanning device, listening on the key pair it just
    /// announced.
    fn create_exchange_recoverer(
        &self,
        info: ExchangeInfo,
    ) -> Result<Arc<dyn PayloadPoller<RecoveryKey>>>;
}

/// Production factory: relay pollers over one shared transport.
pub struct RelayDependencies {
    transport: Arc<dyn RelayTransport>,
    poll_interval: Duration,
}

impl RelayDependencies {
    pub fn new(transport: Arc<dyn RelayTransport>, poll_interval: Duration) -> Self {
        Self {
            transport,
            poll_interval,
        }
    }

    /// HTTP relay at `config.relay_url` with the configured timeouts.
    pub fn from_config(config: &PairingConfig) -> Result<Self> {
        config.validate()?;
        let client = HttpRelayClient::new(&config.relay_url, config.request_timeout())
            .map_err(PairingError::Relay)?;
        Ok(Self::new(Arc::new(client), config.poll_interval()))
    }

    pub fn transport(&self) -> Arc<dyn RelayTransport> {
        self.transport.clone()
    }
}

impl From<Arc<dyn RelayTransport>> for RelayDependencies {
    fn from(transport: Arc<dyn RelayTransport>) -> Self {
        Self::new(transport, DEFAULT_POLL_INTERVAL)
    }
}

impl PairingDependencies for RelayDependencies {
    fn create_key_exchanger(&self) -> Result<Arc<dyn PayloadPoller<ExchangeMessage>>> {
        let poller = RelayPoller::key_exchanger(self.transport.clone(), self.poll_interval)?;
        Ok(Arc::new(poller))
    }

    fn create_connector(&self) -> Result<Arc<dyn PayloadPoller<RecoveryKey>>> {
        let poller = RelayPoller::connector(self.transport.clone(), self.poll_interval)?;
        Ok(Arc::new(poller))
    }

    fn create_exchange_recoverer(
        &self,
        info: ExchangeInfo,
    ) -> Result<Arc<dyn PayloadPoller<RecoveryKey>>> {
        let poller =
            RelayPoller::exchange_recoverer(self.transport.clone(), info, self.poll_interval)?;
        Ok(Arc::new(poller))
    }
}
