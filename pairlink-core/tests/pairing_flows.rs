//! End-to-end pairing flows between two controllers sharing one relay.

use async_trait::async_trait;
use pairlink_core::code::{ConnectKey, ExchangeKey, PairingCode, RecoveryKey};
use pairlink_core::controller::{ConnectionError, PairingConnectionController};
use pairlink_core::dependencies::{PairingDependencies, RelayDependencies};
use pairlink_core::events::PairingEvent;
use pairlink_core::models::{ExchangeInfo, ExchangeMessage, RegisteredDevice};
use pairlink_core::poller::PayloadPoller;
use pairlink_core::relay::{MemoryRelay, RelayTransport};
use pairlink_core::transmit;
use pairlink_core::{AccountBridge, PairingError, Result, SealedCrypter};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

const POLL_INTERVAL: Duration = Duration::from_millis(10);
const WAIT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Mock account
// ---------------------------------------------------------------------------

#[derive(Default)]
struct CallLog {
    login: AtomicUsize,
    create_account: AtomicUsize,
    transmit_recovery_key: AtomicUsize,
    transmit_generated_exchange_info: AtomicUsize,
    transmit_exchange_recovery_key: AtomicUsize,
}

impl CallLog {
    fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

/// Account backed by a shared in-memory relay. Transmissions really seal
/// and post, so two mock accounts can complete a pairing.
struct MockAccount {
    relay: MemoryRelay,
    crypter: SealedCrypter,
    recovery_key: Mutex<Option<RecoveryKey>>,
    reject_login: bool,
    fail_exchange_transmit: bool,
    /// Reply slot of the last exchange announcement.
    announced_slot: Mutex<Option<String>>,
    calls: CallLog,
}

impl MockAccount {
    fn new(relay: &MemoryRelay) -> Self {
        Self {
            relay: relay.clone(),
            crypter: SealedCrypter::new(),
            recovery_key: Mutex::new(None),
            reject_login: false,
            fail_exchange_transmit: false,
            announced_slot: Mutex::new(None),
            calls: CallLog::default(),
        }
    }

    fn with_account(self, key: RecoveryKey) -> Self {
        *self.recovery_key.lock().unwrap() = Some(key);
        self
    }

    fn rejecting_login(mut self) -> Self {
        self.reject_login = true;
        self
    }

    fn failing_exchange_transmit(mut self) -> Self {
        self.fail_exchange_transmit = true;
        self
    }

    fn current_key(&self) -> Result<RecoveryKey> {
        self.recovery_key
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| PairingError::Account("No account".to_string()))
    }
}

#[async_trait]
impl AccountBridge for MockAccount {
    fn has_account(&self) -> bool {
        self.recovery_key.lock().unwrap().is_some()
    }

    async fn login(
        &self,
        recovery_key: &RecoveryKey,
        device_name: &str,
        device_type: &str,
    ) -> Result<Vec<RegisteredDevice>> {
        self.calls.login.fetch_add(1, Ordering::SeqCst);
        if self.reject_login {
            return Err(PairingError::Account("Login rejected".to_string()));
        }
        *self.recovery_key.lock().unwrap() = Some(recovery_key.clone());
        Ok(vec![
            RegisteredDevice {
                id: "existing".to_string(),
                name: "Existing device".to_string(),
                device_type: "linux".to_string(),
            },
            RegisteredDevice {
                id: "this".to_string(),
                name: device_name.to_string(),
                device_type: device_type.to_string(),
            },
        ])
    }

    async fn create_account(&self, _device_name: &str, _device_type: &str) -> Result<()> {
        self.calls.create_account.fetch_add(1, Ordering::SeqCst);
        *self.recovery_key.lock().unwrap() = Some(RecoveryKey::new("created-user", vec![7u8; 32]));
        Ok(())
    }

    async fn transmit_recovery_key(&self, connect_key: &ConnectKey) -> Result<()> {
        self.calls.transmit_recovery_key.fetch_add(1, Ordering::SeqCst);
        let key = self.current_key()?;
        transmit::send_connect_recovery_key(&self.relay, &self.crypter, &key, connect_key).await
    }

    async fn transmit_generated_exchange_info(
        &self,
        exchange_key: &ExchangeKey,
        device_name: &str,
    ) -> Result<ExchangeInfo> {
        self.calls
            .transmit_generated_exchange_info
            .fetch_add(1, Ordering::SeqCst);
        let info = transmit::send_generated_exchange_info(
            &self.relay,
            &self.crypter,
            exchange_key,
            device_name,
        )
        .await?;
        *self.announced_slot.lock().unwrap() = Some(info.key_id.clone());
        Ok(info)
    }

    async fn transmit_exchange_recovery_key(&self, message: &ExchangeMessage) -> Result<()> {
        self.calls
            .transmit_exchange_recovery_key
            .fetch_add(1, Ordering::SeqCst);
        if self.fail_exchange_transmit {
            return Err(PairingError::Account("Transmit rejected".to_string()));
        }
        let key = self.current_key()?;
        transmit::send_exchange_recovery_key(&self.relay, &self.crypter, &key, message).await
    }
}

// ---------------------------------------------------------------------------
// Counting poller factory
// ---------------------------------------------------------------------------

#[derive(Default)]
struct PollerCounts {
    polls: AtomicUsize,
    stops: AtomicUsize,
}

struct CountingPoller<P> {
    inner: Arc<dyn PayloadPoller<P>>,
    counts: Arc<PollerCounts>,
}

#[async_trait]
impl<P: Send + 'static> PayloadPoller<P> for CountingPoller<P> {
    fn code(&self) -> &str {
        self.inner.code()
    }

    async fn poll_for_payload(&self) -> Result<Option<P>> {
        self.counts.polls.fetch_add(1, Ordering::SeqCst);
        self.inner.poll_for_payload().await
    }

    fn stop_polling(&self) {
        self.counts.stops.fetch_add(1, Ordering::SeqCst);
        self.inner.stop_polling();
    }
}

struct CountingDependencies {
    inner: RelayDependencies,
    exchanger: Arc<PollerCounts>,
    connector: Arc<PollerCounts>,
    recoverer: Arc<PollerCounts>,
}

impl CountingDependencies {
    fn new(relay: &MemoryRelay) -> Self {
        let transport: Arc<dyn RelayTransport> = Arc::new(relay.clone());
        Self {
            inner: RelayDependencies::new(transport, POLL_INTERVAL),
            exchanger: Arc::default(),
            connector: Arc::default(),
            recoverer: Arc::default(),
        }
    }

    fn wrap<P: Send + 'static>(
        inner: Arc<dyn PayloadPoller<P>>,
        counts: &Arc<PollerCounts>,
    ) -> Arc<dyn PayloadPoller<P>> {
        Arc::new(CountingPoller {
            inner,
            counts: counts.clone(),
        })
    }
}

impl PairingDependencies for CountingDependencies {
    fn create_key_exchanger(&self) -> Result<Arc<dyn PayloadPoller<ExchangeMessage>>> {
        Ok(Self::wrap(self.inner.create_key_exchanger()?, &self.exchanger))
    }

    fn create_connector(&self) -> Result<Arc<dyn PayloadPoller<RecoveryKey>>> {
        Ok(Self::wrap(self.inner.create_connector()?, &self.connector))
    }

    fn create_exchange_recoverer(
        &self,
        info: ExchangeInfo,
    ) -> Result<Arc<dyn PayloadPoller<RecoveryKey>>> {
        Ok(Self::wrap(
            self.inner.create_exchange_recoverer(info)?,
            &self.recoverer,
        ))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct Device {
    controller: PairingConnectionController,
    events: UnboundedReceiver<PairingEvent>,
    account: Arc<MockAccount>,
    deps: Arc<CountingDependencies>,
}

fn device(name: &str, relay: &MemoryRelay, account: MockAccount) -> Device {
    let account = Arc::new(account);
    let deps = Arc::new(CountingDependencies::new(relay));
    let (controller, events) =
        PairingConnectionController::new(name, "linux", account.clone(), deps.clone());
    Device {
        controller,
        events,
        account,
        deps,
    }
}

async fn next_event(events: &mut UnboundedReceiver<PairingEvent>) -> PairingEvent {
    tokio::time::timeout(WAIT, events.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

fn drain(events: &mut UnboundedReceiver<PairingEvent>) -> Vec<PairingEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}

async fn wait_for(counter: &AtomicUsize, value: usize) {
    tokio::time::timeout(WAIT, async {
        while counter.load(Ordering::SeqCst) < value {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("timed out waiting for counter");
}

async fn wait_until(condition: impl Fn() -> bool) {
    tokio::time::timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("timed out waiting for condition");
}

async fn wait_for_announcement(account: &MockAccount) -> String {
    tokio::time::timeout(WAIT, async {
        loop {
            if let Some(slot) = account.announced_slot.lock().unwrap().clone() {
                return slot;
            }
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("timed out waiting for announcement")
}

/// Base64 of "not a box": decodes fine, fails to unseal.
const GARBAGE_BLOB: &str = "bm90IGEgYm94";

fn primary_key() -> RecoveryKey {
    RecoveryKey::new("user-a", vec![42u8; 32])
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn exchange_flow_end_to_end() {
    let relay = MemoryRelay::new();
    let mut a = device(
        "Device A",
        &relay,
        MockAccount::new(&relay).with_account(primary_key()),
    );
    let mut b = device("Device B", &relay, MockAccount::new(&relay));

    let code = a.controller.start_exchange_mode().unwrap();
    assert!(b.controller.sync_code_entered(&code).await);

    // Scanning device: announce, one recovery poll, one login.
    assert_eq!(
        CallLog::get(&b.account.calls.transmit_generated_exchange_info),
        1
    );
    assert_eq!(b.deps.recoverer.polls.load(Ordering::SeqCst), 1);
    assert_eq!(CallLog::get(&b.account.calls.login), 1);
    assert!(matches!(
        next_event(&mut b.events).await,
        PairingEvent::DidRecognizeScannedCode
    ));
    match next_event(&mut b.events).await {
        PairingEvent::DidCompleteLogin {
            registered_devices,
            is_recovery,
        } => {
            assert_eq!(registered_devices.len(), 2);
            assert!(!is_recovery);
        }
        other => panic!("unexpected event {:?}", other),
    }
    assert_eq!(b.account.current_key().unwrap(), primary_key());

    // Displaying device: one transmit, then its exchanger is stopped once.
    assert!(matches!(
        next_event(&mut a.events).await,
        PairingEvent::WillBeginTransmittingRecoveryKey
    ));
    assert!(matches!(
        next_event(&mut a.events).await,
        PairingEvent::DidFinishTransmittingRecoveryKey
    ));
    wait_for(&a.deps.exchanger.stops, 1).await;
    assert_eq!(
        CallLog::get(&a.account.calls.transmit_exchange_recovery_key),
        1
    );
    assert_eq!(a.deps.exchanger.polls.load(Ordering::SeqCst), 1);
    assert_eq!(a.deps.exchanger.stops.load(Ordering::SeqCst), 1);
    assert!(drain(&mut a.events).is_empty());
    assert!(relay.is_empty());
    wait_until(|| !a.controller.is_exchange_mode_active()).await;
}

#[tokio::test]
async fn exchange_transmit_failure_still_finishes() {
    let relay = MemoryRelay::new();
    let mut a = device(
        "Device A",
        &relay,
        MockAccount::new(&relay)
            .with_account(primary_key())
            .failing_exchange_transmit(),
    );

    let code = a.controller.start_exchange_mode().unwrap();
    let exchange_key = match PairingCode::decode(&code).unwrap() {
        PairingCode::ExchangeKey(key) => key,
        other => panic!("unexpected code {:?}", other),
    };
    transmit::send_generated_exchange_info(&relay, &SealedCrypter::new(), &exchange_key, "B")
        .await
        .unwrap();

    assert!(matches!(
        next_event(&mut a.events).await,
        PairingEvent::WillBeginTransmittingRecoveryKey
    ));
    assert!(matches!(
        next_event(&mut a.events).await,
        PairingEvent::DidError {
            error: ConnectionError::FailedToTransmitExchangeRecoveryKey,
            underlying: Some(_),
        }
    ));
    assert!(matches!(
        next_event(&mut a.events).await,
        PairingEvent::DidFinishTransmittingRecoveryKey
    ));
    wait_for(&a.deps.exchanger.stops, 1).await;
    assert_eq!(a.deps.exchanger.stops.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn connect_flow_end_to_end() {
    let relay = MemoryRelay::new();
    let mut new_device = device("New device", &relay, MockAccount::new(&relay));
    let mut scanner = device("Scanner", &relay, MockAccount::new(&relay));

    let code = new_device.controller.start_connect_mode().unwrap();
    assert!(scanner.controller.sync_code_entered(&code).await);

    assert_eq!(CallLog::get(&scanner.account.calls.create_account), 1);
    assert_eq!(CallLog::get(&scanner.account.calls.transmit_recovery_key), 1);
    let events = drain(&mut scanner.events);
    assert_eq!(events.len(), 3);
    assert!(matches!(events[0], PairingEvent::DidRecognizeScannedCode));
    assert!(matches!(events[1], PairingEvent::DidCreateSyncAccount));
    assert!(matches!(
        events[2],
        PairingEvent::DidCompleteAccountConnection {
            should_show_sync_enabled: false
        }
    ));

    assert!(matches!(
        next_event(&mut new_device.events).await,
        PairingEvent::DidReceiveRecoveryKey
    ));
    assert!(matches!(
        next_event(&mut new_device.events).await,
        PairingEvent::DidCompleteLogin {
            is_recovery: false,
            ..
        }
    ));
    assert_eq!(
        new_device.account.current_key().unwrap(),
        scanner.account.current_key().unwrap()
    );
    wait_until(|| !new_device.controller.is_connect_mode_active()).await;
}

#[tokio::test]
async fn connect_with_existing_account_shows_sync_enabled() {
    let relay = MemoryRelay::new();
    let mut scanner = device(
        "Scanner",
        &relay,
        MockAccount::new(&relay).with_account(primary_key()),
    );
    let target = SealedCrypter::new().generate_exchange_info().unwrap();
    let code = PairingCode::Connect(ConnectKey {
        key_id: target.key_id.clone(),
        public_key: target.public_key.clone(),
    })
    .encode()
    .unwrap();

    assert!(scanner.controller.sync_code_entered(&code).await);

    assert_eq!(CallLog::get(&scanner.account.calls.create_account), 0);
    let events = drain(&mut scanner.events);
    assert!(matches!(
        events.last(),
        Some(PairingEvent::DidCompleteAccountConnection {
            should_show_sync_enabled: true
        })
    ));
    assert!(relay.contains(&target.key_id));
}

#[tokio::test]
async fn recovery_code_logs_in_directly() {
    let relay = MemoryRelay::new();
    let mut d = device("Device", &relay, MockAccount::new(&relay));

    let code = primary_key().to_code().unwrap();
    assert!(d.controller.sync_code_entered(&code).await);

    let events = drain(&mut d.events);
    assert_eq!(events.len(), 2);
    assert!(matches!(
        events[1],
        PairingEvent::DidCompleteLogin {
            is_recovery: true,
            ..
        }
    ));
    assert_eq!(d.deps.recoverer.polls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn two_accounts_are_disambiguated() {
    let relay = MemoryRelay::new();
    let mut d = device(
        "Device",
        &relay,
        MockAccount::new(&relay)
            .with_account(RecoveryKey::new("other-user", vec![1u8; 32]))
            .rejecting_login(),
    );

    let recovered = primary_key();
    assert!(!d.controller.handle_recovery_key(&recovered, true).await);

    let events = drain(&mut d.events);
    assert_eq!(events.len(), 1);
    match &events[0] {
        PairingEvent::DidFindTwoAccountsDuringRecovery(key) => assert_eq!(key, &recovered),
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn rejected_login_without_account_is_login_failure() {
    let relay = MemoryRelay::new();
    let mut d = device(
        "Device",
        &relay,
        MockAccount::new(&relay).rejecting_login(),
    );

    assert!(!d.controller.handle_recovery_key(&primary_key(), true).await);

    let events = drain(&mut d.events);
    assert!(matches!(
        events.as_slice(),
        [PairingEvent::DidError {
            error: ConnectionError::FailedToLogIn,
            ..
        }]
    ));
}

#[tokio::test]
async fn start_then_stop_fires_no_events() {
    let relay = MemoryRelay::new();
    let Device {
        controller,
        mut events,
        deps,
        ..
    } = device("Device", &relay, MockAccount::new(&relay));

    let exchange_code = controller.start_exchange_mode().unwrap();
    controller.stop_exchange_mode();
    let connect_code = controller.start_connect_mode().unwrap();
    controller.stop_connect_mode();

    // Late payloads for the abandoned slots must be ignored.
    let crypter = SealedCrypter::new();
    if let PairingCode::ExchangeKey(key) = PairingCode::decode(&exchange_code).unwrap() {
        transmit::send_generated_exchange_info(&relay, &crypter, &key, "Late")
            .await
            .unwrap();
    }
    if let PairingCode::Connect(key) = PairingCode::decode(&connect_code).unwrap() {
        transmit::send_connect_recovery_key(&relay, &crypter, &primary_key(), &key)
            .await
            .unwrap();
    }

    drop(controller);
    // Channel closes once the cancelled background tasks have exited.
    let closed = tokio::time::timeout(WAIT, events.recv()).await.unwrap();
    assert!(closed.is_none());
    assert_eq!(deps.exchanger.stops.load(Ordering::SeqCst), 1);
    assert_eq!(deps.connector.stops.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn restarting_a_mode_replaces_the_poller() {
    let relay = MemoryRelay::new();
    let mut d = device("Device", &relay, MockAccount::new(&relay));

    let first = d.controller.start_connect_mode().unwrap();
    let second = d.controller.start_connect_mode().unwrap();
    assert_eq!(d.deps.connector.stops.load(Ordering::SeqCst), 1);

    // Only the replacement is listening.
    let sender = MockAccount::new(&relay).with_account(primary_key());
    for code in [&first, &second] {
        if let PairingCode::Connect(key) = PairingCode::decode(code).unwrap() {
            sender.transmit_recovery_key(&key).await.unwrap();
        }
    }

    assert!(matches!(
        next_event(&mut d.events).await,
        PairingEvent::DidReceiveRecoveryKey
    ));
    assert!(matches!(
        next_event(&mut d.events).await,
        PairingEvent::DidCompleteLogin { .. }
    ));
    assert_eq!(CallLog::get(&d.account.calls.login), 1);
}

#[tokio::test]
async fn stopping_idle_modes_is_silent() {
    let relay = MemoryRelay::new();
    let mut d = device("Device", &relay, MockAccount::new(&relay));

    d.controller.stop_exchange_mode();
    d.controller.stop_exchange_mode();
    d.controller.stop_connect_mode();

    assert!(drain(&mut d.events).is_empty());
}

#[tokio::test]
async fn bad_connect_poll_reports_fetch_failure() {
    let relay = MemoryRelay::new();
    let mut d = device("Device", &relay, MockAccount::new(&relay));

    let code = d.controller.start_connect_mode().unwrap();
    let key = match PairingCode::decode(&code).unwrap() {
        PairingCode::Connect(key) => key,
        other => panic!("unexpected code {:?}", other),
    };
    relay.post_message(&key.key_id, GARBAGE_BLOB).await.unwrap();

    assert!(matches!(
        next_event(&mut d.events).await,
        PairingEvent::DidError {
            error: ConnectionError::FailedToFetchConnectRecoveryKey,
            underlying: Some(_),
        }
    ));
}

#[tokio::test]
async fn bad_exchange_poll_reports_public_key_failure() {
    let relay = MemoryRelay::new();
    let mut a = device(
        "Device A",
        &relay,
        MockAccount::new(&relay).with_account(primary_key()),
    );

    let code = a.controller.start_exchange_mode().unwrap();
    let key = match PairingCode::decode(&code).unwrap() {
        PairingCode::ExchangeKey(key) => key,
        other => panic!("unexpected code {:?}", other),
    };
    relay.post_message(&key.key_id, GARBAGE_BLOB).await.unwrap();

    assert!(matches!(
        next_event(&mut a.events).await,
        PairingEvent::DidError {
            error: ConnectionError::FailedToFetchPublicKey,
            underlying: Some(_),
        }
    ));
    assert_eq!(
        CallLog::get(&a.account.calls.transmit_exchange_recovery_key),
        0
    );
    wait_until(|| !a.controller.is_exchange_mode_active()).await;
    assert!(drain(&mut a.events).is_empty());
}

#[tokio::test]
async fn bad_exchange_reply_reports_recovery_key_failure() {
    let relay = MemoryRelay::new();
    let mut b = device("Device B", &relay, MockAccount::new(&relay));

    // Nobody answers the announcement except a corrupt reply.
    let target = SealedCrypter::new().generate_exchange_info().unwrap();
    let code = PairingCode::ExchangeKey(ExchangeKey {
        key_id: target.key_id.clone(),
        public_key: target.public_key.clone(),
    })
    .encode()
    .unwrap();

    let corrupt_reply = async {
        let slot = wait_for_announcement(&b.account).await;
        relay.post_message(&slot, GARBAGE_BLOB).await.unwrap();
    };
    let (succeeded, ()) = tokio::join!(b.controller.sync_code_entered(&code), corrupt_reply);
    assert!(!succeeded);

    let events = drain(&mut b.events);
    assert_eq!(events.len(), 2);
    assert!(matches!(events[0], PairingEvent::DidRecognizeScannedCode));
    match &events[1] {
        PairingEvent::DidError {
            error: ConnectionError::FailedToFetchExchangeRecoveryKey,
            underlying: Some(cause),
        } => assert!(matches!(cause.as_ref(), PairingError::Crypto(_))),
        other => panic!("unexpected event {:?}", other),
    }
    assert_eq!(CallLog::get(&b.account.calls.login), 0);
}

#[tokio::test]
async fn occupied_connect_slot_reports_transmit_failure() {
    let relay = MemoryRelay::new();
    let mut scanner = device(
        "Scanner",
        &relay,
        MockAccount::new(&relay).with_account(primary_key()),
    );
    let target = SealedCrypter::new().generate_exchange_info().unwrap();
    relay.post_message(&target.key_id, GARBAGE_BLOB).await.unwrap();
    let code = PairingCode::Connect(ConnectKey {
        key_id: target.key_id.clone(),
        public_key: target.public_key.clone(),
    })
    .encode()
    .unwrap();

    assert!(!scanner.controller.sync_code_entered(&code).await);

    let events = drain(&mut scanner.events);
    assert_eq!(events.len(), 2);
    assert!(matches!(
        events[1],
        PairingEvent::DidError {
            error: ConnectionError::FailedToTransmitConnectRecoveryKey,
            underlying: Some(_),
        }
    ));
    assert_eq!(CallLog::get(&scanner.account.calls.create_account), 0);
}

#[tokio::test]
async fn connect_login_failure_after_receiving_key() {
    let relay = MemoryRelay::new();
    let mut d = device(
        "New device",
        &relay,
        MockAccount::new(&relay).rejecting_login(),
    );

    let code = d.controller.start_connect_mode().unwrap();
    let key = match PairingCode::decode(&code).unwrap() {
        PairingCode::Connect(key) => key,
        other => panic!("unexpected code {:?}", other),
    };
    transmit::send_connect_recovery_key(&relay, &SealedCrypter::new(), &primary_key(), &key)
        .await
        .unwrap();

    assert!(matches!(
        next_event(&mut d.events).await,
        PairingEvent::DidReceiveRecoveryKey
    ));
    match next_event(&mut d.events).await {
        PairingEvent::DidError {
            error: ConnectionError::FailedToLogIn,
            underlying: Some(cause),
        } => assert!(matches!(cause.as_ref(), PairingError::Account(_))),
        other => panic!("unexpected event {:?}", other),
    }
    assert_eq!(CallLog::get(&d.account.calls.login), 1);
    wait_until(|| !d.controller.is_connect_mode_active()).await;
}

#[tokio::test]
async fn finished_flow_keeps_replacement_active() {
    let relay = MemoryRelay::new();
    let d = device("Device", &relay, MockAccount::new(&relay));

    d.controller.start_connect_mode().unwrap();
    d.controller.start_connect_mode().unwrap();

    // The cancelled first task exits without clearing its successor.
    assert_eq!(d.deps.connector.stops.load(Ordering::SeqCst), 1);
    tokio::time::sleep(POLL_INTERVAL * 3).await;
    assert!(d.controller.is_connect_mode_active());

    d.controller.stop_connect_mode();
    assert!(!d.controller.is_connect_mode_active());
}
