//! Connection manager behaviour through the public API
//!
//! These tests verify:
//! 1. Exactly one event per observable transition (connect, disconnect, chain switch)
//! 2. Connected / disconnected flags are always each other's inverse
//! 3. initialize() reconnects when it can and never fails when it can't
//! 4. Changes made in the wallet's own UI reach manager listeners

use crosswallet::capability::{AdapterConfig, CapabilityAdapter, CapabilityFactory, KeyValueStorage, MemoryStorage};
use crosswallet::core::events::listener;
use crosswallet::core::keys;
use crosswallet::{
    Chain, ConnectOptions, ConnectionManager, ConnectionStatus, EnvironmentProbe, ManagerConfig, ManagerEvent,
    MockWalletProvider, OAuthProviderKind, SdkError, SocialConfig, SocialIdentity, SocialIdentityProvider,
    WalletConnector, WalletState,
};
use async_trait::async_trait;
use crosswallet::connector::provider::ProviderEvent;
use crosswallet::core::events::{Listener, ListenerId};
use crosswallet::{SdkResult, WalletProvider};
use serde_json::Value;
use std::cell::RefCell;
use std::rc::Rc;

const ADDRESS: &str = "0xabc0000000000000000000000000000000000001";

async fn adapter(storage: MemoryStorage) -> Rc<CapabilityAdapter> {
    CapabilityFactory::new(AdapterConfig::new("manager-test"))
        .with_probe(EnvironmentProbe { secure_random: true, ..Default::default() })
        .with_storage(Rc::new(storage))
        .initialize()
        .await
        .expect("adapter")
}

fn chains() -> Vec<Chain> {
    vec![Chain::mainnet(), Chain::sepolia()]
}

fn setup_with(
    adapter: Rc<CapabilityAdapter>,
    mock: MockWalletProvider,
) -> (ConnectionManager, Rc<MockWalletProvider>) {
    let mock = Rc::new(mock);
    let manager = ConnectionManager::new(adapter.clone(), ManagerConfig::default());
    let connector = WalletConnector::injected("mock", "Mock Wallet", mock.clone(), chains(), adapter).expect("connector");
    manager.register(connector);
    (manager, mock)
}

fn record(manager: &ConnectionManager) -> Rc<RefCell<Vec<ManagerEvent>>> {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    manager.on(listener(move |e: ManagerEvent| sink.borrow_mut().push(e)));
    seen
}

fn assert_consistent(state: &WalletState) {
    assert_eq!(state.account.is_some(), !state.is_disconnected);
}

#[tokio::test]
async fn connect_emits_exactly_one_connect_event() {
    let (manager, _mock) = setup_with(adapter(MemoryStorage::new()).await, MockWalletProvider::new(ADDRESS, 1));
    let seen = record(&manager);

    let account = manager.connect("mock", ConnectOptions::default()).await.expect("connect");
    assert_eq!(account.address, ADDRESS);
    assert_eq!(account.chain_id, 1);
    assert_eq!(account.connector_id, "mock");

    let events = seen.borrow();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0], ManagerEvent::Connect(account.clone()));

    let state = manager.get_state();
    assert_eq!(state.status(), ConnectionStatus::Connected);
    assert_eq!(state.account, Some(account));
    assert_consistent(&state);
}

/// Wallet that takes a scheduler turn before answering, like a real extension round trip.
struct SlowWallet(MockWalletProvider);

#[async_trait(?Send)]
impl WalletProvider for SlowWallet {
    async fn request(&self, method: &str, params: Value) -> SdkResult<Value> {
        tokio::task::yield_now().await;
        self.0.request(method, params).await
    }

    fn subscribe(&self, listener: Listener<ProviderEvent>) -> ListenerId {
        self.0.subscribe(listener)
    }

    fn unsubscribe(&self, id: ListenerId) -> bool {
        self.0.unsubscribe(id)
    }
}

#[tokio::test]
async fn double_click_connect_emits_one_connect_event() {
    let adapter = adapter(MemoryStorage::new()).await;
    let manager = ConnectionManager::new(adapter.clone(), ManagerConfig::default());
    let wallet = Rc::new(SlowWallet(MockWalletProvider::new(ADDRESS, 1)));
    manager.register(WalletConnector::injected("mock", "Mock Wallet", wallet, chains(), adapter).expect("connector"));
    let seen = record(&manager);

    let second = manager.clone();
    let (first, second) = futures::join!(
        manager.connect("mock", ConnectOptions::default()),
        async move {
            let result = second.connect("mock", ConnectOptions::default()).await;
            // the first attempt is still open and must still read as connecting
            assert!(second.get_state().is_connecting);
            result
        }
    );

    let account = first.expect("first connect");
    assert!(matches!(&second.unwrap_err(), SdkError::Configuration(msg) if msg == "connection already pending"));
    assert_eq!(*seen.borrow(), vec![ManagerEvent::Connect(account.clone())]);
    let state = manager.get_state();
    assert_eq!(state.account, Some(account));
    assert_consistent(&state);
}

#[tokio::test]
async fn connect_unknown_connector_leaves_state_untouched() {
    let (manager, _mock) = setup_with(adapter(MemoryStorage::new()).await, MockWalletProvider::new(ADDRESS, 1));
    let seen = record(&manager);
    let before = manager.get_state();

    let err = manager.connect("nope", ConnectOptions::default()).await.unwrap_err();
    assert!(matches!(&err, SdkError::Configuration(msg) if msg.contains("nope")));
    assert_eq!(manager.get_state(), before);
    assert!(seen.borrow().is_empty());
}

#[tokio::test]
async fn connect_then_disconnect_inverts_state() {
    let storage = MemoryStorage::new();
    let (manager, _mock) = setup_with(adapter(storage.clone()).await, MockWalletProvider::new(ADDRESS, 1));
    let seen = record(&manager);

    manager.connect("mock", ConnectOptions::default()).await.expect("connect");
    let connected = manager.get_state();
    assert!(connected.account.is_some());
    assert!(!connected.is_disconnected);
    assert_eq!(
        storage.get_item(&keys::manager::recent_connector("crosswallet")).await.unwrap().as_deref(),
        Some("mock")
    );

    manager.disconnect().await.expect("disconnect");
    let disconnected = manager.get_state();
    assert!(disconnected.account.is_none());
    assert!(disconnected.is_disconnected);
    assert_consistent(&disconnected);
    assert!(storage.get_item(&keys::manager::recent_connector("crosswallet")).await.unwrap().is_none());

    // one connect, one disconnect, even though the connector also announced its disconnect
    let events = seen.borrow();
    assert_eq!(events.len(), 2);
    assert_eq!(events[1], ManagerEvent::Disconnect { connector_id: "mock".into() });

    // idempotent
    drop(events);
    manager.disconnect().await.expect("second disconnect");
    assert_eq!(seen.borrow().len(), 2);
}

#[tokio::test]
async fn connect_rejected_by_user_returns_to_disconnected() {
    let (manager, mock) = setup_with(adapter(MemoryStorage::new()).await, MockWalletProvider::new(ADDRESS, 1));
    mock.reject_next(4001, "User rejected the request");

    let err = manager.connect("mock", ConnectOptions::default()).await.unwrap_err();
    assert!(err.is_user_cancellation());
    let state = manager.get_state();
    assert!(state.is_disconnected);
    assert!(!state.is_connecting);
    assert!(state.pending_connector_id.is_none());
}

#[tokio::test]
async fn switch_chain_requires_connection() {
    let (manager, _mock) = setup_with(adapter(MemoryStorage::new()).await, MockWalletProvider::new(ADDRESS, 1));
    let err = manager.switch_chain(11155111).await.unwrap_err();
    assert!(matches!(&err, SdkError::Configuration(msg) if msg == "No connector connected"));
}

#[tokio::test]
async fn switch_chain_emits_exactly_one_chain_changed() {
    let (manager, mock) = setup_with(adapter(MemoryStorage::new()).await, MockWalletProvider::new(ADDRESS, 1));
    manager.connect("mock", ConnectOptions::default()).await.expect("connect");
    let seen = record(&manager);

    // sepolia is unknown to the wallet: switch fails with 4902, gets added, then switched
    let chain = manager.switch_chain(11155111).await.expect("switch");
    assert_eq!(chain.id, 11155111);
    assert_eq!(mock.chain_id(), 11155111);
    assert_eq!(*seen.borrow(), vec![ManagerEvent::ChainChanged { chain_id: 11155111 }]);
    assert_eq!(manager.get_account().map(|a| a.chain_id), Some(11155111));

    // already there: the wallet stays quiet, the caller still gets exactly one event
    manager.switch_chain(11155111).await.expect("same-chain switch");
    assert_eq!(
        *seen.borrow(),
        vec![ManagerEvent::ChainChanged { chain_id: 11155111 }, ManagerEvent::ChainChanged { chain_id: 11155111 }]
    );
}

#[tokio::test]
async fn switch_to_unconfigured_chain_is_rejected() {
    let (manager, mock) = setup_with(adapter(MemoryStorage::new()).await, MockWalletProvider::new(ADDRESS, 1));
    manager.connect("mock", ConnectOptions::default()).await.expect("connect");
    let err = manager.switch_chain(137).await.unwrap_err();
    assert!(matches!(err, SdkError::Configuration(_)));
    assert_eq!(mock.chain_id(), 1);
}

#[tokio::test]
async fn wallet_side_changes_reach_listeners() {
    let (manager, mock) = setup_with(adapter(MemoryStorage::new()).await, MockWalletProvider::new(ADDRESS, 1));
    manager.connect("mock", ConnectOptions::default()).await.expect("connect");
    let seen = record(&manager);

    let other = "0xdef0000000000000000000000000000000000002";
    mock.change_accounts(vec![other.to_string()]).await;
    mock.change_chain(11155111).await;
    mock.disconnect_from_wallet().await;

    let events = seen.borrow();
    assert_eq!(events.len(), 3);
    assert!(matches!(&events[0], ManagerEvent::AccountsChanged(a) if a.address == other));
    assert_eq!(events[1], ManagerEvent::ChainChanged { chain_id: 11155111 });
    assert_eq!(events[2], ManagerEvent::Disconnect { connector_id: "mock".into() });
    assert!(manager.get_state().is_disconnected);
}

#[tokio::test]
async fn initialize_reconnects_authorized_wallet() {
    let storage = MemoryStorage::new();
    storage.set_item(&keys::manager::recent_connector("crosswallet"), "mock").await.unwrap();
    let (manager, _mock) = setup_with(adapter(storage).await, MockWalletProvider::new(ADDRESS, 1).authorized());
    let seen = record(&manager);

    let state = manager.initialize().await;
    assert_eq!(state.status(), ConnectionStatus::Connected);
    assert_eq!(state.account.as_ref().map(|a| a.address.as_str()), Some(ADDRESS));
    assert_eq!(seen.borrow().len(), 1);
}

#[tokio::test]
async fn initialize_never_fails() {
    // revoked authorization
    let storage = MemoryStorage::new();
    let key = keys::manager::recent_connector("crosswallet");
    storage.set_item(&key, "mock").await.unwrap();
    let (manager, _mock) = setup_with(adapter(storage.clone()).await, MockWalletProvider::new(ADDRESS, 1));
    let state = manager.initialize().await;
    assert!(state.is_disconnected);
    assert!(!state.is_reconnecting);
    assert!(storage.get_item(&key).await.unwrap().is_none());

    // wallet errors out during the check
    let storage = MemoryStorage::new();
    storage.set_item(&key, "mock").await.unwrap();
    let (manager, mock) = setup_with(adapter(storage.clone()).await, MockWalletProvider::new(ADDRESS, 1).authorized());
    mock.reject_next(-32603, "internal error");
    let state = manager.initialize().await;
    assert!(state.is_disconnected);
    assert!(storage.get_item(&key).await.unwrap().is_none());

    // recent connector no longer registered
    let storage = MemoryStorage::new();
    storage.set_item(&key, "gone").await.unwrap();
    let (manager, _mock) = setup_with(adapter(storage).await, MockWalletProvider::new(ADDRESS, 1).authorized());
    assert!(manager.initialize().await.is_disconnected);
}

#[tokio::test]
async fn initialize_restores_social_login() {
    let storage = MemoryStorage::new();
    let adapter = adapter(storage.clone()).await;

    let social = Rc::new(SocialIdentityProvider::new(adapter.clone(), SocialConfig::new("app-secret")));
    let identity = SocialIdentity {
        provider: OAuthProviderKind::Google,
        user_id: "108234".into(),
        email: Some("alice@example.com".into()),
        name: Some("Alice".into()),
        avatar: None,
        token: "token".into(),
        expires_at: chrono::Utc::now().timestamp_millis() + 3_600_000,
    };
    let session = social.establish(identity).await.expect("establish");
    storage.set_item(&keys::manager::recent_connector("crosswallet"), "google").await.unwrap();

    // a fresh page load: new provider, new manager, same storage
    let social = Rc::new(SocialIdentityProvider::new(adapter.clone(), SocialConfig::new("app-secret")));
    let manager = ConnectionManager::new(adapter.clone(), ManagerConfig::default());
    let connector = WalletConnector::social("google", "Google", social, OAuthProviderKind::Google, chains(), adapter)
        .expect("connector");
    manager.register(connector);

    let state = manager.initialize().await;
    let account = state.account.expect("restored");
    assert_eq!(account.address, session.address());
    assert_eq!(account.chain_id, 1);
    assert_eq!(account.connector_id, "google");
}

#[tokio::test]
async fn watch_receives_events_in_order() {
    use futures::StreamExt;

    let (manager, mock) = setup_with(adapter(MemoryStorage::new()).await, MockWalletProvider::new(ADDRESS, 1));
    let mut rx = manager.watch();
    manager.connect("mock", ConnectOptions::default()).await.expect("connect");
    mock.change_chain(11155111).await;
    manager.disconnect().await.expect("disconnect");

    assert!(matches!(rx.next().await, Some(ManagerEvent::Connect(_))));
    assert_eq!(rx.next().await, Some(ManagerEvent::ChainChanged { chain_id: 11155111 }));
    assert_eq!(rx.next().await, Some(ManagerEvent::Disconnect { connector_id: "mock".into() }));
}
