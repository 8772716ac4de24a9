//! Social login end to end with a scripted popup host
//!
//! These tests verify:
//! 1. The same social user always lands on the same wallet address
//! 2. A closed popup cancels the login promptly
//! 3. State mismatch and blocked popups fail with typed errors
//! 4. Token exchange goes through the adapter's network client
//! 5. A social connector plugs into the connection manager

use async_trait::async_trait;
use crosswallet::capability::{
    AdapterConfig, CapabilityAdapter, CapabilityFactory, HttpRequest, HttpResponse, KeyValueStorage, MemoryStorage,
    NetworkClient,
};
use crosswallet::social::{OAuthClientConfig, OpenedPopup, PopupHost, PopupWindow, PostedMessage};
use crosswallet::{
    Chain, ConnectOptions, ConnectionManager, EnvironmentProbe, ManagerConfig, OAuthProviderKind, SdkError, SdkResult,
    SocialConfig, SocialIdentityProvider, WalletConnector,
};
use futures::channel::mpsc;
use serde_json::{json, Value};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::{Duration, Instant};

const ORIGIN: &str = "https://app.example";

#[derive(Clone)]
enum Script {
    /// Post a success message for this user, echoing the request state unless `tamper_state`.
    Reply { user_id: &'static str, email: Option<&'static str>, tamper_state: bool },
    /// User closes the window without answering.
    Close,
    /// Browser refuses to open the window.
    Block,
}

struct ScriptedWindow {
    closed: Rc<Cell<bool>>,
}

impl PopupWindow for ScriptedWindow {
    fn is_closed(&self) -> bool {
        self.closed.get()
    }

    fn close(&self) {
        self.closed.set(true);
    }
}

struct ScriptedHost {
    script: RefCell<Script>,
    opened: RefCell<Vec<String>>,
    senders: RefCell<Vec<mpsc::UnboundedSender<PostedMessage>>>,
}

impl ScriptedHost {
    fn new(script: Script) -> Rc<Self> {
        Rc::new(Self { script: RefCell::new(script), opened: RefCell::new(Vec::new()), senders: RefCell::new(Vec::new()) })
    }

    fn set_script(&self, script: Script) {
        *self.script.borrow_mut() = script;
    }
}

fn query_param(url: &str, name: &str) -> String {
    url::Url::parse(url)
        .expect("authorization url")
        .query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
        .unwrap_or_default()
}

impl PopupHost for ScriptedHost {
    fn origin(&self) -> String {
        ORIGIN.to_string()
    }

    fn open(&self, url: &str, _name: &str) -> SdkResult<OpenedPopup> {
        self.opened.borrow_mut().push(url.to_string());
        let (tx, rx) = mpsc::unbounded();
        let closed = Rc::new(Cell::new(false));

        match self.script.borrow().clone() {
            Script::Block => return Err(SdkError::PopupBlocked),
            Script::Close => closed.set(true),
            Script::Reply { user_id, email, tamper_state } => {
                let state = if tamper_state { "forged".to_string() } else { query_param(url, "state") };
                let data = json!({
                    "type": "OAUTH_SUCCESS",
                    "payload": {
                        "code": "auth-code",
                        "state": state,
                        "user": {"id": user_id, "email": email},
                        "token": "access-token",
                        "expiresAt": chrono::Utc::now().timestamp_millis() + 3_600_000,
                    }
                });
                tx.unbounded_send(PostedMessage { origin: ORIGIN.into(), data }).expect("send");
            }
        }

        self.senders.borrow_mut().push(tx);
        Ok(OpenedPopup { window: Box::new(ScriptedWindow { closed }), messages: rx })
    }
}

/// Token endpoint stand-in.
struct FakeTokenEndpoint {
    bodies: RefCell<Vec<Value>>,
    headers: RefCell<Vec<(String, String)>>,
}

#[async_trait(?Send)]
impl NetworkClient for FakeTokenEndpoint {
    async fn fetch(&self, request: HttpRequest) -> SdkResult<HttpResponse> {
        let body: Value = serde_json::from_slice(request.body.as_deref().unwrap_or_default())?;
        self.bodies.borrow_mut().push(body);
        self.headers.borrow_mut().extend(request.headers);
        let response = json!({
            "user": {"id": "exchanged-user", "email": "bob@example.com"},
            "token": "server-token",
            "expiresAt": chrono::Utc::now().timestamp_millis() + 3_600_000,
        });
        Ok(HttpResponse { status: 200, headers: Vec::new(), body: serde_json::to_vec(&response)? })
    }
}

async fn adapter(storage: MemoryStorage, network: Option<Rc<dyn NetworkClient>>) -> Rc<CapabilityAdapter> {
    let mut factory = CapabilityFactory::new(AdapterConfig::new("social-test"))
        .with_probe(EnvironmentProbe { browser_global: true, secure_random: true, ..Default::default() })
        .with_storage(Rc::new(storage));
    if let Some(network) = network {
        factory = factory.with_network_fallback(network);
    }
    factory.initialize().await.expect("adapter")
}

fn config(secret: &str) -> SocialConfig {
    SocialConfig::new(secret)
        .with_provider(
            OAuthProviderKind::Google,
            OAuthClientConfig::new(OAuthProviderKind::Google, "client-id", "https://app.example/callback"),
        )
        .with_poll_interval(Duration::from_millis(20))
        .with_login_timeout(Duration::from_secs(5))
}

fn alice() -> Script {
    Script::Reply { user_id: "108234", email: Some("alice@example.com"), tamper_state: false }
}

#[tokio::test]
async fn same_user_same_address_across_logins() {
    let storage = MemoryStorage::new();
    let host = ScriptedHost::new(alice());

    let social = SocialIdentityProvider::new(adapter(storage.clone(), None).await, config("app-secret"))
        .with_popup_host(host.clone());
    let first = social.login(OAuthProviderKind::Google).await.expect("first login");
    assert!(first.address().starts_with("0x"));
    assert_eq!(first.address().len(), 42);
    assert_eq!(first.identity.user_id, "108234");

    social.logout(OAuthProviderKind::Google).await.expect("logout");
    assert!(storage.is_empty());

    // cleared state, brand new provider
    let social = SocialIdentityProvider::new(adapter(storage.clone(), None).await, config("app-secret"))
        .with_popup_host(host.clone());
    let second = social.login(OAuthProviderKind::Google).await.expect("second login");
    assert_eq!(second.address(), first.address());
    assert_eq!(second.credential, first.credential);

    // a different app secret is a different wallet
    let other = SocialIdentityProvider::new(adapter(MemoryStorage::new(), None).await, config("other-secret"))
        .with_popup_host(host.clone());
    let third = other.login(OAuthProviderKind::Google).await.expect("third login");
    assert_ne!(third.address(), first.address());
    assert_eq!(host.opened.borrow().len(), 3);
}

#[tokio::test]
async fn derived_key_signs_for_its_address() {
    let social = SocialIdentityProvider::new(adapter(MemoryStorage::new(), None).await, config("app-secret"))
        .with_popup_host(ScriptedHost::new(alice()));
    let session = social.login(OAuthProviderKind::Google).await.expect("login");

    let signer = session.credential.signer().expect("signer");
    assert_eq!(signer.address(), session.address());
    let signature = signer.sign_message(b"hello").expect("sign");
    assert_eq!(signature.len(), 2 + 65 * 2);
}

#[tokio::test]
async fn closed_popup_cancels_quickly() {
    let social = SocialIdentityProvider::new(adapter(MemoryStorage::new(), None).await, config("app-secret"))
        .with_popup_host(ScriptedHost::new(Script::Close));

    let started = Instant::now();
    let err = social.login(OAuthProviderKind::Google).await.unwrap_err();
    assert!(matches!(err, SdkError::UserCancelled(_)));
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(social.current_session(OAuthProviderKind::Google).is_none());
}

#[tokio::test]
async fn state_mismatch_is_rejected() {
    let storage = MemoryStorage::new();
    let host = ScriptedHost::new(Script::Reply { user_id: "1", email: None, tamper_state: true });
    let social = SocialIdentityProvider::new(adapter(storage.clone(), None).await, config("app-secret"))
        .with_popup_host(host);

    let err = social.login(OAuthProviderKind::Google).await.unwrap_err();
    assert!(matches!(&err, SdkError::OAuth(msg) if msg == "state mismatch"));
    assert!(storage.is_empty());
}

#[tokio::test]
async fn blocked_popup_is_typed() {
    let social = SocialIdentityProvider::new(adapter(MemoryStorage::new(), None).await, config("app-secret"))
        .with_popup_host(ScriptedHost::new(Script::Block));
    assert!(matches!(social.login(OAuthProviderKind::Google).await, Err(SdkError::PopupBlocked)));
}

#[tokio::test]
async fn token_exchange_uses_adapter_network() {
    let endpoint = Rc::new(FakeTokenEndpoint { bodies: RefCell::new(Vec::new()), headers: RefCell::new(Vec::new()) });
    let network: Rc<dyn NetworkClient> = endpoint.clone();
    let adapter = adapter(MemoryStorage::new(), Some(network)).await;
    let host = ScriptedHost::new(alice());
    let social = SocialIdentityProvider::new(
        adapter,
        config("app-secret").with_token_exchange_url("https://api.app.example/oauth/token"),
    )
    .with_popup_host(host.clone());

    let session = social.login(OAuthProviderKind::Google).await.expect("login");
    assert_eq!(session.identity.user_id, "exchanged-user");
    assert_eq!(session.identity.token, "server-token");

    let bodies = endpoint.bodies.borrow();
    assert_eq!(bodies.len(), 1);
    assert_eq!(bodies[0]["provider"], "google");
    assert_eq!(bodies[0]["code"], "auth-code");
    assert_eq!(bodies[0]["redirectUri"], "https://app.example/callback");
    assert!(!bodies[0]["codeVerifier"].as_str().unwrap_or_default().is_empty());
    assert!(endpoint.headers.borrow().iter().any(|(k, v)| k == "accept" && v == "application/json"));
}

#[tokio::test]
async fn social_connector_through_manager() {
    let storage = MemoryStorage::new();
    let adapter = adapter(storage.clone(), None).await;
    let host = ScriptedHost::new(alice());
    let social = Rc::new(SocialIdentityProvider::new(adapter.clone(), config("app-secret")).with_popup_host(host.clone()));
    let manager = ConnectionManager::new(adapter.clone(), ManagerConfig::default());
    let connector = WalletConnector::social(
        "google",
        "Google",
        social.clone(),
        OAuthProviderKind::Google,
        vec![Chain::mainnet(), Chain::sepolia()],
        adapter,
    )
    .expect("connector");
    manager.register(connector);

    // cancelled login leaves the manager disconnected
    host.set_script(Script::Close);
    let err = manager.connect("google", ConnectOptions::default()).await.unwrap_err();
    assert!(err.is_user_cancellation());
    assert!(manager.get_state().is_disconnected);

    host.set_script(alice());
    let account = manager.connect("google", ConnectOptions::on_chain(11155111)).await.expect("connect");
    let session = social.current_session(OAuthProviderKind::Google).expect("session");
    assert_eq!(account.address, session.address());
    assert_eq!(account.chain_id, 11155111);

    // no wallet to ask, switching is local
    let chain = manager.switch_chain(1).await.expect("switch");
    assert_eq!(chain.id, 1);

    manager.disconnect().await.expect("disconnect");
    assert!(social.current_session(OAuthProviderKind::Google).is_none());
    assert!(storage.get_item("crosswallet.social.google.identity").await.unwrap().is_none());
}
