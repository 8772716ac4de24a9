//! Connection Manager
//!
//! Owns the connector registry and the canonical [`WalletState`], persists the
//! last-used connector id, and re-emits one uniform event stream whichever
//! connector produced the change.
//!
//! # States
//!
//! ```text
//!                initialize (stored id)
//! Disconnected ─────────────────────────► Reconnecting ──authorized──► Connected
//!      │ ▲                                     │                        ▲ │ ▲
//!      │ └───────── not authorized / error ────┘                        │ │ │ change
//!      │ connect(id)                                                    │ │ └──┘
//!      ▼                                                                │ │
//!  Connecting ──────────────── connector resolved ──────────────────────┘ │
//!      │ rejected: back to Disconnected, error re-thrown, no event        │
//!      ◄────────────────── disconnect() / connector disconnect ───────────┘
//! ```
//!
//! State is replaced whole inside one borrow, then events go out; listeners
//! never observe a half-updated state.

pub mod config;

pub use config::ManagerConfig;

use serde::Serialize;
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::{Rc, Weak};
use futures::channel::mpsc;
use futures::FutureExt;
use tracing::{debug, info, warn};

use crate::capability::CapabilityAdapter;
use crate::connector::{ConnectOptions, Connector, ConnectorEvent};
use crate::core::events::{EventEmitter, Listener, ListenerId};
use crate::core::keys;
use crate::core::types::{Chain, ConnectorDescriptor, WalletAccount, WalletState};
use crate::error::{SdkError, SdkResult};

/// Manager-level events, identical whichever connector is active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ManagerEvent {
    Connect(WalletAccount),
    Disconnect {
        #[serde(rename = "connectorId")]
        connector_id: String,
    },
    AccountsChanged(WalletAccount),
    ChainChanged {
        #[serde(rename = "chainId")]
        chain_id: u64,
    },
    Error { message: String },
}

struct Registered {
    connector: Rc<dyn Connector>,
    listener: ListenerId,
}

struct ManagerInner {
    adapter: Rc<CapabilityAdapter>,
    namespace: String,
    config: ManagerConfig,
    /// Registration order.
    connectors: RefCell<Vec<(String, Registered)>>,
    state: RefCell<WalletState>,
    active: RefCell<Option<String>>,
    /// Connectors with a manager-driven connect in flight.
    in_flight: RefCell<BTreeSet<String>>,
    emitter: EventEmitter<ManagerEvent>,
}

/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Rc<ManagerInner>,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("namespace", &self.inner.namespace)
            .field("connectors", &self.connector_ids())
            .field("state", &*self.inner.state.borrow())
            .finish()
    }
}

impl ConnectionManager {
    pub fn new(adapter: Rc<CapabilityAdapter>, config: ManagerConfig) -> Self {
        let namespace = config.namespace.clone().unwrap_or_else(|| adapter.namespace().to_string());
        Self {
            inner: Rc::new(ManagerInner {
                adapter,
                namespace,
                config,
                connectors: RefCell::new(Vec::new()),
                state: RefCell::new(WalletState::disconnected()),
                active: RefCell::new(None),
                in_flight: RefCell::new(BTreeSet::new()),
                emitter: EventEmitter::new(),
            }),
        }
    }

    /// Add a connector. A later registration under the same id replaces the earlier one.
    pub fn register(&self, connector: Rc<dyn Connector>) {
        let id = connector.id();
        let listener = connector.subscribe(self.connector_listener(id.clone()));
        let registered = Registered { connector, listener };

        let replaced = {
            let mut connectors = self.inner.connectors.borrow_mut();
            match connectors.iter_mut().find(|(cid, _)| *cid == id) {
                Some((_, slot)) => Some(std::mem::replace(slot, registered)),
                None => {
                    connectors.push((id.clone(), registered));
                    None
                }
            }
        };
        if let Some(old) = replaced {
            old.connector.unsubscribe(old.listener);
            debug!(connector = %id, "connector registration replaced");
        } else {
            debug!(connector = %id, "connector registered");
        }
    }

    pub fn connectors(&self) -> Vec<ConnectorDescriptor> {
        self.inner.connectors.borrow().iter().map(|(_, r)| r.connector.descriptor()).collect()
    }

    pub fn connector(&self, id: &str) -> Option<Rc<dyn Connector>> {
        self.inner
            .connectors
            .borrow()
            .iter()
            .find(|(cid, _)| cid == id)
            .map(|(_, r)| r.connector.clone())
    }

    fn connector_ids(&self) -> Vec<String> {
        self.inner.connectors.borrow().iter().map(|(id, _)| id.clone()).collect()
    }

    pub fn active_connector(&self) -> Option<Rc<dyn Connector>> {
        let id = self.inner.active.borrow().clone()?;
        self.connector(&id)
    }

    pub fn get_state(&self) -> WalletState {
        self.inner.state.borrow().clone()
    }

    pub fn get_account(&self) -> Option<WalletAccount> {
        self.inner.state.borrow().account.clone()
    }

    pub fn on(&self, listener: Listener<ManagerEvent>) -> ListenerId {
        self.inner.emitter.subscribe(listener)
    }

    pub fn off(&self, id: ListenerId) -> bool {
        self.inner.emitter.unsubscribe(id)
    }

    pub fn watch(&self) -> mpsc::UnboundedReceiver<ManagerEvent> {
        self.inner.emitter.watch()
    }

    /// Best-effort reconnection to the last-used connector. Never fails;
    /// returns the resulting state.
    pub async fn initialize(&self) -> WalletState {
        if self.inner.config.reconnect_on_init {
            self.inner.reconnect().await;
        }
        self.get_state()
    }

    pub async fn connect(&self, connector_id: &str, options: ConnectOptions) -> SdkResult<WalletAccount> {
        let connector = self
            .connector(connector_id)
            .ok_or_else(|| SdkError::configuration(format!("Connector {connector_id} not found")))?;

        // A second click while the first attempt is still open changes nothing.
        if self.inner.in_flight.borrow().contains(connector_id) {
            return Err(SdkError::configuration("connection already pending"));
        }

        let active = self.inner.active.borrow().clone();
        match active {
            Some(id) if id == connector_id => {
                return Err(SdkError::configuration("connector already connected"));
            }
            Some(previous) => {
                debug!(from = %previous, to = %connector_id, "switching connectors");
                if let Err(e) = self.disconnect().await {
                    warn!(connector = %previous, error = %e, "previous connector failed to disconnect cleanly");
                }
            }
            None => {}
        }

        let result = {
            let _attempt = InFlight::enter(&self.inner.in_flight, connector_id);
            self.inner.set_state(WalletState::connecting(connector_id));
            connector.connect(options).await
        };

        match result {
            Ok(outcome) => {
                let account = WalletAccount::new(outcome.account, outcome.chain.id, connector_id);
                // Another connector may have finished while this one was open.
                let previous = self.inner.active.borrow().clone();
                if let Some(previous) = previous.filter(|p| p != connector_id) {
                    if let Err(e) = self.disconnect().await {
                        warn!(connector = %previous, error = %e, "previous connector failed to disconnect cleanly");
                    }
                }
                self.inner.adopt(account.clone()).await;
                Ok(account)
            }
            Err(e) => {
                self.inner.clear_pending(connector_id);
                if e.is_user_cancellation() {
                    debug!(connector = %connector_id, error = %e, "connect cancelled");
                } else {
                    warn!(connector = %connector_id, error = %e, "connect failed");
                }
                Err(e)
            }
        }
    }

    pub async fn disconnect(&self) -> SdkResult<()> {
        let Some(id) = self.inner.active.borrow().clone() else {
            return Ok(());
        };
        let result = match self.connector(&id) {
            Some(connector) => connector.disconnect().await,
            None => Ok(()),
        };
        // The connector's own Disconnect event usually got here first.
        self.inner.apply_disconnect(&id).await;
        result
    }

    /// Resolves with the new chain and emits exactly one `ChainChanged`, also when
    /// the wallet was already on that chain.
    pub async fn switch_chain(&self, chain_id: u64) -> SdkResult<Chain> {
        let connector = self
            .active_connector()
            .ok_or_else(|| SdkError::configuration("No connector connected"))?;
        let before = self.get_account().map(|a| a.chain_id);
        let chain = connector.switch_chain(chain_id).await?;
        // A real move is announced by the connector's Change; a no-op move is not.
        if before == Some(chain.id) {
            self.inner.emitter.emit(ManagerEvent::ChainChanged { chain_id: chain.id }).await;
        }
        Ok(chain)
    }

    fn connector_listener(&self, connector_id: String) -> Listener<ConnectorEvent> {
        let weak: Weak<ManagerInner> = Rc::downgrade(&self.inner);
        Rc::new(move |event: ConnectorEvent| {
            let weak = weak.clone();
            let connector_id = connector_id.clone();
            async move {
                if let Some(inner) = weak.upgrade() {
                    inner.on_connector_event(&connector_id, event).await;
                }
            }
            .boxed_local()
        })
    }
}

/// Marks a manager-driven connect; cleared even if the caller drops the future.
struct InFlight<'a> {
    set: &'a RefCell<BTreeSet<String>>,
    connector_id: String,
}

impl<'a> InFlight<'a> {
    fn enter(set: &'a RefCell<BTreeSet<String>>, connector_id: &str) -> Self {
        set.borrow_mut().insert(connector_id.to_string());
        Self { set, connector_id: connector_id.to_string() }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.set.borrow_mut().remove(&self.connector_id);
    }
}

impl ManagerInner {
    fn set_state(&self, state: WalletState) {
        *self.state.borrow_mut() = state;
    }

    fn is_active(&self, connector_id: &str) -> bool {
        self.active.borrow().as_deref() == Some(connector_id)
    }

    fn find(&self, connector_id: &str) -> Option<Rc<dyn Connector>> {
        self.connectors
            .borrow()
            .iter()
            .find(|(cid, _)| cid == connector_id)
            .map(|(_, r)| r.connector.clone())
    }

    /// Back to Disconnected if this connector's connect was the one pending.
    fn clear_pending(&self, connector_id: &str) {
        let mut state = self.state.borrow_mut();
        if state.pending_connector_id.as_deref() == Some(connector_id) {
            *state = WalletState::disconnected();
        }
    }

    async fn adopt(&self, account: WalletAccount) {
        let connector_id = account.connector_id.clone();
        let key = keys::manager::recent_connector(&self.namespace);
        if let Err(e) = self.adapter.storage().set_item(&key, &connector_id).await {
            warn!(error = %e, "failed to persist recent connector");
        }
        *self.active.borrow_mut() = Some(connector_id.clone());
        self.set_state(WalletState::connected(account.clone()));
        info!(connector = %connector_id, address = %account.address, chain = account.chain_id, "wallet connected");
        self.emitter.emit(ManagerEvent::Connect(account)).await;
    }

    async fn apply_disconnect(&self, connector_id: &str) {
        if !self.is_active(connector_id) {
            return;
        }
        *self.active.borrow_mut() = None;
        self.set_state(WalletState::disconnected());

        let key = keys::manager::recent_connector(&self.namespace);
        if let Err(e) = self.adapter.storage().remove_item(&key).await {
            warn!(error = %e, "failed to clear recent connector");
        }
        info!(connector = %connector_id, "wallet disconnected");
        self.emitter.emit(ManagerEvent::Disconnect { connector_id: connector_id.to_string() }).await;
    }

    async fn on_connector_event(&self, connector_id: &str, event: ConnectorEvent) {
        match event {
            ConnectorEvent::Connect { account, chain_id } => {
                let pending = self.state.borrow().pending_connector_id.as_deref() == Some(connector_id);
                // Manager-driven connects and reconnects finish in connect()/reconnect().
                if pending || self.in_flight.borrow().contains(connector_id) || self.is_active(connector_id) {
                    return;
                }
                debug!(connector = %connector_id, "adopting connector-initiated connection");
                let previous = self.active.borrow().clone();
                if let Some(previous) = previous {
                    self.apply_disconnect(&previous).await;
                }
                self.adopt(WalletAccount::new(account, chain_id, connector_id)).await;
            }
            ConnectorEvent::Disconnect => self.apply_disconnect(connector_id).await,
            ConnectorEvent::Change { account, chain_id } => {
                if !self.is_active(connector_id) {
                    return;
                }
                let updated = {
                    let mut state = self.state.borrow_mut();
                    let Some(current) = state.account.as_mut() else {
                        return;
                    };
                    if let Some(address) = &account {
                        current.address = address.clone();
                    }
                    if let Some(id) = chain_id {
                        current.chain_id = id;
                    }
                    current.clone()
                };
                if account.is_some() {
                    self.emitter.emit(ManagerEvent::AccountsChanged(updated)).await;
                }
                if let Some(chain_id) = chain_id {
                    self.emitter.emit(ManagerEvent::ChainChanged { chain_id }).await;
                }
            }
            ConnectorEvent::Error(message) => {
                warn!(connector = %connector_id, %message, "connector error");
                self.state.borrow_mut().error = Some(message.clone());
                self.emitter.emit(ManagerEvent::Error { message }).await;
            }
        }
    }

    async fn reconnect(&self) {
        let key = keys::manager::recent_connector(&self.namespace);
        let connector_id = match self.adapter.storage().get_item(&key).await {
            Ok(Some(id)) => id,
            Ok(None) => return,
            Err(e) => {
                debug!(error = %e, "could not read recent connector");
                return;
            }
        };
        let Some(connector) = self.find(&connector_id) else {
            debug!(connector = %connector_id, "recent connector is not registered");
            return;
        };

        self.set_state(WalletState::reconnecting(&connector_id));
        match resume(connector.as_ref()).await {
            Ok(Some((address, chain_id))) => {
                self.adopt(WalletAccount::new(address, chain_id, &connector_id)).await;
            }
            Ok(None) => {
                debug!(connector = %connector_id, "recent connector no longer authorized");
                self.abandon_reconnect(&key).await;
            }
            Err(e) => {
                let e = SdkError::Reconnection(e.to_string());
                debug!(connector = %connector_id, error = %e, "reconnection failed");
                self.abandon_reconnect(&key).await;
            }
        }
    }

    async fn abandon_reconnect(&self, key: &str) {
        self.set_state(WalletState::disconnected());
        if let Err(e) = self.adapter.storage().remove_item(key).await {
            debug!(error = %e, "failed to clear recent connector");
        }
    }
}

async fn resume(connector: &dyn Connector) -> SdkResult<Option<(String, u64)>> {
    if !connector.is_authorized().await? {
        return Ok(None);
    }
    let address = connector.get_account().await?;
    let chain_id = connector.get_chain_id().await?;
    Ok(Some((address, chain_id)))
}
