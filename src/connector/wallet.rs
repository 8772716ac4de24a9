//! The one parameterized connector.
//!
//! `ConnectMethod` picks how the account is obtained; everything else
//! (session bookkeeping, persistence, event forwarding, chain switching) is
//! shared. Runtime differences stay inside the capability adapter and the
//! wallet provider.

use async_trait::async_trait;
use futures::FutureExt;
use serde_json::{json, Value};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use tracing::{debug, info, warn};

use super::provider::{
    methods, parse_accounts, parse_chain_id, ProviderEvent, WalletProvider, CHAIN_NOT_ADDED_CODE,
    UNAUTHORIZED_CODE,
};
use super::signer::Signer;
use super::{ConnectOptions, ConnectOutcome, Connector, ConnectorEvent, Provider};
use crate::capability::CapabilityAdapter;
use crate::core::address::same_address;
use crate::core::events::{EventEmitter, Listener, ListenerId};
use crate::core::keys;
use crate::core::types::{Chain, ConnectorDescriptor};
use crate::error::{SdkError, SdkResult};
use crate::social::{OAuthProviderKind, SocialIdentityProvider, SocialSession};

#[derive(Clone)]
pub enum ConnectMethod {
    /// EIP-1193 wallet: browser extension, mobile bridge, mock.
    Injected(Rc<dyn WalletProvider>),
    /// Key derived from a social login.
    Social { identity: Rc<SocialIdentityProvider>, provider_kind: OAuthProviderKind },
}

impl fmt::Debug for ConnectMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectMethod::Injected(_) => f.write_str("Injected"),
            ConnectMethod::Social { provider_kind, .. } => write!(f, "Social({provider_kind})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Session {
    account: String,
    chain_id: u64,
}

/// Clears the in-flight flag however `connect` exits.
struct PendingGuard<'a>(&'a Cell<bool>);

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

pub struct WalletConnector {
    id: String,
    display_name: String,
    method: ConnectMethod,
    chains: Vec<Chain>,
    adapter: Rc<CapabilityAdapter>,
    session: RefCell<Option<Session>>,
    pending: Cell<bool>,
    provider_listener: Cell<Option<ListenerId>>,
    emitter: EventEmitter<ConnectorEvent>,
    this: Weak<WalletConnector>,
}

impl fmt::Debug for WalletConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletConnector")
            .field("id", &self.id)
            .field("method", &self.method)
            .field("chains", &self.chains.iter().map(|c| c.id).collect::<Vec<_>>())
            .field("session", &self.session.borrow())
            .finish_non_exhaustive()
    }
}

impl WalletConnector {
    /// `chains` must not be empty; the first one is the default.
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        method: ConnectMethod,
        chains: Vec<Chain>,
        adapter: Rc<CapabilityAdapter>,
    ) -> SdkResult<Rc<Self>> {
        let id = id.into();
        if id.is_empty() {
            return Err(SdkError::configuration("connector id must not be empty"));
        }
        if chains.is_empty() {
            return Err(SdkError::configuration(format!("connector {id} has no chains")));
        }
        let display_name = display_name.into();
        Ok(Rc::new_cyclic(|this| Self {
            id,
            display_name,
            method,
            chains,
            adapter,
            session: RefCell::new(None),
            pending: Cell::new(false),
            provider_listener: Cell::new(None),
            emitter: EventEmitter::new(),
            this: this.clone(),
        }))
    }

    pub fn injected(
        id: impl Into<String>,
        display_name: impl Into<String>,
        provider: Rc<dyn WalletProvider>,
        chains: Vec<Chain>,
        adapter: Rc<CapabilityAdapter>,
    ) -> SdkResult<Rc<Self>> {
        Self::new(id, display_name, ConnectMethod::Injected(provider), chains, adapter)
    }

    pub fn social(
        id: impl Into<String>,
        display_name: impl Into<String>,
        identity: Rc<SocialIdentityProvider>,
        provider_kind: OAuthProviderKind,
        chains: Vec<Chain>,
        adapter: Rc<CapabilityAdapter>,
    ) -> SdkResult<Rc<Self>> {
        Self::new(id, display_name, ConnectMethod::Social { identity, provider_kind }, chains, adapter)
    }

    pub fn method(&self) -> &ConnectMethod {
        &self.method
    }

    fn chain(&self, chain_id: u64) -> Option<&Chain> {
        self.chains.iter().find(|c| c.id == chain_id)
    }

    fn configured_chain(&self, chain_id: u64) -> SdkResult<Chain> {
        self.chain(chain_id).cloned().ok_or_else(|| {
            SdkError::configuration(format!("chain {chain_id} is not configured for connector {}", self.id))
        })
    }

    /// Metadata for a chain the wallet reports, registered or not.
    fn chain_or_unknown(&self, chain_id: u64) -> Chain {
        self.chain(chain_id).cloned().unwrap_or_else(|| Chain::new(chain_id, format!("Chain {chain_id}")))
    }

    fn default_chain_id(&self) -> u64 {
        self.chains.first().map(|c| c.id).unwrap_or(1)
    }

    fn session(&self) -> SdkResult<Session> {
        self.session.borrow().clone().ok_or(SdkError::NotConnected)
    }

    async fn persist_session(&self, session: &Session) -> SdkResult<()> {
        let storage = self.adapter.storage();
        let namespace = self.adapter.namespace();
        storage.set_item(&keys::connector::account(namespace, &self.id), &session.account).await?;
        storage
            .set_item(&keys::connector::chain_id(namespace, &self.id), &session.chain_id.to_string())
            .await
    }

    async fn stored_chain_id(&self) -> Option<u64> {
        let key = keys::connector::chain_id(self.adapter.namespace(), &self.id);
        match self.adapter.storage().get_item(&key).await {
            Ok(value) => value.and_then(|v| v.parse().ok()),
            Err(e) => {
                debug!(connector = %self.id, error = %e, "could not read stored chain id");
                None
            }
        }
    }

    async fn forget_session(&self) -> SdkResult<()> {
        let storage = self.adapter.storage();
        let prefix = keys::connector::prefix(self.adapter.namespace(), &self.id);
        for key in storage.keys_with_prefix(&prefix).await? {
            storage.remove_item(&key).await?;
        }
        Ok(())
    }

    fn attach_provider(&self, provider: &Rc<dyn WalletProvider>) {
        if self.provider_listener.get().is_some() {
            return;
        }
        let weak = self.this.clone();
        let listener: Listener<ProviderEvent> = Rc::new(move |event: ProviderEvent| {
            let weak = weak.clone();
            async move {
                if let Some(this) = weak.upgrade() {
                    this.handle_provider_event(event).await;
                }
            }
            .boxed_local()
        });
        self.provider_listener.set(Some(provider.subscribe(listener)));
    }

    fn detach_provider(&self) {
        if let (ConnectMethod::Injected(provider), Some(id)) = (&self.method, self.provider_listener.take()) {
            provider.unsubscribe(id);
        }
    }

    async fn handle_provider_event(&self, event: ProviderEvent) {
        // Events before a session exists belong to the connect in flight.
        if self.session.borrow().is_none() {
            return;
        }
        match event {
            ProviderEvent::AccountsChanged(accounts) => match accounts.into_iter().next() {
                Some(account) => self.apply_account(account).await,
                None => self.drop_session("wallet reported no accounts").await,
            },
            ProviderEvent::ChainChanged(chain_id) => self.apply_chain(chain_id).await,
            ProviderEvent::Disconnect { code, message } => {
                debug!(connector = %self.id, code, %message, "provider disconnected");
                self.drop_session("provider disconnected").await;
            }
        }
    }

    async fn apply_account(&self, account: String) {
        let updated = {
            let mut session = self.session.borrow_mut();
            match session.as_mut() {
                Some(s) if !same_address(&s.account, &account) => {
                    s.account = account.clone();
                    Some(s.clone())
                }
                _ => None,
            }
        };
        if let Some(session) = updated {
            self.persist_or_report(&session).await;
            self.emitter.emit(ConnectorEvent::Change { account: Some(account), chain_id: None }).await;
        }
    }

    /// Emits `Change` only when the chain actually moved.
    async fn apply_chain(&self, chain_id: u64) {
        let updated = {
            let mut session = self.session.borrow_mut();
            match session.as_mut() {
                Some(s) if s.chain_id != chain_id => {
                    s.chain_id = chain_id;
                    Some(s.clone())
                }
                _ => None,
            }
        };
        if let Some(session) = updated {
            self.persist_or_report(&session).await;
            self.emitter.emit(ConnectorEvent::Change { account: None, chain_id: Some(chain_id) }).await;
        }
    }

    async fn persist_or_report(&self, session: &Session) {
        if let Err(e) = self.persist_session(session).await {
            warn!(connector = %self.id, error = %e, "failed to persist session");
            self.emitter.emit(ConnectorEvent::Error(e.to_string())).await;
        }
    }

    async fn drop_session(&self, reason: &str) {
        if self.session.borrow_mut().take().is_none() {
            return;
        }
        info!(connector = %self.id, reason, "session ended by wallet");
        if let Err(e) = self.forget_session().await {
            warn!(connector = %self.id, error = %e, "failed to clear stored session");
        }
        self.emitter.emit(ConnectorEvent::Disconnect).await;
    }

    async fn connect_injected(&self, provider: &Rc<dyn WalletProvider>, options: &ConnectOptions) -> SdkResult<Session> {
        self.attach_provider(provider);
        let accounts = parse_accounts(&provider.request(methods::REQUEST_ACCOUNTS, json!([])).await?)?;
        let account = accounts
            .into_iter()
            .next()
            .ok_or_else(|| SdkError::Provider { code: UNAUTHORIZED_CODE, message: "wallet returned no accounts".into() })?;
        let mut chain_id = parse_chain_id(&provider.request(methods::CHAIN_ID, json!([])).await?)?;

        if let Some(target) = options.chain_id {
            if target != chain_id {
                let chain = self.configured_chain(target)?;
                self.request_switch(provider, &chain).await?;
                chain_id = target;
            }
        }
        Ok(Session { account, chain_id })
    }

    async fn connect_social(
        &self,
        identity: &SocialIdentityProvider,
        kind: OAuthProviderKind,
        options: &ConnectOptions,
    ) -> SdkResult<Session> {
        let chain_id = match options.chain_id {
            Some(id) => self.configured_chain(id)?.id,
            None => self.default_chain_id(),
        };
        let session = identity.login(kind).await?;
        Ok(Session { account: session.credential.address, chain_id })
    }

    /// `wallet_switchEthereumChain`, adding the chain first if the wallet does not know it.
    async fn request_switch(&self, provider: &Rc<dyn WalletProvider>, chain: &Chain) -> SdkResult<()> {
        let params = json!([{ "chainId": chain.hex_id() }]);
        match provider.request(methods::SWITCH_CHAIN, params.clone()).await {
            Ok(_) => Ok(()),
            Err(SdkError::Provider { code: CHAIN_NOT_ADDED_CODE, .. }) => {
                debug!(connector = %self.id, chain = chain.id, "wallet does not know chain, adding it");
                provider.request(methods::ADD_CHAIN, add_chain_params(chain)).await?;
                provider.request(methods::SWITCH_CHAIN, params).await?;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn social_session(&self) -> SdkResult<SocialSession> {
        match &self.method {
            ConnectMethod::Social { identity, provider_kind } => {
                identity.current_session(*provider_kind).ok_or(SdkError::NotConnected)
            }
            ConnectMethod::Injected(_) => Err(SdkError::configuration("not a social connector")),
        }
    }
}

fn add_chain_params(chain: &Chain) -> Value {
    json!([{
        "chainId": chain.hex_id(),
        "chainName": chain.name,
        "nativeCurrency": chain.native_currency,
        "rpcUrls": chain.rpc_urls,
    }])
}

#[async_trait(?Send)]
impl Connector for WalletConnector {
    fn descriptor(&self) -> ConnectorDescriptor {
        let ready = match &self.method {
            ConnectMethod::Injected(_) => true,
            ConnectMethod::Social { identity, provider_kind } => identity.can_login(*provider_kind),
        };
        ConnectorDescriptor { id: self.id.clone(), display_name: self.display_name.clone(), ready }
    }

    fn id(&self) -> String {
        self.id.clone()
    }

    fn chains(&self) -> &[Chain] {
        &self.chains
    }

    async fn connect(&self, options: ConnectOptions) -> SdkResult<ConnectOutcome> {
        if self.pending.replace(true) {
            return Err(SdkError::configuration("connection already pending"));
        }
        let _guard = PendingGuard(&self.pending);

        let (session, provider) = match &self.method {
            ConnectMethod::Injected(provider) => {
                let session = self.connect_injected(provider, &options).await?;
                (session, Provider::Injected(provider.clone()))
            }
            ConnectMethod::Social { identity, provider_kind } => {
                let session = self.connect_social(identity, *provider_kind, &options).await?;
                (session, Provider::Social(self.social_session()?))
            }
        };

        self.persist_session(&session).await?;
        *self.session.borrow_mut() = Some(session.clone());
        info!(connector = %self.id, account = %session.account, chain = session.chain_id, "connected");

        self.emitter
            .emit(ConnectorEvent::Connect { account: session.account.clone(), chain_id: session.chain_id })
            .await;

        Ok(ConnectOutcome { chain: self.chain_or_unknown(session.chain_id), account: session.account, provider })
    }

    async fn disconnect(&self) -> SdkResult<()> {
        let had_session = self.session.borrow_mut().take().is_some();
        match &self.method {
            ConnectMethod::Injected(provider) => {
                if had_session {
                    let params = json!([{ "eth_accounts": {} }]);
                    if let Err(e) = provider.request(methods::REVOKE_PERMISSIONS, params).await {
                        debug!(connector = %self.id, error = %e, "wallet did not revoke permissions");
                    }
                }
                self.detach_provider();
            }
            ConnectMethod::Social { identity, provider_kind } => identity.logout(*provider_kind).await?,
        }
        self.forget_session().await?;

        if had_session {
            info!(connector = %self.id, "disconnected");
            self.emitter.emit(ConnectorEvent::Disconnect).await;
        }
        Ok(())
    }

    async fn get_account(&self) -> SdkResult<String> {
        Ok(self.session()?.account)
    }

    async fn get_chain_id(&self) -> SdkResult<u64> {
        Ok(self.session()?.chain_id)
    }

    async fn get_provider(&self) -> SdkResult<Provider> {
        match &self.method {
            ConnectMethod::Injected(provider) => Ok(Provider::Injected(provider.clone())),
            ConnectMethod::Social { .. } => Ok(Provider::Social(self.social_session()?)),
        }
    }

    async fn get_signer(&self) -> SdkResult<Signer> {
        let session = self.session()?;
        match &self.method {
            ConnectMethod::Injected(provider) => {
                Ok(Signer::Injected { provider: provider.clone(), address: session.account })
            }
            ConnectMethod::Social { .. } => Ok(Signer::Local(Rc::new(self.social_session()?.credential.signer()?))),
        }
    }

    async fn is_authorized(&self) -> SdkResult<bool> {
        let session = match &self.method {
            ConnectMethod::Injected(provider) => {
                let accounts = parse_accounts(&provider.request(methods::ACCOUNTS, json!([])).await?)?;
                let Some(account) = accounts.into_iter().next() else {
                    return Ok(false);
                };
                let chain_id = parse_chain_id(&provider.request(methods::CHAIN_ID, json!([])).await?)?;
                self.attach_provider(provider);
                Session { account, chain_id }
            }
            ConnectMethod::Social { identity, provider_kind } => {
                let Some(social) = identity.restore_session(*provider_kind).await? else {
                    return Ok(false);
                };
                let chain_id = match self.stored_chain_id().await {
                    Some(id) if self.chain(id).is_some() => id,
                    _ => self.default_chain_id(),
                };
                Session { account: social.credential.address, chain_id }
            }
        };

        self.persist_session(&session).await?;
        *self.session.borrow_mut() = Some(session);
        Ok(true)
    }

    async fn switch_chain(&self, chain_id: u64) -> SdkResult<Chain> {
        let chain = self.configured_chain(chain_id)?;
        self.session()?;
        if let ConnectMethod::Injected(provider) = &self.method {
            self.request_switch(provider, &chain).await?;
        }
        // No-op if the provider already reported the change.
        self.apply_chain(chain_id).await;
        Ok(chain)
    }

    fn subscribe(&self, listener: Listener<ConnectorEvent>) -> ListenerId {
        self.emitter.subscribe(listener)
    }

    fn unsubscribe(&self, id: ListenerId) -> bool {
        self.emitter.unsubscribe(id)
    }
}
