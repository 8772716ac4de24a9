//! Connector contract.
//!
//! A connector knows how to obtain an account/chain pair through exactly one
//! connection method. The connection manager only talks to this trait; the
//! single implementation, [`WalletConnector`], is parameterized by
//! [`ConnectMethod`] instead of being duplicated per wallet or per runtime.
//!
//! ```text
//! Connector ──events──► ConnectionManager
//!     │
//!     ├─ Injected: WalletProvider (window.ethereum, mock, bridge)
//!     └─ Social:   SocialIdentityProvider ─► derived local key
//! ```

pub mod mock;
pub mod provider;
pub mod signer;
pub mod wallet;

pub use mock::MockWalletProvider;
pub use provider::{ProviderEvent, WalletProvider};
pub use signer::{LocalSigner, Signer};
pub use wallet::{ConnectMethod, WalletConnector};

use async_trait::async_trait;
use std::fmt;
use std::rc::Rc;

use crate::core::events::{Listener, ListenerId};
use crate::core::types::{Chain, ConnectorDescriptor};
use crate::error::SdkResult;
use crate::social::SocialSession;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Switch to this chain as part of connecting.
    pub chain_id: Option<u64>,
}

impl ConnectOptions {
    pub fn on_chain(chain_id: u64) -> Self {
        Self { chain_id: Some(chain_id) }
    }
}

/// Transport behind a connection.
#[derive(Clone)]
pub enum Provider {
    Injected(Rc<dyn WalletProvider>),
    Social(SocialSession),
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::Injected(_) => f.write_str("Provider::Injected"),
            Provider::Social(session) => f.debug_tuple("Provider::Social").field(session).finish(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConnectOutcome {
    pub account: String,
    pub chain: Chain,
    pub provider: Provider,
}

/// Events a connector emits, in the order they happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectorEvent {
    Connect { account: String, chain_id: u64 },
    Disconnect,
    /// Only the fields that changed are set.
    Change { account: Option<String>, chain_id: Option<u64> },
    Error(String),
}

#[async_trait(?Send)]
pub trait Connector {
    fn descriptor(&self) -> ConnectorDescriptor;

    fn id(&self) -> String {
        self.descriptor().id
    }

    /// Chains supplied at registration time.
    fn chains(&self) -> &[Chain];

    async fn connect(&self, options: ConnectOptions) -> SdkResult<ConnectOutcome>;
    async fn disconnect(&self) -> SdkResult<()>;

    /// Fails with `NotConnected` before a successful connect.
    async fn get_account(&self) -> SdkResult<String>;
    async fn get_chain_id(&self) -> SdkResult<u64>;
    async fn get_provider(&self) -> SdkResult<Provider>;
    async fn get_signer(&self) -> SdkResult<Signer>;

    /// Whether a previous session can be resumed without prompting.
    /// A `true` result leaves the connector ready for `get_account`.
    async fn is_authorized(&self) -> SdkResult<bool>;

    async fn switch_chain(&self, chain_id: u64) -> SdkResult<Chain>;

    fn subscribe(&self, listener: Listener<ConnectorEvent>) -> ListenerId;
    fn unsubscribe(&self, id: ListenerId) -> bool;
}
