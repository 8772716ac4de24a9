//! CrossWallet: wallet connections that behave the same in every JavaScript-ish host.
//!
//! # Architecture
//!
//! ```text
//! ConnectionManager (entry point, one active connector)
//!   │
//!   ├── Connector registry
//!   │     ├── WalletConnector::injected  → WalletProvider (window.ethereum, mock)
//!   │     └── WalletConnector::social    → SocialIdentityProvider
//!   │                                        ├── OAuth popup + PKCE
//!   │                                        └── derive_credential (user id → key)
//!   │
//!   └── CapabilityAdapter (injected everywhere)
//!         ├── storage  (localStorage / file store / memory)
//!         ├── crypto   (secure random + hash, insecure fallback flagged)
//!         ├── network  (fetch / host polyfill / fail closed)
//!         └── timer
//! ```
//!
//! # Features
//!
//! - `native` - Server-rendered and mobile hosts (tokio timers, file store, reqwest)
//! - `wasm` - Browser (localStorage, window.open, window.ethereum, wasm-bindgen facade)
//!
//! # Usage
//!
//! ```ignore
//! use crosswallet::{
//!     create_capability_adapter, Chain, ConnectOptions, ConnectionManager, ManagerConfig,
//!     MockWalletProvider, WalletConnector,
//! };
//! use std::rc::Rc;
//!
//! let adapter = create_capability_adapter().await?;
//! let manager = ConnectionManager::new(adapter.clone(), ManagerConfig::default());
//! let wallet = Rc::new(MockWalletProvider::new("0xabc", 1));
//! manager.register(WalletConnector::injected("mock", "Mock", wallet, vec![Chain::mainnet()], adapter)?);
//!
//! manager.initialize().await;
//! let account = manager.connect("mock", ConnectOptions::default()).await?;
//! ```

pub mod capability;
pub mod connector;
pub mod core;
pub mod error;
pub mod manager;
pub mod runtime;
pub mod social;

#[cfg(feature = "native")]
pub mod logging;

#[cfg(all(feature = "wasm", target_arch = "wasm32"))]
pub mod wasm;

pub use capability::{
    create_capability_adapter, AdapterConfig, Capabilities, CapabilityAdapter, CapabilityFactory,
    CryptoProvider, CryptoStrength, KeyValueStorage, MemoryStorage, NetworkClient, Timer,
};
pub use connector::{
    ConnectOptions, ConnectOutcome, Connector, ConnectorEvent, LocalSigner, MockWalletProvider,
    Provider, Signer, WalletConnector, WalletProvider,
};
pub use crate::core::types::{Chain, ConnectionStatus, ConnectorDescriptor, WalletAccount, WalletState};
pub use error::{ErrorKind, SdkError, SdkResult};
pub use manager::{ConnectionManager, ManagerConfig, ManagerEvent};
pub use runtime::{EnvironmentProbe, RuntimeKind};
pub use social::{
    derive_credential, CredentialPersistence, DerivedWalletCredential, OAuthProviderKind, SocialConfig,
    SocialIdentity, SocialIdentityProvider, SocialSession,
};
