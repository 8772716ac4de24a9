//! Capability Adapter: one uniform storage / crypto / network / timer surface per runtime.
//!
//! # Fallback chains
//!
//! ```text
//! storage:  host override → native persistent store → in-memory (warn)
//! crypto:   platform secure random → headless secondary → insecure PRNG (warn, flagged)
//! network:  native fetch → host-supplied polyfill → fail closed
//! ```
//!
//! # Lifecycle
//!
//! `CapabilityFactory::new(config)` is the uninitialized handle; `initialize()`
//! resolves once and yields the adapter every other component receives by
//! injection. Adapters are never mutated after construction.

pub mod crypto;
pub mod network;
pub mod storage;
pub mod timer;

pub use crypto::{CryptoProvider, CryptoStrength, InsecureCrypto, RandomSource, SecureCrypto};
pub use network::{
    FetchClient, HttpMethod, HttpRequest, HttpResponse, NetworkClient, NetworkSource,
    UnavailableNetwork,
};
pub use storage::{KeyValueStorage, MemoryStorage};
pub use timer::Timer;

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::rc::Rc;
use tracing::{debug, warn};

use crate::core::keys::DEFAULT_NAMESPACE;
use crate::error::{Capability, SdkError, SdkResult};
use crate::runtime::{EnvironmentProbe, RuntimeKind};

/// Adapter configuration. Higher layers construct this.
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    /// Directory name for on-disk storage.
    pub app: String,
    /// Prefix of every storage key.
    pub namespace: String,
    pub storage_root: Option<PathBuf>,
    /// Skip runtime detection (tests, SSR shims).
    pub force_runtime: Option<RuntimeKind>,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE)
    }
}

impl AdapterConfig {
    pub fn new(app: impl Into<String>) -> Self {
        Self {
            app: app.into(),
            namespace: DEFAULT_NAMESPACE.into(),
            storage_root: None,
            force_runtime: None,
        }
    }
    pub fn with_namespace(mut self, ns: impl Into<String>) -> Self { self.namespace = ns.into(); self }
    pub fn with_storage_root(mut self, root: impl Into<PathBuf>) -> Self { self.storage_root = Some(root.into()); self }
    pub fn with_runtime(mut self, kind: RuntimeKind) -> Self { self.force_runtime = Some(kind); self }
}

/// Snapshot of what the adapter ended up with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    pub runtime: RuntimeKind,
    pub persistent_storage: bool,
    pub crypto_strength: CryptoStrength,
    pub network_source: NetworkSource,
    pub open_url: bool,
}

impl Capabilities {
    /// False when state is volatile or randomness/hashing is insecure.
    pub fn is_production_safe(&self) -> bool {
        self.persistent_storage && self.crypto_strength == CryptoStrength::Secure
    }
}

pub struct CapabilityAdapter {
    runtime: RuntimeKind,
    namespace: String,
    probe: EnvironmentProbe,
    storage: Rc<dyn KeyValueStorage>,
    crypto: Rc<dyn CryptoProvider>,
    network: Rc<dyn NetworkClient>,
    network_source: NetworkSource,
    timer: Rc<dyn Timer>,
}

impl fmt::Debug for CapabilityAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityAdapter")
            .field("namespace", &self.namespace)
            .field("capabilities", &self.capabilities())
            .finish()
    }
}

impl CapabilityAdapter {
    pub fn runtime_kind(&self) -> RuntimeKind { self.runtime }
    pub fn namespace(&self) -> &str { &self.namespace }
    pub fn storage(&self) -> &dyn KeyValueStorage { &*self.storage }
    pub fn crypto(&self) -> &dyn CryptoProvider { &*self.crypto }
    pub fn network(&self) -> &dyn NetworkClient { &*self.network }
    pub fn timer(&self) -> &dyn Timer { &*self.timer }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            runtime: self.runtime,
            persistent_storage: self.storage.is_persistent(),
            crypto_strength: self.crypto.strength(),
            network_source: self.network_source,
            open_url: self.probe.open_url,
        }
    }

    /// Refuse security-sensitive work on the insecure fallback.
    pub fn require_secure_crypto(&self) -> SdkResult<()> {
        match self.crypto.strength() {
            CryptoStrength::Secure => Ok(()),
            CryptoStrength::Insecure => Err(SdkError::unavailable(
                Capability::Crypto,
                "only the non-cryptographic fallback is available",
            )),
        }
    }

    /// Remove every key under this adapter's namespace. Returns how many were removed.
    pub async fn clear_namespace(&self) -> SdkResult<usize> {
        let keys = self.storage.keys_with_prefix(&format!("{}.", self.namespace)).await?;
        for key in &keys {
            self.storage.remove_item(key).await?;
        }
        Ok(keys.len())
    }
}

/// Uninitialized adapter handle.
pub struct CapabilityFactory {
    config: AdapterConfig,
    probe: Option<EnvironmentProbe>,
    storage: Option<Rc<dyn KeyValueStorage>>,
    network_fallback: Option<Rc<dyn NetworkClient>>,
    timer: Option<Rc<dyn Timer>>,
}

impl CapabilityFactory {
    pub fn new(config: AdapterConfig) -> Self {
        Self { config, probe: None, storage: None, network_fallback: None, timer: None }
    }

    /// Use this probe instead of detecting the host.
    pub fn with_probe(mut self, probe: EnvironmentProbe) -> Self { self.probe = Some(probe); self }

    /// Host-provided persistent store (e.g. a mobile bridge); wins over detection.
    pub fn with_storage(mut self, storage: Rc<dyn KeyValueStorage>) -> Self { self.storage = Some(storage); self }

    /// Fetch implementation used when native fetch is missing.
    pub fn with_network_fallback(mut self, client: Rc<dyn NetworkClient>) -> Self { self.network_fallback = Some(client); self }

    pub fn with_timer(mut self, timer: Rc<dyn Timer>) -> Self { self.timer = Some(timer); self }

    pub async fn initialize(self) -> SdkResult<Rc<CapabilityAdapter>> {
        let probe = self.probe.unwrap_or_else(EnvironmentProbe::detect);
        let runtime = self.config.force_runtime.unwrap_or_else(|| probe.runtime_kind());
        debug!(runtime = runtime.as_str(), ?probe, "initializing capability adapter");

        let storage = match self.storage {
            Some(storage) => storage,
            None => select_storage(&self.config, &probe),
        };
        let crypto = select_crypto(&probe);
        let (network, network_source) = match (probe.native_fetch, self.network_fallback) {
            (true, _) => (Rc::new(FetchClient::new()) as Rc<dyn NetworkClient>, NetworkSource::Native),
            (false, Some(fallback)) => {
                debug!("native fetch missing, using host fallback");
                (fallback, NetworkSource::Polyfill)
            }
            (false, None) => {
                warn!("no fetch primitive; network calls will fail with CapabilityUnavailable");
                (Rc::new(UnavailableNetwork) as Rc<dyn NetworkClient>, NetworkSource::Unavailable)
            }
        };
        let timer = self
            .timer
            .or_else(default_timer)
            .ok_or_else(|| SdkError::configuration("no timer primitive for this build; supply one with with_timer"))?;

        Ok(Rc::new(CapabilityAdapter {
            runtime,
            namespace: self.config.namespace,
            probe,
            storage,
            crypto,
            network,
            network_source,
            timer,
        }))
    }
}

/// Detect the host and build an adapter with default configuration.
pub async fn create_capability_adapter() -> SdkResult<Rc<CapabilityAdapter>> {
    CapabilityFactory::new(AdapterConfig::default()).initialize().await
}

fn select_storage(config: &AdapterConfig, probe: &EnvironmentProbe) -> Rc<dyn KeyValueStorage> {
    if probe.persistent_storage {
        match open_persistent_storage(config) {
            Ok(Some(storage)) => return storage,
            Ok(None) => {}
            Err(e) => warn!(error = %e, "persistent storage failed to open"),
        }
    }
    warn!("persistent storage unavailable; using in-memory store, data will not survive a restart");
    Rc::new(MemoryStorage::new())
}

#[cfg(all(feature = "wasm", target_arch = "wasm32"))]
fn open_persistent_storage(_config: &AdapterConfig) -> SdkResult<Option<Rc<dyn KeyValueStorage>>> {
    Ok(Some(Rc::new(crate::wasm::storage::BrowserStorage::open()?)))
}

#[cfg(all(feature = "native", not(all(feature = "wasm", target_arch = "wasm32"))))]
fn open_persistent_storage(config: &AdapterConfig) -> SdkResult<Option<Rc<dyn KeyValueStorage>>> {
    let root = storage::resolve_root(config.storage_root.as_deref());
    Ok(Some(Rc::new(storage::FileStorage::open(&root, &config.app)?)))
}

#[cfg(not(any(feature = "native", all(feature = "wasm", target_arch = "wasm32"))))]
fn open_persistent_storage(_config: &AdapterConfig) -> SdkResult<Option<Rc<dyn KeyValueStorage>>> {
    Ok(None)
}

fn select_crypto(probe: &EnvironmentProbe) -> Rc<dyn CryptoProvider> {
    if probe.secure_random {
        Rc::new(SecureCrypto::new(RandomSource::Os))
    } else if probe.server_random {
        debug!("platform random missing, using headless secondary");
        Rc::new(SecureCrypto::new(RandomSource::ThreadLocal))
    } else {
        warn!("no secure random source; falling back to NON-CRYPTOGRAPHIC PRNG and hash");
        Rc::new(InsecureCrypto::from_clock())
    }
}

fn default_timer() -> Option<Rc<dyn Timer>> {
    #[cfg(all(feature = "wasm", target_arch = "wasm32"))]
    let timer: Option<Rc<dyn Timer>> = Some(Rc::new(crate::wasm::timer::JsTimer));
    #[cfg(all(feature = "native", not(all(feature = "wasm", target_arch = "wasm32"))))]
    let timer: Option<Rc<dyn Timer>> = Some(Rc::new(timer::TokioTimer));
    #[cfg(not(any(feature = "native", all(feature = "wasm", target_arch = "wasm32"))))]
    let timer: Option<Rc<dyn Timer>> = None;
    timer
}
