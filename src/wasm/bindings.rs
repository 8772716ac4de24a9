//! CrossWallet: the SDK exposed to JavaScript via wasm-bindgen
//!
//! ```javascript
//! const wallet = await CrossWallet.create("myapp");
//! wallet.registerInjected("metamask", "MetaMask");
//! await wallet.initialize();               // silent reconnect
//! wallet.on((event) => console.log(event.type, event));
//! const account = await wallet.connect("metamask");
//! await wallet.switchChain(11155111);
//! ```

use futures::StreamExt;
use serde::Serialize;
use std::rc::Rc;
use wasm_bindgen::prelude::*;

use super::ethereum::InjectedProvider;
use super::{log, to_js_error};
use crate::capability::{AdapterConfig, CapabilityAdapter, CapabilityFactory};
use crate::connector::{ConnectOptions, WalletConnector};
use crate::core::types::Chain;
use crate::manager::{ConnectionManager, ManagerConfig};

fn to_js<T: Serialize>(value: &T) -> Result<JsValue, JsValue> {
    let serializer = serde_wasm_bindgen::Serializer::json_compatible();
    value.serialize(&serializer).map_err(|e| JsValue::from_str(&e.to_string()))
}

fn chain_id_arg(value: f64) -> Result<u64, JsValue> {
    if value.is_finite() && value >= 0.0 && value.fract() == 0.0 {
        Ok(value as u64)
    } else {
        Err(JsValue::from_str(&format!("invalid chain id: {value}")))
    }
}

#[wasm_bindgen]
pub struct CrossWallet {
    adapter: Rc<CapabilityAdapter>,
    manager: ConnectionManager,
}

#[wasm_bindgen]
impl CrossWallet {
    /// Detect the browser capabilities and build a manager.
    pub async fn create(app: String) -> Result<CrossWallet, JsValue> {
        log!("[CrossWallet] creating for {}", app);
        let adapter = CapabilityFactory::new(AdapterConfig::new(app)).initialize().await.map_err(to_js_error)?;
        let manager = ConnectionManager::new(adapter.clone(), ManagerConfig::default());
        Ok(Self { adapter, manager })
    }

    /// Register `window.ethereum` under `id`. `chains` is an optional array of
    /// `{id, name, nativeCurrency, rpcUrls}`; mainnet and Sepolia by default.
    #[wasm_bindgen(js_name = "registerInjected")]
    pub fn register_injected(&self, id: String, name: String, chains: JsValue) -> Result<(), JsValue> {
        let chains: Vec<Chain> = if chains.is_undefined() || chains.is_null() {
            vec![Chain::mainnet(), Chain::sepolia()]
        } else {
            serde_wasm_bindgen::from_value(chains).map_err(|e| JsValue::from_str(&e.to_string()))?
        };
        let provider = InjectedProvider::require().map_err(to_js_error)?;
        let connector = WalletConnector::injected(id, name, Rc::new(provider), chains, self.adapter.clone())
            .map_err(to_js_error)?;
        self.manager.register(connector);
        Ok(())
    }

    /// Best-effort reconnect; resolves with the state, never rejects.
    pub async fn initialize(&self) -> Result<JsValue, JsValue> {
        to_js(&self.manager.initialize().await)
    }

    pub async fn connect(&self, id: String, chain_id: Option<f64>) -> Result<JsValue, JsValue> {
        let options = match chain_id {
            Some(value) => ConnectOptions::on_chain(chain_id_arg(value)?),
            None => ConnectOptions::default(),
        };
        let account = self.manager.connect(&id, options).await.map_err(to_js_error)?;
        to_js(&account)
    }

    pub async fn disconnect(&self) -> Result<(), JsValue> {
        self.manager.disconnect().await.map_err(to_js_error)
    }

    #[wasm_bindgen(js_name = "switchChain")]
    pub async fn switch_chain(&self, chain_id: f64) -> Result<JsValue, JsValue> {
        let chain = self.manager.switch_chain(chain_id_arg(chain_id)?).await.map_err(to_js_error)?;
        to_js(&chain)
    }

    #[wasm_bindgen(js_name = "getState")]
    pub fn get_state(&self) -> Result<JsValue, JsValue> {
        to_js(&self.manager.get_state())
    }

    pub fn connectors(&self) -> Result<JsValue, JsValue> {
        to_js(&self.manager.connectors())
    }

    /// Includes `isProductionSafe`, false on volatile storage or insecure crypto.
    pub fn capabilities(&self) -> Result<JsValue, JsValue> {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Report {
            #[serde(flatten)]
            capabilities: crate::capability::Capabilities,
            is_production_safe: bool,
        }
        let capabilities = self.adapter.capabilities();
        to_js(&Report { capabilities, is_production_safe: capabilities.is_production_safe() })
    }

    /// Forward manager events to `callback(event)`.
    pub fn on(&self, callback: js_sys::Function) {
        let mut rx = self.manager.watch();
        wasm_bindgen_futures::spawn_local(async move {
            while let Some(event) = rx.next().await {
                match to_js(&event) {
                    Ok(value) => {
                        let _ = callback.call1(&JsValue::NULL, &value);
                    }
                    Err(e) => log!("[CrossWallet] event serialization failed: {:?}", e),
                }
            }
        });
    }
}
