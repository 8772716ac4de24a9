//! `window.ethereum` as a [`WalletProvider`].

use async_trait::async_trait;
use futures::channel::mpsc;
use futures::StreamExt;
use js_sys::{Array, Function, Object, Promise, Reflect};
use serde::Serialize;
use serde_json::Value;
use std::cell::RefCell;
use std::rc::Rc;
use wasm_bindgen::closure::Closure;
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;

use super::{js_error_message, log};
use crate::connector::provider::{parse_accounts, parse_chain_id, ProviderEvent, WalletProvider};
use crate::core::events::{EventEmitter, Listener, ListenerId};
use crate::error::{SdkError, SdkResult};

const WALLET_EVENTS: [&str; 3] = ["accountsChanged", "chainChanged", "disconnect"];

pub struct InjectedProvider {
    ethereum: Object,
    emitter: Rc<EventEmitter<ProviderEvent>>,
    handlers: RefCell<Vec<(&'static str, Closure<dyn FnMut(JsValue)>)>>,
}

impl InjectedProvider {
    /// `None` when no wallet extension injected itself.
    pub fn detect() -> Option<Self> {
        let ethereum = Reflect::get(&js_sys::global(), &JsValue::from_str("ethereum")).ok()?;
        if ethereum.is_undefined() || ethereum.is_null() {
            return None;
        }
        let provider = Self {
            ethereum: ethereum.unchecked_into(),
            emitter: Rc::new(EventEmitter::new()),
            handlers: RefCell::new(Vec::new()),
        };
        provider.bind_events();
        Some(provider)
    }

    pub fn require() -> SdkResult<Self> {
        Self::detect().ok_or_else(|| SdkError::configuration("no injected wallet (window.ethereum)"))
    }

    /// Wallet callbacks feed one forwarding task so listeners see events in order.
    fn bind_events(&self) {
        let (tx, mut rx) = mpsc::unbounded::<ProviderEvent>();
        let emitter = self.emitter.clone();
        wasm_bindgen_futures::spawn_local(async move {
            while let Some(event) = rx.next().await {
                emitter.emit(event).await;
            }
        });

        let Some(on) = Reflect::get(&self.ethereum, &JsValue::from_str("on"))
            .ok()
            .and_then(|f| f.dyn_into::<Function>().ok())
        else {
            log!("[InjectedProvider] wallet has no event API");
            return;
        };

        for name in WALLET_EVENTS {
            let tx = tx.clone();
            let handler = Closure::<dyn FnMut(JsValue)>::new(move |payload: JsValue| {
                if let Some(event) = decode_event(name, &payload) {
                    let _ = tx.unbounded_send(event);
                }
            });
            let _ = on.call2(&self.ethereum, &JsValue::from_str(name), handler.as_ref().unchecked_ref());
            self.handlers.borrow_mut().push((name, handler));
        }
    }
}

impl Drop for InjectedProvider {
    fn drop(&mut self) {
        let Some(remove) = Reflect::get(&self.ethereum, &JsValue::from_str("removeListener"))
            .ok()
            .and_then(|f| f.dyn_into::<Function>().ok())
        else {
            return;
        };
        for (name, handler) in self.handlers.borrow().iter() {
            let _ = remove.call2(&self.ethereum, &JsValue::from_str(name), handler.as_ref().unchecked_ref());
        }
    }
}

fn decode_event(name: &str, payload: &JsValue) -> Option<ProviderEvent> {
    let value: Value = serde_wasm_bindgen::from_value(payload.clone()).ok()?;
    match name {
        "accountsChanged" => parse_accounts(&value).ok().map(ProviderEvent::AccountsChanged),
        "chainChanged" => parse_chain_id(&value).ok().map(ProviderEvent::ChainChanged),
        "disconnect" => Some(ProviderEvent::Disconnect {
            code: value["code"].as_i64().unwrap_or(4900),
            message: value["message"].as_str().unwrap_or("disconnected").to_string(),
        }),
        _ => None,
    }
}

fn provider_error(error: &JsValue) -> SdkError {
    let code = Reflect::get(error, &JsValue::from_str("code"))
        .ok()
        .and_then(|c| c.as_f64())
        .map(|c| c as i64)
        .unwrap_or(-32603);
    SdkError::Provider { code, message: js_error_message(error) }
}

#[async_trait(?Send)]
impl WalletProvider for InjectedProvider {
    async fn request(&self, method: &str, params: Value) -> SdkResult<Value> {
        let serializer = serde_wasm_bindgen::Serializer::json_compatible();
        let args = Object::new();
        Reflect::set(&args, &JsValue::from_str("method"), &JsValue::from_str(method))
            .map_err(|e| provider_error(&e))?;
        let params = match params {
            Value::Null => Array::new().into(),
            other => other
                .serialize(&serializer)
                .map_err(|e| SdkError::Provider { code: -32602, message: e.to_string() })?,
        };
        Reflect::set(&args, &JsValue::from_str("params"), &params).map_err(|e| provider_error(&e))?;

        let request: Function = Reflect::get(&self.ethereum, &JsValue::from_str("request"))
            .ok()
            .and_then(|f| f.dyn_into().ok())
            .ok_or_else(|| SdkError::Provider { code: -32601, message: "wallet has no request()".into() })?;
        let promise: Promise = request
            .call1(&self.ethereum, &args)
            .map_err(|e| provider_error(&e))?
            .dyn_into()
            .map_err(|_| SdkError::Provider { code: -32603, message: "request() did not return a promise".into() })?;

        let result = JsFuture::from(promise).await.map_err(|e| provider_error(&e))?;
        if result.is_undefined() || result.is_null() {
            return Ok(Value::Null);
        }
        serde_wasm_bindgen::from_value(result).map_err(|e| SdkError::Provider { code: -32603, message: e.to_string() })
    }

    fn subscribe(&self, listener: Listener<ProviderEvent>) -> ListenerId {
        self.emitter.subscribe(listener)
    }

    fn unsubscribe(&self, id: ListenerId) -> bool {
        self.emitter.unsubscribe(id)
    }
}
