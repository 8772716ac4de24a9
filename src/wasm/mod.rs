//! WASM module: browser platform for the SDK
//!
//! Browser implementations of the capability and connector seams plus the
//! JS-facing facade:
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │          CrossWallet (JS API)           │
//! │  create, registerInjected, connect,     │
//! │  disconnect, switchChain, getState, on  │
//! └─────────────────┬───────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────┐
//! │   ConnectionManager / WalletConnector   │
//! └───────┬─────────────────────┬───────────┘
//!         │                     │
//! ┌───────▼────────┐   ┌────────▼──────────┐
//! │ InjectedProvider│  │ BrowserPopupHost  │
//! │ window.ethereum │  │ window.open + msg │
//! └────────────────┘   └───────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────┐
//! │  probe · BrowserStorage · JsTimer       │
//! │  globalThis / localStorage / setTimeout │
//! └─────────────────────────────────────────┘
//! ```

mod bindings;
pub mod ethereum;
pub mod popup;
pub mod probe;
pub mod storage;
pub mod timer;

pub use bindings::CrossWallet;
pub use ethereum::InjectedProvider;
pub use popup::BrowserPopupHost;
pub use storage::BrowserStorage;
pub use timer::JsTimer;

use wasm_bindgen::prelude::*;

use crate::error::SdkError;

/// Initialize WASM module (called automatically on load)
#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
}

/// Log to browser console
pub fn console_log(s: &str) {
    web_sys::console::log_1(&JsValue::from_str(s));
}

macro_rules! log {
    ($($t:tt)*) => {
        crate::wasm::console_log(&format!($($t)*))
    }
}

pub(crate) use log;

/// Best-effort text of a thrown JS value.
pub(crate) fn js_error_message(value: &JsValue) -> String {
    if let Some(s) = value.as_string() {
        return s;
    }
    js_sys::Reflect::get(value, &JsValue::from_str("message"))
        .ok()
        .and_then(|m| m.as_string())
        .unwrap_or_else(|| format!("{value:?}"))
}

pub(crate) fn to_js_error(error: SdkError) -> JsValue {
    let err = js_sys::Error::new(&error.to_string());
    let kind = format!("{:?}", error.kind());
    let _ = js_sys::Reflect::set(&err, &JsValue::from_str("kind"), &JsValue::from_str(&kind));
    err.into()
}
