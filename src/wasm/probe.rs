//! Feature probes against `globalThis`.

use js_sys::Reflect;
use wasm_bindgen::{JsCast, JsValue};

use crate::runtime::EnvironmentProbe;

fn has(target: &JsValue, name: &str) -> bool {
    Reflect::has(target, &JsValue::from_str(name)).unwrap_or(false)
}

fn get(target: &JsValue, name: &str) -> Option<JsValue> {
    Reflect::get(target, &JsValue::from_str(name)).ok().filter(|v| !v.is_undefined() && !v.is_null())
}

fn local_storage_usable() -> bool {
    // Access throws in some privacy modes.
    web_sys::window()
        .and_then(|w| w.local_storage().ok().flatten())
        .map(|s| s.length().is_ok())
        .unwrap_or(false)
}

pub fn detect() -> EnvironmentProbe {
    let global: JsValue = js_sys::global().into();

    let browser_global = has(&global, "window") && has(&global, "document");
    let mobile_native_global = has(&global, "ReactNativeWebView")
        || get(&global, "navigator")
            .and_then(|n| get(&n, "product"))
            .and_then(|p| p.as_string())
            .is_some_and(|p| p == "ReactNative");
    let secure_random = get(&global, "crypto")
        .map(|c| has(&c, "getRandomValues"))
        .unwrap_or(false);
    let server_random = get(&global, "process")
        .and_then(|p| get(&p, "versions"))
        .map(|v| has(&v, "node"))
        .unwrap_or(false);
    let native_fetch = get(&global, "fetch").is_some_and(|f| f.is_instance_of::<js_sys::Function>());
    let open_url = (browser_global && has(&global, "open")) || has(&global, "ReactNativeWebView");

    EnvironmentProbe {
        browser_global,
        mobile_native_global,
        persistent_storage: browser_global && local_storage_usable(),
        secure_random,
        server_random,
        native_fetch,
        open_url,
    }
}
