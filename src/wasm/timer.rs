//! `setTimeout` as a future. Works in windows and workers alike.

use async_trait::async_trait;
use js_sys::{Function, Promise, Reflect};
use std::time::Duration;
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;

use super::log;
use crate::capability::Timer;

#[derive(Debug, Clone, Copy, Default)]
pub struct JsTimer;

#[async_trait(?Send)]
impl Timer for JsTimer {
    async fn sleep(&self, duration: Duration) {
        let ms = duration.as_millis().min(i32::MAX as u128) as f64;
        let promise = Promise::new(&mut |resolve, _reject| {
            let set_timeout = Reflect::get(&js_sys::global(), &JsValue::from_str("setTimeout"))
                .ok()
                .and_then(|f| f.dyn_into::<Function>().ok());
            match set_timeout {
                Some(set_timeout) => {
                    let _ = set_timeout.call2(&JsValue::NULL, &resolve, &JsValue::from_f64(ms));
                }
                None => {
                    // No timer at all: resolve now rather than hang forever.
                    let _ = resolve.call0(&JsValue::NULL);
                }
            }
        });
        if let Err(e) = JsFuture::from(promise).await {
            log!("[JsTimer] sleep failed: {:?}", e);
        }
    }
}
