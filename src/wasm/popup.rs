//! `window.open` popup host with a `message` listener on the opener.

use futures::channel::mpsc;
use serde_json::Value;
use wasm_bindgen::closure::Closure;
use wasm_bindgen::JsCast;
use web_sys::{MessageEvent, Window};

use super::js_error_message;
use crate::error::{Capability, SdkError, SdkResult};
use crate::social::{OpenedPopup, PopupHost, PopupWindow, PostedMessage};

const POPUP_FEATURES: &str = "width=500,height=650,popup=yes";

pub struct BrowserPopupHost {
    window: Window,
}

impl BrowserPopupHost {
    pub fn new() -> SdkResult<Self> {
        let window = web_sys::window().ok_or_else(|| SdkError::unavailable(Capability::Popup, "no window"))?;
        Ok(Self { window })
    }
}

impl PopupHost for BrowserPopupHost {
    fn origin(&self) -> String {
        self.window.location().origin().unwrap_or_default()
    }

    fn open(&self, url: &str, name: &str) -> SdkResult<OpenedPopup> {
        let popup = self
            .window
            .open_with_url_and_target_and_features(url, name, POPUP_FEATURES)
            .map_err(|_| SdkError::PopupBlocked)?
            .ok_or(SdkError::PopupBlocked)?;

        let (tx, rx) = mpsc::unbounded();
        let listener = Closure::<dyn FnMut(MessageEvent)>::new(move |event: MessageEvent| {
            let data: Value = serde_wasm_bindgen::from_value(event.data()).unwrap_or(Value::Null);
            let _ = tx.unbounded_send(PostedMessage { origin: event.origin(), data });
        });
        if let Err(e) = self
            .window
            .add_event_listener_with_callback("message", listener.as_ref().unchecked_ref())
        {
            let _ = popup.close();
            return Err(SdkError::unavailable(Capability::Popup, js_error_message(&e)));
        }

        let window = BrowserPopupWindow { popup, opener: self.window.clone(), listener };
        Ok(OpenedPopup { window: Box::new(window), messages: rx })
    }
}

struct BrowserPopupWindow {
    popup: Window,
    opener: Window,
    listener: Closure<dyn FnMut(MessageEvent)>,
}

impl PopupWindow for BrowserPopupWindow {
    fn is_closed(&self) -> bool {
        self.popup.closed().unwrap_or(true)
    }

    fn close(&self) {
        let _ = self.popup.close();
    }
}

impl Drop for BrowserPopupWindow {
    fn drop(&mut self) {
        let _ = self
            .opener
            .remove_event_listener_with_callback("message", self.listener.as_ref().unchecked_ref());
    }
}
