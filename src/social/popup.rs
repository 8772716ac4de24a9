//! Authorization popup and its watchdog.
//!
//! Waiting on a popup resolves exactly one of three ways: a protocol message
//! from the expected origin, the window found closed on a watchdog tick, or the
//! login timeout. The window is closed on every path.

use futures::channel::mpsc;
use futures::{select_biased, FutureExt, StreamExt};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::oauth::{OAuthMessage, OAuthSuccess};
use crate::capability::Timer;
use crate::error::{SdkError, SdkResult};

/// A `message` event delivered to the opener.
#[derive(Debug, Clone, PartialEq)]
pub struct PostedMessage {
    pub origin: String,
    pub data: Value,
}

pub trait PopupWindow {
    fn is_closed(&self) -> bool;
    fn close(&self);
}

/// An open popup and the opener's message stream while it lives.
pub struct OpenedPopup {
    pub window: Box<dyn PopupWindow>,
    pub messages: mpsc::UnboundedReceiver<PostedMessage>,
}

/// Something that can open an authorization window: a browser, a web view, a test fake.
pub trait PopupHost {
    /// Origin that legitimate callback messages carry.
    fn origin(&self) -> String;

    /// Fails with `SdkError::PopupBlocked` when the window cannot be opened.
    fn open(&self, url: &str, name: &str) -> SdkResult<OpenedPopup>;
}

enum Wake {
    Message(Option<PostedMessage>),
    Tick,
}

/// Wait for the callback, polling `is_closed` every `poll_interval`.
///
/// The watchdog tick is armed once and only re-armed after it fires, so a
/// busy message channel cannot postpone the closed-window check or the timeout.
pub async fn await_callback(
    popup: OpenedPopup,
    expected_origin: &str,
    timer: &dyn Timer,
    poll_interval: Duration,
    timeout: Duration,
) -> SdkResult<OAuthSuccess> {
    let OpenedPopup { window, mut messages } = popup;
    let mut waited = Duration::ZERO;
    let mut tick = timer.sleep(poll_interval).fuse();

    let outcome = loop {
        let wake = select_biased! {
            _ = tick => Wake::Tick,
            message = messages.next() => Wake::Message(message),
        };

        match wake {
            Wake::Message(Some(message)) => {
                if let Some(result) = accept(message, expected_origin) {
                    break result;
                }
            }
            // Host dropped its listener, so nothing can arrive any more.
            Wake::Message(None) => break Err(SdkError::UserCancelled("login cancelled".into())),
            Wake::Tick => {
                if window.is_closed() {
                    // The callback may have been posted just before the window closed.
                    break drain(&mut messages, expected_origin)
                        .unwrap_or_else(|| Err(SdkError::UserCancelled("login cancelled".into())));
                }
                waited += poll_interval;
                if waited >= timeout {
                    break Err(SdkError::LoginTimeout(timeout.as_millis() as u64));
                }
                tick = timer.sleep(poll_interval).fuse();
            }
        }
    };

    window.close();
    outcome
}

/// `None` when the message is not for us.
fn accept(message: PostedMessage, expected_origin: &str) -> Option<SdkResult<OAuthSuccess>> {
    if message.origin != expected_origin {
        debug!(origin = %message.origin, "ignoring message from foreign origin");
        return None;
    }
    match OAuthMessage::parse(&message.data) {
        Some(OAuthMessage::Success { payload }) => Some(Ok(payload)),
        Some(OAuthMessage::Error { error }) => Some(Err(callback_error(error))),
        None => {
            debug!("ignoring non-protocol message");
            None
        }
    }
}

fn drain(messages: &mut mpsc::UnboundedReceiver<PostedMessage>, expected_origin: &str) -> Option<SdkResult<OAuthSuccess>> {
    while let Ok(Some(message)) = messages.try_next() {
        if let Some(result) = accept(message, expected_origin) {
            return Some(result);
        }
    }
    None
}

fn callback_error(error: String) -> SdkError {
    match error.as_str() {
        "access_denied" | "user_cancelled" | "cancelled" => SdkError::UserCancelled(error),
        _ => SdkError::OAuth(error),
    }
}
