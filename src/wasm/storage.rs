//! `window.localStorage` backend.

use async_trait::async_trait;
use web_sys::Storage;

use super::js_error_message;
use crate::capability::KeyValueStorage;
use crate::error::{Capability, SdkError, SdkResult};

pub struct BrowserStorage {
    storage: Storage,
}

impl BrowserStorage {
    pub fn open() -> SdkResult<Self> {
        let window = web_sys::window().ok_or_else(|| SdkError::unavailable(Capability::Storage, "no window"))?;
        let storage = window
            .local_storage()
            .map_err(|e| SdkError::unavailable(Capability::Storage, js_error_message(&e)))?
            .ok_or_else(|| SdkError::unavailable(Capability::Storage, "localStorage disabled"))?;
        Ok(Self { storage })
    }
}

#[async_trait(?Send)]
impl KeyValueStorage for BrowserStorage {
    async fn get_item(&self, key: &str) -> SdkResult<Option<String>> {
        self.storage.get_item(key).map_err(|e| SdkError::Storage(js_error_message(&e)))
    }

    async fn set_item(&self, key: &str, value: &str) -> SdkResult<()> {
        // QuotaExceededError lands here
        self.storage.set_item(key, value).map_err(|e| SdkError::Storage(js_error_message(&e)))
    }

    async fn remove_item(&self, key: &str) -> SdkResult<()> {
        self.storage.remove_item(key).map_err(|e| SdkError::Storage(js_error_message(&e)))
    }

    async fn keys_with_prefix(&self, prefix: &str) -> SdkResult<Vec<String>> {
        let len = self.storage.length().map_err(|e| SdkError::Storage(js_error_message(&e)))?;
        let mut keys = Vec::new();
        for i in 0..len {
            if let Ok(Some(key)) = self.storage.key(i) {
                if key.starts_with(prefix) {
                    keys.push(key);
                }
            }
        }
        Ok(keys)
    }

    fn is_persistent(&self) -> bool {
        true
    }
}
