//! Runtime detection
//!
//! Probes the host for the primitives the capability adapter needs. The probe
//! is a plain value so tests and SSR shims can hand in their own.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RuntimeKind {
    Browser,
    ServerRendered,
    MobileNative,
}

impl RuntimeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuntimeKind::Browser => "browser",
            RuntimeKind::ServerRendered => "server",
            RuntimeKind::MobileNative => "mobile",
        }
    }
}

/// What the current host offers. `false` everywhere means a bare runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EnvironmentProbe {
    pub browser_global: bool,
    pub mobile_native_global: bool,
    pub persistent_storage: bool,
    /// Platform-native secure random (Web Crypto, OS entropy).
    pub secure_random: bool,
    /// Secondary random source of a headless runtime.
    pub server_random: bool,
    pub native_fetch: bool,
    /// Can open an external URL / web view (needed by social login).
    pub open_url: bool,
}

impl EnvironmentProbe {
    /// Probe the running host.
    pub fn detect() -> Self {
        #[cfg(all(feature = "wasm", target_arch = "wasm32"))]
        {
            crate::wasm::probe::detect()
        }
        #[cfg(not(all(feature = "wasm", target_arch = "wasm32")))]
        {
            detect_native()
        }
    }

    /// Browser global first, then mobile-native global, otherwise server-rendered.
    pub fn runtime_kind(&self) -> RuntimeKind {
        if self.browser_global {
            RuntimeKind::Browser
        } else if self.mobile_native_global {
            RuntimeKind::MobileNative
        } else {
            RuntimeKind::ServerRendered
        }
    }
}

#[cfg(not(all(feature = "wasm", target_arch = "wasm32")))]
fn detect_native() -> EnvironmentProbe {
    use rand::RngCore;

    let mut buf = [0u8; 8];
    let os_random = rand::rngs::OsRng.try_fill_bytes(&mut buf).is_ok();

    EnvironmentProbe {
        browser_global: false,
        mobile_native_global: cfg!(any(target_os = "android", target_os = "ios")),
        persistent_storage: cfg!(feature = "native"),
        secure_random: os_random,
        // thread_rng reseeds from the same OS source
        server_random: os_random,
        native_fetch: cfg!(feature = "native"),
        open_url: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_kind_precedence() {
        let browser = EnvironmentProbe { browser_global: true, mobile_native_global: true, ..Default::default() };
        assert_eq!(browser.runtime_kind(), RuntimeKind::Browser);

        let mobile = EnvironmentProbe { mobile_native_global: true, ..Default::default() };
        assert_eq!(mobile.runtime_kind(), RuntimeKind::MobileNative);

        assert_eq!(EnvironmentProbe::default().runtime_kind(), RuntimeKind::ServerRendered);
    }

    #[cfg(feature = "native")]
    #[test]
    fn test_detect_native_host() {
        let probe = EnvironmentProbe::detect();
        assert!(!probe.browser_global);
        assert!(probe.secure_random);
        assert!(probe.native_fetch);
    }
}
