//! Connection manager configuration - passed from higher layers

/// Manager configuration.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Storage namespace; the adapter's namespace when unset.
    pub namespace: Option<String>,
    /// Resume the last-used connector during `initialize`.
    pub reconnect_on_init: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self { namespace: None, reconnect_on_init: true }
    }
}

impl ManagerConfig {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_namespace(mut self, ns: impl Into<String>) -> Self { self.namespace = Some(ns.into()); self }
    pub fn with_reconnect(mut self, enabled: bool) -> Self { self.reconnect_on_init = enabled; self }
}
