//! Storage key registry
//!
//! Every persisted record lives under `{namespace}.{...}`, one logical record per key.
//! Builders keep the layout in one place so connectors, the manager and the
//! social provider never disagree on spelling.

/// Default namespace prefix for all keys.
pub const DEFAULT_NAMESPACE: &str = "crosswallet";

/// Connection manager keys
pub mod manager {
    pub const RECENT_CONNECTOR: &str = "recentConnectorId";

    pub fn recent_connector(namespace: &str) -> String {
        format!("{namespace}.{RECENT_CONNECTOR}")
    }
}

/// Per-connector keys
pub mod connector {
    pub const ACCOUNT: &str = "account";
    pub const CHAIN_ID: &str = "chainId";

    pub fn prefix(namespace: &str, id: &str) -> String {
        format!("{namespace}.connector.{id}.")
    }

    pub fn account(namespace: &str, id: &str) -> String {
        format!("{}{ACCOUNT}", prefix(namespace, id))
    }

    pub fn chain_id(namespace: &str, id: &str) -> String {
        format!("{}{CHAIN_ID}", prefix(namespace, id))
    }
}

/// Per-social-provider keys
pub mod social {
    pub const IDENTITY: &str = "identity";
    pub const ADDRESS: &str = "address";
    pub const PRIVATE_KEY: &str = "privateKey";

    pub fn prefix(namespace: &str, provider: &str) -> String {
        format!("{namespace}.social.{provider}.")
    }

    pub fn identity(namespace: &str, provider: &str) -> String {
        format!("{}{IDENTITY}", prefix(namespace, provider))
    }

    pub fn address(namespace: &str, provider: &str) -> String {
        format!("{}{ADDRESS}", prefix(namespace, provider))
    }

    pub fn private_key(namespace: &str, provider: &str) -> String {
        format!("{}{PRIVATE_KEY}", prefix(namespace, provider))
    }
}
