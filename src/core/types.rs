//! Data model shared by connectors, the manager and the bindings.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NativeCurrency {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

/// Chain metadata supplied when a connector is registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chain {
    pub id: u64,
    pub name: String,
    pub native_currency: NativeCurrency,
    pub rpc_urls: Vec<String>,
}

impl Chain {
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            native_currency: NativeCurrency { name: "Ether".into(), symbol: "ETH".into(), decimals: 18 },
            rpc_urls: Vec::new(),
        }
    }

    pub fn with_rpc_url(mut self, url: impl Into<String>) -> Self {
        self.rpc_urls.push(url.into());
        self
    }

    pub fn with_native_currency(mut self, currency: NativeCurrency) -> Self {
        self.native_currency = currency;
        self
    }

    pub fn mainnet() -> Self {
        Self::new(1, "Ethereum").with_rpc_url("https://cloudflare-eth.com")
    }

    pub fn sepolia() -> Self {
        Self::new(11_155_111, "Sepolia")
            .with_native_currency(NativeCurrency {
                name: "Sepolia Ether".into(),
                symbol: "ETH".into(),
                decimals: 18,
            })
            .with_rpc_url("https://rpc.sepolia.org")
    }

    /// `0x`-prefixed hex id, as EIP-1193 providers expect.
    pub fn hex_id(&self) -> String {
        format!("{:#x}", self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorDescriptor {
    pub id: String,
    pub display_name: String,
    pub ready: bool,
}

/// Account of the active connection. Absent whenever disconnected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletAccount {
    pub address: String,
    pub chain_id: u64,
    pub is_connected: bool,
    pub connector_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ens_name: Option<String>,
}

impl WalletAccount {
    pub fn new(address: impl Into<String>, chain_id: u64, connector_id: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            chain_id,
            is_connected: true,
            connector_id: connector_id.into(),
            balance: None,
            ens_name: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionStatus {
    Disconnected,
    Reconnecting,
    Connecting,
    Connected,
}

/// Canonical connection state, written only by the connection manager.
///
/// `is_disconnected == account.is_none()` holds for every value the
/// constructors below produce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletState {
    pub account: Option<WalletAccount>,
    pub is_connecting: bool,
    pub is_reconnecting: bool,
    pub is_disconnected: bool,
    pub pending_connector_id: Option<String>,
    pub error: Option<String>,
}

impl Default for WalletState {
    fn default() -> Self {
        Self::disconnected()
    }
}

impl WalletState {
    pub fn disconnected() -> Self {
        Self {
            account: None,
            is_connecting: false,
            is_reconnecting: false,
            is_disconnected: true,
            pending_connector_id: None,
            error: None,
        }
    }

    pub fn connecting(connector_id: &str) -> Self {
        Self {
            is_connecting: true,
            pending_connector_id: Some(connector_id.to_string()),
            ..Self::disconnected()
        }
    }

    pub fn reconnecting(connector_id: &str) -> Self {
        Self {
            is_reconnecting: true,
            pending_connector_id: Some(connector_id.to_string()),
            ..Self::disconnected()
        }
    }

    pub fn connected(account: WalletAccount) -> Self {
        Self {
            account: Some(account),
            is_connecting: false,
            is_reconnecting: false,
            is_disconnected: false,
            pending_connector_id: None,
            error: None,
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        if self.is_reconnecting {
            ConnectionStatus::Reconnecting
        } else if self.is_connecting {
            ConnectionStatus::Connecting
        } else if self.account.is_some() {
            ConnectionStatus::Connected
        } else {
            ConnectionStatus::Disconnected
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_invariants() {
        let states = [
            WalletState::disconnected(),
            WalletState::connecting("mock"),
            WalletState::reconnecting("mock"),
            WalletState::connected(WalletAccount::new("0xabc", 1, "mock")),
        ];
        for state in &states {
            assert_eq!(state.is_disconnected, state.account.is_none());
            assert!(!(state.is_connecting && state.is_reconnecting));
        }
        assert_eq!(states[0].status(), ConnectionStatus::Disconnected);
        assert_eq!(states[1].status(), ConnectionStatus::Connecting);
        assert_eq!(states[2].status(), ConnectionStatus::Reconnecting);
        assert_eq!(states[3].status(), ConnectionStatus::Connected);
    }

    #[test]
    fn test_chain_hex_id() {
        assert_eq!(Chain::mainnet().hex_id(), "0x1");
        assert_eq!(Chain::sepolia().hex_id(), "0xaa36a7");
    }

    #[test]
    fn test_account_serializes_camel_case() {
        let json = serde_json::to_value(WalletAccount::new("0xabc", 1, "mock")).unwrap();
        assert_eq!(json["chainId"], 1);
        assert_eq!(json["isConnected"], true);
        assert_eq!(json["connectorId"], "mock");
        assert!(json.get("ensName").is_none());
    }
}
