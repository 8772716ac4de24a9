//! EIP-1193 style wallet provider contract.
//!
//! Injected browser wallets, mobile bridges and the in-memory mock all sit
//! behind `WalletProvider`; the wallet connector only speaks JSON-RPC to it.

use async_trait::async_trait;
use serde_json::Value;

use crate::core::events::{Listener, ListenerId};
use crate::error::{SdkError, SdkResult};

/// JSON-RPC methods used by the wallet connector.
pub mod methods {
    pub const REQUEST_ACCOUNTS: &str = "eth_requestAccounts";
    pub const ACCOUNTS: &str = "eth_accounts";
    pub const CHAIN_ID: &str = "eth_chainId";
    pub const SWITCH_CHAIN: &str = "wallet_switchEthereumChain";
    pub const ADD_CHAIN: &str = "wallet_addEthereumChain";
    pub const PERSONAL_SIGN: &str = "personal_sign";
    pub const REVOKE_PERMISSIONS: &str = "wallet_revokePermissions";
}

/// Chain id unknown to the wallet; add it first.
pub const CHAIN_NOT_ADDED_CODE: i64 = 4902;
pub const UNAUTHORIZED_CODE: i64 = 4100;
pub const UNSUPPORTED_METHOD_CODE: i64 = 4200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    AccountsChanged(Vec<String>),
    ChainChanged(u64),
    Disconnect { code: i64, message: String },
}

#[async_trait(?Send)]
pub trait WalletProvider {
    /// Errors are `SdkError::Provider { code, message }` with EIP-1193 codes.
    async fn request(&self, method: &str, params: Value) -> SdkResult<Value>;
    fn subscribe(&self, listener: Listener<ProviderEvent>) -> ListenerId;
    fn unsubscribe(&self, id: ListenerId) -> bool;
}

/// Accepts `"0x1"`, `"1"` or `1`.
pub fn parse_chain_id(value: &Value) -> SdkResult<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| SdkError::Provider { code: -32602, message: format!("bad chain id: {n}") }),
        Value::String(s) => {
            let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                Some(hex) => u64::from_str_radix(hex, 16),
                None => s.parse::<u64>(),
            };
            parsed.map_err(|_| SdkError::Provider { code: -32602, message: format!("bad chain id: {s}") })
        }
        other => Err(SdkError::Provider { code: -32602, message: format!("bad chain id: {other}") }),
    }
}

pub fn parse_accounts(value: &Value) -> SdkResult<Vec<String>> {
    let list = value
        .as_array()
        .ok_or_else(|| SdkError::Provider { code: -32602, message: "accounts must be an array".into() })?;
    Ok(list.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_chain_id_forms() {
        assert_eq!(parse_chain_id(&json!("0x1")).unwrap(), 1);
        assert_eq!(parse_chain_id(&json!("0xaa36a7")).unwrap(), 11_155_111);
        assert_eq!(parse_chain_id(&json!("137")).unwrap(), 137);
        assert_eq!(parse_chain_id(&json!(10)).unwrap(), 10);
        assert!(parse_chain_id(&json!("0xzz")).is_err());
        assert!(parse_chain_id(&json!(null)).is_err());
    }

    #[test]
    fn test_parse_accounts() {
        assert_eq!(parse_accounts(&json!(["0xa", "0xb"])).unwrap(), vec!["0xa", "0xb"]);
        assert!(parse_accounts(&json!({})).is_err());
    }
}
