//! In-memory wallet provider for tests, demos and server-side rendering.
//!
//! Behaves like a well-mannered injected wallet: accounts are hidden until
//! `eth_requestAccounts`, unknown chains answer 4902, and state changes are
//! announced through provider events.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::cell::RefCell;
use std::collections::BTreeSet;

use super::provider::{
    methods, parse_chain_id, ProviderEvent, WalletProvider, CHAIN_NOT_ADDED_CODE,
    UNSUPPORTED_METHOD_CODE,
};
use crate::core::address::{eip191_hash, keccak256};
use crate::core::events::{EventEmitter, Listener, ListenerId};
use crate::error::{SdkError, SdkResult};

#[derive(Debug)]
struct MockState {
    accounts: Vec<String>,
    chain_id: u64,
    authorized: bool,
    known_chains: BTreeSet<u64>,
    reject_next: Option<(i64, String)>,
    requests: Vec<String>,
}

pub struct MockWalletProvider {
    state: RefCell<MockState>,
    emitter: EventEmitter<ProviderEvent>,
}

impl MockWalletProvider {
    pub fn new(address: impl Into<String>, chain_id: u64) -> Self {
        Self {
            state: RefCell::new(MockState {
                accounts: vec![address.into()],
                chain_id,
                authorized: false,
                known_chains: BTreeSet::from([chain_id]),
                reject_next: None,
                requests: Vec::new(),
            }),
            emitter: EventEmitter::new(),
        }
    }

    /// Start out as if the user already approved this site.
    pub fn authorized(self) -> Self {
        self.state.borrow_mut().authorized = true;
        self
    }

    pub fn with_chains(self, chain_ids: impl IntoIterator<Item = u64>) -> Self {
        self.state.borrow_mut().known_chains.extend(chain_ids);
        self
    }

    /// Fail the next request with this EIP-1193 error.
    pub fn reject_next(&self, code: i64, message: impl Into<String>) {
        self.state.borrow_mut().reject_next = Some((code, message.into()));
    }

    pub fn set_authorized(&self, authorized: bool) {
        self.state.borrow_mut().authorized = authorized;
    }

    pub fn is_authorized(&self) -> bool {
        self.state.borrow().authorized
    }

    pub fn chain_id(&self) -> u64 {
        self.state.borrow().chain_id
    }

    /// Methods requested so far, oldest first.
    pub fn requests(&self) -> Vec<String> {
        self.state.borrow().requests.clone()
    }

    /// Simulate the wallet switching accounts from its own UI.
    pub async fn change_accounts(&self, accounts: Vec<String>) {
        self.state.borrow_mut().accounts = accounts.clone();
        self.emitter.emit(ProviderEvent::AccountsChanged(accounts)).await;
    }

    /// Simulate the wallet switching chains from its own UI.
    pub async fn change_chain(&self, chain_id: u64) {
        {
            let mut state = self.state.borrow_mut();
            state.chain_id = chain_id;
            state.known_chains.insert(chain_id);
        }
        self.emitter.emit(ProviderEvent::ChainChanged(chain_id)).await;
    }

    pub async fn disconnect_from_wallet(&self) {
        self.state.borrow_mut().authorized = false;
        self.emitter
            .emit(ProviderEvent::Disconnect { code: 4900, message: "wallet disconnected".into() })
            .await;
    }

    fn target_chain(params: &Value) -> SdkResult<u64> {
        parse_chain_id(&params[0]["chainId"])
    }
}

#[async_trait(?Send)]
impl WalletProvider for MockWalletProvider {
    async fn request(&self, method: &str, params: Value) -> SdkResult<Value> {
        let rejection = {
            let mut state = self.state.borrow_mut();
            state.requests.push(method.to_string());
            state.reject_next.take()
        };
        if let Some((code, message)) = rejection {
            return Err(SdkError::Provider { code, message });
        }

        match method {
            methods::REQUEST_ACCOUNTS => {
                let mut state = self.state.borrow_mut();
                state.authorized = true;
                Ok(json!(state.accounts))
            }
            methods::ACCOUNTS => {
                let state = self.state.borrow();
                let visible: Vec<String> = if state.authorized { state.accounts.clone() } else { Vec::new() };
                Ok(json!(visible))
            }
            methods::CHAIN_ID => Ok(json!(format!("{:#x}", self.state.borrow().chain_id))),
            methods::SWITCH_CHAIN => {
                let target = Self::target_chain(&params)?;
                let changed = {
                    let mut state = self.state.borrow_mut();
                    if !state.known_chains.contains(&target) {
                        return Err(SdkError::Provider {
                            code: CHAIN_NOT_ADDED_CODE,
                            message: format!("unrecognized chain {target:#x}"),
                        });
                    }
                    let changed = state.chain_id != target;
                    state.chain_id = target;
                    changed
                };
                if changed {
                    self.emitter.emit(ProviderEvent::ChainChanged(target)).await;
                }
                Ok(Value::Null)
            }
            methods::ADD_CHAIN => {
                let target = Self::target_chain(&params)?;
                self.state.borrow_mut().known_chains.insert(target);
                Ok(Value::Null)
            }
            methods::PERSONAL_SIGN => {
                let message = params[0].as_str().unwrap_or_default();
                let bytes = hex::decode(message.trim_start_matches("0x")).unwrap_or_else(|_| message.as_bytes().to_vec());
                // Deterministic stand-in, 65 bytes like a real signature.
                let digest = eip191_hash(&bytes);
                let mut sig = digest.to_vec();
                sig.extend_from_slice(&keccak256(&digest));
                sig.push(27);
                Ok(json!(format!("0x{}", hex::encode(sig))))
            }
            methods::REVOKE_PERMISSIONS => {
                self.state.borrow_mut().authorized = false;
                Ok(Value::Null)
            }
            other => Err(SdkError::Provider {
                code: UNSUPPORTED_METHOD_CODE,
                message: format!("unsupported method {other}"),
            }),
        }
    }

    fn subscribe(&self, listener: Listener<ProviderEvent>) -> ListenerId {
        self.emitter.subscribe(listener)
    }

    fn unsubscribe(&self, id: ListenerId) -> bool {
        self.emitter.unsubscribe(id)
    }
}
