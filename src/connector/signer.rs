//! Message signing for connected accounts.

use k256::ecdsa::SigningKey;
use serde_json::json;
use std::fmt;
use std::rc::Rc;
use zeroize::Zeroizing;

use super::provider::{methods, WalletProvider};
use crate::core::address::{address_from_verifying_key, eip191_hash};
use crate::error::{SdkError, SdkResult};

/// secp256k1 key held in memory; signs EIP-191 personal messages.
pub struct LocalSigner {
    key: SigningKey,
    address: String,
}

impl fmt::Debug for LocalSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalSigner").field("address", &self.address).finish_non_exhaustive()
    }
}

impl LocalSigner {
    pub fn from_bytes(secret: &[u8; 32]) -> SdkResult<Self> {
        let key = SigningKey::from_slice(secret).map_err(|e| SdkError::Crypto(e.to_string()))?;
        let address = address_from_verifying_key(key.verifying_key())?;
        Ok(Self { key, address })
    }

    /// Parse a `0x` hex secret key.
    pub fn from_hex(secret: &str) -> SdkResult<Self> {
        let raw = Zeroizing::new(
            hex::decode(secret.trim_start_matches("0x")).map_err(|e| SdkError::Crypto(e.to_string()))?,
        );
        let bytes: &[u8; 32] = raw
            .as_slice()
            .try_into()
            .map_err(|_| SdkError::Crypto("secret key must be 32 bytes".into()))?;
        Self::from_bytes(bytes)
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// 65-byte `r || s || v` signature, `v` in {27, 28}, as `0x` hex.
    pub fn sign_message(&self, message: &[u8]) -> SdkResult<String> {
        let digest = eip191_hash(message);
        let (signature, recovery_id) = self
            .key
            .sign_prehash_recoverable(&digest)
            .map_err(|e| SdkError::Crypto(e.to_string()))?;
        let mut out = signature.to_bytes().to_vec();
        out.push(recovery_id.to_byte() + 27);
        Ok(format!("0x{}", hex::encode(out)))
    }
}

/// Signer handed out by `Connector::get_signer`.
#[derive(Clone)]
pub enum Signer {
    Local(Rc<LocalSigner>),
    /// Delegates to the wallet via `personal_sign`.
    Injected { provider: Rc<dyn WalletProvider>, address: String },
}

impl fmt::Debug for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signer::Local(local) => f.debug_tuple("Local").field(local).finish(),
            Signer::Injected { address, .. } => f.debug_struct("Injected").field("address", address).finish(),
        }
    }
}

impl Signer {
    pub fn address(&self) -> &str {
        match self {
            Signer::Local(local) => local.address(),
            Signer::Injected { address, .. } => address,
        }
    }

    pub async fn sign_message(&self, message: &[u8]) -> SdkResult<String> {
        match self {
            Signer::Local(local) => local.sign_message(message),
            Signer::Injected { provider, address } => {
                let params = json!([format!("0x{}", hex::encode(message)), address]);
                let value = provider.request(methods::PERSONAL_SIGN, params).await?;
                value
                    .as_str()
                    .map(str::to_string)
                    .ok_or_else(|| SdkError::Provider { code: -32603, message: "signature must be a string".into() })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::mock::MockWalletProvider;
    use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};

    fn key_one() -> LocalSigner {
        let mut secret = [0u8; 32];
        secret[31] = 1;
        LocalSigner::from_bytes(&secret).unwrap()
    }

    #[test]
    fn test_local_signature_recovers_to_address() {
        let signer = key_one();
        let sig = signer.sign_message(b"hello").unwrap();
        let raw = hex::decode(sig.trim_start_matches("0x")).unwrap();
        assert_eq!(raw.len(), 65);
        assert!(raw[64] == 27 || raw[64] == 28);

        let signature = Signature::from_slice(&raw[..64]).unwrap();
        let recid = RecoveryId::from_byte(raw[64] - 27).unwrap();
        let recovered = VerifyingKey::recover_from_prehash(&eip191_hash(b"hello"), &signature, recid).unwrap();
        assert_eq!(address_from_verifying_key(&recovered).unwrap(), signer.address());
    }

    #[test]
    fn test_from_hex_rejects_short_keys() {
        assert!(LocalSigner::from_hex("0x01").is_err());
        let signer = LocalSigner::from_hex(&format!("0x{}01", "00".repeat(31))).unwrap();
        assert_eq!(signer.address(), "0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf");
    }

    #[tokio::test]
    async fn test_injected_signer_uses_personal_sign() {
        let provider = Rc::new(MockWalletProvider::new("0xabc", 1).authorized());
        let signer = Signer::Injected { provider: provider.clone(), address: "0xabc".into() };
        let sig = signer.sign_message(b"hi").await.unwrap();
        assert_eq!(sig.len(), 2 + 130);
        assert_eq!(provider.requests(), vec![methods::PERSONAL_SIGN]);
    }
}
