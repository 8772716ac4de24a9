//! Deterministic wallet credentials from a social identity.
//!
//! ```text
//! seed    = hash(user_id ":" email ":" app_secret)
//! round 0 = seed
//! round n = hash(seed || n)          while the digest is not a valid scalar
//! address = EIP-55(keccak256(pubkey)[12..])
//! ```
//!
//! No network, no randomness: the same identity and secret always yield the
//! same key. The hash comes from the capability adapter, so on the insecure
//! fallback the derivation still works but the session is flagged.

use k256::ecdsa::SigningKey;
use serde::Serialize;
use std::fmt;
use zeroize::Zeroizing;

use crate::capability::CryptoProvider;
use crate::connector::signer::LocalSigner;
use crate::core::address::address_from_verifying_key;
use crate::error::{SdkError, SdkResult};

/// Address plus secret key. The key never leaves this process.
#[derive(Clone, Serialize)]
pub struct DerivedWalletCredential {
    pub address: String,
    #[serde(skip)]
    private_key: Zeroizing<[u8; 32]>,
}

impl fmt::Debug for DerivedWalletCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedWalletCredential")
            .field("address", &self.address)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

impl PartialEq for DerivedWalletCredential {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address && *self.private_key == *other.private_key
    }
}

impl Eq for DerivedWalletCredential {}

impl DerivedWalletCredential {
    pub fn private_key_bytes(&self) -> &[u8; 32] {
        &self.private_key
    }

    pub fn private_key_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(format!("0x{}", hex::encode(*self.private_key)))
    }

    pub fn signer(&self) -> SdkResult<LocalSigner> {
        LocalSigner::from_bytes(&self.private_key)
    }
}

pub fn derive_credential(
    hasher: &dyn CryptoProvider,
    user_id: &str,
    email: Option<&str>,
    app_secret: &str,
) -> SdkResult<DerivedWalletCredential> {
    if app_secret.is_empty() {
        return Err(SdkError::configuration("app secret must not be empty"));
    }
    let material = Zeroizing::new(format!("{}:{}:{}", user_id, email.unwrap_or_default(), app_secret));
    let seed = Zeroizing::new(hasher.hash(material.as_bytes()));

    for round in 0..=255u8 {
        let digest = if round == 0 {
            Zeroizing::new(*seed)
        } else {
            let mut input = Zeroizing::new(seed.to_vec());
            input.push(round);
            Zeroizing::new(hasher.hash(&input))
        };

        // Zero or >= curve order: not a scalar, try the next round.
        let Ok(key) = SigningKey::from_slice(&digest[..]) else {
            continue;
        };
        let address = address_from_verifying_key(key.verifying_key())?;
        return Ok(DerivedWalletCredential { address, private_key: digest });
    }

    Err(SdkError::Crypto("credential derivation failed after 256 rounds".into()))
}
