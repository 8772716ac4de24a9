//! Random bytes and hashing
//!
//! `SecureCrypto` is backed by OS / Web Crypto entropy and SHA-256.
//! `InsecureCrypto` exists only so a bare runtime keeps working; it reports
//! `CryptoStrength::Insecure` and must not back production credentials.

use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::cell::Cell;

use crate::error::{Capability, SdkError, SdkResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CryptoStrength {
    Secure,
    Insecure,
}

pub trait CryptoProvider {
    fn strength(&self) -> CryptoStrength;
    fn generate_random_bytes(&self, len: usize) -> SdkResult<Vec<u8>>;
    /// 32-byte digest. Deterministic for a given provider kind.
    fn hash(&self, data: &[u8]) -> [u8; 32];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RandomSource {
    /// Platform-native entropy (`getrandom`: OS or `crypto.getRandomValues`).
    Os,
    /// Thread-local CSPRNG, the headless secondary.
    ThreadLocal,
}

#[derive(Debug, Clone)]
pub struct SecureCrypto {
    source: RandomSource,
}

impl SecureCrypto {
    pub fn new(source: RandomSource) -> Self {
        Self { source }
    }

    pub fn source(&self) -> RandomSource {
        self.source
    }
}

impl CryptoProvider for SecureCrypto {
    fn strength(&self) -> CryptoStrength {
        CryptoStrength::Secure
    }

    fn generate_random_bytes(&self, len: usize) -> SdkResult<Vec<u8>> {
        let mut out = vec![0u8; len];
        match self.source {
            RandomSource::Os => OsRng
                .try_fill_bytes(&mut out)
                .map_err(|e| SdkError::unavailable(Capability::Crypto, e.to_string()))?,
            RandomSource::ThreadLocal => rand::thread_rng()
                .try_fill_bytes(&mut out)
                .map_err(|e| SdkError::unavailable(Capability::Crypto, e.to_string()))?,
        }
        Ok(out)
    }

    fn hash(&self, data: &[u8]) -> [u8; 32] {
        Sha256::digest(data).into()
    }
}

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// xorshift64* generator and FNV-1a hash. Not cryptographically secure.
#[derive(Debug)]
pub struct InsecureCrypto {
    state: Cell<u64>,
}

impl InsecureCrypto {
    pub fn with_seed(seed: u64) -> Self {
        // xorshift state must be non-zero
        Self { state: Cell::new(if seed == 0 { FNV_OFFSET } else { seed }) }
    }

    pub fn from_clock() -> Self {
        let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default() as u64;
        Self::with_seed(nanos)
    }

    fn next_u64(&self) -> u64 {
        let mut x = self.state.get();
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state.set(x);
        x.wrapping_mul(0x2545_f491_4f6c_dd1d)
    }
}

impl CryptoProvider for InsecureCrypto {
    fn strength(&self) -> CryptoStrength {
        CryptoStrength::Insecure
    }

    fn generate_random_bytes(&self, len: usize) -> SdkResult<Vec<u8>> {
        let mut out = Vec::with_capacity(len + 8);
        while out.len() < len {
            out.extend_from_slice(&self.next_u64().to_le_bytes());
        }
        out.truncate(len);
        Ok(out)
    }

    fn hash(&self, data: &[u8]) -> [u8; 32] {
        let mut out = [0u8; 32];
        for (lane, chunk) in out.chunks_mut(8).enumerate() {
            let mut h = FNV_OFFSET ^ (lane as u64).wrapping_mul(FNV_PRIME);
            for byte in data {
                h ^= u64::from(*byte);
                h = h.wrapping_mul(FNV_PRIME);
            }
            chunk.copy_from_slice(&h.to_be_bytes());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secure_random_lengths() {
        for source in [RandomSource::Os, RandomSource::ThreadLocal] {
            let crypto = SecureCrypto::new(source);
            let a = crypto.generate_random_bytes(32).unwrap();
            let b = crypto.generate_random_bytes(32).unwrap();
            assert_eq!(a.len(), 32);
            assert_ne!(a, b);
        }
    }

    #[test]
    fn test_secure_hash_is_sha256() {
        let crypto = SecureCrypto::new(RandomSource::Os);
        assert_eq!(
            hex::encode(crypto.hash(b"abc")),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(crypto.strength(), CryptoStrength::Secure);
    }

    #[test]
    fn test_insecure_crypto_is_flagged_and_deterministic() {
        let a = InsecureCrypto::with_seed(42);
        let b = InsecureCrypto::with_seed(42);
        assert_eq!(a.strength(), CryptoStrength::Insecure);
        assert_eq!(a.generate_random_bytes(13).unwrap(), b.generate_random_bytes(13).unwrap());
        assert_eq!(a.hash(b"same"), b.hash(b"same"));
        assert_ne!(a.hash(b"same"), a.hash(b"other"));
    }

    #[test]
    fn test_insecure_zero_seed() {
        let crypto = InsecureCrypto::with_seed(0);
        let bytes = crypto.generate_random_bytes(16).unwrap();
        assert!(bytes.iter().any(|b| *b != 0));
    }
}
