//! Error taxonomy shared by every component.
//!
//! Each variant maps onto one [`ErrorKind`] so hosting applications can decide
//! whether a failure is a fault, an expected user action, or a degraded runtime.

use std::fmt;

/// Result alias used across the crate.
pub type SdkResult<T> = Result<T, SdkError>;

/// Runtime primitive that can be missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Storage,
    Crypto,
    Network,
    Popup,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Capability::Storage => "storage",
            Capability::Crypto => "crypto",
            Capability::Network => "network",
            Capability::Popup => "popup",
        })
    }
}

/// Coarse classification of [`SdkError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Unknown connector id, unconfigured OAuth provider. Never retried.
    Configuration,
    /// Missing storage/crypto/network/popup primitive.
    CapabilityUnavailable,
    /// Popup closed, request rejected, login timed out.
    UserCancelled,
    /// Fetch failed in transit. Retry policy belongs to the caller.
    TransientNetwork,
    /// Session restore on startup failed. Always non-fatal.
    Reconnection,
    /// Everything else (storage I/O, serialization, key material).
    Internal,
}

#[derive(Debug, thiserror::Error)]
pub enum SdkError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("{capability} unavailable: {reason}")]
    CapabilityUnavailable { capability: Capability, reason: String },

    #[error("user cancelled: {0}")]
    UserCancelled(String),

    #[error("popup blocked")]
    PopupBlocked,

    #[error("login timed out after {0} ms")]
    LoginTimeout(u64),

    #[error("network error: {0}")]
    TransientNetwork(String),

    #[error("not connected")]
    NotConnected,

    #[error("not implemented for this runtime: {0}")]
    NotImplemented(String),

    #[error("provider error {code}: {message}")]
    Provider { code: i64, message: String },

    #[error("oauth error: {0}")]
    OAuth(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("reconnection failed: {0}")]
    Reconnection(String),
}

/// EIP-1193 code for a request the user rejected in their wallet.
pub const USER_REJECTED_CODE: i64 = 4001;

impl SdkError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn unavailable(capability: Capability, reason: impl Into<String>) -> Self {
        Self::CapabilityUnavailable { capability, reason: reason.into() }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            SdkError::Configuration(_) => ErrorKind::Configuration,
            SdkError::CapabilityUnavailable { .. }
            | SdkError::PopupBlocked
            | SdkError::NotImplemented(_) => ErrorKind::CapabilityUnavailable,
            SdkError::UserCancelled(_) | SdkError::LoginTimeout(_) => ErrorKind::UserCancelled,
            SdkError::Provider { code, .. } if *code == USER_REJECTED_CODE => {
                ErrorKind::UserCancelled
            }
            SdkError::TransientNetwork(_) => ErrorKind::TransientNetwork,
            SdkError::Reconnection(_) => ErrorKind::Reconnection,
            SdkError::NotConnected
            | SdkError::Provider { .. }
            | SdkError::OAuth(_)
            | SdkError::Storage(_)
            | SdkError::Serialization(_)
            | SdkError::Crypto(_) => ErrorKind::Internal,
        }
    }

    /// Expected outcome of a user action; not a system fault.
    pub fn is_user_cancellation(&self) -> bool {
        self.kind() == ErrorKind::UserCancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(SdkError::configuration("x").kind(), ErrorKind::Configuration);
        assert_eq!(SdkError::PopupBlocked.kind(), ErrorKind::CapabilityUnavailable);
        assert_eq!(SdkError::LoginTimeout(10).kind(), ErrorKind::UserCancelled);
        assert_eq!(
            SdkError::unavailable(Capability::Network, "no fetch").kind(),
            ErrorKind::CapabilityUnavailable
        );
        assert_eq!(SdkError::TransientNetwork("reset".into()).kind(), ErrorKind::TransientNetwork);
    }

    #[test]
    fn test_user_rejection_code() {
        let rejected = SdkError::Provider { code: USER_REJECTED_CODE, message: "denied".into() };
        assert!(rejected.is_user_cancellation());
        let other = SdkError::Provider { code: -32603, message: "internal".into() };
        assert!(!other.is_user_cancellation());
    }

    #[test]
    fn test_display() {
        let err = SdkError::unavailable(Capability::Network, "no fetch primitive");
        assert_eq!(err.to_string(), "network unavailable: no fetch primitive");
    }
}
