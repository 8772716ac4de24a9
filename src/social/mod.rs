//! Social Identity Provider
//!
//! Turns an OAuth login into a deterministic wallet credential.
//!
//! ```text
//! login(kind)
//!   → authorization_request (state + PKCE)
//!   → PopupHost::open → await_callback (message | closed | timeout)
//!   → state check → exchange (token endpoint, or the callback payload)
//!   → derive_credential(user_id, email, app_secret)
//!   → persist identity + address under {ns}.social.{provider}.*
//! ```
//!
//! The private key is never sent anywhere. By default it is not persisted
//! either: `restore_session` re-derives it from the stored identity.
//! `CredentialPersistence::InsecurePlaintext` writes it to storage in clear
//! and logs a warning on every write.

pub mod derive;
pub mod oauth;
pub mod popup;

pub use derive::{derive_credential, DerivedWalletCredential};
pub use oauth::{OAuthClientConfig, OAuthMessage, OAuthProviderKind, OAuthSuccess, OAuthUser};
pub use popup::{await_callback, OpenedPopup, PopupHost, PopupWindow, PostedMessage};

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::capability::{CapabilityAdapter, CryptoStrength, HttpRequest};
use crate::core::keys;
use crate::error::{Capability, SdkError, SdkResult};
use crate::runtime::RuntimeKind;
use oauth::{authorization_request, AuthorizationRequest, TokenExchangeResponse};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);
pub const DEFAULT_LOGIN_TIMEOUT: Duration = Duration::from_secs(300);

/// What gets written to storage after a login.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CredentialPersistence {
    /// Identity and address only; the key is re-derived on restore.
    #[default]
    AddressOnly,
    /// Also store the private key in clear. Demo/quick-start only.
    InsecurePlaintext,
}

#[derive(Clone)]
pub struct SocialConfig {
    pub app_secret: String,
    /// Origin callback messages must come from. Defaults to the popup host's own origin.
    pub origin: Option<String>,
    pub providers: BTreeMap<OAuthProviderKind, OAuthClientConfig>,
    pub poll_interval: Duration,
    pub login_timeout: Duration,
    pub credential_persistence: CredentialPersistence,
    /// Backend that trades the code for an identity. Without one the
    /// identity carried by the callback message is used as is.
    pub token_exchange_url: Option<String>,
}

impl fmt::Debug for SocialConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocialConfig")
            .field("app_secret", &"<redacted>")
            .field("origin", &self.origin)
            .field("providers", &self.providers.keys().collect::<Vec<_>>())
            .field("poll_interval", &self.poll_interval)
            .field("login_timeout", &self.login_timeout)
            .field("credential_persistence", &self.credential_persistence)
            .field("token_exchange_url", &self.token_exchange_url)
            .finish()
    }
}

impl SocialConfig {
    pub fn new(app_secret: impl Into<String>) -> Self {
        Self {
            app_secret: app_secret.into(),
            origin: None,
            providers: BTreeMap::new(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            login_timeout: DEFAULT_LOGIN_TIMEOUT,
            credential_persistence: CredentialPersistence::default(),
            token_exchange_url: None,
        }
    }

    pub fn with_provider(mut self, kind: OAuthProviderKind, client: OAuthClientConfig) -> Self {
        self.providers.insert(kind, client);
        self
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_login_timeout(mut self, timeout: Duration) -> Self {
        self.login_timeout = timeout;
        self
    }

    pub fn with_credential_persistence(mut self, mode: CredentialPersistence) -> Self {
        self.credential_persistence = mode;
        self
    }

    pub fn with_token_exchange_url(mut self, url: impl Into<String>) -> Self {
        self.token_exchange_url = Some(url.into());
        self
    }
}

/// Result of the OAuth round trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SocialIdentity {
    pub provider: OAuthProviderKind,
    pub user_id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    pub token: String,
    /// Unix milliseconds.
    pub expires_at: i64,
}

impl SocialIdentity {
    pub fn from_user(provider: OAuthProviderKind, user: OAuthUser, token: String, expires_at: i64) -> Self {
        Self {
            provider,
            user_id: user.id,
            email: user.email,
            name: user.name,
            avatar: user.avatar,
            token,
            expires_at,
        }
    }

    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        self.expires_at <= now_ms
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(chrono::Utc::now().timestamp_millis())
    }
}

/// Logged-in identity with its derived credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocialSession {
    pub identity: SocialIdentity,
    pub credential: DerivedWalletCredential,
    /// `Insecure` when the derivation ran on the fallback hash.
    pub crypto_strength: CryptoStrength,
}

impl SocialSession {
    pub fn address(&self) -> &str {
        &self.credential.address
    }
}

pub struct SocialIdentityProvider {
    adapter: Rc<CapabilityAdapter>,
    config: SocialConfig,
    popup_host: Option<Rc<dyn PopupHost>>,
    sessions: RefCell<BTreeMap<OAuthProviderKind, SocialSession>>,
}

impl fmt::Debug for SocialIdentityProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocialIdentityProvider")
            .field("config", &self.config)
            .field("popup_host", &self.popup_host.is_some())
            .finish_non_exhaustive()
    }
}

impl SocialIdentityProvider {
    /// Uses the runtime's own popup host when there is one (browser builds).
    pub fn new(adapter: Rc<CapabilityAdapter>, config: SocialConfig) -> Self {
        let popup_host = default_popup_host(&adapter);
        Self { adapter, config, popup_host, sessions: RefCell::new(BTreeMap::new()) }
    }

    /// Web views, mobile bridges and tests supply their own host.
    pub fn with_popup_host(mut self, host: Rc<dyn PopupHost>) -> Self {
        self.popup_host = Some(host);
        self
    }

    pub fn config(&self) -> &SocialConfig {
        &self.config
    }

    pub fn is_configured(&self, kind: OAuthProviderKind) -> bool {
        self.config.providers.contains_key(&kind)
    }

    /// Configured and able to open a login window.
    pub fn can_login(&self, kind: OAuthProviderKind) -> bool {
        self.is_configured(kind) && self.popup_host.is_some()
    }

    pub async fn login(&self, kind: OAuthProviderKind) -> SdkResult<SocialSession> {
        let client = self
            .config
            .providers
            .get(&kind)
            .ok_or_else(|| SdkError::configuration(format!("OAuth provider {kind} is not configured")))?;
        let host = self.popup_host()?;

        let request = authorization_request(client, self.adapter.crypto())?;
        let popup = host.open(request.url.as_str(), &format!("crosswallet-{kind}"))?;
        debug!(provider = %kind, "authorization popup opened");

        let origin = self.config.origin.clone().unwrap_or_else(|| host.origin());
        let callback = await_callback(
            popup,
            &origin,
            self.adapter.timer(),
            self.config.poll_interval,
            self.config.login_timeout,
        )
        .await?;

        if callback.state != request.state {
            return Err(SdkError::OAuth("state mismatch".into()));
        }

        let identity = self.exchange(kind, callback, &request).await?;
        self.establish(identity).await
    }

    /// Resume a persisted login. Expired identities are cleared.
    pub async fn restore_session(&self, kind: OAuthProviderKind) -> SdkResult<Option<SocialSession>> {
        if let Some(session) = self.current_session(kind) {
            return Ok(Some(session));
        }

        let namespace = self.adapter.namespace();
        let Some(raw) = self.adapter.storage().get_item(&keys::social::identity(namespace, kind.as_str())).await? else {
            return Ok(None);
        };
        let identity: SocialIdentity = serde_json::from_str(&raw)?;
        if identity.is_expired() {
            debug!(provider = %kind, "stored identity expired");
            self.logout(kind).await?;
            return Ok(None);
        }

        let session = self.derive_session(identity)?;
        let stored_address = self.adapter.storage().get_item(&keys::social::address(namespace, kind.as_str())).await?;
        if stored_address.as_deref() != Some(session.address()) {
            // app secret changed since the last login
            warn!(provider = %kind, "stored address does not match derived credential, rewriting");
            self.persist(&session).await?;
        }

        self.sessions.borrow_mut().insert(kind, session.clone());
        Ok(Some(session))
    }

    pub fn current_session(&self, kind: OAuthProviderKind) -> Option<SocialSession> {
        self.sessions.borrow().get(&kind).cloned()
    }

    /// Forget the session and remove every stored key for this provider.
    pub async fn logout(&self, kind: OAuthProviderKind) -> SdkResult<()> {
        self.sessions.borrow_mut().remove(&kind);
        let storage = self.adapter.storage();
        let prefix = keys::social::prefix(self.adapter.namespace(), kind.as_str());
        for key in storage.keys_with_prefix(&prefix).await? {
            storage.remove_item(&key).await?;
        }
        info!(provider = %kind, "social session cleared");
        Ok(())
    }

    /// Pure derivation for this provider's app secret.
    pub fn derive(&self, identity: &SocialIdentity) -> SdkResult<DerivedWalletCredential> {
        derive_credential(
            self.adapter.crypto(),
            &identity.user_id,
            identity.email.as_deref(),
            &self.config.app_secret,
        )
    }

    /// Adopt an identity obtained elsewhere (native SDK login, server handoff).
    pub async fn establish(&self, identity: SocialIdentity) -> SdkResult<SocialSession> {
        let kind = identity.provider;
        let session = self.derive_session(identity)?;
        self.persist(&session).await?;
        self.sessions.borrow_mut().insert(kind, session.clone());
        info!(provider = %kind, address = %session.address(), "social login complete");
        Ok(session)
    }

    fn popup_host(&self) -> SdkResult<Rc<dyn PopupHost>> {
        match (&self.popup_host, self.adapter.runtime_kind()) {
            (Some(host), _) => Ok(host.clone()),
            (None, RuntimeKind::MobileNative) => {
                Err(SdkError::NotImplemented("social login without an open-url capability".into()))
            }
            (None, _) => Err(SdkError::unavailable(Capability::Popup, "no popup host for this runtime")),
        }
    }

    fn derive_session(&self, identity: SocialIdentity) -> SdkResult<SocialSession> {
        let crypto_strength = self.adapter.crypto().strength();
        if crypto_strength == CryptoStrength::Insecure {
            warn!(provider = %identity.provider, "deriving social credential with the NON-CRYPTOGRAPHIC fallback hash");
        }
        let credential = self.derive(&identity)?;
        Ok(SocialSession { identity, credential, crypto_strength })
    }

    async fn exchange(
        &self,
        kind: OAuthProviderKind,
        callback: OAuthSuccess,
        request: &AuthorizationRequest,
    ) -> SdkResult<SocialIdentity> {
        let Some(url) = &self.config.token_exchange_url else {
            return Ok(SocialIdentity::from_user(kind, callback.user, callback.token, callback.expires_at));
        };

        let redirect_uri = self.config.providers.get(&kind).map(|c| c.redirect_uri.as_str()).unwrap_or_default();
        let body = json!({
            "provider": kind.as_str(),
            "code": callback.code,
            "codeVerifier": request.code_verifier,
            "redirectUri": redirect_uri,
        });
        let request = HttpRequest::post_json(url.as_str(), &body)?.with_header("accept", "application/json");
        let response = self.adapter.network().fetch(request).await?;
        let exchanged: TokenExchangeResponse = response.error_for_status()?.json()?;
        Ok(SocialIdentity::from_user(kind, exchanged.user, exchanged.token, exchanged.expires_at))
    }

    async fn persist(&self, session: &SocialSession) -> SdkResult<()> {
        let namespace = self.adapter.namespace();
        let provider = session.identity.provider.as_str();
        let storage = self.adapter.storage();

        storage
            .set_item(&keys::social::identity(namespace, provider), &serde_json::to_string(&session.identity)?)
            .await?;
        storage.set_item(&keys::social::address(namespace, provider), session.address()).await?;

        let key_slot = keys::social::private_key(namespace, provider);
        match self.config.credential_persistence {
            CredentialPersistence::AddressOnly => storage.remove_item(&key_slot).await,
            CredentialPersistence::InsecurePlaintext => {
                warn!(provider, "persisting derived private key in PLAINTEXT (insecure demo mode)");
                storage.set_item(&key_slot, &session.credential.private_key_hex()).await
            }
        }
    }
}

#[cfg(all(feature = "wasm", target_arch = "wasm32"))]
fn default_popup_host(adapter: &CapabilityAdapter) -> Option<Rc<dyn PopupHost>> {
    if adapter.runtime_kind() != RuntimeKind::Browser {
        return None;
    }
    match crate::wasm::popup::BrowserPopupHost::new() {
        Ok(host) => Some(Rc::new(host)),
        Err(e) => {
            warn!(error = %e, "browser popup host unavailable");
            None
        }
    }
}

#[cfg(not(all(feature = "wasm", target_arch = "wasm32")))]
fn default_popup_host(_adapter: &CapabilityAdapter) -> Option<Rc<dyn PopupHost>> {
    None
}
