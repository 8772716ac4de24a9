//! OAuth authorization-code flow: provider catalogue, authorization URLs with
//! PKCE, and the popup callback message protocol.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use url::Url;

use crate::capability::CryptoProvider;
use crate::error::{SdkError, SdkResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OAuthProviderKind {
    Google,
    Apple,
    Github,
    Discord,
    Twitter,
}

impl OAuthProviderKind {
    pub const ALL: [OAuthProviderKind; 5] = [
        OAuthProviderKind::Google,
        OAuthProviderKind::Apple,
        OAuthProviderKind::Github,
        OAuthProviderKind::Discord,
        OAuthProviderKind::Twitter,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OAuthProviderKind::Google => "google",
            OAuthProviderKind::Apple => "apple",
            OAuthProviderKind::Github => "github",
            OAuthProviderKind::Discord => "discord",
            OAuthProviderKind::Twitter => "twitter",
        }
    }

    pub fn parse(name: &str) -> SdkResult<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(name))
            .ok_or_else(|| SdkError::configuration(format!("unknown OAuth provider: {name}")))
    }

    pub fn default_auth_url(&self) -> &'static str {
        match self {
            OAuthProviderKind::Google => "https://accounts.google.com/o/oauth2/v2/auth",
            OAuthProviderKind::Apple => "https://appleid.apple.com/auth/authorize",
            OAuthProviderKind::Github => "https://github.com/login/oauth/authorize",
            OAuthProviderKind::Discord => "https://discord.com/oauth2/authorize",
            OAuthProviderKind::Twitter => "https://twitter.com/i/oauth2/authorize",
        }
    }

    pub fn default_scopes(&self) -> &'static [&'static str] {
        match self {
            OAuthProviderKind::Google => &["openid", "email", "profile"],
            OAuthProviderKind::Apple => &["name", "email"],
            OAuthProviderKind::Github => &["read:user", "user:email"],
            OAuthProviderKind::Discord => &["identify", "email"],
            OAuthProviderKind::Twitter => &["users.read", "tweet.read"],
        }
    }
}

impl fmt::Display for OAuthProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Client registration for one provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthClientConfig {
    pub client_id: String,
    pub auth_url: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
}

impl OAuthClientConfig {
    /// Provider defaults for the endpoint and scopes.
    pub fn new(kind: OAuthProviderKind, client_id: impl Into<String>, redirect_uri: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            auth_url: kind.default_auth_url().to_string(),
            redirect_uri: redirect_uri.into(),
            scopes: kind.default_scopes().iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn with_auth_url(mut self, url: impl Into<String>) -> Self {
        self.auth_url = url.into();
        self
    }

    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }
}

/// One pending authorization. `state` and `code_verifier` stay local.
#[derive(Clone)]
pub struct AuthorizationRequest {
    pub url: Url,
    pub state: String,
    pub code_verifier: String,
}

impl fmt::Debug for AuthorizationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizationRequest")
            .field("url", &self.url.as_str())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// Build the authorization URL with a fresh `state` and PKCE S256 challenge.
pub fn authorization_request(
    config: &OAuthClientConfig,
    crypto: &dyn CryptoProvider,
) -> SdkResult<AuthorizationRequest> {
    let state = hex::encode(crypto.generate_random_bytes(16)?);
    let code_verifier = URL_SAFE_NO_PAD.encode(crypto.generate_random_bytes(32)?);
    let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(code_verifier.as_bytes()));

    let mut url = Url::parse(&config.auth_url)
        .map_err(|e| SdkError::configuration(format!("invalid auth url {}: {e}", config.auth_url)))?;
    url.query_pairs_mut()
        .append_pair("client_id", &config.client_id)
        .append_pair("redirect_uri", &config.redirect_uri)
        .append_pair("response_type", "code")
        .append_pair("scope", &config.scopes.join(" "))
        .append_pair("state", &state)
        .append_pair("code_challenge", &challenge)
        .append_pair("code_challenge_method", "S256");

    Ok(AuthorizationRequest { url, state, code_verifier })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthUser {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthSuccess {
    pub code: String,
    pub state: String,
    pub user: OAuthUser,
    pub token: String,
    /// Unix milliseconds.
    pub expires_at: i64,
}

/// Message the popup posts to its opener, exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OAuthMessage {
    #[serde(rename = "OAUTH_SUCCESS")]
    Success { payload: OAuthSuccess },
    #[serde(rename = "OAUTH_ERROR")]
    Error { error: String },
}

impl OAuthMessage {
    /// `None` for anything that is not part of the protocol.
    pub fn parse(data: &serde_json::Value) -> Option<Self> {
        serde_json::from_value(data.clone()).ok()
    }
}

/// Response body of a token exchange endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenExchangeResponse {
    pub user: OAuthUser,
    pub token: String,
    pub expires_at: i64,
}
