//! Network fetch
//!
//! Native fetch goes through `reqwest` (hyper on native, browser fetch on wasm).
//! A host-supplied fallback stands in for a fetch polyfill. With neither, every
//! call fails closed with `CapabilityUnavailable`.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Capability, SdkError, SdkResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NetworkSource {
    Native,
    Polyfill,
    Unavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self { method: HttpMethod::Get, url: url.into(), headers: Vec::new(), body: None }
    }

    pub fn post_json(url: impl Into<String>, body: &Value) -> SdkResult<Self> {
        Ok(Self {
            method: HttpMethod::Post,
            url: url.into(),
            headers: vec![("content-type".into(), "application/json".into())],
            body: Some(serde_json::to_vec(body)?),
        })
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: DeserializeOwned>(&self) -> SdkResult<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Turn non-2xx into `TransientNetwork` so callers see a typed failure.
    pub fn error_for_status(self) -> SdkResult<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(SdkError::TransientNetwork(format!(
                "http {}: {}",
                self.status,
                String::from_utf8_lossy(&self.body)
            )))
        }
    }
}

#[async_trait(?Send)]
pub trait NetworkClient {
    async fn fetch(&self, request: HttpRequest) -> SdkResult<HttpResponse>;
}

/// Native fetch via `reqwest`.
#[derive(Clone, Default)]
pub struct FetchClient {
    client: reqwest::Client,
}

impl FetchClient {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait(?Send)]
impl NetworkClient for FetchClient {
    async fn fetch(&self, request: HttpRequest) -> SdkResult<HttpResponse> {
        let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
            .map_err(|e| SdkError::configuration(format!("http method: {e}")))?;
        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| SdkError::TransientNetwork(e.to_string()))?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| SdkError::TransientNetwork(e.to_string()))?
            .to_vec();
        tracing::debug!(url = %request.url, status, "fetch complete");
        Ok(HttpResponse { status, headers, body })
    }
}

/// Fails every request. Used when no fetch primitive exists.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableNetwork;

#[async_trait(?Send)]
impl NetworkClient for UnavailableNetwork {
    async fn fetch(&self, request: HttpRequest) -> SdkResult<HttpResponse> {
        Err(SdkError::unavailable(
            Capability::Network,
            format!("no fetch primitive for {} {}", request.method.as_str(), request.url),
        ))
    }
}
