//! HTTP transport layer
//!
//! This module defines the narrow transport interface the rest of the crate
//! is written against: one request in, one uniform response descriptor out.
//! HTTP error statuses are ordinary responses here. A transport error means
//! the server produced no parseable response at all (connection failure,
//! truncated body, non-JSON garbage), which callers treat very differently
//! from a 4xx/5xx.

use crate::config::Config;
use async_trait::async_trait;
use reqwest::Client as ReqwestClient;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

/// Header carrying the current access token. Managed exclusively by the
/// client; callers may not supply it themselves.
pub const OAUTH_TOKEN_HEADER: &str = "OAuth-Token";

/// Marker header identifying which part of the library issued a request.
pub const SOURCE_HEADER: &str = "X-Briar";

/// Errors raised by the transport itself
///
/// These represent the absence of a usable response, not HTTP-level failure.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The request never produced a response (connect/send/read failure)
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The server responded, but the body was not parseable
    #[error("unparseable response body: {0}")]
    Body(#[source] serde_json::Error),
}

/// HTTP method for API requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    /// GET request
    Get,
    /// POST request
    Post,
    /// PUT request
    Put,
    /// DELETE request
    Delete,
}

impl HttpMethod {
    /// The wire name of the method
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Uniform response descriptor
///
/// Every request that reached the server and produced a readable body ends up
/// as one of these, whatever the status code. An empty body reads as
/// `Value::Null`.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,
    /// Response headers (lower-cased keys)
    pub headers: HashMap<String, String>,
    /// Parsed JSON body
    pub body: Value,
}

impl HttpResponse {
    /// Create a new response descriptor
    pub fn new(status: u16, headers: HashMap<String, String>, body: Value) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// Check if the response is successful (2xx status)
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Check if the response is an authentication failure
    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }

    /// Get a response header value
    pub fn header(&self, key: &str) -> Option<&String> {
        self.headers.get(&key.to_ascii_lowercase())
    }

    /// Deserialize the body into a concrete type
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.body.clone())
    }
}

/// The transport collaborator: performs a single HTTP request
///
/// Implemented by [`HttpTransport`] for production use; tests substitute
/// scripted implementations.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform one request and return its uniform response descriptor.
    async fn request(
        &self,
        method: HttpMethod,
        url: &str,
        body: Option<Value>,
        headers: &HashMap<String, String>,
    ) -> Result<HttpResponse, TransportError>;
}

/// Production transport over reqwest
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: ReqwestClient,
}

impl HttpTransport {
    /// Build a transport from the client configuration
    pub fn new(config: &Config) -> Result<Self, TransportError> {
        let client = ReqwestClient::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn request(
        &self,
        method: HttpMethod,
        url: &str,
        body: Option<Value>,
        headers: &HashMap<String, String>,
    ) -> Result<HttpResponse, TransportError> {
        let mut req = match method {
            HttpMethod::Get => self.client.get(url),
            HttpMethod::Post => self.client.post(url),
            HttpMethod::Put => self.client.put(url),
            HttpMethod::Delete => self.client.delete(url),
        };

        for (key, value) in headers {
            req = req.header(key, value);
        }

        if let Some(body) = &body {
            req = req.json(body);
        }

        let response = req.send().await?;

        let status = response.status().as_u16();
        let mut response_headers = HashMap::new();
        for (key, value) in response.headers() {
            if let Ok(value_str) = value.to_str() {
                response_headers.insert(key.to_string(), value_str.to_string());
            }
        }

        let text = response.text().await?;
        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).map_err(TransportError::Body)?
        };

        Ok(HttpResponse::new(status, response_headers, body))
    }
}

/// Return the URL needed to access the given endpoint.
pub fn construct_url(base_url: &str, version: &str, endpoint: &str) -> String {
    [
        base_url.trim_end_matches('/'),
        version,
        endpoint.trim_start_matches('/'),
    ]
    .join("/")
}
