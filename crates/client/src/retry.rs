//! Authenticated-request retry core
//!
//! [`wrap_request`] is the stateless heart of the client: it issues an
//! arbitrary request, and on a 401 performs exactly one token refresh
//! followed by exactly one replay with the fresh token. Every other status
//! passes straight through to the caller, including 4xx/5xx failures. The
//! function holds no session state of its own; callers supply the refresh
//! token and a completion callback to persist whatever the refresh returns.

use crate::http::{
    construct_url, HttpMethod, HttpResponse, Transport, TransportError, OAUTH_TOKEN_HEADER,
    SOURCE_HEADER,
};
use crate::{Config, Error};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

/// Which part of the library issued a request
///
/// Sent as the `X-Briar` header value so server-side logs can attribute
/// traffic to direct agent calls, fixture management, or metadata fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestSource {
    /// A user agent making a direct API call
    Agent,
    /// The fixture manager creating, linking, or deleting records
    Fixtures,
    /// The metadata provider fetching field definitions
    Metadata,
}

impl RequestSource {
    /// The header value for this source
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestSource::Agent => "Agent",
            RequestSource::Fixtures => "Fixtures",
            RequestSource::Metadata => "Metadata",
        }
    }
}

/// Token pair returned by the token endpoint
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenResponse {
    /// Short-lived access token, sent as `OAuth-Token` on every request
    pub access_token: String,
    /// Long-lived token used to obtain a new access token after a 401
    pub refresh_token: String,
}

/// OAuth token endpoint requests
///
/// Issues password-grant logins and refresh-grant token renewals against
/// `{base}/{version}/oauth2/token`. Both return the raw response so callers
/// can apply their own success policy.
#[derive(Clone)]
pub struct AuthRequests {
    transport: Arc<dyn Transport>,
    base_url: String,
    client_id: String,
    client_secret: String,
}

impl AuthRequests {
    /// Create auth requests over a transport
    pub fn new(transport: Arc<dyn Transport>, config: &Config) -> Self {
        Self {
            transport,
            base_url: config.base_url.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
        }
    }

    /// Perform a password-grant login
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        version: &str,
        source: RequestSource,
    ) -> Result<HttpResponse, TransportError> {
        debug!(username, version, "requesting access token");
        let credentials = json!({
            "username": username,
            "password": password,
            "grant_type": "password",
            "client_id": self.client_id,
            "client_secret": self.client_secret,
        });
        self.token_request(credentials, version, source).await
    }

    /// Exchange a refresh token for a new token pair
    pub async fn refresh(
        &self,
        refresh_token: &str,
        version: &str,
        source: RequestSource,
    ) -> Result<HttpResponse, TransportError> {
        debug!(version, "refreshing access token");
        let credentials = json!({
            "grant_type": "refresh_token",
            "refresh_token": refresh_token,
            "client_id": self.client_id,
            "client_secret": self.client_secret,
        });
        self.token_request(credentials, version, source).await
    }

    async fn token_request(
        &self,
        credentials: serde_json::Value,
        version: &str,
        source: RequestSource,
    ) -> Result<HttpResponse, TransportError> {
        let url = construct_url(&self.base_url, version, "oauth2/token");
        let mut headers = HashMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        headers.insert(SOURCE_HEADER.to_string(), source.as_str().to_string());

        self.transport
            .request(HttpMethod::Post, &url, Some(credentials), &headers)
            .await
    }
}

/// Options controlling the 401 recovery path of [`wrap_request`]
pub struct RetryOptions<'a> {
    /// Refresh token captured before the first attempt
    pub refresh_token: Option<String>,
    /// Called with the fresh token pair after a successful refresh, before
    /// the replay is issued
    pub after_refresh: &'a (dyn Fn(&TokenResponse) + Send + Sync),
    /// Source marker for the refresh request
    pub source: RequestSource,
    /// API version the refresh request is issued against
    pub retry_version: &'a str,
}

/// Issue a request with one-shot 401 refresh-and-replay
///
/// The closure receives the header map to send and is invoked at most twice:
/// once with the caller's headers, and once more with a cloned map carrying
/// the refreshed access token. The original map is never mutated.
///
/// Outcomes:
/// - any non-401 response (success or failure) is returned as-is
/// - a 401 triggers one refresh and one replay; the replay's response is
///   returned verbatim, even if it is another 401
/// - a transport failure on any leg surfaces as [`Error::InvalidResponse`]
///   without retrying
/// - a refresh that fails or returns no usable token pair surfaces as
///   [`Error::RefreshFailed`]
pub async fn wrap_request<F, Fut>(
    auth: &AuthRequests,
    mut request_fn: F,
    headers: HashMap<String, String>,
    options: RetryOptions<'_>,
) -> Result<HttpResponse, Error>
where
    F: FnMut(HashMap<String, String>) -> Fut,
    Fut: Future<Output = Result<HttpResponse, TransportError>>,
{
    let response = request_fn(headers.clone())
        .await
        .map_err(Error::InvalidResponse)?;

    if !response.is_unauthorized() {
        return Ok(response);
    }

    warn!(
        version = options.retry_version,
        "access token rejected, refreshing"
    );

    let refresh_token = options.refresh_token.unwrap_or_default();
    let refresh_response = auth
        .refresh(&refresh_token, options.retry_version, options.source)
        .await
        .map_err(Error::InvalidResponse)?;

    if !refresh_response.is_success() {
        return Err(Error::RefreshFailed {
            status: refresh_response.status,
        });
    }

    let token: TokenResponse = refresh_response.json().map_err(|_| Error::RefreshFailed {
        status: refresh_response.status,
    })?;

    (options.after_refresh)(&token);

    let mut retry_headers = headers;
    retry_headers.insert(OAUTH_TOKEN_HEADER.to_string(), token.access_token.clone());

    request_fn(retry_headers).await.map_err(Error::InvalidResponse)
}
