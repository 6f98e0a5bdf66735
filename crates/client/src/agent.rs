//! Client context and user agents
//!
//! [`Client`] is the shared context for one server under test: configuration,
//! transport, the credential registry, and the per-username session table.
//! [`Agent`] is a cheap handle scoped to one (username, version) pair; agents
//! for the same username share a single [`SessionState`], so a login or token
//! refresh performed through one version is visible through all of them.
//!
//! # Example
//!
//! ```rust,no_run
//! use briar_client::{Client, Config};
//!
//! # async fn example() -> Result<(), briar_client::Error> {
//! let client = Client::new(Config::new("http://server.test", "admin", "hunter2"))?;
//!
//! let admin = client.admin()?;
//! let response = admin.get("me", None).await?;
//! assert!(response.is_success());
//! # Ok(())
//! # }
//! ```

use crate::config::Config;
use crate::http::{
    construct_url, HttpMethod, HttpResponse, HttpTransport, Transport, OAUTH_TOKEN_HEADER,
    SOURCE_HEADER,
};
use crate::retry::{wrap_request, AuthRequests, RequestSource, RetryOptions, TokenResponse};
use crate::session::SessionState;
use crate::Error;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Header that switches the effective HTTP method server-side. Allowing it
/// would bypass the method-specific handling in this client, so it is
/// rejected alongside the token header.
const METHOD_OVERRIDE_HEADER: &str = "X-HTTP-Method-Override";

/// Per-request options
///
/// Currently a header bag. The token header and the method-override header
/// are reserved and rejected before any network activity.
#[derive(Debug, Clone, Default)]
pub struct RequestParams {
    headers: HashMap<String, String>,
}

impl RequestParams {
    /// Create empty request params
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a header to the request
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// The headers carried by these params
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    fn validate(&self) -> Result<(), Error> {
        for key in self.headers.keys() {
            let lower = key.to_ascii_lowercase();
            if lower == OAUTH_TOKEN_HEADER.to_ascii_lowercase()
                || lower == METHOD_OVERRIDE_HEADER.to_ascii_lowercase()
            {
                return Err(Error::ForbiddenOverride(key.clone()));
            }
        }
        Ok(())
    }
}

struct ClientState {
    credentials: HashMap<String, String>,
    sessions: HashMap<String, Arc<SessionState>>,
    agents: HashMap<(String, String), Agent>,
}

impl ClientState {
    fn seeded(config: &Config) -> Self {
        let mut credentials = HashMap::new();
        credentials.insert(
            config.admin_username.clone(),
            config.admin_password.clone(),
        );
        Self {
            credentials,
            sessions: HashMap::new(),
            agents: HashMap::new(),
        }
    }
}

pub(crate) struct ClientInner {
    config: Config,
    transport: Arc<dyn Transport>,
    auth: AuthRequests,
    state: Mutex<ClientState>,
}

/// Shared client context for one server under test
///
/// Cloning is cheap and clones share all state. The context owns every
/// credential and session; nothing about it is global, so independent
/// contexts (for example, two servers in one test process) never interfere.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    /// Create a client with the production HTTP transport
    pub fn new(config: Config) -> Result<Self, Error> {
        let transport = Arc::new(HttpTransport::new(&config)?);
        Ok(Self::with_transport(config, transport))
    }

    /// Create a client over a caller-supplied transport
    pub fn with_transport(config: Config, transport: Arc<dyn Transport>) -> Self {
        let auth = AuthRequests::new(transport.clone(), &config);
        let state = Mutex::new(ClientState::seeded(&config));
        Self {
            inner: Arc::new(ClientInner {
                config,
                transport,
                auth,
                state,
            }),
        }
    }

    /// The configuration this client was built with
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Agent for the administrative identity at the default version
    pub fn admin(&self) -> Result<Agent, Error> {
        let username = self.inner.config.admin_username.clone();
        self.as_user(&username)
    }

    /// Agent for a registered username at the default version
    ///
    /// Agents are cached per (username, version); repeated calls return the
    /// same handle. Fails with [`Error::NoUsername`] for an empty username
    /// and [`Error::NoCredentials`] for one that was never registered.
    pub fn as_user(&self, username: &str) -> Result<Agent, Error> {
        let version = self.inner.config.version.clone();
        self.agent_for(username, &version)
    }

    /// Register credentials for a username
    ///
    /// Usually called by the fixture layer when a user record is created.
    /// Registering a username twice is an error; the password on file would
    /// silently stop matching the server's.
    pub fn register_user(&self, username: &str, password: &str) -> Result<(), Error> {
        let mut state = self.inner.state.lock().unwrap();
        if state.credentials.contains_key(username) {
            return Err(Error::DuplicateUser(username.to_string()));
        }
        debug!(username, "registering user credentials");
        state
            .credentials
            .insert(username.to_string(), password.to_string());
        Ok(())
    }

    /// Whether credentials are on file for a username
    pub fn has_credentials(&self, username: &str) -> bool {
        self.inner
            .state
            .lock()
            .unwrap()
            .credentials
            .contains_key(username)
    }

    /// Discard all credentials, sessions, and cached agents
    ///
    /// The admin credentials are re-seeded from the configuration. Agent
    /// handles obtained before the reset keep their old session state and
    /// should be discarded.
    pub fn reset(&self) {
        warn!("resetting client state");
        let mut state = self.inner.state.lock().unwrap();
        *state = ClientState::seeded(&self.inner.config);
    }

    fn agent_for(&self, username: &str, version: &str) -> Result<Agent, Error> {
        if username.is_empty() {
            return Err(Error::NoUsername);
        }

        let mut state = self.inner.state.lock().unwrap();
        let key = (username.to_string(), version.to_string());
        if let Some(agent) = state.agents.get(&key) {
            return Ok(agent.clone());
        }

        let password = state
            .credentials
            .get(username)
            .ok_or_else(|| Error::NoCredentials(username.to_string()))?
            .clone();

        let session = state
            .sessions
            .entry(username.to_string())
            .or_insert_with(|| Arc::new(SessionState::new(username)))
            .clone();

        let agent = Agent {
            client: self.inner.clone(),
            username: username.to_string(),
            password,
            version: version.to_string(),
            session,
        };
        state.agents.insert(key, agent.clone());
        Ok(agent)
    }
}

/// A (username, version) scoped request handle
///
/// Logs in lazily on the first request and transparently refreshes an
/// expired token once per request. Clones share session state.
#[derive(Clone)]
pub struct Agent {
    client: Arc<ClientInner>,
    username: String,
    password: String,
    version: String,
    session: Arc<SessionState>,
}

impl Agent {
    /// The username this agent acts as
    pub fn username(&self) -> &str {
        &self.username
    }

    /// The API version this agent targets
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Whether two agents share login state
    pub fn shares_session_with(&self, other: &Agent) -> bool {
        Arc::ptr_eq(&self.session, &other.session)
    }

    /// Sibling agent for the same username on a different API version
    ///
    /// The sibling shares this agent's session, so tokens obtained through
    /// either are visible to both.
    pub fn on(&self, version: &str) -> Agent {
        if version == self.version {
            return self.clone();
        }

        let mut state = self.client.state.lock().unwrap();
        let key = (self.username.clone(), version.to_string());
        if let Some(agent) = state.agents.get(&key) {
            return agent.clone();
        }

        let agent = Agent {
            client: self.client.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            version: version.to_string(),
            session: self.session.clone(),
        };
        state.agents.insert(key, agent.clone());
        agent
    }

    /// Perform a GET request against an endpoint
    pub async fn get(
        &self,
        endpoint: &str,
        params: Option<RequestParams>,
    ) -> Result<HttpResponse, Error> {
        self.request(HttpMethod::Get, endpoint, None, params).await
    }

    /// Perform a POST request with a JSON body
    pub async fn post(
        &self,
        endpoint: &str,
        data: Value,
        params: Option<RequestParams>,
    ) -> Result<HttpResponse, Error> {
        self.request(HttpMethod::Post, endpoint, Some(data), params)
            .await
    }

    /// Perform a PUT request with a JSON body
    pub async fn put(
        &self,
        endpoint: &str,
        data: Value,
        params: Option<RequestParams>,
    ) -> Result<HttpResponse, Error> {
        self.request(HttpMethod::Put, endpoint, Some(data), params)
            .await
    }

    /// Perform a DELETE request, optionally with a JSON body
    pub async fn delete(
        &self,
        endpoint: &str,
        data: Option<Value>,
        params: Option<RequestParams>,
    ) -> Result<HttpResponse, Error> {
        self.request(HttpMethod::Delete, endpoint, data, params)
            .await
    }

    /// Log in if this agent's session has no access token yet
    ///
    /// Concurrent callers for the same username queue behind the session's
    /// login gate; only the first issues the login request, the rest observe
    /// its token. Attempts are bounded; see [`SessionState::record_attempt`].
    async fn ensure_login(&self) -> Result<(), Error> {
        if self.session.access_token().is_some() {
            return Ok(());
        }

        let _gate = self.session.login_gate().lock().await;

        // Another task may have completed the login while we waited.
        if self.session.access_token().is_some() {
            return Ok(());
        }

        loop {
            let attempt = self.session.record_attempt()?;
            debug!(username = %self.username, attempt, "logging in");

            let result = self
                .client
                .auth
                .login(
                    &self.username,
                    &self.password,
                    &self.version,
                    RequestSource::Agent,
                )
                .await;

            match result {
                Ok(response) if response.is_success() => {
                    match response.json::<TokenResponse>() {
                        Ok(token) if !token.access_token.is_empty() => {
                            self.session.store_tokens(&token);
                            self.session.reset_attempts();
                            return Ok(());
                        }
                        // A success status without a usable token pair counts
                        // as a failed attempt.
                        _ => {
                            warn!(username = %self.username, attempt, "login response carried no tokens");
                        }
                    }
                }
                Ok(response) => {
                    warn!(username = %self.username, attempt, status = response.status, "login rejected");
                }
                Err(err) => {
                    warn!(username = %self.username, attempt, error = %err, "login request failed");
                }
            }
        }
    }

    async fn request(
        &self,
        method: HttpMethod,
        endpoint: &str,
        data: Option<Value>,
        params: Option<RequestParams>,
    ) -> Result<HttpResponse, Error> {
        let params = params.unwrap_or_default();
        params.validate()?;

        self.ensure_login().await?;

        let url = construct_url(&self.client.config.base_url, &self.version, endpoint);

        // Defaults first, caller params next, session headers last so the
        // access token always wins.
        let mut headers = HashMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        headers.insert(
            SOURCE_HEADER.to_string(),
            RequestSource::Agent.as_str().to_string(),
        );
        for (key, value) in params.headers() {
            headers.insert(key.clone(), value.clone());
        }
        for (key, value) in self.session.headers() {
            headers.insert(key, value);
        }

        let transport = self.client.transport.clone();
        let request_url = url.clone();
        let request_fn = move |request_headers: HashMap<String, String>| {
            let transport = transport.clone();
            let url = request_url.clone();
            let body = data.clone();
            async move { transport.request(method, &url, body, &request_headers).await }
        };

        let session = self.session.clone();
        let after_refresh = move |token: &TokenResponse| session.store_tokens(token);
        let options = RetryOptions {
            refresh_token: self.session.refresh_token(),
            after_refresh: &after_refresh,
            source: RequestSource::Agent,
            retry_version: &self.version,
        };

        debug!(method = %method, url = %url, username = %self.username, "sending request");
        wrap_request(&self.client.auth, request_fn, headers, options).await
    }
}
