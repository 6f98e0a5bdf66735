//! Client configuration
//!
//! Builder-style configuration for the fixture client: server location,
//! administrative credentials, default API version, and the OAuth client
//! identity used by the token endpoint. Most test suites construct one of
//! these from the environment via [`Config::from_env`].

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// API version used when none is configured.
pub const DEFAULT_VERSION: &str = "v10";

/// Module whose created records carry login credentials.
pub const DEFAULT_USER_MODULE: &str = "Users";

/// Errors raised while building configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is unset or empty
    #[error("missing environment variable: {0}")]
    MissingVar(&'static str),
}

/// Configuration for a [`Client`](crate::Client)
///
/// # Example
///
/// ```rust
/// use briar_client::Config;
///
/// let config = Config::new("http://server.test", "admin", "hunter2")
///     .with_version("v11")
///     .with_timeout(std::time::Duration::from_secs(10));
/// assert_eq!(config.version, "v11");
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// Root URL of the API server under test
    pub base_url: String,
    /// Username of the administrative identity
    pub admin_username: String,
    /// Password of the administrative identity
    pub admin_password: String,
    /// Default API version for new agents
    pub version: String,
    /// OAuth client id sent with token requests
    pub client_id: String,
    /// OAuth client secret sent with token requests
    pub client_secret: String,
    /// Request timeout
    pub timeout: Duration,
    /// User agent string
    pub user_agent: String,
    /// Optional static metadata file (bypasses the live metadata fetch)
    pub metadata_file: Option<PathBuf>,
    /// Module whose records register credentials for created users
    pub user_module: String,
}

impl Config {
    /// Create a configuration with required fields and sensible defaults
    pub fn new(
        base_url: impl Into<String>,
        admin_username: impl Into<String>,
        admin_password: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            admin_username: admin_username.into(),
            admin_password: admin_password.into(),
            version: DEFAULT_VERSION.to_string(),
            client_id: "api".to_string(),
            client_secret: String::new(),
            timeout: Duration::from_secs(30),
            user_agent: format!("Briar/{}", env!("CARGO_PKG_VERSION")),
            metadata_file: None,
            user_module: DEFAULT_USER_MODULE.to_string(),
        }
    }

    /// Load configuration from the environment
    ///
    /// Reads `BRIAR_SERVER_URL`, `BRIAR_ADMIN_USERNAME` and
    /// `BRIAR_ADMIN_PASSWORD` (all required), plus optional
    /// `BRIAR_API_VERSION` and `BRIAR_METADATA_FILE`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let base_url = require_env("BRIAR_SERVER_URL")?;
        let admin_username = require_env("BRIAR_ADMIN_USERNAME")?;
        let admin_password = require_env("BRIAR_ADMIN_PASSWORD")?;

        let mut config = Self::new(base_url, admin_username, admin_password);
        if let Ok(version) = std::env::var("BRIAR_API_VERSION") {
            if !version.is_empty() {
                config.version = version;
            }
        }
        if let Ok(path) = std::env::var("BRIAR_METADATA_FILE") {
            if !path.is_empty() {
                config.metadata_file = Some(PathBuf::from(path));
            }
        }

        Ok(config)
    }

    /// Set the default API version
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Set the OAuth client id and secret
    pub fn with_oauth_client(
        mut self,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        self.client_id = client_id.into();
        self.client_secret = client_secret.into();
        self
    }

    /// Set the request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the user agent string
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Set a static metadata file path
    pub fn with_metadata_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.metadata_file = Some(path.into());
        self
    }

    /// Set the module name that carries user credentials
    pub fn with_user_module(mut self, module: impl Into<String>) -> Self {
        self.user_module = module.into();
        self
    }
}

fn require_env(name: &'static str) -> Result<String, ConfigError> {
    match std::env::var(name) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(ConfigError::MissingVar(name)),
    }
}
