//! REST client core for server test suites
//!
//! This crate provides the authenticated request machinery the fixture layer
//! is built on: a shared [`Client`] context per server under test,
//! lazy-login [`Agent`] handles scoped to a (username, version) pair, and a
//! one-shot 401 refresh-and-replay wrapper around every request.
//!
//! # Example
//!
//! ```rust,no_run
//! use briar_client::{Client, Config};
//!
//! # async fn example() -> Result<(), briar_client::Error> {
//! let client = Client::new(Config::from_env()?)?;
//!
//! let admin = client.admin()?;
//! let accounts = admin.get("Accounts", None).await?;
//! println!("status {}", accounts.status);
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod agent;
pub mod config;
pub mod http;
pub mod retry;
pub mod session;
pub mod test_utils;

pub use agent::{Agent, Client, RequestParams};
pub use config::{Config, ConfigError, DEFAULT_USER_MODULE, DEFAULT_VERSION};
pub use http::{
    construct_url, HttpMethod, HttpResponse, HttpTransport, Transport, TransportError,
    OAUTH_TOKEN_HEADER, SOURCE_HEADER,
};
pub use retry::{wrap_request, AuthRequests, RequestSource, RetryOptions, TokenResponse};
pub use session::{SessionState, MAX_LOGIN_ATTEMPTS};

use thiserror::Error as ThisError;

/// Convenience alias for client results
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the client
#[derive(Debug, ThisError)]
pub enum Error {
    /// The server produced no parseable response at all
    #[error("invalid response received: {0}")]
    InvalidResponse(#[source] TransportError),

    /// A token refresh came back unusable
    #[error("token refresh failed with status {status}")]
    RefreshFailed {
        /// HTTP status of the failed refresh response
        status: u16,
    },

    /// The login attempt ceiling was exceeded for a username
    #[error("max login attempts exceeded for user {0}")]
    MaxLoginAttemptsExceeded(String),

    /// An agent was requested for an empty username
    #[error("cannot create an agent without a username")]
    NoUsername,

    /// An agent was requested for a username with no registered credentials
    #[error("no credentials registered for user {0}")]
    NoCredentials(String),

    /// A caller tried to supply a header the client manages itself
    #[error("header {0} is managed by the client and cannot be supplied")]
    ForbiddenOverride(String),

    /// Credentials were registered twice for the same username
    #[error("credentials already registered for user {0}")]
    DuplicateUser(String),

    /// A body failed to serialize or deserialize
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The transport could not be constructed
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Configuration was incomplete
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}
