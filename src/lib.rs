//! Briar, a test-support client for REST API servers
//!
//! Re-exports the two member crates and provides process-level logging
//! setup. `briar-client` holds the authenticated request machinery (agents,
//! sessions, token refresh); `briar-fixtures` builds on it to create, link,
//! look up, and tear down disposable test records in bulk.
//!
//! # Example
//!
//! ```rust,no_run
//! use briar::client::{Client, Config};
//! use briar::fixtures::{CreateOptions, Fixtures, Model};
//! use serde_json::json;
//!
//! # async fn example() -> anyhow::Result<()> {
//! briar::init_logging();
//!
//! let client = Client::new(Config::from_env()?)?;
//! let fixtures = Fixtures::new(client.clone());
//!
//! let account = Model::with_module("Accounts").attribute("name", json!("ACME"));
//! fixtures.create(&[account], &CreateOptions::default()).await?;
//!
//! let admin = client.admin()?;
//! let accounts = admin.get("Accounts", None).await?;
//! assert!(accounts.is_success());
//!
//! fixtures.cleanup().await?;
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]

pub use briar_client as client;
pub use briar_fixtures as fixtures;

use tracing_subscriber::EnvFilter;

/// Install a global tracing subscriber for test runs
///
/// Verbosity is controlled by the `BRIAR_LOG` environment variable using the
/// usual filter syntax, e.g. `BRIAR_LOG=briar_client=debug`. Defaults to
/// `warn`. Calling this more than once is harmless; later calls are ignored.
pub fn init_logging() {
    let filter = EnvFilter::try_from_env("BRIAR_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
