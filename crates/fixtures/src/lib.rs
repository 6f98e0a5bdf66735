//! Bulk test-fixture management for server test suites
//!
//! Built on `briar-client`, this crate creates disposable records in bulk,
//! links them, looks them up from a local cache, and deletes everything
//! again. Required fields a test does not care about are filled with
//! generated values resolved from module metadata.
//!
//! # Example
//!
//! ```rust,no_run
//! use briar_client::{Client, Config};
//! use briar_fixtures::{CreateOptions, Fixtures, Model};
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), briar_fixtures::FixtureError> {
//! let client = Client::new(Config::new("http://server.test", "admin", "hunter2"))?;
//! let fixtures = Fixtures::new(client.clone());
//!
//! let account = Model::with_module("Accounts").attribute("name", json!("ACME"));
//! let contact = Model::with_module("Contacts")
//!     .attribute("last_name", json!("Smith"))
//!     .link("accounts", account.id());
//!
//! fixtures.create(&[account, contact], &CreateOptions::default()).await?;
//! let smith = fixtures.lookup("Contacts", &json!({"last_name": "Smith"}))?;
//! println!("created contact {}", smith["id"]);
//!
//! fixtures.cleanup().await?;
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod manager;
pub mod metadata;
pub mod model;

pub use manager::Fixtures;
pub use metadata::{Field, MetadataError, MetadataProvider};
pub use model::{CreateOptions, Model, ModelId};

use thiserror::Error;

/// Errors raised by the fixture manager
#[derive(Debug, Error)]
pub enum FixtureError {
    /// A model names no module and the create options supply none
    #[error("cannot create a record without a module")]
    MissingModule,

    /// A model that already has a created record was created again
    #[error("a record was already created for this model")]
    DuplicateRecord,

    /// A link references a model or record that does not exist
    #[error("link references a record that was never created")]
    MissingLink,

    /// A lookup ran against an empty fixture cache
    #[error("no cached records are currently available")]
    NoRecordsAvailable,

    /// A lookup found no cached records for the module
    #[error("no cached records found for module {0}")]
    NoRecordsForModule(String),

    /// Metadata resolution or value generation failed
    #[error(transparent)]
    Metadata(#[from] MetadataError),

    /// The underlying client failed
    #[error(transparent)]
    Client(#[from] briar_client::Error),
}

/// Convenience alias for fixture results
pub type Result<T> = std::result::Result<T, FixtureError>;
