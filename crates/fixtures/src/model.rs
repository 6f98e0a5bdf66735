//! Fixture models
//!
//! A [`Model`] is the declarative description of one record to create. Every
//! model is born with a [`ModelId`], a correlation id that survives creation:
//! after [`Fixtures::create`](crate::Fixtures::create) the id resolves to the
//! server-returned record, which is how link targets and later
//! [`link`](crate::Fixtures::link) calls find their records. The id's scope
//! is the life of the fixture cache, from creation until `cleanup`.

use serde_json::{Map, Value};
use uuid::Uuid;

/// Correlation id tying a model to its created record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModelId(Uuid);

impl ModelId {
    /// Generate a fresh id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ModelId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ModelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Declarative description of one record to create
///
/// # Example
///
/// ```rust
/// use briar_fixtures::Model;
/// use serde_json::json;
///
/// let account = Model::with_module("Accounts").attribute("name", json!("ACME"));
/// let contact = Model::with_module("Contacts")
///     .attribute("last_name", json!("Smith"))
///     .link("accounts", account.id());
/// ```
#[derive(Debug, Clone, Default)]
pub struct Model {
    id: ModelId,
    module: Option<String>,
    attributes: Map<String, Value>,
    links: Vec<(String, ModelId)>,
}

impl Model {
    /// Create an empty model; the module comes from the create options
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a model bound to a module
    pub fn with_module(module: impl Into<String>) -> Self {
        Self {
            module: Some(module.into()),
            ..Self::default()
        }
    }

    /// This model's correlation id
    pub fn id(&self) -> ModelId {
        self.id
    }

    /// The module this model belongs to, if set on the model itself
    pub fn module(&self) -> Option<&str> {
        self.module.as_deref()
    }

    /// Set an attribute on the record to create
    ///
    /// Attributes set here are sent verbatim; required fields the server
    /// demands but the model omits are filled with generated values.
    pub fn attribute(mut self, name: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    /// The attributes set so far
    pub fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }

    /// Link this record to another model's record under a link name
    ///
    /// The target must already have a created record by the time this model
    /// is created (same batch or an earlier one).
    pub fn link(mut self, link_name: impl Into<String>, target: ModelId) -> Self {
        self.links.push((link_name.into(), target));
        self
    }

    /// The links declared on this model
    pub fn links(&self) -> &[(String, ModelId)] {
        &self.links
    }
}

/// Options applying to a whole create batch
#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    /// Fallback module for models that do not name their own
    pub module: Option<String>,
}

impl CreateOptions {
    /// Options with a fallback module
    pub fn module(module: impl Into<String>) -> Self {
        Self {
            module: Some(module.into()),
        }
    }
}
