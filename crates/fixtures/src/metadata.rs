//! Module metadata and generated field values
//!
//! The fixture manager needs to know which fields a module requires so it can
//! fill the ones a model omits. [`MetadataProvider`] answers that from one of
//! two sources: a static JSON file named in the configuration, or a single
//! live fetch through the administrative agent, cached for the provider's
//! lifetime. [`MetadataProvider::generate_value`] produces a random value
//! appropriate for a field's declared type.

use briar_client::{Client, RequestParams, RequestSource, SOURCE_HEADER};
use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;
use tracing::debug;

/// Field types that carry identity or server-managed content; generating a
/// random value for them would corrupt the record.
const UNSUPPORTED_TYPES: &[&str] = &[
    "id",
    "file",
    "json",
    "relate",
    "link",
    "team_list",
    "image",
    "username",
    "assigned_user_name",
];

/// Errors raised while resolving metadata or generating values
#[derive(Debug, Error)]
pub enum MetadataError {
    /// No metadata exists for the requested module
    #[error("no metadata available for module {0}")]
    UnrecognizedModule(String),

    /// A required field has a type no value can be generated for
    #[error("cannot generate a value for field {field} of type {field_type}")]
    UnsupportedFieldType {
        /// Field name
        field: String,
        /// Declared field type
        field_type: String,
    },

    /// The metadata file could not be read
    #[error("failed to read metadata file: {0}")]
    Io(#[from] std::io::Error),

    /// Metadata was not valid JSON of the expected shape
    #[error("failed to parse metadata: {0}")]
    Json(#[from] serde_json::Error),

    /// The live metadata fetch failed
    #[error(transparent)]
    Client(#[from] briar_client::Error),
}

/// One required field of a module
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Field {
    /// Field name
    pub name: String,
    /// Declared type, e.g. `varchar` or `bool`
    #[serde(rename = "type")]
    pub field_type: String,
    /// Maximum length for string types
    #[serde(default)]
    pub len: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct ModuleMetadata {
    fields: Vec<Field>,
}

/// Source of required-field definitions per module
///
/// Fetches lazily and at most once; concurrent first callers share the one
/// in-flight fetch.
pub struct MetadataProvider {
    client: Client,
    metadata_file: Option<PathBuf>,
    cache: tokio::sync::Mutex<Option<HashMap<String, Vec<Field>>>>,
}

impl MetadataProvider {
    /// Create a provider over a client context
    ///
    /// The metadata file path, if any, comes from the client's configuration.
    pub fn new(client: Client) -> Self {
        let metadata_file = client.config().metadata_file.clone();
        Self {
            client,
            metadata_file,
            cache: tokio::sync::Mutex::new(None),
        }
    }

    /// Required fields of a module
    pub async fn required_fields(&self, module: &str) -> Result<Vec<Field>, MetadataError> {
        let mut cache = self.cache.lock().await;

        if cache.is_none() {
            let metadata = match &self.metadata_file {
                Some(path) => {
                    debug!(path = %path.display(), "loading metadata from file");
                    let text = std::fs::read_to_string(path)?;
                    let parsed: HashMap<String, ModuleMetadata> = serde_json::from_str(&text)?;
                    parsed
                        .into_iter()
                        .map(|(module, meta)| (module, meta.fields))
                        .collect()
                }
                None => self.fetch().await?,
            };
            *cache = Some(metadata);
        }

        cache
            .as_ref()
            .and_then(|metadata| metadata.get(module))
            .cloned()
            .ok_or_else(|| MetadataError::UnrecognizedModule(module.to_string()))
    }

    /// Drop cached metadata so the next call fetches again
    pub async fn clear_cache(&self) {
        *self.cache.lock().await = None;
    }

    /// One live fetch of all module metadata through the admin agent
    async fn fetch(&self) -> Result<HashMap<String, Vec<Field>>, MetadataError> {
        debug!("fetching module metadata");
        let admin = self.client.admin()?;
        let params =
            RequestParams::new().header(SOURCE_HEADER, RequestSource::Metadata.as_str());
        let response = admin.get("metadata?modules", Some(params)).await?;

        let mut metadata = HashMap::new();
        let modules = response.body["modules"].as_object().cloned().unwrap_or_default();
        for (module, definition) in modules {
            let fields = definition["fields"].as_object().cloned().unwrap_or_default();
            let required = fields
                .iter()
                .filter(|(_, def)| is_required(def))
                .map(|(name, def)| Field {
                    name: name.clone(),
                    field_type: def["type"].as_str().unwrap_or_default().to_string(),
                    len: field_len(def),
                })
                .collect();
            metadata.insert(module, required);
        }
        Ok(metadata)
    }

    /// Generate a random value for a field, keyed on its declared type
    pub fn generate_value(&self, field: &Field) -> Result<Value, MetadataError> {
        if UNSUPPORTED_TYPES.contains(&field.field_type.as_str()) {
            return Err(MetadataError::UnsupportedFieldType {
                field: field.name.clone(),
                field_type: field.field_type.clone(),
            });
        }

        let mut rng = rand::thread_rng();
        let value = match field.field_type.as_str() {
            "varchar" | "char" | "name" => json!(random_string(field.len.unwrap_or(10))),
            "text" => json!(random_string(24)),
            "email" => json!(format!("{}@example.com", random_string(8).to_lowercase())),
            "url" => json!(format!("https://{}.example.com", random_string(8).to_lowercase())),
            "phone" => {
                let digits: String = (0..10).map(|_| rng.gen_range(0..10).to_string()).collect();
                json!(digits)
            }
            "int" => json!(rng.gen_range(0..10_000)),
            "decimal" => {
                let raw: f64 = rng.gen_range(0.0..1_000.0);
                json!((raw * 100.0).round() / 100.0)
            }
            "bool" => json!(rng.gen_bool(0.5)),
            "date" => json!(Utc::now().format("%Y-%m-%d").to_string()),
            "datetime" => json!(Utc::now().to_rfc3339()),
            _ => {
                return Err(MetadataError::UnsupportedFieldType {
                    field: field.name.clone(),
                    field_type: field.field_type.clone(),
                })
            }
        };
        Ok(value)
    }
}

/// Filter for the live fetch: required, client-writable, not an identifier.
fn is_required(def: &Value) -> bool {
    def["required"].as_bool().unwrap_or(false)
        && def["source"].is_null()
        && !def["readonly"].as_bool().unwrap_or(false)
        && def["type"].as_str() != Some("id")
}

fn field_len(def: &Value) -> Option<usize> {
    match &def["len"] {
        Value::Number(n) => n.as_u64().map(|n| n as usize),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn random_string(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use briar_client::test_utils::StubTransport;
    use briar_client::Config;
    use std::io::Write;
    use std::sync::Arc;

    fn provider_with_file(content: &str) -> (MetadataProvider, tempfile::NamedTempFile) {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();

        let config = Config::new("http://server.test", "admin", "secret")
            .with_metadata_file(file.path());
        let client = Client::with_transport(config, Arc::new(StubTransport::new()));
        (MetadataProvider::new(client), file)
    }

    fn field(name: &str, field_type: &str, len: Option<usize>) -> Field {
        Field {
            name: name.to_string(),
            field_type: field_type.to_string(),
            len,
        }
    }

    fn any_provider() -> MetadataProvider {
        let config = Config::new("http://server.test", "admin", "secret");
        MetadataProvider::new(Client::with_transport(config, Arc::new(StubTransport::new())))
    }

    #[tokio::test]
    async fn test_file_metadata_bypasses_the_network() {
        let (provider, _file) = provider_with_file(
            r#"{
                "Accounts": {
                    "fields": [
                        {"name": "name", "type": "varchar", "len": 50},
                        {"name": "active", "type": "bool"}
                    ]
                }
            }"#,
        );

        let fields = provider.required_fields("Accounts").await.unwrap();
        assert_eq!(
            fields,
            vec![
                field("name", "varchar", Some(50)),
                field("active", "bool", None),
            ]
        );

        // Unknown module is an error, not an empty list.
        let err = provider.required_fields("Nonexistent").await.unwrap_err();
        assert!(matches!(err, MetadataError::UnrecognizedModule(ref m) if m == "Nonexistent"));
    }

    #[tokio::test]
    async fn test_missing_file_is_an_io_error() {
        let config = Config::new("http://server.test", "admin", "secret")
            .with_metadata_file("/nonexistent/metadata.json");
        let client = Client::with_transport(config, Arc::new(StubTransport::new()));
        let provider = MetadataProvider::new(client);

        let err = provider.required_fields("Accounts").await.unwrap_err();
        assert!(matches!(err, MetadataError::Io(_)));
    }

    #[test]
    fn test_live_fetch_filter() {
        let required = json!({"type": "varchar", "required": true});
        assert!(is_required(&required));

        // Non-required, sourced, readonly, and id fields are all skipped.
        assert!(!is_required(&json!({"type": "varchar"})));
        assert!(!is_required(
            &json!({"type": "varchar", "required": true, "source": "non-db"})
        ));
        assert!(!is_required(
            &json!({"type": "varchar", "required": true, "readonly": true})
        ));
        assert!(!is_required(&json!({"type": "id", "required": true})));
    }

    #[test]
    fn test_generated_string_honors_len() {
        let provider = any_provider();

        let value = provider
            .generate_value(&field("name", "varchar", Some(5)))
            .unwrap();
        assert_eq!(value.as_str().unwrap().len(), 5);

        let value = provider.generate_value(&field("name", "name", None)).unwrap();
        assert_eq!(value.as_str().unwrap().len(), 10);
    }

    #[test]
    fn test_generated_value_shapes() {
        let provider = any_provider();

        let email = provider.generate_value(&field("e", "email", None)).unwrap();
        assert!(email.as_str().unwrap().ends_with("@example.com"));

        let url = provider.generate_value(&field("u", "url", None)).unwrap();
        assert!(url.as_str().unwrap().starts_with("https://"));

        let phone = provider.generate_value(&field("p", "phone", None)).unwrap();
        assert_eq!(phone.as_str().unwrap().len(), 10);

        assert!(provider.generate_value(&field("i", "int", None)).unwrap().is_i64());
        assert!(provider.generate_value(&field("d", "decimal", None)).unwrap().is_f64());
        assert!(provider.generate_value(&field("b", "bool", None)).unwrap().is_boolean());

        let date = provider.generate_value(&field("d", "date", None)).unwrap();
        assert_eq!(date.as_str().unwrap().len(), 10);
    }

    #[test]
    fn test_identity_types_are_rejected() {
        let provider = any_provider();

        for field_type in ["id", "relate", "link", "team_list", "username"] {
            let err = provider
                .generate_value(&field("f", field_type, None))
                .unwrap_err();
            assert!(matches!(err, MetadataError::UnsupportedFieldType { .. }));
        }

        // Unknown types are rejected too rather than silently guessed.
        let err = provider
            .generate_value(&field("f", "holographic", None))
            .unwrap_err();
        assert!(matches!(err, MetadataError::UnsupportedFieldType { .. }));
    }
}
