//! Bulk fixture management
//!
//! [`Fixtures`] creates disposable records in bulk through the administrative
//! agent, caches what the server returned, links records, and tears
//! everything down again. All traffic goes through the client's retry core,
//! so fixture calls survive token expiry like any other request.

use crate::metadata::MetadataProvider;
use crate::model::{CreateOptions, Model, ModelId};
use crate::FixtureError;
use briar_client::{Client, RequestParams, RequestSource, SOURCE_HEADER};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{debug, warn};

/// One entry of a bulk response, order-matched to the request
#[derive(Debug, Deserialize)]
struct BulkEntry {
    contents: Value,
    #[serde(default)]
    status: Option<u16>,
}

#[derive(Default)]
struct FixtureState {
    /// Created records per module, in insertion order
    records: HashMap<String, Vec<Value>>,
    /// Created records by the correlation id of the model that produced them
    by_model: HashMap<ModelId, Value>,
}

/// Bulk create/link/cleanup/lookup of test records
///
/// # Example
///
/// ```rust,no_run
/// use briar_client::{Client, Config};
/// use briar_fixtures::{CreateOptions, Fixtures, Model};
/// use serde_json::json;
///
/// # async fn example() -> Result<(), briar_fixtures::FixtureError> {
/// let client = Client::new(Config::new("http://server.test", "admin", "hunter2"))?;
/// let fixtures = Fixtures::new(client);
///
/// let account = Model::with_module("Accounts").attribute("name", json!("ACME"));
/// let created = fixtures.create(&[account], &CreateOptions::default()).await?;
/// assert_eq!(created["Accounts"].len(), 1);
///
/// fixtures.cleanup().await?;
/// # Ok(())
/// # }
/// ```
pub struct Fixtures {
    client: Client,
    metadata: MetadataProvider,
    state: Mutex<FixtureState>,
}

impl Fixtures {
    /// Create a fixture manager over a client context
    pub fn new(client: Client) -> Self {
        let metadata = MetadataProvider::new(client.clone());
        Self {
            client,
            metadata,
            state: Mutex::new(FixtureState::default()),
        }
    }

    /// The metadata provider backing required-field resolution
    pub fn metadata(&self) -> &MetadataProvider {
        &self.metadata
    }

    /// Create records for a batch of models in one bulk request
    ///
    /// Each model's module falls back to `options.module`; a model with
    /// neither fails the whole batch with [`FixtureError::MissingModule`]
    /// before any traffic. Required fields the model omits are filled with
    /// generated values; attributes the model sets are sent verbatim, falsy
    /// values included. Links declared on the models are resolved against
    /// records created in this batch or earlier ones and posted as a second
    /// bulk request. Returns the newly created records grouped by module.
    pub async fn create(
        &self,
        models: &[Model],
        options: &CreateOptions,
    ) -> Result<HashMap<String, Vec<Value>>, FixtureError> {
        let version = self.client.config().version.clone();
        let user_module = self.client.config().user_module.clone();

        // Resolve modules and reject duplicates before generating anything.
        let mut batch: Vec<(&Model, String)> = Vec::with_capacity(models.len());
        {
            let state = self.state.lock().unwrap();
            for model in models {
                let module = model
                    .module()
                    .or(options.module.as_deref())
                    .ok_or(FixtureError::MissingModule)?
                    .to_string();
                if state.by_model.contains_key(&model.id())
                    || batch.iter().any(|(m, _)| m.id() == model.id())
                {
                    return Err(FixtureError::DuplicateRecord);
                }
                batch.push((model, module));
            }
        }

        // Fill in required fields the models leave out.
        let mut requests = Vec::with_capacity(batch.len());
        for (model, module) in &batch {
            let mut attributes = model.attributes().clone();
            for field in self.metadata.required_fields(module).await? {
                if !attributes.contains_key(&field.name) {
                    attributes.insert(field.name.clone(), self.metadata.generate_value(&field)?);
                }
            }
            requests.push(json!({
                "url": format!("/{version}/{module}"),
                "method": "POST",
                "data": Value::Object(attributes),
            }));
        }

        debug!(count = requests.len(), "creating fixture records");
        let entries = self.bulk(requests).await?;

        // Cache what came back, order-matched to the batch.
        let mut created: HashMap<String, Vec<Value>> = HashMap::new();
        {
            let mut state = self.state.lock().unwrap();
            for ((model, module), entry) in batch.iter().zip(entries) {
                if let Some(status) = entry.status {
                    if !(200..300).contains(&status) {
                        warn!(module = %module, status, "fixture record creation returned an error status");
                    }
                }

                let mut contents = entry.contents;
                if contents.get("_module").is_none() {
                    if let Value::Object(map) = &mut contents {
                        map.insert("_module".to_string(), json!(module));
                    }
                }

                state
                    .records
                    .entry(module.clone())
                    .or_default()
                    .push(contents.clone());
                state.by_model.insert(model.id(), contents.clone());
                created.entry(module.clone()).or_default().push(contents);
            }
        }

        // New user records become identities the client can log in as.
        for (model, module) in &batch {
            if *module == user_module {
                self.register_credentials(model)?;
            }
        }

        let link_requests = self.link_requests(&batch, &version)?;
        if !link_requests.is_empty() {
            debug!(count = link_requests.len(), "linking fixture records");
            self.bulk(link_requests).await?;
        }

        Ok(created)
    }

    /// Link two already-created records directly
    ///
    /// Resolves both sides through the fixture cache and issues a single
    /// (non-bulk) link request. Returns the server's response body.
    pub async fn link(
        &self,
        left: ModelId,
        link_name: &str,
        right: ModelId,
    ) -> Result<Value, FixtureError> {
        let (endpoint, body) = {
            let state = self.state.lock().unwrap();
            let left_record = state.by_model.get(&left).ok_or(FixtureError::MissingLink)?;
            let right_record = state.by_model.get(&right).ok_or(FixtureError::MissingLink)?;

            let module = left_record["_module"].as_str().ok_or(FixtureError::MissingLink)?;
            let left_id = left_record["id"].as_str().ok_or(FixtureError::MissingLink)?;
            let right_id = right_record["id"].as_str().ok_or(FixtureError::MissingLink)?;

            (
                format!("{module}/{left_id}/link"),
                json!({"link_name": link_name, "ids": [right_id]}),
            )
        };

        let admin = self.client.admin()?;
        let response = admin.post(&endpoint, body, Some(fixtures_params())).await?;
        Ok(response.body)
    }

    /// Delete every cached record and reset all fixture and client state
    ///
    /// Issues one bulk request of DELETEs, then atomically drops the record
    /// cache, the model map, and the client's sessions, agents, and
    /// registered credentials. The reset happens once the round trip
    /// resolves, whatever its statuses.
    pub async fn cleanup(&self) -> Result<(), FixtureError> {
        let version = self.client.config().version.clone();
        let version = &version;

        let requests: Vec<Value> = {
            let state = self.state.lock().unwrap();
            state
                .records
                .iter()
                .flat_map(|(module, records)| {
                    records.iter().filter_map(move |record| {
                        let id = record["id"].as_str()?;
                        Some(json!({
                            "url": format!("/{version}/{module}/{id}"),
                            "method": "DELETE",
                        }))
                    })
                })
                .collect()
        };

        if !requests.is_empty() {
            debug!(count = requests.len(), "deleting fixture records");
            self.bulk(requests).await?;
        }

        let mut state = self.state.lock().unwrap();
        *state = FixtureState::default();
        self.client.reset();
        Ok(())
    }

    /// First cached record of a module matching every predicate field
    ///
    /// The predicate is a JSON object compared field-by-field for exact
    /// equality; an empty predicate matches the first record.
    pub fn lookup(&self, module: &str, predicate: &Value) -> Result<Value, FixtureError> {
        let state = self.state.lock().unwrap();

        if state.records.values().all(|records| records.is_empty()) {
            return Err(FixtureError::NoRecordsAvailable);
        }

        let records = state
            .records
            .get(module)
            .filter(|records| !records.is_empty())
            .ok_or_else(|| FixtureError::NoRecordsForModule(module.to_string()))?;

        let empty = Map::new();
        let wanted = predicate.as_object().unwrap_or(&empty);
        records
            .iter()
            .find(|record| wanted.iter().all(|(key, value)| &record[key] == value))
            .cloned()
            .ok_or_else(|| FixtureError::NoRecordsForModule(module.to_string()))
    }

    /// The record created for a model, if any
    pub fn record_for(&self, id: ModelId) -> Option<Value> {
        self.state.lock().unwrap().by_model.get(&id).cloned()
    }

    async fn bulk(&self, requests: Vec<Value>) -> Result<Vec<BulkEntry>, FixtureError> {
        let admin = self.client.admin()?;
        let response = admin
            .post("bulk", json!({"requests": requests}), Some(fixtures_params()))
            .await?;
        let entries = response.json().map_err(briar_client::Error::Json)?;
        Ok(entries)
    }

    fn link_requests(
        &self,
        batch: &[(&Model, String)],
        version: &str,
    ) -> Result<Vec<Value>, FixtureError> {
        let state = self.state.lock().unwrap();
        let mut requests = Vec::new();

        for (model, module) in batch {
            if model.links().is_empty() {
                continue;
            }

            let left = state
                .by_model
                .get(&model.id())
                .ok_or(FixtureError::MissingLink)?;
            let left_id = left["id"].as_str().ok_or(FixtureError::MissingLink)?;

            for (link_name, target) in model.links() {
                let right = state.by_model.get(target).ok_or(FixtureError::MissingLink)?;
                let right_id = right["id"].as_str().ok_or(FixtureError::MissingLink)?;

                requests.push(json!({
                    "url": format!("/{version}/{module}/{left_id}/link"),
                    "method": "POST",
                    "data": {"link_name": link_name, "ids": [right_id]},
                }));
            }
        }

        Ok(requests)
    }

    fn register_credentials(&self, model: &Model) -> Result<(), FixtureError> {
        let username = model.attributes().get("user_name").and_then(Value::as_str);
        let password = model.attributes().get("user_hash").and_then(Value::as_str);

        match (username, password) {
            (Some(username), Some(password)) => {
                self.client.register_user(username, password)?;
                Ok(())
            }
            _ => {
                warn!("user record has no user_name/user_hash attributes, skipping registration");
                Ok(())
            }
        }
    }
}

fn fixtures_params() -> RequestParams {
    RequestParams::new().header(SOURCE_HEADER, RequestSource::Fixtures.as_str())
}
