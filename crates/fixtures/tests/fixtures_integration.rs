//! Integration tests for the fixture manager against a mock HTTP server

use briar_client::{Client, Config};
use briar_fixtures::{CreateOptions, Fixtures, FixtureError, Model};
use serde_json::json;
use std::io::Write;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const METADATA_FILE: &str = r#"{
    "Accounts": {"fields": [{"name": "name", "type": "varchar", "len": 12}]},
    "Contacts": {"fields": [{"name": "last_name", "type": "varchar"}]},
    "Users": {"fields": []}
}"#;

fn metadata_file() -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(METADATA_FILE.as_bytes()).unwrap();
    file
}

async fn mount_login(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/v10/oauth2/token"))
        .and(body_partial_json(json!({"grant_type": "password"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "tok-1",
            "refresh_token": "ref-1",
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_create_lookup_cleanup_round_trip() {
    let server = MockServer::start().await;
    let file = metadata_file();

    mount_login(&server).await;

    // First bulk call creates, second deletes.
    Mock::given(method("POST"))
        .and(path("/v10/bulk"))
        .and(header("X-Briar", "Fixtures"))
        .and(header("OAuth-Token", "tok-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"contents": {"id": "acc-1", "name": "ACME", "_module": "Accounts"}, "status": 200}
        ])))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v10/bulk"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"contents": {}, "status": 200}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let config = Config::new(server.uri(), "admin", "hunter2").with_metadata_file(file.path());
    let fixtures = Fixtures::new(Client::new(config).unwrap());

    let account = Model::with_module("Accounts").attribute("name", json!("ACME"));
    let created = fixtures
        .create(&[account], &CreateOptions::default())
        .await
        .unwrap();
    assert_eq!(created["Accounts"][0]["id"], "acc-1");

    let found = fixtures.lookup("Accounts", &json!({"name": "ACME"})).unwrap();
    assert_eq!(found["id"], "acc-1");

    fixtures.cleanup().await.unwrap();
    assert!(matches!(
        fixtures.lookup("Accounts", &json!({})),
        Err(FixtureError::NoRecordsAvailable)
    ));

    // The cleanup envelope deleted the created record.
    let requests = server.received_requests().await.unwrap();
    let cleanup_body: serde_json::Value =
        serde_json::from_slice(&requests.last().unwrap().body).unwrap();
    assert_eq!(cleanup_body["requests"][0]["url"], "/v10/Accounts/acc-1");
    assert_eq!(cleanup_body["requests"][0]["method"], "DELETE");
}

#[tokio::test]
async fn test_create_sends_caller_attributes_and_generated_fields() {
    let server = MockServer::start().await;
    let file = metadata_file();

    mount_login(&server).await;

    Mock::given(method("POST"))
        .and(path("/v10/bulk"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"contents": {"id": "con-1", "_module": "Contacts"}, "status": 200}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let config = Config::new(server.uri(), "admin", "hunter2").with_metadata_file(file.path());
    let fixtures = Fixtures::new(Client::new(config).unwrap());

    // No last_name set; the required field must be generated.
    let contact = Model::with_module("Contacts").attribute("phone_work", json!("555-0100"));
    fixtures
        .create(&[contact], &CreateOptions::default())
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    let bulk_body: serde_json::Value =
        serde_json::from_slice(&requests.last().unwrap().body).unwrap();
    let data = &bulk_body["requests"][0]["data"];
    assert_eq!(data["phone_work"], "555-0100");
    assert_eq!(data["last_name"].as_str().unwrap().len(), 10);
}

#[tokio::test]
async fn test_live_metadata_is_fetched_once() {
    let server = MockServer::start().await;

    mount_login(&server).await;

    Mock::given(method("GET"))
        .and(path("/v10/metadata"))
        .and(header("X-Briar", "Metadata"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "modules": {
                "Accounts": {
                    "fields": {
                        "name": {"type": "varchar", "required": true, "len": 6},
                        "id": {"type": "id", "required": true},
                        "date_modified": {"type": "datetime", "required": true, "readonly": true},
                        "description": {"type": "text"}
                    }
                }
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v10/bulk"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"contents": {"id": "acc-1", "_module": "Accounts"}, "status": 200}
        ])))
        .expect(2)
        .mount(&server)
        .await;

    let config = Config::new(server.uri(), "admin", "hunter2");
    let fixtures = Fixtures::new(Client::new(config).unwrap());

    // Two batches, one metadata fetch.
    for _ in 0..2 {
        fixtures
            .create(&[Model::with_module("Accounts")], &CreateOptions::default())
            .await
            .unwrap();
    }

    // Only the filtered required field was generated.
    let requests = server.received_requests().await.unwrap();
    let bulk_body: serde_json::Value =
        serde_json::from_slice(&requests.last().unwrap().body).unwrap();
    let data = bulk_body["requests"][0]["data"].as_object().unwrap();
    assert_eq!(data.len(), 1);
    assert_eq!(data["name"].as_str().unwrap().len(), 6);
}

#[tokio::test]
async fn test_created_user_can_authenticate() {
    let server = MockServer::start().await;
    let file = metadata_file();

    // The created user's own login; mounted before the generic admin login
    // so the more specific matcher wins.
    Mock::given(method("POST"))
        .and(path("/v10/oauth2/token"))
        .and(body_partial_json(json!({
            "grant_type": "password",
            "username": "jane",
            "password": "hunter3",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "tok-jane",
            "refresh_token": "ref-jane",
        })))
        .expect(1)
        .mount(&server)
        .await;

    mount_login(&server).await;

    Mock::given(method("POST"))
        .and(path("/v10/bulk"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"contents": {"id": "u-1", "user_name": "jane", "_module": "Users"}, "status": 200}
        ])))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v10/me"))
        .and(header("OAuth-Token", "tok-jane"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"current_user": "jane"})))
        .expect(1)
        .mount(&server)
        .await;

    let config = Config::new(server.uri(), "admin", "hunter2").with_metadata_file(file.path());
    let client = Client::new(config).unwrap();
    let fixtures = Fixtures::new(client.clone());

    let user = Model::with_module("Users")
        .attribute("user_name", json!("jane"))
        .attribute("user_hash", json!("hunter3"));
    fixtures
        .create(&[user], &CreateOptions::default())
        .await
        .unwrap();

    let jane = client.as_user("jane").unwrap();
    let response = jane.get("me", None).await.unwrap();
    assert_eq!(response.body["current_user"], "jane");
}
