//! Test utilities
//!
//! Scripted transport for exercising the client without a server. Responses
//! are queued in order; every request made through the stub is recorded with
//! its method, URL, body, and headers so tests can assert on the exact
//! traffic.
//!
//! # Example
//!
//! ```rust
//! use briar_client::test_utils::StubTransport;
//! use serde_json::json;
//!
//! let transport = StubTransport::new()
//!     .respond(200, json!({"ok": true}))
//!     .respond(404, json!({"error": "not found"}));
//! ```

#![allow(dead_code)]

use crate::http::{HttpMethod, HttpResponse, Transport, TransportError};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// One request captured by the stub
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// HTTP method used
    pub method: HttpMethod,
    /// Full request URL
    pub url: String,
    /// JSON body, if one was sent
    pub body: Option<Value>,
    /// Headers as handed to the transport
    pub headers: HashMap<String, String>,
}

/// Transport that replays scripted responses in order
#[derive(Default)]
pub struct StubTransport {
    responses: Mutex<VecDeque<Result<HttpResponse, TransportError>>>,
    calls: Mutex<Vec<RecordedRequest>>,
}

impl StubTransport {
    /// Create a stub with no scripted responses
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response with the given status and body
    pub fn respond(self, status: u16, body: Value) -> Self {
        self.responses
            .lock()
            .unwrap()
            .push_back(Ok(HttpResponse::new(status, HashMap::new(), body)));
        self
    }

    /// Queue a transport failure
    pub fn fail(self, error: TransportError) -> Self {
        self.responses.lock().unwrap().push_back(Err(error));
        self
    }

    /// Queue another response after construction
    pub fn push_response(&self, status: u16, body: Value) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Ok(HttpResponse::new(status, HashMap::new(), body)));
    }

    /// All requests made so far
    pub fn calls(&self) -> Vec<RecordedRequest> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of requests made so far
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for StubTransport {
    async fn request(
        &self,
        method: HttpMethod,
        url: &str,
        body: Option<Value>,
        headers: &HashMap<String, String>,
    ) -> Result<HttpResponse, TransportError> {
        self.calls.lock().unwrap().push(RecordedRequest {
            method,
            url: url.to_string(),
            body,
            headers: headers.clone(),
        });

        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("no scripted response left for {method} {url}"))
    }
}

/// A transport error that can be constructed without a live socket
pub fn body_error() -> TransportError {
    let err = serde_json::from_str::<Value>("not json").unwrap_err();
    TransportError::Body(err)
}
