//! Offline test transport: a middleware that records requests and answers
//! with a canned response instead of touching the network.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use serde_json::Value;

use crate::client::{Client, ClientError};
use crate::middleware::{Middleware, Next};
use crate::options::ClientOptions;

#[derive(Debug, Clone)]
pub(crate) struct Canned {
    status: u16,
    content_type: &'static str,
    body: Vec<u8>,
}

impl Canned {
    pub(crate) fn json(status: u16, body: &str) -> Self {
        Self::bytes(status, "application/json", body.as_bytes())
    }

    pub(crate) fn event_stream(body: &str) -> Self {
        Self::bytes(200, "text/event-stream", body.as_bytes())
    }

    pub(crate) fn bytes(status: u16, content_type: &'static str, body: &[u8]) -> Self {
        Self {
            status,
            content_type,
            body: body.to_vec(),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct CapturedRequest {
    pub method: String,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
}

impl CapturedRequest {
    pub(crate) fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }

    pub(crate) fn json(&self) -> Value {
        let body = self.body.as_deref().expect("request has a buffered body");
        serde_json::from_slice(body).expect("request body is JSON")
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Captured(Arc<Mutex<Vec<CapturedRequest>>>);

impl Captured {
    pub(crate) fn last(&self) -> CapturedRequest {
        self.0
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("at least one request was sent")
    }
}

struct Capture {
    canned: Canned,
    captured: Captured,
}

#[async_trait]
impl Middleware for Capture {
    async fn handle(
        &self,
        request: reqwest::Request,
        _next: Next<'_>,
    ) -> Result<reqwest::Response, ClientError> {
        self.captured.0.lock().unwrap().push(CapturedRequest {
            method: request.method().to_string(),
            url: request.url().to_string(),
            headers: request.headers().clone(),
            body: request
                .body()
                .and_then(|body| body.as_bytes())
                .map(<[u8]>::to_vec),
        });

        let response = http::Response::builder()
            .status(self.canned.status)
            .header("content-type", self.canned.content_type)
            .body(self.canned.body.clone())
            .unwrap();
        Ok(reqwest::Response::from(response))
    }
}

/// A client whose every request is recorded and answered with `canned`.
pub(crate) fn capture_client(canned: Canned) -> (Client, Captured) {
    let captured = Captured::default();
    let options = ClientOptions::default()
        .with_base_url("http://dify.test/v1")
        .with_middleware(Capture {
            canned,
            captured: captured.clone(),
        });
    let client = Client::new("app-key", options).unwrap();
    (client, captured)
}
