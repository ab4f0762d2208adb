//! Buffered responses.

use std::sync::OnceLock;

use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::client::ClientError;

/// A completed response with its body fully read.
///
/// The JSON view is parsed on first access and cached, so repeated calls to
/// [`Response::json`] return the same value without re-parsing.
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
    json: OnceLock<Value>,
}

impl Response {
    pub fn from_parts(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
            json: OnceLock::new(),
        }
    }

    /// Read the whole body of a reqwest response.
    pub async fn read(response: reqwest::Response) -> Result<Self, ClientError> {
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;
        Ok(Self::from_parts(status, headers, body))
    }

    pub fn status(&self) -> u16 {
        self.status.as_u16()
    }

    pub fn status_code(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Header value by case-insensitive name, when it is valid text.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }

    /// Raw body, e.g. audio produced by text-to-speech.
    pub fn bytes(&self) -> &Bytes {
        &self.body
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// The body parsed as JSON, cached after the first call.
    pub fn json(&self) -> Result<&Value, ClientError> {
        if let Some(value) = self.json.get() {
            return Ok(value);
        }
        let value: Value = serde_json::from_slice(&self.body)?;
        Ok(self.json.get_or_init(|| value))
    }

    /// Typed view of the JSON body.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, ClientError> {
        Ok(T::deserialize(self.json()?)?)
    }
}
