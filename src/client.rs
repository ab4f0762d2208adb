//! Transport client and error types.
//!
//! [`Client`] turns a logical [`Request`] into one HTTP exchange and
//! materialises either a buffered [`Response`] or a [`StreamSession`].

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::http::{
    build_http_client, join_url, merge_headers, multipart_form, to_header_map, CONTENT_TYPE_EVENT_STREAM,
    CONTENT_TYPE_JSON, HEADER_ACCEPT, HEADER_CONTENT_TYPE,
};
use crate::middleware::Next;
use crate::options::{ClientOptions, SecretString};
use crate::request::{Body, Request};
use crate::response::Response;
use crate::stream::{StreamResponse, StreamSession};

/// Errors that can occur during client operations.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The request could not be assembled; no network I/O happened.
    #[error("failed to build request: {message}")]
    RequestBuild {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Connection or body transfer failure.
    #[error("HTTP error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The service answered with a status of 400 or above.
    ///
    /// When the error body could not be read to the end, `body` holds the
    /// bytes that did arrive and `read_error` the transfer failure.
    #[error("API error ({status}): {body}")]
    Api {
        status: StatusCode,
        body: ApiErrorBody,
        #[source]
        read_error: Option<reqwest::Error>,
    },

    /// A buffered body was requested as JSON but is not valid JSON.
    #[error("JSON parse error: {0}")]
    Decode(#[from] serde_json::Error),

    /// A completed stream event carried data that is not valid JSON.
    #[error("malformed stream event: {message}")]
    StreamDecode {
        message: String,
        raw: String,
        #[source]
        source: serde_json::Error,
    },

    /// A single stream event grew past the decoder's size limit.
    #[error("stream event exceeds {limit} bytes")]
    StreamOverflow { limit: usize },

    /// The service reported an `error` event inside a stream.
    #[error("stream failed ({code}): {message}")]
    StreamFailed {
        status: Option<u16>,
        code: String,
        message: String,
    },

    /// Streamed audio was not valid base64.
    #[error("invalid audio payload: {0}")]
    Audio(#[from] base64::DecodeError),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Shorthand result type for this crate.
pub type Result<T, E = ClientError> = std::result::Result<T, E>;

impl ClientError {
    pub(crate) fn request_build(message: impl Into<String>) -> Self {
        Self::RequestBuild {
            message: message.into(),
            source: None,
        }
    }

    pub(crate) fn file(path: &Path, source: std::io::Error) -> Self {
        Self::RequestBuild {
            message: format!("cannot read upload file {}", path.display()),
            source: Some(source),
        }
    }

    /// HTTP status for [`ClientError::Api`] errors.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Body of an error response.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiErrorBody {
    Json(Value),
    Text(String),
}

impl ApiErrorBody {
    fn from_bytes(bytes: &[u8]) -> Self {
        match serde_json::from_slice::<Value>(bytes) {
            Ok(value) => Self::Json(value),
            Err(_) => Self::Text(String::from_utf8_lossy(bytes).into_owned()),
        }
    }

    /// The decoded JSON body, if the service sent one.
    pub fn json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::Text(_) => None,
        }
    }

    /// The service error code, e.g. `invalid_param`.
    pub fn code(&self) -> Option<&str> {
        self.json()?.get("code")?.as_str()
    }

    /// Human readable message of the service.
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Json(value) => value.get("message")?.as_str(),
            Self::Text(text) if !text.is_empty() => Some(text),
            Self::Text(_) => None,
        }
    }
}

impl fmt::Display for ApiErrorBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code(), self.message()) {
            (Some(code), Some(message)) => write!(f, "{code}: {message}"),
            (None, Some(message)) => f.write_str(message),
            _ => match self {
                Self::Json(value) => write!(f, "{value}"),
                Self::Text(_) => f.write_str("empty body"),
            },
        }
    }
}

/// Outcome of [`Client::send`].
#[derive(Debug)]
pub enum Reply {
    Buffered(Response),
    Streaming(StreamSession),
}

/// Authenticated transport for one API key.
///
/// Cloning is cheap; clones share the connection pool and configuration.
///
/// # Example
/// ```no_run
/// use difyai::client::Client;
/// use difyai::options::ClientOptions;
/// use difyai::request::Request;
///
/// # async fn run() -> Result<(), difyai::ClientError> {
/// let client = Client::new("app-key", ClientOptions::default())?;
/// let response = client.request(Request::get("/parameters")).await?;
/// println!("{}", response.json()?);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Client {
    http: reqwest::Client,
    options: Arc<ClientOptions>,
    api_key: SecretString,
}

impl Client {
    /// Create a client from a resolved configuration.
    pub fn new(api_key: impl Into<SecretString>, options: ClientOptions) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.expose_secret().trim().is_empty() {
            return Err(ClientError::Config("API key is required".to_string()));
        }

        reqwest::Url::parse(&options.base_url)
            .map_err(|e| ClientError::Config(format!("invalid base URL {}: {e}", options.base_url)))?;

        let http = build_http_client(&options)?;

        Ok(Self {
            http,
            options: Arc::new(options),
            api_key,
        })
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    pub fn api_key(&self) -> &SecretString {
        &self.api_key
    }

    /// Send `request` and return a buffered response or an open stream.
    pub async fn send(&self, request: Request, streaming: bool) -> Result<Reply> {
        let response = self.dispatch(request, streaming).await?;
        if streaming {
            Ok(Reply::Streaming(StreamSession::from_response(response)))
        } else {
            Ok(Reply::Buffered(Response::read(response).await?))
        }
    }

    /// Send `request` and buffer the whole response.
    pub async fn request(&self, request: Request) -> Result<Response> {
        let response = self.dispatch(request, false).await?;
        Response::read(response).await
    }

    /// Send `request` and keep the body open as an event stream.
    pub async fn stream(&self, request: Request) -> Result<StreamResponse> {
        let response = self.dispatch(request, true).await?;
        Ok(StreamResponse::new(
            StreamSession::from_response(response).events(),
        ))
    }

    pub async fn get(&self, path: impl Into<String>) -> Result<Response> {
        self.request(Request::get(path)).await
    }

    pub async fn post_json<T: serde::Serialize + ?Sized>(
        &self,
        path: impl Into<String>,
        body: &T,
    ) -> Result<Response> {
        self.request(Request::post(path).json(body)?).await
    }

    /// Assemble the HTTP request without sending it.
    ///
    /// Upload files are opened here, so unreadable paths fail before any
    /// connection is made.
    pub async fn build_request(&self, request: Request, streaming: bool) -> Result<reqwest::Request> {
        let Request {
            method,
            path,
            headers,
            query,
            body,
        } = request;

        let url = join_url(&self.options.base_url, &path)?;
        let mut headers = merge_headers(&self.options.headers, &headers, &self.api_key);
        let mut builder = self.http.request(method.into(), url);

        if !query.is_empty() {
            builder = builder.query(&query);
        }

        match body {
            Body::Empty => {}
            Body::Json(value) => {
                headers
                    .entry(HEADER_CONTENT_TYPE.to_owned())
                    .or_insert_with(|| CONTENT_TYPE_JSON.to_owned());
                let encoded = serde_json::to_vec(&value).map_err(|e| {
                    ClientError::request_build(format!("failed to encode JSON body: {e}"))
                })?;
                builder = builder.body(encoded);
            }
            Body::Multipart(parts) => {
                // reqwest generates the boundary parameter
                headers.remove(HEADER_CONTENT_TYPE);
                builder = builder.multipart(multipart_form(parts).await?);
            }
        }

        if streaming {
            headers
                .entry(HEADER_ACCEPT.to_owned())
                .or_insert_with(|| CONTENT_TYPE_EVENT_STREAM.to_owned());
        }

        builder
            .headers(to_header_map(&headers)?)
            .build()
            .map_err(|e| ClientError::request_build(format!("invalid request: {e}")))
    }

    async fn dispatch(&self, request: Request, streaming: bool) -> Result<reqwest::Response> {
        let method = request.method;
        let path = request.path.clone();
        let http_request = self.build_request(request, streaming).await?;

        debug!(?method, %path, streaming, "sending request");
        let response = Next::new(&self.http, &self.options.middleware)
            .run(http_request)
            .await?;

        let status = response.status();
        debug!(status = status.as_u16(), %path, "received response");

        if status.as_u16() >= 400 {
            let (bytes, read_error) = read_error_body(response).await;
            let body = ApiErrorBody::from_bytes(&bytes);
            match &read_error {
                Some(error) => warn!(
                    status = status.as_u16(),
                    %path,
                    error = %body,
                    read_error = %error,
                    "request failed, error body truncated"
                ),
                None => warn!(status = status.as_u16(), %path, error = %body, "request failed"),
            }
            return Err(ClientError::Api {
                status,
                body,
                read_error,
            });
        }

        Ok(response)
    }
}

/// Read an error body chunk by chunk, keeping what arrived before a failure.
async fn read_error_body(mut response: reqwest::Response) -> (Vec<u8>, Option<reqwest::Error>) {
    let mut bytes = Vec::new();
    loop {
        match response.chunk().await {
            Ok(Some(chunk)) => bytes.extend_from_slice(&chunk),
            Ok(None) => return (bytes, None),
            Err(error) => return (bytes, Some(error)),
        }
    }
}
