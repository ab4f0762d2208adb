//! Logical request description handed to the transport.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;

use crate::client::ClientError;

/// HTTP method of a [`Request`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

/// Request body. Exactly one representation is ever set.
#[derive(Debug, Clone, Default)]
pub enum Body {
    #[default]
    Empty,
    Json(Value),
    Multipart(Vec<MultipartPart>),
}

/// Content of one multipart segment.
#[derive(Debug, Clone)]
pub enum PartContent {
    Text(String),
    Bytes(Bytes),
    /// Opened when the request is sent and streamed from disk.
    File(PathBuf),
}

/// One segment of a `multipart/form-data` body.
#[derive(Debug, Clone)]
pub struct MultipartPart {
    pub name: String,
    pub content: PartContent,
    pub filename: Option<String>,
    pub mime: Option<String>,
}

impl MultipartPart {
    /// A plain text form field.
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: PartContent::Text(value.into()),
            filename: None,
            mime: None,
        }
    }

    /// An in-memory file segment.
    pub fn bytes(name: impl Into<String>, data: impl Into<Bytes>, filename: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: PartContent::Bytes(data.into()),
            filename: Some(filename.into()),
            mime: None,
        }
    }

    /// A file segment read from `path`. Without an explicit `filename`, the
    /// file name of `path` is used, extension included. The extension is
    /// kept on purpose: older SDKs sent only the stem, but the service
    /// detects the upload's file type from it.
    pub fn file(
        name: impl Into<String>,
        path: impl Into<PathBuf>,
        filename: Option<String>,
    ) -> Result<Self, ClientError> {
        let path = path.into();
        let filename = match filename.filter(|name| !name.trim().is_empty()) {
            Some(filename) => filename,
            None => derive_filename(&path)?,
        };
        Ok(Self {
            name: name.into(),
            content: PartContent::File(path),
            filename: Some(filename),
            mime: None,
        })
    }

    /// Override the guessed MIME type.
    pub fn with_mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = Some(mime.into());
        self
    }
}

fn derive_filename(path: &Path) -> Result<String, ClientError> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(ToString::to_string)
        .ok_or_else(|| {
            ClientError::request_build(format!(
                "cannot derive a file name from {}",
                path.display()
            ))
        })
}

/// A file to upload with an optional display name.
#[derive(Debug, Clone)]
pub struct NamedFile {
    pub path: PathBuf,
    pub name: Option<String>,
}

impl NamedFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Files passed to upload operations.
#[derive(Debug, Clone)]
pub enum FileInput {
    SinglePath { path: PathBuf, name: Option<String> },
    NamedParts(Vec<NamedFile>),
}

impl FileInput {
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self::SinglePath {
            path: path.into(),
            name: None,
        }
    }

    /// Resolve into one multipart segment per file, all under `field`.
    pub fn into_parts(self, field: &str) -> Result<Vec<MultipartPart>, ClientError> {
        let files = match self {
            FileInput::SinglePath { path, name } => vec![NamedFile { path, name }],
            FileInput::NamedParts(files) => files,
        };

        if files.is_empty() {
            return Err(ClientError::request_build("no files to upload"));
        }

        files
            .into_iter()
            .map(|file| MultipartPart::file(field, file.path, file.name))
            .collect()
    }
}

impl From<PathBuf> for FileInput {
    fn from(path: PathBuf) -> Self {
        Self::path(path)
    }
}

impl From<&str> for FileInput {
    fn from(path: &str) -> Self {
        Self::path(path)
    }
}

impl From<Vec<NamedFile>> for FileInput {
    fn from(files: Vec<NamedFile>) -> Self {
        Self::NamedParts(files)
    }
}

/// A single logical API call: method, relative path, headers and body.
///
/// # Example
/// ```rust
/// use difyai::request::{Method, Request};
/// use serde_json::json;
///
/// let request = Request::post("/messages/42/feedbacks")
///     .json(&json!({"user": "u-1", "rating": "like"}))
///     .unwrap();
///
/// assert_eq!(request.method, Method::Post);
/// ```
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub headers: BTreeMap<String, String>,
    pub query: Vec<(String, String)>,
    pub body: Body,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: BTreeMap::new(),
            query: Vec::new(),
            body: Body::Empty,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    /// Set a header. Names are case-insensitive; a later value wins.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .insert(key.into().trim().to_ascii_lowercase(), value.into());
        self
    }

    /// Append a query parameter.
    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// Append a query parameter when `value` is present.
    pub fn query_opt(self, key: impl Into<String>, value: Option<impl ToString>) -> Self {
        match value {
            Some(value) => self.query(key, value),
            None => self,
        }
    }

    /// Replace the body with the JSON encoding of `body`.
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self, ClientError> {
        let value = serde_json::to_value(body).map_err(|e| {
            ClientError::request_build(format!("failed to encode JSON body: {e}"))
        })?;
        self.body = Body::Json(value);
        Ok(self)
    }

    /// Replace the body with multipart segments.
    pub fn multipart(mut self, parts: Vec<MultipartPart>) -> Self {
        self.body = Body::Multipart(parts);
        self
    }
}
