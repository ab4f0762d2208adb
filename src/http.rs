//! HTTP client utilities shared by every request.
//!
//! This module provides reqwest client construction, URL joining, the
//! header precedence rules applied to outgoing requests and multipart
//! encoding with files streamed from disk.

use std::collections::BTreeMap;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use tokio::io::{AsyncRead, ReadBuf};

use crate::client::ClientError;
use crate::options::{ClientOptions, SecretString};
use crate::request::{MultipartPart, PartContent};

pub const HEADER_AUTHORIZATION: &str = "authorization";
pub const HEADER_CONTENT_TYPE: &str = "content-type";
pub const HEADER_ACCEPT: &str = "accept";

pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_TYPE_EVENT_STREAM: &str = "text/event-stream";

/// Build a configured HTTP client from client options.
///
/// This applies common configuration like timeouts and proxies.
pub fn build_http_client(options: &ClientOptions) -> Result<Client, ClientError> {
    let mut builder = Client::builder();

    if let Some(timeout) = options.timeout {
        builder = builder.timeout(timeout);
    }

    if let Some(timeout) = options.connect_timeout {
        builder = builder.connect_timeout(timeout);
    }

    if let Some(proxy_url) = &options.proxy {
        let proxy = reqwest::Proxy::all(proxy_url)
            .map_err(|e| ClientError::Config(format!("invalid proxy {proxy_url}: {e}")))?;
        builder = builder.proxy(proxy);
    }

    builder
        .build()
        .map_err(|e| ClientError::Config(format!("failed to build HTTP client: {e}")))
}

/// Join a relative API path onto the base URL with exactly one `/` between.
///
/// Absolute URLs are rejected: every request goes to the configured service.
pub fn join_url(base_url: &str, path: &str) -> Result<String, ClientError> {
    if path.contains("://") {
        return Err(ClientError::request_build(format!(
            "request path must be relative to the base URL, got {path}"
        )));
    }

    let base = base_url.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    if path.is_empty() {
        Ok(base.to_string())
    } else {
        Ok(format!("{base}/{path}"))
    }
}

/// Percent-encode a caller-supplied value as a single path segment.
///
/// `/`, `?`, `#` and `%` cannot leak into the URL structure. Empty, `.` and
/// `..` segments are rejected since URL normalization would drop them.
pub fn encode_segment(segment: &str) -> Result<String, ClientError> {
    if matches!(segment, "" | "." | "..") {
        return Err(ClientError::request_build(format!(
            "invalid path segment {segment:?}"
        )));
    }

    let mut url = reqwest::Url::parse("http://segment.invalid/")
        .map_err(|e| ClientError::request_build(format!("failed to encode path segment: {e}")))?;
    url.path_segments_mut()
        .map_err(|_| ClientError::request_build("failed to encode path segment"))?
        .pop()
        .push(segment);
    Ok(url.path().trim_start_matches('/').to_string())
}

/// Merge default and per-request headers, then inject the bearer token.
///
/// Keys are compared lowercase; a request header overrides a default of the
/// same name and `authorization` always carries the configured API key.
pub fn merge_headers(
    defaults: &BTreeMap<String, String>,
    request: &BTreeMap<String, String>,
    api_key: &SecretString,
) -> BTreeMap<String, String> {
    let mut headers = BTreeMap::new();

    for (key, value) in defaults.iter().chain(request.iter()) {
        headers.insert(key.trim().to_ascii_lowercase(), value.clone());
    }

    headers.insert(
        HEADER_AUTHORIZATION.to_owned(),
        format!("Bearer {}", api_key.expose_secret()),
    );

    headers
}

/// Convert a merged header map into reqwest's representation.
pub fn to_header_map(headers: &BTreeMap<String, String>) -> Result<HeaderMap, ClientError> {
    let mut out = HeaderMap::new();
    for (key, value) in headers {
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|_| ClientError::request_build(format!("invalid header name: {key}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| ClientError::request_build(format!("invalid header value for {key}")))?;
        out.insert(name, value);
    }
    Ok(out)
}

/// Size of the chunks upload files are streamed in.
const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// Encode multipart segments into a reqwest form.
///
/// File segments are opened here and streamed from disk as the body is
/// written, never buffered whole.
pub async fn multipart_form(parts: Vec<MultipartPart>) -> Result<Form, ClientError> {
    let mut form = Form::new();

    for MultipartPart {
        name,
        content,
        filename,
        mime,
    } in parts
    {
        let is_text = matches!(content, PartContent::Text(_));
        let mut part = match content {
            PartContent::Text(text) => Part::text(text),
            PartContent::Bytes(data) => Part::bytes(data.to_vec()),
            PartContent::File(path) => {
                let file = tokio::fs::File::open(&path)
                    .await
                    .map_err(|e| ClientError::file(&path, e))?;
                let metadata = file.metadata().await.map_err(|e| ClientError::file(&path, e))?;
                if metadata.is_dir() {
                    return Err(ClientError::request_build(format!(
                        "upload path {} is a directory",
                        path.display()
                    )));
                }
                Part::stream_with_length(
                    reqwest::Body::wrap_stream(FileChunks::new(file)),
                    metadata.len(),
                )
            }
        };

        let mime = mime.or_else(|| {
            filename
                .as_deref()
                .filter(|_| !is_text)
                .map(|filename| guess_mime(filename).to_string())
        });

        if let Some(filename) = filename {
            part = part.file_name(filename);
        }
        if let Some(mime) = mime {
            part = part
                .mime_str(&mime)
                .map_err(|e| ClientError::request_build(format!("invalid MIME type {mime}: {e}")))?;
        }

        form = form.part(name, part);
    }

    Ok(form)
}

/// Guess a MIME type from a file extension.
pub fn guess_mime(filename: &str) -> &'static str {
    let extension = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "mp3" | "mpga" => "audio/mpeg",
        "m4a" => "audio/mp4",
        "wav" => "audio/wav",
        "webm" => "audio/webm",
        "mp4" => "video/mp4",
        "txt" => "text/plain",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}

/// Streams a file in fixed-size chunks.
struct FileChunks {
    file: tokio::fs::File,
    buf: Box<[u8]>,
    done: bool,
}

impl FileChunks {
    fn new(file: tokio::fs::File) -> Self {
        Self {
            file,
            buf: vec![0; UPLOAD_CHUNK_SIZE].into_boxed_slice(),
            done: false,
        }
    }
}

impl Stream for FileChunks {
    type Item = std::io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }

        let mut read_buf = ReadBuf::new(&mut this.buf);
        match Pin::new(&mut this.file).poll_read(cx, &mut read_buf) {
            Poll::Ready(Ok(())) => {
                let filled = read_buf.filled();
                if filled.is_empty() {
                    this.done = true;
                    Poll::Ready(None)
                } else {
                    Poll::Ready(Some(Ok(Bytes::copy_from_slice(filled))))
                }
            }
            Poll::Ready(Err(e)) => {
                this.done = true;
                Poll::Ready(Some(Err(e)))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
