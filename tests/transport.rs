//! End-to-end tests against a scripted HTTP server on the loopback interface.

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use difyai::apps::App;
use difyai::middleware::{Middleware, Next};
use difyai::model::{ChatRequest, StreamChunk};
use difyai::request::{FileInput, Request};
use difyai::{ClientError, ClientOptions, Reply};
use futures::StreamExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};

#[derive(Clone)]
struct ResponseChunk {
    delay_ms: u64,
    bytes: Vec<u8>,
}

#[derive(Clone)]
struct ScriptedResponse {
    status: u16,
    content_type: &'static str,
    chunks: Vec<ResponseChunk>,
    /// Send `Content-Length` framing with this length instead of chunked
    /// encoding, whatever the chunks actually add up to.
    declared_length: Option<usize>,
}

#[derive(Debug, Clone)]
struct ReceivedRequest {
    head: String,
    body: Vec<u8>,
}

impl ReceivedRequest {
    fn request_line(&self) -> &str {
        self.head.lines().next().unwrap_or_default()
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.head.lines().skip(1).find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim()
                .eq_ignore_ascii_case(name)
                .then(|| value.trim())
        })
    }

    fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

struct ScriptedServer {
    base_url: String,
    received: Arc<Mutex<Vec<ReceivedRequest>>>,
    handle: JoinHandle<()>,
}

impl ScriptedServer {
    async fn new(scripts: Vec<ScriptedResponse>) -> Self {
        let scripts = Arc::new(scripts);
        let request_count = Arc::new(AtomicUsize::new(0));
        let received = Arc::new(Mutex::new(Vec::new()));
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("local TCP listener should bind");
        let addr = listener
            .local_addr()
            .expect("resolved local listener address");
        let base_url = format!("http://{addr}/v1");

        let handle = tokio::spawn({
            let received = Arc::clone(&received);

            async move {
                loop {
                    let (socket, _) = match listener.accept().await {
                        Ok(pair) => pair,
                        Err(_) => break,
                    };
                    let scripts = Arc::clone(&scripts);
                    let request_count = Arc::clone(&request_count);
                    let received = Arc::clone(&received);
                    tokio::spawn(async move {
                        serve_one(socket, scripts, request_count, received).await;
                    });
                }
            }
        });

        Self {
            base_url,
            received,
            handle,
        }
    }

    fn options(&self) -> ClientOptions {
        ClientOptions::default().with_base_url(&self.base_url)
    }

    fn last_request(&self) -> ReceivedRequest {
        self.received
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("server received a request")
    }

    fn shutdown(&self) {
        self.handle.abort();
    }
}

fn response_json(status: u16, body: &str) -> ScriptedResponse {
    ScriptedResponse {
        status,
        content_type: "application/json",
        chunks: vec![ResponseChunk {
            delay_ms: 0,
            bytes: body.as_bytes().to_vec(),
        }],
        declared_length: None,
    }
}

fn response_truncated(status: u16, declared_length: usize, sent: &str) -> ScriptedResponse {
    ScriptedResponse {
        declared_length: Some(declared_length),
        ..response_json(status, sent)
    }
}

fn response_sse_chunks(chunks: &[&str], delay_ms: u64) -> ScriptedResponse {
    ScriptedResponse {
        status: 200,
        content_type: "text/event-stream",
        chunks: chunks
            .iter()
            .map(|chunk| ResponseChunk {
                delay_ms,
                bytes: chunk.as_bytes().to_vec(),
            })
            .collect(),
        declared_length: None,
    }
}

#[tokio::test]
async fn api_error_carries_status_and_body() {
    let server = ScriptedServer::new(vec![response_json(
        404,
        r#"{"code":"not_found","message":"Conversation Not Exists.","status":404}"#,
    )])
    .await;
    let client = server.options().client("app-secret").unwrap();

    let err = client
        .request(Request::get("/conversations/c-1/messages"))
        .await
        .unwrap_err();

    match &err {
        ClientError::Api {
            status,
            body,
            read_error,
        } => {
            assert!(read_error.is_none());
            assert_eq!(status.as_u16(), 404);
            assert_eq!(body.code(), Some("not_found"));
            assert_eq!(body.message(), Some("Conversation Not Exists."));
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(err.status().map(|s| s.as_u16()), Some(404));

    let request = server.last_request();
    assert_eq!(
        request.request_line(),
        "GET /v1/conversations/c-1/messages HTTP/1.1"
    );
    assert_eq!(request.header("authorization"), Some("Bearer app-secret"));

    server.shutdown();
}

#[tokio::test]
async fn truncated_error_body_keeps_status_and_read_failure() {
    let server = ScriptedServer::new(vec![response_truncated(500, 100, r#"{"co"#)]).await;
    let client = server.options().client("app-secret").unwrap();

    let err = client
        .request(Request::get("/parameters"))
        .await
        .unwrap_err();

    assert_eq!(err.status().map(|s| s.as_u16()), Some(500));
    match &err {
        ClientError::Api {
            body, read_error, ..
        } => {
            assert!(read_error.is_some());
            let received = body.message().unwrap_or_default();
            assert!(r#"{"co"#.starts_with(received));
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert!(std::error::Error::source(&err).is_some());

    server.shutdown();
}

#[tokio::test]
async fn buffered_send_decodes_json_once() {
    let server = ScriptedServer::new(vec![response_json(
        200,
        r#"{"opening_statement":"Hi there"}"#,
    )])
    .await;
    let client = server.options().client("app-secret").unwrap();

    let reply = client
        .send(Request::get("/parameters"), false)
        .await
        .unwrap();
    let Reply::Buffered(response) = reply else {
        panic!("expected a buffered reply");
    };

    assert_eq!(response.status(), 200);
    let first = response.json().unwrap();
    let second = response.json().unwrap();
    assert!(std::ptr::eq(first, second));
    assert_eq!(first["opening_statement"], "Hi there");

    server.shutdown();
}

#[tokio::test]
async fn streaming_chat_survives_arbitrary_chunking() {
    let server = ScriptedServer::new(vec![response_sse_chunks(
        &[
            "data: {\"event\":\"message\",\"task_id\":\"t-1\",\"answer\":\"Hel",
            "lo\"}\r\n\r\nda",
            "ta: {\"event\":\"message\",\"answer\":\", world\"}\n",
            "\n: keep-alive\n\n",
            "data: {\"event\":\"message_end\",\"conversation_id\":\"c-1\"}\n\n",
            "data: [DONE]\n\n",
        ],
        15,
    )])
    .await;
    let chat = server.options().chat("app-secret").unwrap();

    let answer = chat
        .chat_messages_stream(ChatRequest::new("u-1", "hi"))
        .await
        .unwrap()
        .collect_answer()
        .await
        .unwrap();

    assert_eq!(answer.text, "Hello, world");
    assert_eq!(answer.task_id.as_deref(), Some("t-1"));
    assert_eq!(answer.conversation_id.as_deref(), Some("c-1"));

    let request = server.last_request();
    assert_eq!(request.request_line(), "POST /v1/chat-messages HTTP/1.1");
    assert_eq!(request.header("accept"), Some("text/event-stream"));
    assert!(request.body_text().contains("\"response_mode\":\"streaming\""));

    server.shutdown();
}

#[tokio::test]
async fn closing_a_stream_early_is_idempotent() {
    let server = ScriptedServer::new(vec![response_sse_chunks(
        &[
            "data: {\"event\":\"message\",\"answer\":\"a\"}\n\n",
            "data: {\"event\":\"message\",\"answer\":\"b\"}\n\n",
        ],
        0,
    )])
    .await;
    let chat = server.options().chat("app-secret").unwrap();

    let mut stream = chat
        .chat_messages_stream(ChatRequest::new("u-1", "hi"))
        .await
        .unwrap();
    let first = stream.next().await.unwrap().unwrap();
    assert!(matches!(first, StreamChunk::Message(ref delta) if delta.answer == "a"));

    stream.close();
    stream.close();
    assert!(stream.next().await.is_none());

    server.shutdown();
}

#[tokio::test]
async fn multipart_upload_streams_file_content() {
    let server = ScriptedServer::new(vec![response_json(
        201,
        r#"{"id":"f-1","name":"notes.txt","size":10,"extension":"txt","mime_type":"text/plain"}"#,
    )])
    .await;
    let chat = server.options().chat("app-secret").unwrap();

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"hello dify").unwrap();

    let response = chat
        .file_upload(
            "u-1",
            FileInput::SinglePath {
                path: file.path().to_path_buf(),
                name: Some("notes.txt".to_string()),
            },
        )
        .await
        .unwrap();
    assert_eq!(response.status(), 201);

    let request = server.last_request();
    assert_eq!(request.request_line(), "POST /v1/files/upload HTTP/1.1");
    assert!(request
        .header("content-type")
        .unwrap()
        .starts_with("multipart/form-data; boundary="));

    let body = request.body_text();
    assert!(body.contains("name=\"user\""));
    assert!(body.contains("filename=\"notes.txt\""));
    assert!(body.contains("hello dify"));

    server.shutdown();
}

struct StampHeader;

#[async_trait]
impl Middleware for StampHeader {
    async fn handle(
        &self,
        mut request: reqwest::Request,
        next: Next<'_>,
    ) -> Result<reqwest::Response, ClientError> {
        request
            .headers_mut()
            .insert("x-request-source", "integration".parse().unwrap());
        next.run(request).await
    }
}

#[tokio::test]
async fn middleware_and_default_headers_reach_the_wire() {
    let server = ScriptedServer::new(vec![response_json(200, r#"{"result":"success"}"#)]).await;
    let options = server
        .options()
        .with_header("X-Tenant", "acme")
        .with_middleware(StampHeader);
    let chat = options.chat("app-secret").unwrap();

    chat.meta().await.unwrap();

    let request = server.last_request();
    assert_eq!(request.header("x-tenant"), Some("acme"));
    assert_eq!(request.header("x-request-source"), Some("integration"));

    server.shutdown();
}

async fn serve_one(
    mut socket: TcpStream,
    scripts: Arc<Vec<ScriptedResponse>>,
    request_count: Arc<AtomicUsize>,
    received: Arc<Mutex<Vec<ReceivedRequest>>>,
) {
    let request = match read_request(&mut socket).await {
        Ok(request) => request,
        Err(_) => return,
    };
    received.lock().unwrap().push(request);

    let index = request_count.fetch_add(1, Ordering::AcqRel);
    let response = scripts
        .get(index)
        .cloned()
        .unwrap_or_else(|| response_json(500, r#"{"code":"unexpected_request"}"#));

    let framing = match response.declared_length {
        Some(length) => format!("Content-Length: {length}"),
        None => "Transfer-Encoding: chunked".to_string(),
    };
    let headers = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\n{framing}\r\nConnection: close\r\n\r\n",
        response.status,
        status_reason(response.status),
        response.content_type,
    );
    if socket.write_all(headers.as_bytes()).await.is_err() {
        return;
    }

    if response.declared_length.is_some() {
        for chunk in response.chunks {
            if socket.write_all(&chunk.bytes).await.is_err() {
                return;
            }
        }
        let _ = socket.shutdown().await;
        return;
    }

    for chunk in response.chunks {
        if chunk.delay_ms > 0 {
            sleep(Duration::from_millis(chunk.delay_ms)).await;
        }
        let prefix = format!("{:X}\r\n", chunk.bytes.len());
        if socket.write_all(prefix.as_bytes()).await.is_err() {
            return;
        }
        if socket.write_all(&chunk.bytes).await.is_err() {
            return;
        }
        if socket.write_all(b"\r\n").await.is_err() {
            return;
        }
    }

    let _ = socket.write_all(b"0\r\n\r\n").await;
    let _ = socket.shutdown().await;
}

fn status_reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        404 => "Not Found",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}

async fn read_request(socket: &mut TcpStream) -> std::io::Result<ReceivedRequest> {
    let mut data = Vec::new();
    let mut buffer = [0_u8; 4096];

    let header_end = loop {
        if let Some(pos) = find(&data, b"\r\n\r\n") {
            break pos + 4;
        }
        let n = socket.read(&mut buffer).await?;
        if n == 0 {
            return Err(std::io::ErrorKind::UnexpectedEof.into());
        }
        data.extend_from_slice(&buffer[..n]);
    };

    let mut request = ReceivedRequest {
        head: String::from_utf8_lossy(&data[..header_end]).into_owned(),
        body: data[header_end..].to_vec(),
    };

    let content_length = request
        .header("content-length")
        .and_then(|value| value.parse::<usize>().ok());
    let chunked = request
        .header("transfer-encoding")
        .is_some_and(|value| value.eq_ignore_ascii_case("chunked"));

    if let Some(length) = content_length {
        while request.body.len() < length {
            let n = socket.read(&mut buffer).await?;
            if n == 0 {
                break;
            }
            request.body.extend_from_slice(&buffer[..n]);
        }
    } else if chunked {
        while !request.body.ends_with(b"0\r\n\r\n") {
            let n = socket.read(&mut buffer).await?;
            if n == 0 {
                break;
            }
            request.body.extend_from_slice(&buffer[..n]);
        }
        request.body = dechunk(&request.body);
    }

    Ok(request)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn dechunk(mut data: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    while let Some(line_end) = find(data, b"\r\n") {
        let size_line = String::from_utf8_lossy(&data[..line_end]);
        let size = usize::from_str_radix(size_line.trim(), 16).unwrap_or(0);
        if size == 0 {
            break;
        }
        let start = line_end + 2;
        let end = (start + size).min(data.len());
        body.extend_from_slice(&data[start..end]);
        data = &data[(end + 2).min(data.len())..];
    }
    body
}
