//! # difyai - Dify API Client Library
//!
//! An async Rust client for the Dify conversational-AI service API.
//!
//! ## Features
//! - Async-first, tokio compatible
//! - Bearer-authenticated JSON and multipart requests
//! - Streaming responses via Server-Sent Events
//! - Composable request middleware
//! - Typed chat, completion and audio payloads
//!
//! ## Architecture
//!
//! ### Core Types
//!
//! - **`ClientOptions`**: Base URL, default headers, timeouts and middleware
//! - **`Client`**: Transport bound to one API key; sends a [`Request`]
//! - **`Response`**: Buffered reply with lazily decoded JSON
//! - **`StreamResponse`**: Open event stream, closed exactly once
//! - **`App`**: Operations shared by every app type, with `ChatApp` and
//!   `CompletionApp` on top
//!
//! ## Demos
//!
//! Runnable programs live in `demos/` and are registered as Cargo examples:
//!
//! ```bash
//! export DIFY_API_KEY="app-your-key"
//! cargo run --example chat_streaming
//! cargo run --example file_upload -- path/to/picture.png
//! cargo run --example text_to_audio
//! ```
//!
//! ## Example
//! ```no_run
//! use difyai::model::ChatRequest;
//! use difyai::options::ClientOptions;
//! use futures::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let chat = ClientOptions::from_env().chat("app-your-key")?;
//!
//!     let mut stream = chat
//!         .chat_messages_stream(ChatRequest::new("user-1", "Hello!"))
//!         .await?;
//!
//!     while let Some(chunk) = stream.next().await {
//!         if let Some(text) = chunk?.text() {
//!             print!("{text}");
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod apps;
pub mod client;
pub mod http;
pub mod middleware;
pub mod model;
pub mod options;
pub mod request;
pub mod response;
pub mod sse;
pub mod stream;

// Re-exports for convenience
pub use apps::{App, ChatApp, CompletionApp};
pub use client::{Client, ClientError, Reply};
pub use options::ClientOptions;
pub use request::Request;
pub use response::Response;
pub use stream::{StreamChunk, StreamEvent, StreamResponse, StreamSession};
