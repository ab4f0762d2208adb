//! Streaming chat against a Dify chat app.
//!
//! Run with:
//! ```bash
//! export DIFY_API_KEY="app-your-key"
//! cargo run --example chat_streaming
//! ```

use std::io::Write;

use difyai::middleware::TraceMiddleware;
use difyai::model::{ChatRequest, StreamChunk};
use difyai::ClientOptions;
use futures::StreamExt;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let api_key = std::env::var("DIFY_API_KEY").expect("DIFY_API_KEY environment variable must be set");

    // DIFY_BASE_URL selects a self-hosted instance
    let chat = ClientOptions::from_env()
        .with_timeout(std::time::Duration::from_secs(120))
        .with_middleware(TraceMiddleware)
        .chat(api_key)?;

    let request = ChatRequest::new("demo-user", "Write a haiku about Rust programming.");
    let mut stream = chat.chat_messages_stream(request).await?;

    print!("Response: ");
    while let Some(chunk) = stream.next().await {
        match chunk? {
            StreamChunk::Message(delta) | StreamChunk::AgentMessage(delta) => {
                print!("{}", delta.answer);
                std::io::stdout().flush()?;
            }
            StreamChunk::AgentThought(thought) => {
                println!("\n[thought] {}", thought.thought);
            }
            StreamChunk::MessageEnd(end) => {
                println!("\n\n=== Stream Complete ===");
                if let Some(conversation_id) = end.conversation_id {
                    println!("Conversation: {conversation_id}");
                }
                if let Some(usage) = end.metadata.usage {
                    println!("Total tokens: {:?}", usage.total_tokens);
                }
            }
            StreamChunk::Error(failure) => {
                eprintln!("\nError in stream: {}", failure.message);
                break;
            }
            _ => {}
        }
    }

    Ok(())
}
