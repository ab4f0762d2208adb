//! Synthesize speech into an mp3 file.
//!
//! Run with:
//! ```bash
//! export DIFY_API_KEY="app-your-key"
//! cargo run --example text_to_audio
//! ```

use difyai::apps::App;
use difyai::ClientOptions;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let api_key = std::env::var("DIFY_API_KEY").expect("DIFY_API_KEY must be set");
    let chat = ClientOptions::from_env().chat(api_key)?;

    let text = "Hello from Rust.";

    // Buffered: the body is the audio file
    let response = chat.text_to_audio("demo-user", text).await?;
    println!(
        "Buffered: {} bytes of {}",
        response.bytes().len(),
        response.header("content-type").unwrap_or("unknown")
    );
    tokio::fs::write("speech.mp3", response.bytes()).await?;

    // Streaming: base64 chunks decoded and joined
    let audio = chat
        .text_to_audio_stream("demo-user", text)
        .await?
        .collect_audio()
        .await?;
    println!("Streamed: {} bytes", audio.len());
    tokio::fs::write("speech-streamed.mp3", audio).await?;

    Ok(())
}
