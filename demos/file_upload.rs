//! Upload an image and ask about it in a chat.
//!
//! Run with:
//! ```bash
//! export DIFY_API_KEY="app-your-key"
//! cargo run --example file_upload -- path/to/picture.png
//! ```

use difyai::apps::App;
use difyai::model::{ChatRequest, InputFile, UploadedFile};
use difyai::request::FileInput;
use difyai::ClientOptions;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let api_key = std::env::var("DIFY_API_KEY").expect("DIFY_API_KEY must be set");
    let path = std::env::args().nth(1).expect("usage: file_upload <image path>");

    let chat = ClientOptions::from_env().chat(api_key)?;

    let uploaded: UploadedFile = chat
        .file_upload("demo-user", FileInput::path(path))
        .await?
        .deserialize()?;
    println!("Uploaded {} as {}", uploaded.name, uploaded.id);

    let request = ChatRequest::new("demo-user", "What is in this picture?")
        .with_file(InputFile::uploaded_image(uploaded.id));
    let response = chat.chat_messages(request).await?;

    println!("{}", response.json()?["answer"]);
    Ok(())
}
