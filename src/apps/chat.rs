//! Chat apps: multi-turn conversations.

use crate::apps::App;
use crate::client::{Client, ClientError};
use crate::http::encode_segment;
use crate::model::{
    ChatRequest, ConversationsQuery, MessagesQuery, RenameRequest, ResponseMode, UserRequest,
};
use crate::request::{FileInput, MultipartPart, Request};
use crate::response::Response;
use crate::stream::StreamResponse;

/// Client of a chat-type app (chatbot, agent, chatflow).
///
/// # Example
/// ```no_run
/// use difyai::model::ChatRequest;
/// use difyai::options::ClientOptions;
///
/// # async fn run() -> Result<(), difyai::ClientError> {
/// let chat = ClientOptions::from_env().chat("app-key")?;
/// let answer = chat
///     .chat_messages_stream(ChatRequest::new("user-1", "What is Rust?"))
///     .await?
///     .collect_answer()
///     .await?;
/// println!("{}", answer.text);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ChatApp {
    client: Client,
}

impl ChatApp {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Send a message and wait for the whole answer.
    pub async fn chat_messages(&self, mut request: ChatRequest) -> Result<Response, ClientError> {
        request.response_mode = ResponseMode::Blocking;
        self.client.post_json("/chat-messages", &request).await
    }

    /// Send a message and stream the answer as it is generated.
    pub async fn chat_messages_stream(
        &self,
        mut request: ChatRequest,
    ) -> Result<StreamResponse, ClientError> {
        request.response_mode = ResponseMode::Streaming;
        self.client
            .stream(Request::post("/chat-messages").json(&request)?)
            .await
    }

    /// Stop a streaming generation. Only applies to streaming mode.
    pub async fn stop(&self, task_id: &str, user: &str) -> Result<Response, ClientError> {
        let task_id = encode_segment(task_id)?;
        self.client
            .post_json(
                format!("/chat-messages/{task_id}/stop"),
                &UserRequest { user },
            )
            .await
    }

    /// Suggested follow-up questions for a message.
    pub async fn suggested(&self, message_id: &str, user: &str) -> Result<Response, ClientError> {
        let message_id = encode_segment(message_id)?;
        self.client
            .request(Request::get(format!("/messages/{message_id}/suggested")).query("user", user))
            .await
    }

    /// Conversation history, newest page first.
    pub async fn messages(&self, query: MessagesQuery) -> Result<Response, ClientError> {
        let request = Request::get("/messages")
            .query("user", query.user)
            .query("conversation_id", query.conversation_id)
            .query_opt("first_id", query.first_id)
            .query_opt("limit", query.limit);
        self.client.request(request).await
    }

    /// Conversations of an end-user.
    pub async fn conversations(&self, query: ConversationsQuery) -> Result<Response, ClientError> {
        let request = Request::get("/conversations")
            .query("user", query.user)
            .query_opt("last_id", query.last_id)
            .query_opt("limit", query.limit)
            .query_opt("pinned", query.pinned);
        self.client.request(request).await
    }

    /// Rename a conversation. With `name` absent the service generates one.
    pub async fn rename_conversation(
        &self,
        conversation_id: &str,
        user: &str,
        name: Option<&str>,
    ) -> Result<Response, ClientError> {
        let conversation_id = encode_segment(conversation_id)?;
        self.client
            .post_json(
                format!("/conversations/{conversation_id}/name"),
                &RenameRequest {
                    user,
                    name,
                    auto_generate: name.is_none(),
                },
            )
            .await
    }

    pub async fn delete_conversation(
        &self,
        conversation_id: &str,
        user: &str,
    ) -> Result<Response, ClientError> {
        let conversation_id = encode_segment(conversation_id)?;
        let request = Request::delete(format!("/conversations/{conversation_id}"))
            .json(&UserRequest { user })?;
        self.client.request(request).await
    }

    /// Transcribe an audio file.
    pub async fn audio_to_text(&self, user: &str, file: FileInput) -> Result<Response, ClientError> {
        let mut parts = vec![MultipartPart::text("user", user)];
        parts.extend(file.into_parts("file")?);

        self.client
            .request(Request::post("/audio-to-text").multipart(parts))
            .await
    }
}

impl App for ChatApp {
    fn client(&self) -> &Client {
        &self.client
    }
}
