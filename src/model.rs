//! Typed payloads of the Dify service API.

use base64::prelude::*;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::client::ClientError;
use crate::sse::StreamEvent;

/// How the service returns a generated message.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResponseMode {
    #[default]
    Blocking,
    Streaming,
}

/// End-user rating of a message.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Rating {
    Like,
    Dislike,
}

#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransferMethod {
    RemoteUrl,
    LocalFile,
}

/// A file attached to a chat or completion message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InputFile {
    #[serde(rename = "type")]
    pub file_type: String,
    pub transfer_method: TransferMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload_file_id: Option<String>,
}

impl InputFile {
    /// An image previously stored with `file_upload`.
    pub fn uploaded_image(upload_file_id: impl Into<String>) -> Self {
        Self {
            file_type: "image".to_string(),
            transfer_method: TransferMethod::LocalFile,
            url: None,
            upload_file_id: Some(upload_file_id.into()),
        }
    }

    /// An image the service downloads itself.
    pub fn remote_image(url: impl Into<String>) -> Self {
        Self {
            file_type: "image".to_string(),
            transfer_method: TransferMethod::RemoteUrl,
            url: Some(url.into()),
            upload_file_id: None,
        }
    }
}

/// Body of `POST /chat-messages`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChatRequest {
    pub inputs: Map<String, Value>,
    pub query: String,
    pub response_mode: ResponseMode,
    pub user: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<InputFile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_generate_name: Option<bool>,
}

impl ChatRequest {
    pub fn new(user: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            query: query.into(),
            ..Default::default()
        }
    }

    /// Continue an existing conversation.
    pub fn with_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    /// Set an app input variable.
    pub fn with_input(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.inputs.insert(key.into(), value.into());
        self
    }

    pub fn with_file(mut self, file: InputFile) -> Self {
        self.files.push(file);
        self
    }
}

/// Body of `POST /completion-messages`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CompletionRequest {
    pub inputs: Map<String, Value>,
    pub response_mode: ResponseMode,
    pub user: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<InputFile>,
}

impl CompletionRequest {
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            ..Default::default()
        }
    }

    /// Set an app input variable, e.g. `query`.
    pub fn with_input(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.inputs.insert(key.into(), value.into());
        self
    }

    pub fn with_file(mut self, file: InputFile) -> Self {
        self.files.push(file);
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct FeedbackRequest<'a> {
    pub user: &'a str,
    pub rating: Option<Rating>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct TextToAudioRequest<'a> {
    pub text: &'a str,
    pub user: &'a str,
    pub streaming: bool,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct UserRequest<'a> {
    pub user: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct RenameRequest<'a> {
    pub user: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<&'a str>,
    pub auto_generate: bool,
}

/// Query of `GET /messages`.
#[derive(Debug, Clone, Default)]
pub struct MessagesQuery {
    pub user: String,
    pub conversation_id: String,
    pub first_id: Option<String>,
    pub limit: Option<u32>,
}

/// Query of `GET /conversations`.
#[derive(Debug, Clone, Default)]
pub struct ConversationsQuery {
    pub user: String,
    pub last_id: Option<String>,
    pub limit: Option<u32>,
    pub pinned: Option<bool>,
}

/// Result of `POST /files/upload`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UploadedFile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub size: u64,
    pub extension: Option<String>,
    pub mime_type: Option<String>,
    pub created_by: Option<String>,
    pub created_at: Option<i64>,
}

/// Token usage and cost of one message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Usage {
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
    pub total_tokens: Option<u64>,
    pub total_price: Option<String>,
    pub currency: Option<String>,
    pub latency: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct MessageMetadata {
    pub usage: Option<Usage>,
    #[serde(default)]
    pub retriever_resources: Vec<Value>,
}

/// Incremental answer text (`message`, `agent_message`, `message_replace`).
#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
pub struct MessageDelta {
    pub id: Option<String>,
    pub task_id: Option<String>,
    pub message_id: Option<String>,
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub answer: String,
    pub created_at: Option<i64>,
}

/// One reasoning step of an agent app.
#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
pub struct AgentThought {
    pub id: Option<String>,
    pub task_id: Option<String>,
    pub message_id: Option<String>,
    pub position: Option<u32>,
    #[serde(default)]
    pub thought: String,
    pub observation: Option<String>,
    pub tool: Option<String>,
    pub tool_input: Option<String>,
    #[serde(default)]
    pub message_files: Vec<String>,
    pub created_at: Option<i64>,
}

/// A file produced while answering, e.g. a generated image.
#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
pub struct MessageFile {
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub file_type: Option<String>,
    pub belongs_to: Option<String>,
    pub url: Option<String>,
    pub conversation_id: Option<String>,
}

/// Final event of a message, carrying usage metadata.
#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
pub struct MessageEnd {
    pub id: Option<String>,
    pub task_id: Option<String>,
    pub message_id: Option<String>,
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub metadata: MessageMetadata,
}

/// Base64 encoded audio (`tts_message`, `tts_message_end`).
#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
pub struct TtsAudio {
    pub task_id: Option<String>,
    pub message_id: Option<String>,
    #[serde(default)]
    pub audio: String,
    pub created_at: Option<i64>,
}

impl TtsAudio {
    pub fn decode_audio(&self) -> Result<Vec<u8>, ClientError> {
        Ok(BASE64_STANDARD.decode(self.audio.trim())?)
    }
}

/// An `error` event reported by the service mid-stream.
#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
pub struct StreamFailure {
    pub task_id: Option<String>,
    pub message_id: Option<String>,
    pub status: Option<u16>,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

impl From<StreamFailure> for ClientError {
    fn from(failure: StreamFailure) -> Self {
        ClientError::StreamFailed {
            status: failure.status,
            code: failure.code,
            message: failure.message,
        }
    }
}

/// Streaming response chunk, typed by event kind.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamChunk {
    Message(MessageDelta),
    AgentMessage(MessageDelta),
    AgentThought(AgentThought),
    MessageFile(MessageFile),
    MessageEnd(MessageEnd),
    MessageReplace(MessageDelta),
    TtsMessage(TtsAudio),
    TtsMessageEnd(TtsAudio),
    Error(StreamFailure),
    Ping,
    /// Any event kind without a typed representation, e.g. workflow events.
    Other(StreamEvent),
}

impl StreamChunk {
    pub fn from_event(event: StreamEvent) -> Result<Self, ClientError> {
        let kind = event.kind().map(str::to_owned);
        let chunk = match kind.as_deref() {
            Some("message") => Self::Message(typed(&event)?),
            Some("agent_message") => Self::AgentMessage(typed(&event)?),
            Some("agent_thought") => Self::AgentThought(typed(&event)?),
            Some("message_file") => Self::MessageFile(typed(&event)?),
            Some("message_end") => Self::MessageEnd(typed(&event)?),
            Some("message_replace") => Self::MessageReplace(typed(&event)?),
            Some("tts_message") => Self::TtsMessage(typed(&event)?),
            Some("tts_message_end") => Self::TtsMessageEnd(typed(&event)?),
            Some("error") => Self::Error(typed(&event)?),
            Some("ping") => Self::Ping,
            _ => Self::Other(event),
        };
        Ok(chunk)
    }

    /// Answer text carried by this chunk, if any.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Message(delta) | Self::AgentMessage(delta) => Some(&delta.answer),
            _ => None,
        }
    }
}

fn typed<T: DeserializeOwned>(event: &StreamEvent) -> Result<T, ClientError> {
    Ok(T::deserialize(&event.data)?)
}

/// A streamed answer folded into one value.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Answer {
    pub text: String,
    pub task_id: Option<String>,
    pub message_id: Option<String>,
    pub conversation_id: Option<String>,
    pub metadata: Option<MessageMetadata>,
}

impl Answer {
    pub(crate) fn absorb_ids(
        &mut self,
        task_id: &Option<String>,
        message_id: &Option<String>,
        conversation_id: &Option<String>,
    ) {
        if self.task_id.is_none() {
            self.task_id = task_id.clone();
        }
        if self.message_id.is_none() {
            self.message_id = message_id.clone();
        }
        if self.conversation_id.is_none() {
            self.conversation_id = conversation_id.clone();
        }
    }
}
