//! Operations available on every Dify app.

use async_trait::async_trait;

use crate::client::{Client, ClientError};
use crate::http::encode_segment;
use crate::model::{FeedbackRequest, Rating, TextToAudioRequest};
use crate::request::{FileInput, MultipartPart, Request};
use crate::response::Response;
use crate::stream::StreamResponse;

/// Shared app operations.
///
/// Implementors only provide access to their [`Client`]; every operation is
/// a provided method that assembles a path and payload and hands it to the
/// transport.
///
/// # Example
/// ```no_run
/// use difyai::apps::{App, ChatApp};
/// use difyai::model::Rating;
/// use difyai::options::ClientOptions;
///
/// # async fn run() -> Result<(), difyai::ClientError> {
/// let chat = ClientOptions::default().chat("app-key")?;
/// chat.message_feedback("user-1", "message-id", Some(Rating::Like)).await?;
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait App: Send + Sync {
    /// The transport this app sends through.
    fn client(&self) -> &Client;

    /// App input form, file upload settings and other parameters.
    async fn parameters(&self) -> Result<Response, ClientError> {
        self.client().get("/parameters").await
    }

    /// App meta information, e.g. tool icons.
    async fn meta(&self) -> Result<Response, ClientError> {
        self.client().get("/meta").await
    }

    /// Rate a message on behalf of an end-user. `None` revokes a rating.
    async fn message_feedback(
        &self,
        user: &str,
        message_id: &str,
        rating: Option<Rating>,
    ) -> Result<Response, ClientError> {
        let message_id = encode_segment(message_id)?;
        self.client()
            .post_json(
                format!("/messages/{message_id}/feedbacks"),
                &FeedbackRequest { user, rating },
            )
            .await
    }

    /// Upload files for use in messages of this end-user.
    ///
    /// The response decodes as [`UploadedFile`](crate::model::UploadedFile).
    async fn file_upload(&self, user: &str, files: FileInput) -> Result<Response, ClientError> {
        let mut parts = vec![MultipartPart::text("user", user)];
        parts.extend(files.into_parts("file")?);

        self.client()
            .request(Request::post("/files/upload").multipart(parts))
            .await
    }

    /// Synthesize speech. The audio is the raw response body.
    async fn text_to_audio(&self, user: &str, text: &str) -> Result<Response, ClientError> {
        self.client()
            .post_json(
                "/text-to-audio",
                &TextToAudioRequest {
                    text,
                    user,
                    streaming: false,
                },
            )
            .await
    }

    /// Synthesize speech as a stream of `tts_message` chunks.
    async fn text_to_audio_stream(
        &self,
        user: &str,
        text: &str,
    ) -> Result<StreamResponse, ClientError> {
        let request = Request::post("/text-to-audio").json(&TextToAudioRequest {
            text,
            user,
            streaming: true,
        })?;
        self.client().stream(request).await
    }
}
