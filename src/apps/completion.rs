//! Completion apps: single-turn text generation.

use crate::apps::App;
use crate::client::{Client, ClientError};
use crate::http::encode_segment;
use crate::model::{CompletionRequest, ResponseMode, UserRequest};
use crate::request::Request;
use crate::response::Response;
use crate::stream::StreamResponse;

/// Client of a text-generation app.
#[derive(Debug, Clone)]
pub struct CompletionApp {
    client: Client,
}

impl CompletionApp {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Generate text and wait for the whole result.
    pub async fn completion_messages(
        &self,
        mut request: CompletionRequest,
    ) -> Result<Response, ClientError> {
        request.response_mode = ResponseMode::Blocking;
        self.client.post_json("/completion-messages", &request).await
    }

    /// Generate text as a stream of `message` chunks.
    pub async fn completion_messages_stream(
        &self,
        mut request: CompletionRequest,
    ) -> Result<StreamResponse, ClientError> {
        request.response_mode = ResponseMode::Streaming;
        self.client
            .stream(Request::post("/completion-messages").json(&request)?)
            .await
    }

    pub async fn stop(&self, task_id: &str, user: &str) -> Result<Response, ClientError> {
        let task_id = encode_segment(task_id)?;
        self.client
            .post_json(
                format!("/completion-messages/{task_id}/stop"),
                &UserRequest { user },
            )
            .await
    }
}

impl App for CompletionApp {
    fn client(&self) -> &Client {
        &self.client
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apps::testing::{capture_client, Canned};
    use serde_json::json;

    #[tokio::test]
    async fn test_completion_messages_payload() {
        let (client, captured) = capture_client(Canned::json(200, r#"{"answer":"A haiku"}"#));
        let app = CompletionApp::new(client);

        let request = CompletionRequest::new("u-1").with_input("query", "write a haiku");
        app.completion_messages(request).await.unwrap();

        let sent = captured.last();
        assert_eq!(sent.url, "http://dify.test/v1/completion-messages");
        assert_eq!(
            sent.json(),
            json!({
                "inputs": {"query": "write a haiku"},
                "response_mode": "blocking",
                "user": "u-1"
            })
        );
    }

    #[tokio::test]
    async fn test_completion_stream_replace_wins() {
        let (client, _) = capture_client(Canned::event_stream(concat!(
            "data: {\"event\":\"message\",\"answer\":\"draft\"}\n\n",
            "data: {\"event\":\"message_replace\",\"answer\":\"[filtered]\"}\n\n",
            "data: {\"event\":\"message\",\"answer\":\"!\"}\n\n",
            "data: [DONE]\n\n",
        )));
        let app = CompletionApp::new(client);

        let answer = app
            .completion_messages_stream(CompletionRequest::new("u-1"))
            .await
            .unwrap()
            .collect_answer()
            .await
            .unwrap();

        assert_eq!(answer.text, "[filtered]!");
    }

    #[tokio::test]
    async fn test_stream_error_event_fails() {
        let (client, _) = capture_client(Canned::event_stream(concat!(
            "data: {\"event\":\"message\",\"answer\":\"par\"}\n\n",
            "data: {\"event\":\"error\",\"status\":400,\"code\":\"provider_quota_exceeded\",\"message\":\"quota\"}\n\n",
        )));
        let app = CompletionApp::new(client);

        let err = app
            .completion_messages_stream(CompletionRequest::new("u-1"))
            .await
            .unwrap()
            .collect_answer()
            .await
            .unwrap_err();

        match err {
            ClientError::StreamFailed { status, code, .. } => {
                assert_eq!(status, Some(400));
                assert_eq!(code, "provider_quota_exceeded");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_stop_path() {
        let (client, captured) = capture_client(Canned::json(200, r#"{"result":"success"}"#));
        let app = CompletionApp::new(client);

        app.stop("t-3", "u-1").await.unwrap();
        assert_eq!(
            captured.last().url,
            "http://dify.test/v1/completion-messages/t-3/stop"
        );

        let err = app.stop("", "u-1").await.unwrap_err();
        assert!(matches!(err, ClientError::RequestBuild { .. }));
    }

    #[tokio::test]
    async fn test_shared_operations_are_available() {
        let (client, captured) = capture_client(Canned::json(200, r#"{"tool_icons":{}}"#));
        let app = CompletionApp::new(client);

        app.meta().await.unwrap();
        assert_eq!(captured.last().url, "http://dify.test/v1/meta");
    }
}
