//! Streaming responses.
//!
//! A [`StreamSession`] owns the open response body. It is consumed exactly
//! once by an [`EventStream`], which feeds the bytes through the
//! [`SseDecoder`] and yields [`StreamEvent`]s as they complete.
//! [`StreamResponse`] maps those events onto [`StreamChunk`]s.
//!
//! The connection is released exactly once: on `[DONE]`, end of input,
//! decode or transport error, explicit `close()`, or when the stream is
//! dropped before it is exhausted.
//!
//! # Example
//! ```ignore
//! use futures::StreamExt;
//!
//! let mut stream = chat.chat_messages_stream(request).await?;
//! while let Some(chunk) = stream.next().await {
//!     if let Some(text) = chunk?.text() {
//!         print!("{}", text);
//!     }
//! }
//! ```

use std::fmt;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tracing::{debug, trace};

use crate::client::ClientError;
use crate::sse::{Frame, SseDecoder};

pub use crate::model::{Answer, StreamChunk};
pub use crate::sse::StreamEvent;

type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, ClientError>> + Send>>;
type CloseHook = Box<dyn FnOnce() + Send>;

/// Owned handle on an open streaming response body.
pub struct StreamSession {
    body: Option<ByteStream>,
    on_close: Option<CloseHook>,
}

impl StreamSession {
    /// Take ownership of a response body.
    pub fn from_response(response: reqwest::Response) -> Self {
        Self::from_stream(response.bytes_stream().map(|chunk| chunk.map_err(ClientError::from)))
    }

    /// Wrap any byte stream, e.g. a body produced by middleware.
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, ClientError>> + Send + 'static,
    {
        Self {
            body: Some(Box::pin(stream)),
            on_close: None,
        }
    }

    /// Run `hook` once, when the session is closed.
    pub fn on_close(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.on_close = Some(Box::new(hook));
        self
    }

    pub fn is_closed(&self) -> bool {
        self.body.is_none()
    }

    /// Release the connection. Later calls do nothing.
    pub fn close(&mut self) {
        if let Some(body) = self.body.take() {
            drop(body);
            debug!("stream session closed");
            if let Some(hook) = self.on_close.take() {
                hook();
            }
        }
    }

    /// Consume the session as a sequence of decoded events.
    pub fn events(self) -> EventStream {
        EventStream {
            session: self,
            decoder: SseDecoder::new(),
        }
    }

    fn poll_chunk(&mut self, cx: &mut Context<'_>) -> Poll<Option<Result<Bytes, ClientError>>> {
        match self.body.as_mut() {
            Some(body) => body.as_mut().poll_next(cx),
            None => Poll::Ready(None),
        }
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for StreamSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamSession")
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Decoded events of one stream session, in arrival order.
#[derive(Debug)]
pub struct EventStream {
    session: StreamSession,
    decoder: SseDecoder,
}

impl EventStream {
    /// Stop consuming and release the connection.
    pub fn close(&mut self) {
        self.session.close();
    }

    pub fn is_closed(&self) -> bool {
        self.session.is_closed()
    }
}

impl Stream for EventStream {
    type Item = Result<StreamEvent, ClientError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            if this.session.is_closed() {
                return Poll::Ready(None);
            }

            if let Some(frame) = this.decoder.next_frame() {
                return match frame {
                    Ok(Frame::Event(event)) => Poll::Ready(Some(Ok(event))),
                    Ok(Frame::Done) => {
                        this.session.close();
                        Poll::Ready(None)
                    }
                    Err(error) => {
                        this.session.close();
                        Poll::Ready(Some(Err(error)))
                    }
                };
            }

            match ready!(this.session.poll_chunk(cx)) {
                Some(Ok(chunk)) => {
                    trace!(bytes = chunk.len(), "stream chunk received");
                    this.decoder.push(&chunk);
                }
                Some(Err(error)) => {
                    this.session.close();
                    return Poll::Ready(Some(Err(error)));
                }
                None => {
                    this.session.close();
                    return Poll::Ready(match this.decoder.finish() {
                        Some(Frame::Event(event)) => Some(Ok(event)),
                        _ => None,
                    });
                }
            }
        }
    }
}

/// Typed view of a streamed operation.
#[derive(Debug)]
pub struct StreamResponse {
    events: EventStream,
}

impl StreamResponse {
    pub fn new(events: EventStream) -> Self {
        Self { events }
    }

    /// The underlying untyped events.
    pub fn events(self) -> EventStream {
        self.events
    }

    /// Stop consuming and release the connection.
    pub fn close(&mut self) {
        self.events.close();
    }

    /// Fold the stream into the final answer text and its metadata.
    ///
    /// `message_replace` chunks replace the text collected so far; an
    /// `error` chunk fails with [`ClientError::StreamFailed`].
    pub async fn collect_answer(mut self) -> Result<Answer, ClientError> {
        let mut answer = Answer::default();
        while let Some(chunk) = self.next().await {
            match chunk? {
                StreamChunk::Message(delta) | StreamChunk::AgentMessage(delta) => {
                    answer.absorb_ids(&delta.task_id, &delta.message_id, &delta.conversation_id);
                    answer.text.push_str(&delta.answer);
                }
                StreamChunk::MessageReplace(delta) => {
                    answer.absorb_ids(&delta.task_id, &delta.message_id, &delta.conversation_id);
                    answer.text = delta.answer;
                }
                StreamChunk::MessageEnd(end) => {
                    answer.absorb_ids(&end.task_id, &end.message_id, &end.conversation_id);
                    answer.metadata = Some(end.metadata);
                }
                StreamChunk::Error(failure) => return Err(failure.into()),
                _ => {}
            }
        }
        Ok(answer)
    }

    /// Concatenate the decoded audio of all `tts_message` chunks.
    pub async fn collect_audio(mut self) -> Result<Vec<u8>, ClientError> {
        let mut audio = Vec::new();
        while let Some(chunk) = self.next().await {
            match chunk? {
                StreamChunk::TtsMessage(message) | StreamChunk::TtsMessageEnd(message) => {
                    audio.extend(message.decode_audio()?);
                }
                StreamChunk::Error(failure) => return Err(failure.into()),
                _ => {}
            }
        }
        Ok(audio)
    }
}

impl Stream for StreamResponse {
    type Item = Result<StreamChunk, ClientError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match ready!(this.events.poll_next_unpin(cx)) {
            Some(Ok(event)) => {
                let chunk = StreamChunk::from_event(event);
                if chunk.is_err() {
                    this.events.close();
                }
                Poll::Ready(Some(chunk))
            }
            Some(Err(error)) => Poll::Ready(Some(Err(error))),
            None => Poll::Ready(None),
        }
    }
}
