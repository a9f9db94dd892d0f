//! Turns one HTTP response into an ordered channel of [`MessageEvent`]s.
//!
//! [`dispatch`] validates the status and media type synchronously, then hands the body
//! to a producer task that decodes frames, maps them to typed payloads and publishes
//! them while the body is still arriving. Every publish races the caller's
//! [`CancellationToken`]; once it fires the task stops and the channel closes without
//! a terminal event.

use std::collections::HashMap;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::Stream;
use futures_util::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::LLMError;
use crate::event::{ErrorDetail, MessageContent, MessageEvent, MessageStart, decode_event};
use crate::http::HttpResponse;
use crate::stream::{EventStreamDecoder, FrameStream, SseDecoder};

/// Upper bound on the bytes read from a failed response body.
pub const ERROR_BODY_LIMIT: usize = 1 << 13;

/// Events the producer may queue ahead of the consumer.
pub const EVENT_CHANNEL_CAPACITY: usize = 1;

const EVENT_STREAM: &str = "text/event-stream";
const AWS_EVENT_STREAM: &str = "application/vnd.amazon.eventstream";
const JSON: &str = "application/json";

/// Status line and headers of the response behind a [`MessageResponse`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub status: u16,
    pub headers: HashMap<String, String>,
}

impl ResponseHead {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Handle to the events of one request.
///
/// Read events until the channel closes. A `ClaudeError` or `ClientError` payload marks
/// the end of useful output.
#[derive(Debug)]
pub struct MessageResponse {
    events: mpsc::Receiver<MessageEvent>,
    head: ResponseHead,
}

impl MessageResponse {
    /// Waits for the next event; `None` once the producer is done.
    pub async fn next_event(&mut self) -> Option<MessageEvent> {
        self.events.recv().await
    }

    /// The underlying channel receiver.
    pub fn events(&mut self) -> &mut mpsc::Receiver<MessageEvent> {
        &mut self.events
    }

    /// Status and headers of the HTTP response.
    pub fn http_response(&self) -> &ResponseHead {
        &self.head
    }

    /// Concatenates the text of every event until the channel closes.
    ///
    /// # Errors
    ///
    /// An API error event becomes [`LLMError::Api`]; a client error event yields the
    /// error it wraps.
    pub async fn collect_text(mut self) -> Result<String, LLMError> {
        let mut text = String::new();
        while let Some(event) = self.next_event().await {
            match event.payload {
                MessageContent::ClaudeError(err) => {
                    return Err(LLMError::Api {
                        status: self.head.status,
                        error_type: err.error.kind,
                        message: err.error.message,
                    });
                }
                MessageContent::ClientError(err) => return Err(err.into_error()),
                payload => text.push_str(payload.text()),
            }
        }
        Ok(text)
    }
}

impl Stream for MessageResponse {
    type Item = MessageEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().events.poll_recv(cx)
    }
}

/// Handles one HTTP response end to end.
///
/// Must be called from within a tokio runtime; the events are produced on a spawned task.
///
/// # Errors
///
/// Returns synchronously, before any channel exists, when the status is not 200, the
/// media type is unsupported, or a non-streaming body cannot be decoded.
pub async fn dispatch(
    mut response: HttpResponse,
    cancel: CancellationToken,
) -> Result<MessageResponse, LLMError> {
    if response.status != 200 {
        return Err(error_from_body(&mut response).await);
    }

    let content_type = response.header("content-type").unwrap_or_default().to_string();
    let head = ResponseHead {
        status: response.status,
        headers: response.headers.clone(),
    };

    match media_type(&content_type).as_str() {
        EVENT_STREAM => Ok(spawn_stream(
            Box::pin(SseDecoder::new(response.body)),
            head,
            cancel,
        )),
        AWS_EVENT_STREAM => Ok(spawn_stream(
            Box::pin(EventStreamDecoder::new(response.body)),
            head,
            cancel,
        )),
        JSON => single_message(response, head, cancel).await,
        _ => Err(LLMError::UnexpectedContentType { content_type }),
    }
}

/// Media type portion of a `Content-Type` value, lowercased, without parameters.
fn media_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

async fn error_from_body(response: &mut HttpResponse) -> LLMError {
    #[derive(Deserialize)]
    struct ErrorEnvelope {
        error: ErrorDetail,
    }

    let status = response.status;
    let (body, read_error) = response.read_bounded(ERROR_BODY_LIMIT).await;
    let text = String::from_utf8_lossy(&body).into_owned();

    if let Some(err) = read_error {
        tracing::debug!(status, error = %err, "failed to read error body");
        return LLMError::UnexpectedStatus { status, body: text };
    }

    match serde_json::from_slice::<ErrorEnvelope>(&body) {
        Ok(envelope) => LLMError::Api {
            status,
            error_type: envelope.error.kind,
            message: envelope.error.message,
        },
        Err(_) => LLMError::UnexpectedStatus { status, body: text },
    }
}

fn spawn_stream(
    frames: FrameStream,
    head: ResponseHead,
    cancel: CancellationToken,
) -> MessageResponse {
    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    tokio::spawn(publish_frames(frames, tx, cancel));
    MessageResponse { events: rx, head }
}

async fn publish_frames(
    mut frames: FrameStream,
    tx: mpsc::Sender<MessageEvent>,
    cancel: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!("response cancelled while reading frames");
                return;
            }
            next = frames.next() => next,
        };
        let Some(frame) = next else {
            return;
        };

        let frame = match frame {
            Ok(frame) => frame,
            Err(err) => {
                publish(&tx, &cancel, MessageEvent::client_error(err)).await;
                return;
            }
        };

        tracing::debug!(
            event = frame.name(),
            id = frame.id.as_deref(),
            data = frame.data.trim_end(),
            "stream frame"
        );

        let event = match decode_event(frame.name(), &frame.data) {
            Ok(payload) => MessageEvent {
                event_type: frame.name().to_string(),
                payload,
            },
            Err(err) => {
                publish(&tx, &cancel, MessageEvent::client_error(err)).await;
                return;
            }
        };

        if !publish(&tx, &cancel, event).await {
            return;
        }
    }
}

/// Sends one event unless the caller cancels first or stopped listening.
async fn publish(
    tx: &mpsc::Sender<MessageEvent>,
    cancel: &CancellationToken,
    event: MessageEvent,
) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            tracing::debug!("response cancelled while publishing");
            false
        }
        sent = tx.send(event) => sent.is_ok(),
    }
}

async fn single_message(
    mut response: HttpResponse,
    head: ResponseHead,
    cancel: CancellationToken,
) -> Result<MessageResponse, LLMError> {
    let body = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            return Err(LLMError::Aborted {
                message: "cancelled while reading response body".to_string(),
            });
        }
        body = response.read_all() => body?,
    };

    let message: MessageStart = serde_json::from_slice(&body)
        .map_err(|err| LLMError::decode(format!("failed to decode message: {err}")))?;
    tracing::debug!(reply = ?message.message, "non-streaming response");

    let event = MessageEvent {
        event_type: message.message.kind.clone(),
        payload: MessageContent::MessageStart(message),
    };

    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    tokio::spawn(async move {
        publish(&tx, &cancel, event).await;
    });
    Ok(MessageResponse { events: rx, head })
}
