//! Typed message-lifecycle events and the mapping from raw frames to them.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, de};
use serde_json::Value;

use crate::error::LLMError;
use crate::types::{TurnContent, Usage};

/// Event type used for locally detected failures. It never appears on the wire.
pub const CLIENT_ERROR_EVENT: &str = "_client_error";

/// Unit delivered on a response channel.
#[derive(Debug)]
pub struct MessageEvent {
    /// Wire event name (`content_block_delta`, ...), `message` for a non-streaming
    /// reply, or [`CLIENT_ERROR_EVENT`].
    pub event_type: String,
    pub payload: MessageContent,
}

impl MessageEvent {
    pub(crate) fn client_error(error: LLMError) -> Self {
        Self {
            event_type: CLIENT_ERROR_EVENT.to_string(),
            payload: MessageContent::ClientError(ClientError::new(error)),
        }
    }

    /// Incremental text carried by this event, empty when there is none.
    pub fn text(&self) -> &str {
        self.payload.text()
    }

    /// `true` for API-reported and locally detected errors.
    pub fn is_error(&self) -> bool {
        matches!(
            self.payload,
            MessageContent::ClaudeError(_) | MessageContent::ClientError(_)
        )
    }
}

/// Every payload a [`MessageEvent`] may carry.
#[derive(Debug)]
pub enum MessageContent {
    MessageStart(MessageStart),
    MessagePing(MessagePing),
    ContentBlockStart(ContentBlockStart),
    ContentBlockDelta(ContentBlockDelta),
    ContentBlockStop(ContentBlockStop),
    MessageDelta(MessageDelta),
    MessageStop(MessageStop),
    /// Error sent by the API inside the stream.
    ClaudeError(ClaudeError),
    /// Failure detected by this library after the channel was opened.
    ClientError(ClientError),
}

impl MessageContent {
    /// Incremental text contributed by the event.
    ///
    /// For a complete message this is the concatenated text of its content blocks.
    pub fn text(&self) -> &str {
        match self {
            Self::MessageStart(start) => start.text(),
            Self::ContentBlockStart(start) => &start.content_block.text,
            Self::ContentBlockDelta(delta) => &delta.delta.text,
            _ => "",
        }
    }
}

/// A full message: the first streamed event, or the whole non-streaming reply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub id: String,
    /// Object type, normally `message`.
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub content: Vec<TurnContent>,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub stop_reason: Option<String>,
    #[serde(default)]
    pub stop_sequence: Option<String>,
    #[serde(default)]
    pub usage: Usage,
}

/// Payload of `message_start` and of non-streaming replies.
///
/// Decodes both the `{"type":"message_start","message":{...}}` wrapper sent in streams
/// and a bare message object. The wrapper is tried first and a bare message carrying an
/// unrelated `message` field still decodes. Serializes as the bare message.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct MessageStart {
    pub message: Message,
    #[serde(skip)]
    text: String,
}

impl MessageStart {
    pub fn new(message: Message) -> Self {
        let text = message
            .content
            .iter()
            .map(TurnContent::text_content)
            .collect();
        Self { message, text }
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

impl<'de> Deserialize<'de> for MessageStart {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        let message = match value.get("message") {
            Some(inner) if inner.is_object() => {
                Message::deserialize(inner).or_else(|wrapped| match Message::deserialize(&value) {
                    // A failed wrapper never decodes as an empty bare message.
                    Ok(bare) if bare.kind != "message_start" => Ok(bare),
                    _ => Err(wrapped),
                })
            }
            _ => Message::deserialize(&value),
        }
        .map_err(de::Error::custom)?;
        Ok(Self::new(message))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct MessagePing {
    #[serde(rename = "type", default)]
    pub kind: String,
}

/// Opens content block `index`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ContentBlockStart {
    #[serde(rename = "type", default)]
    pub kind: String,
    pub index: usize,
    pub content_block: ContentBlock,
}

/// Block stub announced by `content_block_start`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ContentBlock {
    /// `text` or `tool_use`.
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub text: String,
    /// Tool call id for `tool_use` blocks.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub input: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ContentBlockDelta {
    #[serde(rename = "type", default)]
    pub kind: String,
    pub index: usize,
    pub delta: BlockDelta,
}

/// Increment of a content block: text for `text_delta`, a JSON fragment for
/// `input_json_delta`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BlockDelta {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub partial_json: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ContentBlockStop {
    #[serde(rename = "type", default)]
    pub kind: String,
    pub index: usize,
}

/// Top-level message changes reported near the end of a stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct MessageDelta {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub delta: MessageDeltaFields,
    /// Cumulative output-token count.
    #[serde(default)]
    pub usage: OutputUsage,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct MessageDeltaFields {
    #[serde(default)]
    pub stop_reason: Option<String>,
    #[serde(default)]
    pub stop_sequence: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct OutputUsage {
    #[serde(default)]
    pub output_tokens: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct MessageStop {
    #[serde(rename = "type", default)]
    pub kind: String,
}

/// Error event sent by the API, e.g. `overloaded_error`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ClaudeError {
    #[serde(rename = "type", default)]
    pub kind: String,
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub message: String,
}

impl fmt::Display for ClaudeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.error.kind, self.error.message)
    }
}

/// Wraps a failure detected locally while decoding a response.
#[derive(Debug)]
pub struct ClientError {
    error: LLMError,
}

impl ClientError {
    pub fn new(error: LLMError) -> Self {
        Self { error }
    }

    pub fn error(&self) -> &LLMError {
        &self.error
    }

    pub fn into_error(self) -> LLMError {
        self.error
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.error.fmt(f)
    }
}

/// Maps a frame's event name and JSON data onto a typed payload.
///
/// # Errors
///
/// Returns [`LLMError::Protocol`] for names outside the known set and
/// [`LLMError::Decode`] when the data does not fit the chosen shape.
///
/// # Examples
///
/// ```
/// use claude_wire::event::{decode_event, MessageContent};
///
/// let payload = decode_event(
///     "content_block_delta",
///     r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hi"}}"#,
/// )
/// .unwrap();
/// assert!(matches!(payload, MessageContent::ContentBlockDelta(_)));
/// assert_eq!(payload.text(), "Hi");
/// ```
pub fn decode_event(name: &str, data: &str) -> Result<MessageContent, LLMError> {
    fn parse<'a, T: Deserialize<'a>>(data: &'a str) -> Result<T, LLMError> {
        serde_json::from_str(data).map_err(|err| LLMError::decode(format!("parse event err: {err}")))
    }

    let content = match name {
        "message_start" => MessageContent::MessageStart(parse(data)?),
        "ping" => MessageContent::MessagePing(parse(data)?),
        "content_block_start" => MessageContent::ContentBlockStart(parse(data)?),
        "content_block_delta" => MessageContent::ContentBlockDelta(parse(data)?),
        "content_block_stop" => MessageContent::ContentBlockStop(parse(data)?),
        "message_delta" => MessageContent::MessageDelta(parse(data)?),
        "message_stop" => MessageContent::MessageStop(parse(data)?),
        "error" => MessageContent::ClaudeError(parse(data)?),
        other => {
            return Err(LLMError::protocol(format!("unknown event type: {other}")));
        }
    };
    Ok(content)
}
