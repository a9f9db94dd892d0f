//! Request-side data structures of the Messages API.
//!
//! The same [`Turn`] and [`TurnContent`] values are used when building requests and when
//! decoding the content of messages returned by the API, so their JSON shape follows the
//! upstream field names exactly.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Maximum output tokens applied when a request leaves `max_tokens` unset.
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Chat role string; the API accepts `user` and `assistant`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(pub String);

impl Role {
    pub fn user() -> Self {
        Self("user".to_string())
    }

    pub fn assistant() -> Self {
        Self("assistant".to_string())
    }
}

/// One role-tagged message in a conversation.
///
/// # Examples
///
/// ```
/// # use claude_wire::types::{Role, Turn, TurnContent};
/// let turn = Turn {
///     role: Role::user(),
///     content: vec![
///         TurnContent::text("Describe this image"),
///         TurnContent::image("image/png", vec![0x89, 0x50, 0x4e, 0x47]),
///     ],
/// };
/// let json = serde_json::to_value(&turn).unwrap();
/// assert_eq!(json["content"][1]["source"]["data"], "iVBORw==");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    /// Content blocks in order.
    pub content: Vec<TurnContent>,
}

impl Turn {
    /// Builds a user turn holding a single text block.
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::user(),
            content: vec![TurnContent::text(text)],
        }
    }
}

/// Content block inside a [`Turn`] or a returned message.
///
/// Decoding reads the `type` tag first and fails on tags it does not know; there is
/// no catch-all variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnContent {
    Text {
        text: String,
    },
    Image {
        source: ImageSource,
    },
    /// Tool invocation emitted by the assistant.
    ToolUse {
        id: String,
        name: String,
        /// Arbitrary JSON arguments, preserved as received.
        input: Value,
    },
    /// Tool execution result sent back by the caller.
    ToolResult {
        tool_use_id: String,
        content: String,
    },
}

impl TurnContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Inline image; the bytes are base64-encoded when serialized.
    pub fn image(media_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self::Image {
            source: ImageSource {
                kind: "base64".to_string(),
                media_type: media_type.into(),
                data,
            },
        }
    }

    pub fn tool_use(id: impl Into<String>, name: impl Into<String>, input: Value) -> Self {
        Self::ToolUse {
            id: id.into(),
            name: name.into(),
            input,
        }
    }

    pub fn tool_result(tool_use_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::ToolResult {
            tool_use_id: tool_use_id.into(),
            content: content.into(),
        }
    }

    /// The wire `type` tag of this block.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::Image { .. } => "image",
            Self::ToolUse { .. } => "tool_use",
            Self::ToolResult { .. } => "tool_result",
        }
    }

    /// Text carried by the block, empty for non-text blocks.
    pub fn text_content(&self) -> &str {
        match self {
            Self::Text { text } => text,
            _ => "",
        }
    }
}

/// Inline image source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSource {
    /// Always `base64` for inline data.
    #[serde(rename = "type")]
    pub kind: String,
    pub media_type: String,
    /// Raw image bytes.
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

mod base64_bytes {
    use base64::{Engine as _, engine::general_purpose};
    use serde::{Deserialize, Deserializer, Serializer, de};

    pub(super) fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&general_purpose::STANDARD.encode(bytes))
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        general_purpose::STANDARD
            .decode(encoded.as_bytes())
            .map_err(de::Error::custom)
    }
}

/// Token counters reported by the API.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
}

/// Opaque request metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestMetadata {
    /// External identifier for the end user; never put personal data here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// Declarative definition of a tool available to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema describing the tool input.
    pub input_schema: Value,
}

/// Strategy describing how tools may be invoked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolChoice {
    Auto,
    Any,
    Tool { name: String },
}

/// Request body of the Messages API.
///
/// # Examples
///
/// ```
/// # use claude_wire::types::{MessageRequest, Turn};
/// let mut request = MessageRequest::new("claude-3-haiku-20240307", vec![Turn::user_text("Hi")]);
/// request.stream = true;
/// let json = serde_json::to_value(&request).unwrap();
/// assert_eq!(json["max_tokens"], 4096);
/// assert!(json.get("temperature").is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRequest {
    pub model: String,
    /// Alternating user/assistant turns; the first one must use the user role.
    pub messages: Vec<Turn>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub max_tokens: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<RequestMetadata>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop_sequences: Vec<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub stream: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    /// Cloud-hosted backends carry the API version in the body instead of a header.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anthropic_version: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Tool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
}

impl MessageRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Turn>) -> Self {
        Self {
            model: model.into(),
            messages,
            system: None,
            max_tokens: DEFAULT_MAX_TOKENS,
            metadata: None,
            stop_sequences: Vec::new(),
            stream: false,
            temperature: None,
            top_p: None,
            top_k: None,
            anthropic_version: None,
            tools: Vec::new(),
            tool_choice: None,
        }
    }

    /// Fills in values every backend requires.
    pub fn apply_defaults(&mut self) {
        if self.max_tokens < 1 {
            self.max_tokens = DEFAULT_MAX_TOKENS;
        }
    }
}
