//! Model identifiers and their per-backend spellings.
//!
//! The direct API takes the canonical id. Bedrock and Vertex use their own ids, and
//! translation accepts either form.

use crate::error::LLMError;

pub const CLAUDE_3_5_SONNET: &str = "claude-3-5-sonnet-20240620";
pub const CLAUDE_3_OPUS: &str = "claude-3-opus-20240229";
pub const CLAUDE_3_SONNET: &str = "claude-3-sonnet-20240229";
pub const CLAUDE_3_HAIKU: &str = "claude-3-haiku-20240307";
pub const CLAUDE_2_1: &str = "claude-2.1";
pub const CLAUDE_2_0: &str = "claude-2.0";
pub const CLAUDE_INSTANT_1_2: &str = "claude-instant-1.2";

/// One row of the model table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelInfo {
    pub canonical: &'static str,
    pub bedrock: Option<&'static str>,
    pub vertex: Option<&'static str>,
    pub display_name: &'static str,
}

const MODELS: &[ModelInfo] = &[
    ModelInfo {
        canonical: CLAUDE_3_5_SONNET,
        bedrock: Some("anthropic.claude-3-5-sonnet-20240620-v1:0"),
        vertex: Some("claude-3-5-sonnet@20240620"),
        display_name: "Claude 3.5 Sonnet",
    },
    ModelInfo {
        canonical: CLAUDE_3_OPUS,
        bedrock: Some("anthropic.claude-3-opus-20240229-v1:0"),
        vertex: Some("claude-3-opus@20240229"),
        display_name: "Claude 3 Opus",
    },
    ModelInfo {
        canonical: CLAUDE_3_SONNET,
        bedrock: Some("anthropic.claude-3-sonnet-20240229-v1:0"),
        vertex: Some("claude-3-sonnet@20240229"),
        display_name: "Claude 3 Sonnet",
    },
    ModelInfo {
        canonical: CLAUDE_3_HAIKU,
        bedrock: Some("anthropic.claude-3-haiku-20240307-v1:0"),
        vertex: Some("claude-3-haiku@20240307"),
        display_name: "Claude 3 Haiku",
    },
    ModelInfo {
        canonical: CLAUDE_2_1,
        bedrock: Some("anthropic.claude-v2:1"),
        vertex: None,
        display_name: "Claude 2.1",
    },
    ModelInfo {
        canonical: CLAUDE_2_0,
        bedrock: Some("anthropic.claude-v2"),
        vertex: None,
        display_name: "Claude 2.0",
    },
    ModelInfo {
        canonical: CLAUDE_INSTANT_1_2,
        bedrock: Some("anthropic.claude-instant-v1"),
        vertex: None,
        display_name: "Claude Instant 1.2",
    },
];

/// Every known model, newest first.
pub fn models() -> &'static [ModelInfo] {
    MODELS
}

/// Finds a model by its canonical, Bedrock or Vertex id.
pub fn lookup(model: &str) -> Option<&'static ModelInfo> {
    MODELS.iter().find(|info| {
        info.canonical == model || info.bedrock == Some(model) || info.vertex == Some(model)
    })
}

/// Translates a model id into the id Bedrock expects in the URL path.
///
/// # Errors
///
/// Returns [`LLMError::Validation`] for models Bedrock does not serve.
///
/// # Examples
///
/// ```
/// use claude_wire::models::{bedrock_model, CLAUDE_3_HAIKU};
///
/// assert_eq!(
///     bedrock_model(CLAUDE_3_HAIKU).unwrap(),
///     "anthropic.claude-3-haiku-20240307-v1:0"
/// );
/// assert!(bedrock_model("gpt-4o").is_err());
/// ```
pub fn bedrock_model(model: &str) -> Result<&'static str, LLMError> {
    lookup(model)
        .and_then(|info| info.bedrock)
        .ok_or_else(|| unknown_model(model, "bedrock"))
}

/// Translates a model id into the id Vertex expects in the URL path.
///
/// # Errors
///
/// Returns [`LLMError::Validation`] for models Vertex does not serve.
pub fn vertex_model(model: &str) -> Result<&'static str, LLMError> {
    lookup(model)
        .and_then(|info| info.vertex)
        .ok_or_else(|| unknown_model(model, "vertex"))
}

/// Human-readable name for any known model id.
pub fn display_name(model: &str) -> String {
    match lookup(model) {
        Some(info) => info.display_name.to_string(),
        None => format!("Unknown model<{model}>"),
    }
}

fn unknown_model(model: &str, backend: &str) -> LLMError {
    LLMError::Validation {
        message: format!("unknown model for {backend}: {model}"),
    }
}
