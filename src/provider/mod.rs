use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::LLMError;
use crate::http::{HttpTransport, post_json_with_headers};
use crate::response::{MessageResponse, dispatch};
use crate::types::MessageRequest;

pub mod anthropic;
pub mod bedrock;
pub mod vertex;

pub use anthropic::AnthropicClient;
pub use bedrock::BedrockClient;
pub use vertex::VertexClient;

/// A backend that can answer a Messages request.
///
/// Every backend hands its HTTP response to [`dispatch`], so callers observe the same
/// event sequence whichever backend served the request.
#[async_trait]
pub trait MessageClient: Send + Sync {
    /// Sends one request and returns the handle to its events.
    ///
    /// # Errors
    ///
    /// Fails synchronously on request validation, transport failures, non-200 statuses
    /// and unsupported media types. Cancelling before the response arrives yields
    /// [`LLMError::Aborted`].
    async fn message(
        &self,
        request: MessageRequest,
        cancel: CancellationToken,
    ) -> Result<MessageResponse, LLMError>;

    /// Backend name used in logs.
    fn name(&self) -> &'static str;
}

/// Thread-safe backend handle.
pub type DynMessageClient = Arc<dyn MessageClient>;

/// Posts `body` and dispatches the response, unless `cancel` fires first.
pub(crate) async fn send_and_dispatch<T: Serialize + Sync + ?Sized>(
    transport: &dyn HttpTransport,
    url: String,
    headers: HashMap<String, String>,
    body: &T,
    cancel: CancellationToken,
) -> Result<MessageResponse, LLMError> {
    let response = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            return Err(LLMError::Aborted {
                message: "cancelled before the response arrived".to_string(),
            });
        }
        response = post_json_with_headers(transport, url, headers, body) => response?,
    };
    dispatch(response, cancel).await
}

/// Serializes a request into a JSON object so backends can drop or add fields.
pub(crate) fn request_object(request: &MessageRequest) -> Result<serde_json::Map<String, Value>, LLMError> {
    match serde_json::to_value(request) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(LLMError::Validation {
            message: "request did not serialize to a JSON object".to_string(),
        }),
        Err(err) => Err(LLMError::Validation {
            message: format!("failed to serialize request: {err}"),
        }),
    }
}
