use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::LLMError;
use crate::http::DynHttpTransport;
use crate::models::bedrock_model;
use crate::response::MessageResponse;
use crate::types::MessageRequest;

use super::{MessageClient, request_object, send_and_dispatch};

pub const DEFAULT_VERSION: &str = "bedrock-2023-05-31";

/// Client for Claude models served by Amazon Bedrock.
///
/// Authenticates with a Bedrock API key sent as a bearer token. Streaming replies use
/// the binary event-stream framing, which the dispatcher decodes.
pub struct BedrockClient {
    transport: DynHttpTransport,
    region: String,
    api_key: String,
    base_url: Option<String>,
}

impl BedrockClient {
    pub fn new(
        transport: DynHttpTransport,
        region: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            region: region.into(),
            api_key: api_key.into(),
            base_url: None,
        }
    }

    /// Replaces `https://bedrock-runtime.{region}.amazonaws.com`, e.g. for a VPC endpoint.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub(crate) fn endpoint(&self, model: &str, stream: bool) -> String {
        let action = if stream {
            "invoke-with-response-stream"
        } else {
            "invoke"
        };
        let host = match &self.base_url {
            Some(base) => base.trim_end_matches('/').to_string(),
            None => format!("https://bedrock-runtime.{}.amazonaws.com", self.region),
        };
        format!("{host}/model/{model}/{action}")
    }
}

#[async_trait]
impl MessageClient for BedrockClient {
    async fn message(
        &self,
        mut request: MessageRequest,
        cancel: CancellationToken,
    ) -> Result<MessageResponse, LLMError> {
        request.apply_defaults();
        request
            .anthropic_version
            .get_or_insert_with(|| DEFAULT_VERSION.to_string());
        if self.region.is_empty() && self.base_url.is_none() {
            return Err(LLMError::invalid_config("region", "region not set"));
        }
        let model = bedrock_model(&request.model)?;

        // Bedrock takes the model and the streaming mode from the URL only.
        let mut body = request_object(&request)?;
        body.remove("model");
        body.remove("stream");
        let url = self.endpoint(model, request.stream);
        tracing::debug!(backend = self.name(), %url, stream = request.stream, "sending message request");

        let mut headers = HashMap::from([(
            "authorization".to_string(),
            format!("Bearer {}", self.api_key),
        )]);
        let accept = if request.stream {
            "application/vnd.amazon.eventstream"
        } else {
            "application/json"
        };
        headers.insert("accept".to_string(), accept.to_string());

        send_and_dispatch(
            self.transport.as_ref(),
            url,
            headers,
            &Value::Object(body),
            cancel,
        )
        .await
    }

    fn name(&self) -> &'static str {
        "bedrock"
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::event::MessageContent;
    use crate::models::CLAUDE_3_SONNET;
    use crate::provider::testing::{MESSAGE, RecordingTransport};
    use crate::stream::eventstream::tests::encode_chunk;
    use crate::types::Turn;

    #[tokio::test]
    async fn invoke_strips_model_and_stream() {
        let transport = Arc::new(RecordingTransport::new("application/json", MESSAGE));
        let client = BedrockClient::new(transport.clone(), "us-west-2", "bedrock-key");
        let request = MessageRequest::new(CLAUDE_3_SONNET, vec![Turn::user_text("Hi")]);

        let mut response = client
            .message(request, CancellationToken::new())
            .await
            .expect("response");
        let event = response.next_event().await.expect("event");
        assert_eq!(event.event_type, "message");
        assert!(matches!(event.payload, MessageContent::MessageStart(_)));
        assert!(response.next_event().await.is_none());

        let sent = transport.last_request();
        assert_eq!(
            sent.url,
            "https://bedrock-runtime.us-west-2.amazonaws.com/model/anthropic.claude-3-sonnet-20240229-v1:0/invoke"
        );
        assert_eq!(sent.headers["authorization"], "Bearer bedrock-key");
        assert_eq!(sent.headers["accept"], "application/json");

        let body: Value = serde_json::from_slice(&sent.body).expect("json");
        assert!(body.get("model").is_none());
        assert!(body.get("stream").is_none());
        assert_eq!(body["anthropic_version"], DEFAULT_VERSION);
    }

    #[tokio::test]
    async fn streaming_decodes_binary_event_stream() {
        let mut bytes = encode_chunk(&json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "Hi there"}}));
        bytes.extend(encode_chunk(&json!({"type": "message_stop"})));
        let transport = Arc::new(RecordingTransport::new(
            "application/vnd.amazon.eventstream",
            bytes,
        ));
        let client = BedrockClient::new(transport.clone(), "us-east-1", "key");
        let mut request = MessageRequest::new(CLAUDE_3_SONNET, vec![Turn::user_text("Hi")]);
        request.stream = true;

        let response = client
            .message(request, CancellationToken::new())
            .await
            .expect("response");
        assert_eq!(response.collect_text().await.expect("text"), "Hi there");

        let sent = transport.last_request();
        assert!(sent.url.ends_with("/invoke-with-response-stream"));
        let body: Value = serde_json::from_slice(&sent.body).expect("json");
        assert!(body.get("stream").is_none());
    }

    #[tokio::test]
    async fn unknown_model_is_rejected() {
        let transport = Arc::new(RecordingTransport::new("application/json", MESSAGE));
        let client = BedrockClient::new(transport, "us-east-1", "key");
        let request = MessageRequest::new("claude-9", vec![Turn::user_text("Hi")]);
        assert!(matches!(
            client.message(request, CancellationToken::new()).await,
            Err(LLMError::Validation { .. })
        ));
    }
}
