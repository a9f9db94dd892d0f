use std::collections::HashMap;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::LLMError;
use crate::http::DynHttpTransport;
use crate::response::MessageResponse;
use crate::types::MessageRequest;

use super::{MessageClient, send_and_dispatch};

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_VERSION: &str = "2023-06-01";

/// Client for the direct Anthropic API.
pub struct AnthropicClient {
    transport: DynHttpTransport,
    base_url: String,
    api_key: String,
    version: String,
    beta: Option<String>,
}

impl AnthropicClient {
    pub fn new(transport: DynHttpTransport, api_key: impl Into<String>) -> Self {
        Self {
            transport,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            version: DEFAULT_VERSION.to_string(),
            beta: None,
        }
    }

    /// Points the client at a proxy or compatible gateway.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Overrides the `anthropic-version` header.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Sets the `anthropic-beta` header; several betas are comma separated.
    pub fn with_beta(mut self, beta: impl Into<String>) -> Self {
        self.beta = Some(beta.into());
        self
    }

    pub(crate) fn endpoint(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if base.ends_with("/v1") {
            format!("{base}/messages")
        } else {
            format!("{base}/v1/messages")
        }
    }

    fn build_headers(&self) -> HashMap<String, String> {
        let mut headers = HashMap::from([
            ("x-api-key".to_string(), self.api_key.clone()),
            ("anthropic-version".to_string(), self.version.clone()),
        ]);
        if let Some(beta) = &self.beta {
            headers.insert("anthropic-beta".to_string(), beta.clone());
        }
        headers
    }
}

#[async_trait]
impl MessageClient for AnthropicClient {
    async fn message(
        &self,
        mut request: MessageRequest,
        cancel: CancellationToken,
    ) -> Result<MessageResponse, LLMError> {
        request.apply_defaults();
        let url = self.endpoint();
        tracing::debug!(backend = self.name(), %url, stream = request.stream, "sending message request");

        send_and_dispatch(
            self.transport.as_ref(),
            url,
            self.build_headers(),
            &request,
            cancel,
        )
        .await
    }

    fn name(&self) -> &'static str {
        "anthropic"
    }
}
