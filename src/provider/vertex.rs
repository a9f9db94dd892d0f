use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::LLMError;
use crate::http::DynHttpTransport;
use crate::models::vertex_model;
use crate::response::MessageResponse;
use crate::types::MessageRequest;

use super::{MessageClient, request_object, send_and_dispatch};

pub const DEFAULT_VERSION: &str = "vertex-2023-10-16";

/// Client for Claude models served by Google Vertex AI.
///
/// Authenticates with an OAuth access token, e.g. the output of
/// `gcloud auth print-access-token`.
pub struct VertexClient {
    transport: DynHttpTransport,
    region: String,
    project_id: String,
    access_token: String,
    base_url: Option<String>,
}

impl VertexClient {
    pub fn new(
        transport: DynHttpTransport,
        region: impl Into<String>,
        project_id: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            region: region.into(),
            project_id: project_id.into(),
            access_token: access_token.into(),
            base_url: None,
        }
    }

    /// Replaces `https://{region}-aiplatform.googleapis.com`.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub(crate) fn endpoint(&self, model: &str, stream: bool) -> String {
        let method = if stream { "streamRawPredict" } else { "rawPredict" };
        let host = match &self.base_url {
            Some(base) => base.trim_end_matches('/').to_string(),
            None => format!("https://{}-aiplatform.googleapis.com", self.region),
        };
        format!(
            "{host}/v1/projects/{}/locations/{}/publishers/anthropic/models/{model}:{method}",
            self.project_id, self.region
        )
    }

    fn validate(&self) -> Result<(), LLMError> {
        if self.region.is_empty() {
            return Err(LLMError::invalid_config("region", "region not set"));
        }
        if self.project_id.is_empty() {
            return Err(LLMError::invalid_config("project_id", "project id not set"));
        }
        Ok(())
    }
}

#[async_trait]
impl MessageClient for VertexClient {
    async fn message(
        &self,
        mut request: MessageRequest,
        cancel: CancellationToken,
    ) -> Result<MessageResponse, LLMError> {
        request.apply_defaults();
        request
            .anthropic_version
            .get_or_insert_with(|| DEFAULT_VERSION.to_string());
        self.validate()?;
        let model = vertex_model(&request.model)?;

        let mut body = request_object(&request)?;
        body.remove("model");
        let url = self.endpoint(model, request.stream);
        tracing::debug!(backend = self.name(), %url, stream = request.stream, "sending message request");

        let headers = HashMap::from([(
            "authorization".to_string(),
            format!("Bearer {}", self.access_token),
        )]);
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
        "vertex"
    }
}
