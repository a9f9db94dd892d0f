use std::collections::HashMap;

use tokio_util::sync::CancellationToken;

use crate::error::LLMError;
use crate::provider::DynMessageClient;
use crate::response::MessageResponse;
use crate::types::MessageRequest;

/// Entry point routing requests to backends registered under handles.
pub struct Client {
    backends: HashMap<String, DynMessageClient>,
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder {
            backends: HashMap::new(),
        }
    }

    /// Sends a request through the backend registered as `handle`.
    pub async fn message(
        &self,
        handle: &str,
        request: MessageRequest,
        cancel: CancellationToken,
    ) -> Result<MessageResponse, LLMError> {
        let backend = self.get_backend(handle)?;
        backend.message(request, cancel).await
    }

    /// Registered handles, in no particular order.
    pub fn handles(&self) -> Vec<String> {
        self.backends.keys().cloned().collect()
    }

    /// Name of the backend behind `handle`.
    pub fn backend(&self, handle: &str) -> Result<&'static str, LLMError> {
        Ok(self.get_backend(handle)?.name())
    }

    fn get_backend(&self, handle: &str) -> Result<DynMessageClient, LLMError> {
        self.backends
            .get(handle)
            .cloned()
            .ok_or_else(|| LLMError::Validation {
                message: format!("unknown backend handle: {handle}"),
            })
    }
}

pub struct ClientBuilder {
    backends: HashMap<String, DynMessageClient>,
}

impl ClientBuilder {
    /// Registers `backend` under `handle`, replacing any earlier registration.
    pub fn register_handle<S: Into<String>>(mut self, handle: S, backend: DynMessageClient) -> Self {
        self.backends.insert(handle.into(), backend);
        self
    }

    pub fn build(self) -> Client {
        Client {
            backends: self.backends,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::*;
    use crate::provider::MessageClient;
    use crate::types::Turn;

    struct RefusingBackend {
        name: &'static str,
    }

    #[async_trait]
    impl MessageClient for RefusingBackend {
        async fn message(
            &self,
            _request: MessageRequest,
            _cancel: CancellationToken,
        ) -> Result<MessageResponse, LLMError> {
            Err(LLMError::transport(format!("{} is offline", self.name)))
        }

        fn name(&self) -> &'static str {
            self.name
        }
    }

    fn client() -> Client {
        Client::builder()
            .register_handle("direct", Arc::new(RefusingBackend { name: "anthropic" }))
            .register_handle("cloud", Arc::new(RefusingBackend { name: "vertex" }))
            .build()
    }

    #[test]
    fn backend_reports_name_for_handle() {
        let client = client();
        assert_eq!(client.backend("cloud").expect("backend"), "vertex");

        let mut handles = client.handles();
        handles.sort();
        assert_eq!(handles, vec!["cloud".to_string(), "direct".to_string()]);
    }

    #[test]
    fn backend_returns_error_for_unknown_handle() {
        match client().backend("missing") {
            Err(LLMError::Validation { message }) => assert!(message.contains("missing")),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn message_routes_to_registered_backend() {
        let request = MessageRequest::new("claude-3-haiku-20240307", vec![Turn::user_text("Hi")]);
        let err = client()
            .message("direct", request, CancellationToken::new())
            .await
            .expect_err("backend refuses");
        assert_eq!(err.to_string(), "transport error: anthropic is offline");
    }
}
