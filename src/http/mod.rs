use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_core::Stream;
use futures_util::StreamExt;
use serde::Serialize;

use crate::error::LLMError;

/// Minimal HTTP request representation shared across backends.
///
/// Every Messages endpoint is a JSON `POST`, so the request carries no method.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    /// Builds a POST request with a JSON request body.
    ///
    /// # Examples
    ///
    /// ```
    /// use claude_wire::http::HttpRequest;
    ///
    /// let request = HttpRequest::post_json("https://example.com", br"{}".to_vec());
    /// assert_eq!(request.headers.get("content-type"), Some(&"application/json".to_string()));
    /// ```
    pub fn post_json(url: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            url: url.into(),
            headers: HashMap::from([("content-type".to_string(), "application/json".to_string())]),
            body,
            timeout: None,
        }
    }

    /// Adds headers on top of the defaults, replacing entries with the same name.
    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers.extend(headers);
        self
    }
}

/// Alias for the body stream carried by [`HttpResponse`].
pub type HttpBodyStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, LLMError>> + Send>>;

/// HTTP response whose body is still arriving.
///
/// A response is handed to [`crate::response::dispatch`] exactly once; the body is
/// consumed by whoever ends up owning it.
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: HttpBodyStream,
}

impl std::fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

impl HttpResponse {
    /// Looks up a header value, ignoring the case of the header name.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::collections::HashMap;
    /// use claude_wire::http::HttpResponse;
    /// use futures_util::stream;
    ///
    /// let response = HttpResponse {
    ///     status: 200,
    ///     headers: HashMap::from([("Content-Type".to_string(), "text/event-stream".to_string())]),
    ///     body: Box::pin(stream::empty::<Result<Vec<u8>, claude_wire::error::LLMError>>()),
    /// };
    /// assert_eq!(response.header("content-type"), Some("text/event-stream"));
    /// ```
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Reads at most `limit` bytes from the body.
    ///
    /// On a read failure the bytes received so far are returned alongside the error.
    pub async fn read_bounded(&mut self, limit: usize) -> (Vec<u8>, Option<LLMError>) {
        let mut bytes = Vec::new();
        while bytes.len() < limit {
            match self.body.next().await {
                Some(Ok(chunk)) => bytes.extend_from_slice(&chunk),
                Some(Err(err)) => {
                    bytes.truncate(limit);
                    return (bytes, Some(err));
                }
                None => break,
            }
        }
        bytes.truncate(limit);
        (bytes, None)
    }

    /// Drains the full body into memory.
    ///
    /// # Errors
    ///
    /// Forwards the first chunk error raised by the body stream.
    pub async fn read_all(&mut self) -> Result<Vec<u8>, LLMError> {
        let mut bytes = Vec::new();
        while let Some(chunk) = self.body.next().await {
            bytes.extend_from_slice(&chunk?);
        }
        Ok(bytes)
    }
}

/// Transport abstraction used to decouple backends from the concrete HTTP client.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Sends a request and resolves once the status line and headers are available.
    ///
    /// # Examples
    ///
    /// ```
    /// # use async_trait::async_trait;
    /// # use claude_wire::http::{HttpTransport, HttpRequest, HttpResponse};
    /// # use claude_wire::error::LLMError;
    /// # use futures_util::{stream, StreamExt};
    /// struct EchoTransport;
    ///
    /// #[async_trait]
    /// impl HttpTransport for EchoTransport {
    ///     async fn send(&self, request: HttpRequest) -> Result<HttpResponse, LLMError> {
    ///         let body = stream::once(async move { Ok::<_, LLMError>(request.body) });
    ///         Ok(HttpResponse { status: 200, headers: request.headers, body: Box::pin(body) })
    ///     }
    /// }
    ///
    /// # tokio::runtime::Runtime::new().unwrap().block_on(async {
    /// let response = EchoTransport
    ///     .send(HttpRequest::post_json("https://example.com", br"{}".to_vec()))
    ///     .await
    ///     .unwrap();
    /// let chunks: Vec<_> = response.body.collect::<Vec<_>>().await;
    /// assert_eq!(chunks.len(), 1);
    /// # });
    /// ```
    ///
    /// # Errors
    ///
    /// Implementations should map connection failures to [`LLMError::Transport`].
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, LLMError>;
}

/// Thread-safe handle to a transport implementation.
pub type DynHttpTransport = Arc<dyn HttpTransport>;

/// Serializes a body to JSON, attaches headers, and issues a POST request.
///
/// # Errors
///
/// Returns [`LLMError::Validation`] if serialization fails or forwards the error raised by
/// [`HttpTransport::send`].
pub async fn post_json_with_headers<T: Serialize + ?Sized>(
    transport: &dyn HttpTransport,
    url: impl Into<String>,
    headers: HashMap<String, String>,
    body: &T,
) -> Result<HttpResponse, LLMError> {
    let payload = serde_json::to_vec(body).map_err(|err| LLMError::Validation {
        message: format!("failed to serialize request: {err}"),
    })?;
    let request = HttpRequest::post_json(url, payload).with_headers(headers);
    transport.send(request).await
}

pub mod reqwest;
