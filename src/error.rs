use thiserror::Error;

/// Aggregates every failure mode exposed by the Claude client.
///
/// Errors raised before a [`crate::response::MessageResponse`] exists are returned
/// synchronously. Once the event channel is live, failures travel as
/// [`crate::event::MessageContent::ClientError`] events instead.
#[derive(Debug, Error)]
pub enum LLMError {
    /// Represents transport-layer or networking failures.
    #[error("transport error: {message}")]
    Transport { message: String },
    /// Structured error body returned with a non-200 status.
    #[error("{error_type}: {message}")]
    Api {
        /// HTTP status code of the failed response.
        status: u16,
        /// Error class reported by the API, e.g. `invalid_request_error`.
        error_type: String,
        /// Human-readable message reported by the API.
        message: String,
    },
    /// Non-200 response whose body could not be parsed as an API error.
    #[error("{status} error response: {body}")]
    UnexpectedStatus {
        status: u16,
        /// Leading bytes of the body, bounded to the error read limit.
        body: String,
    },
    /// The 200 response carried a media type that is neither JSON nor an event stream.
    #[error("unexpected response content-type: {content_type}")]
    UnexpectedContentType { content_type: String },
    /// JSON payload could not be decoded into the expected shape.
    #[error("decode error: {message}")]
    Decode { message: String },
    /// Malformed framing or unknown event names on a streaming body.
    #[error("protocol error: {message}")]
    Protocol { message: String },
    /// Signals validation failures in the request payload.
    #[error("invalid request: {message}")]
    Validation { message: String },
    /// Raised when building or validating configuration fails.
    #[error("invalid configuration for {field}: {reason}")]
    InvalidConfig {
        /// Name of the configuration field that failed validation.
        field: String,
        /// Additional context explaining why the field is invalid.
        reason: String,
    },
    /// Surfaces cancellations triggered explicitly by the caller.
    #[error("request aborted: {message}")]
    Aborted { message: String },
}

impl LLMError {
    /// Creates an [`LLMError::Transport`] from a textual description.
    ///
    /// # Examples
    ///
    /// ```
    /// use claude_wire::error::LLMError;
    ///
    /// let err = LLMError::transport("dns lookup failed");
    /// assert!(matches!(err, LLMError::Transport { .. }));
    /// ```
    pub fn transport<T: Into<String>>(message: T) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Creates an [`LLMError::Protocol`] for framing and event-name failures.
    ///
    /// # Examples
    ///
    /// ```
    /// use claude_wire::error::LLMError;
    ///
    /// let err = LLMError::protocol("unknown event type: bogus");
    /// assert_eq!(err.to_string(), "protocol error: unknown event type: bogus");
    /// ```
    pub fn protocol<T: Into<String>>(message: T) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates an [`LLMError::Decode`] from a JSON failure description.
    pub fn decode<T: Into<String>>(message: T) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
