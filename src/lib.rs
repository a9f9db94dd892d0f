//! Claude Messages client.
//!
//! Requests go to the direct Anthropic API, Amazon Bedrock or Google Vertex AI; every
//! backend hands its HTTP response to [`response::dispatch`], which turns it into an
//! ordered channel of typed [`event::MessageEvent`]s. Streaming bodies are decoded
//! incrementally and honour caller cancellation between events.

pub mod client;
pub mod config;
pub mod error;
pub mod event;
pub mod http;
pub mod models;
pub mod provider;
pub mod response;
pub mod stream;
pub mod types;

pub use client::Client;
pub use error::LLMError;
pub use event::{MessageContent, MessageEvent};
pub use provider::{DynMessageClient, MessageClient};
pub use response::{MessageResponse, dispatch};
pub use types::*;

pub use tokio_util::sync::CancellationToken;
