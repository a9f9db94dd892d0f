use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use claude_wire::config::{BackendConfig, BackendKind, Credential, build_client_from_configs};
use claude_wire::error::LLMError;
use claude_wire::event::{CLIENT_ERROR_EVENT, MessageContent};
use claude_wire::http::{HttpRequest, HttpResponse, HttpTransport};
use claude_wire::types::{MessageRequest, Turn, TurnContent};
use claude_wire::{CancellationToken, Client, MessageEvent};
use futures_util::{StreamExt, stream};
use serde_json::Value;

/// Transport replaying one scripted response per request.
struct ScriptedTransport {
    status: u16,
    content_type: String,
    chunks: Vec<Vec<u8>>,
    seen: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    fn new(status: u16, content_type: &str, chunks: Vec<&str>) -> Arc<Self> {
        Arc::new(Self {
            status,
            content_type: content_type.to_string(),
            chunks: chunks.into_iter().map(|c| c.as_bytes().to_vec()).collect(),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn last_body(&self) -> Value {
        let seen = self.seen.lock().expect("lock");
        let request = seen.last().expect("request sent");
        serde_json::from_slice(&request.body).expect("json body")
    }

    fn last_url(&self) -> String {
        self.seen.lock().expect("lock").last().expect("request sent").url.clone()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, LLMError> {
        self.seen.lock().expect("lock").push(request);
        let chunks: Vec<Result<Vec<u8>, LLMError>> = self.chunks.iter().cloned().map(Ok).collect();
        Ok(HttpResponse {
            status: self.status,
            headers: HashMap::from([("Content-Type".to_string(), self.content_type.clone())]),
            body: Box::pin(stream::iter(chunks)),
        })
    }
}

fn direct_config() -> BackendConfig {
    BackendConfig {
        handle: "direct".to_string(),
        backend: BackendKind::Anthropic,
        credential: Credential::ApiKey {
            key: "sk-test".to_string(),
        },
        base_url: None,
        region: None,
        project_id: None,
        version: None,
    }
}

fn vertex_config() -> BackendConfig {
    BackendConfig {
        handle: "vertex".to_string(),
        backend: BackendKind::Vertex,
        credential: Credential::Bearer {
            token: "ya29".to_string(),
        },
        base_url: None,
        region: Some("us-east5".to_string()),
        project_id: Some("proj".to_string()),
        version: None,
    }
}

fn client_for(transport: Arc<ScriptedTransport>) -> Client {
    build_client_from_configs(&[direct_config(), vertex_config()], transport).expect("client")
}

fn streaming_request() -> MessageRequest {
    let mut request = MessageRequest::new("claude-3-opus-20240229", vec![Turn::user_text("Hello")]);
    request.stream = true;
    request
}

const STREAM: &[&str] = &[
    "event: message_start\ndata: {\"type\":\"message_start\",\"message\":{\"id\":\"msg_1\",\"type\":\"message\",\"role\":\"assistant\",\"content\":[],\"model\":\"claude-3-opus-20240229\",\"stop_reason\":null,\"stop_sequence\":null,\"usage\":{\"input_tokens\":12,\"output_tokens\":1}}}\n\n",
    "event: content_block_start\ndata: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"text\",\"text\":\"\"}}\n\n: keep-alive\n\n",
    "event: ping\ndata: {\"type\": \"ping\"}\n\nevent: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Hel",
    "lo\"}}\n\nevent: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\" there\"}}\n\n",
    "event: content_block_stop\ndata: {\"type\":\"content_block_stop\",\"index\":0}\n\nevent: message_delta\ndata: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"end_turn\",\"stop_sequence\":null},\"usage\":{\"output_tokens\":4}}\n\n",
    "event: message_stop\ndata: {\"type\":\"message_stop\"}\n\n",
];

async fn drain(mut events: impl futures_util::Stream<Item = MessageEvent> + Unpin) -> Vec<MessageEvent> {
    let mut out = Vec::new();
    while let Some(event) = events.next().await {
        out.push(event);
    }
    out
}

#[tokio::test]
async fn direct_stream_is_delivered_in_order_across_chunk_boundaries() {
    let transport = ScriptedTransport::new(200, "text/event-stream", STREAM.to_vec());
    let client = client_for(transport.clone());

    let response = client
        .message("direct", streaming_request(), CancellationToken::new())
        .await
        .expect("response");
    assert_eq!(response.http_response().header("content-type"), Some("text/event-stream"));

    let events = drain(response).await;
    let names: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "message_start",
            "content_block_start",
            "ping",
            "content_block_delta",
            "content_block_delta",
            "content_block_stop",
            "message_delta",
            "message_stop",
        ]
    );
    let text: String = events.iter().map(MessageEvent::text).collect();
    assert_eq!(text, "Hello there");

    match &events[6].payload {
        MessageContent::MessageDelta(delta) => {
            assert_eq!(delta.delta.stop_reason.as_deref(), Some("end_turn"));
            assert_eq!(delta.usage.output_tokens, 4);
        }
        other => panic!("unexpected payload: {other:?}"),
    }

    assert_eq!(transport.last_url(), "https://api.anthropic.com/v1/messages");
    assert_eq!(transport.last_body()["stream"], true);
}

#[tokio::test]
async fn vertex_non_streaming_reply_is_one_message_event() {
    let body = r#"{"type":"message","id":"msg_v","role":"assistant","model":"claude-3-opus@20240229","content":[{"type":"text","text":"Bonjour"},{"type":"tool_use","id":"toolu_1","name":"lookup","input":{"q":"paris"}}],"stop_reason":"tool_use","stop_sequence":null,"usage":{"input_tokens":5,"output_tokens":9}}"#;
    let transport = ScriptedTransport::new(200, "application/json", vec![body]);
    let client = client_for(transport.clone());

    let mut request = streaming_request();
    request.stream = false;
    let events = drain(
        client
            .message("vertex", request, CancellationToken::new())
            .await
            .expect("response"),
    )
    .await;

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, "message");
    match &events[0].payload {
        MessageContent::MessageStart(start) => {
            assert_eq!(start.message.stop_reason.as_deref(), Some("tool_use"));
            match &start.message.content[1] {
                TurnContent::ToolUse { name, input, .. } => {
                    assert_eq!(name, "lookup");
                    assert_eq!(input["q"], "paris");
                }
                other => panic!("unexpected block: {other:?}"),
            }
        }
        other => panic!("unexpected payload: {other:?}"),
    }
    assert_eq!(events[0].text(), "Bonjour");
    assert!(transport.last_body().get("model").is_none());
}

#[tokio::test]
async fn non_200_reply_is_a_synchronous_api_error() {
    let body = r#"{"type":"error","error":{"type":"authentication_error","message":"invalid x-api-key"}}"#;
    let transport = ScriptedTransport::new(401, "application/json", vec![body]);
    let client = client_for(transport);

    match client
        .message("direct", streaming_request(), CancellationToken::new())
        .await
    {
        Err(LLMError::Api {
            status,
            error_type,
            message,
        }) => {
            assert_eq!(status, 401);
            assert_eq!(error_type, "authentication_error");
            assert_eq!(message, "invalid x-api-key");
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test]
async fn unknown_event_mid_stream_ends_with_client_error() {
    let transport = ScriptedTransport::new(
        200,
        "text/event-stream",
        vec![
            STREAM[0],
            "event: completion\ndata: {\"completion\": \"legacy\"}\n\n",
            STREAM[5],
        ],
    );
    let client = client_for(transport);

    let events = drain(
        client
            .message("direct", streaming_request(), CancellationToken::new())
            .await
            .expect("response"),
    )
    .await;
    assert_eq!(events.len(), 2);
    assert_eq!(events[1].event_type, CLIENT_ERROR_EVENT);
    assert!(events[1].is_error());
}

#[tokio::test]
async fn collect_text_surfaces_stream_errors() {
    let transport = ScriptedTransport::new(
        200,
        "text/event-stream",
        vec![
            STREAM[0],
            "event: error\ndata: {\"type\":\"error\",\"error\":{\"type\":\"overloaded_error\",\"message\":\"Overloaded\"}}\n\n",
        ],
    );
    let client = client_for(transport);
    let response = client
        .message("direct", streaming_request(), CancellationToken::new())
        .await
        .expect("response");
    let err = response.collect_text().await.expect_err("stream error");
    assert_eq!(err.to_string(), "overloaded_error: Overloaded");
}

#[tokio::test]
async fn dropping_the_response_early_does_not_hang() {
    let transport = ScriptedTransport::new(200, "text/event-stream", STREAM.to_vec());
    let client = client_for(transport);
    let cancel = CancellationToken::new();

    let mut response = client
        .message("direct", streaming_request(), cancel.clone())
        .await
        .expect("response");
    assert!(response.next_event().await.is_some());
    drop(response);
    cancel.cancel();

    // Another request on the same client still works afterwards.
    let again = tokio::time::timeout(
        Duration::from_secs(2),
        client.message("direct", streaming_request(), CancellationToken::new()),
    )
    .await
    .expect("no hang")
    .expect("response");
    assert_eq!(again.collect_text().await.expect("text"), "Hello there");
}

#[tokio::test]
async fn unknown_handle_is_rejected() {
    let transport = ScriptedTransport::new(200, "application/json", vec!["{}"]);
    let client = client_for(transport);
    assert!(matches!(
        client
            .message("bedrock", streaming_request(), CancellationToken::new())
            .await,
        Err(LLMError::Validation { .. })
    ));
}
