use std::collections::{HashMap, VecDeque};
use std::pin::Pin;
use std::task::{Context, Poll};

use base64::{Engine as _, engine::general_purpose};
use futures_core::Stream;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::LLMError;
use crate::http::HttpBodyStream;

use super::Frame;

const PRELUDE_LEN: usize = 12;
const PRELUDE_CRC_OFFSET: usize = 8;
const MESSAGE_CRC_LEN: usize = 4;
const MAX_MESSAGE_LEN: usize = 16 * 1024 * 1024;

/// Decodes `application/vnd.amazon.eventstream` bodies into [`Frame`] values.
///
/// Each `chunk` event wraps one base64-encoded Messages stream event; the decoder unwraps
/// it so the resulting frame looks exactly like its SSE counterpart, with the event's own
/// `type` as frame name. Exception messages become frames named `error`.
///
/// The prelude checksum is verified before its lengths are trusted, and the message
/// checksum once the whole message has arrived. A mismatch ends the stream.
pub struct EventStreamDecoder {
    body: HttpBodyStream,
    buffer: Vec<u8>,
    pending: VecDeque<Result<Frame, LLMError>>,
    body_closed: bool,
    finished: bool,
}

/// Wire message with its string headers; other header kinds are parsed and skipped.
#[derive(Debug)]
struct RawMessage {
    headers: HashMap<String, String>,
    payload: Vec<u8>,
}

#[derive(Deserialize)]
struct ChunkPayload {
    bytes: String,
}

impl EventStreamDecoder {
    pub fn new(body: HttpBodyStream) -> Self {
        Self {
            body,
            buffer: Vec::new(),
            pending: VecDeque::new(),
            body_closed: false,
            finished: false,
        }
    }

    fn drain_messages(&mut self) {
        loop {
            match take_message(&mut self.buffer) {
                Ok(Some(bytes)) => {
                    let frame = parse_message(&bytes).and_then(convert_message);
                    let failed = frame.is_err();
                    self.pending.push_back(frame);
                    if failed {
                        self.finished = true;
                        return;
                    }
                }
                Ok(None) => return,
                Err(err) => {
                    self.finished = true;
                    self.pending.push_back(Err(err));
                    return;
                }
            }
        }
    }
}

impl Stream for EventStreamDecoder {
    type Item = Result<Frame, LLMError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            if let Some(item) = this.pending.pop_front() {
                return Poll::Ready(Some(item));
            }
            if this.finished {
                return Poll::Ready(None);
            }
            if this.body_closed {
                if !this.buffer.is_empty() {
                    tracing::warn!(
                        remaining = this.buffer.len(),
                        "event stream ended mid-message, dropping partial message"
                    );
                }
                this.finished = true;
                return Poll::Ready(None);
            }

            match this.body.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    this.buffer.extend_from_slice(&bytes);
                    this.drain_messages();
                }
                Poll::Ready(Some(Err(err))) => {
                    this.finished = true;
                    return Poll::Ready(Some(Err(err)));
                }
                Poll::Ready(None) => this.body_closed = true,
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// Splits one complete message off the front of `buffer`, if enough bytes arrived.
fn take_message(buffer: &mut Vec<u8>) -> Result<Option<Vec<u8>>, LLMError> {
    if buffer.len() < PRELUDE_LEN {
        return Ok(None);
    }
    let prelude_crc = read_u32(&buffer[PRELUDE_CRC_OFFSET..PRELUDE_LEN]);
    let computed = crc32fast::hash(&buffer[..PRELUDE_CRC_OFFSET]);
    if prelude_crc != computed {
        return Err(LLMError::protocol(format!(
            "malformed prelude: checksum {prelude_crc:#010x} does not match {computed:#010x}"
        )));
    }
    let total_len = read_u32(&buffer[0..4]) as usize;
    let headers_len = read_u32(&buffer[4..8]) as usize;
    if total_len < PRELUDE_LEN + MESSAGE_CRC_LEN || total_len > MAX_MESSAGE_LEN {
        return Err(LLMError::protocol(format!(
            "invalid event-stream message length: {total_len}"
        )));
    }
    if headers_len > total_len - PRELUDE_LEN - MESSAGE_CRC_LEN {
        return Err(LLMError::protocol(format!(
            "event-stream headers length {headers_len} exceeds message length {total_len}"
        )));
    }
    if buffer.len() < total_len {
        return Ok(None);
    }
    let crc_offset = total_len - MESSAGE_CRC_LEN;
    let message_crc = read_u32(&buffer[crc_offset..total_len]);
    let computed = crc32fast::hash(&buffer[..crc_offset]);
    if message_crc != computed {
        return Err(LLMError::protocol(format!(
            "event-stream message checksum {message_crc:#010x} does not match {computed:#010x}"
        )));
    }
    Ok(Some(buffer.drain(..total_len).collect()))
}

fn parse_message(bytes: &[u8]) -> Result<RawMessage, LLMError> {
    let headers_len = read_u32(&bytes[4..8]) as usize;
    let headers_end = PRELUDE_LEN + headers_len;
    let headers = parse_headers(&bytes[PRELUDE_LEN..headers_end])?;
    let payload = bytes[headers_end..bytes.len() - MESSAGE_CRC_LEN].to_vec();
    Ok(RawMessage { headers, payload })
}

fn parse_headers(mut bytes: &[u8]) -> Result<HashMap<String, String>, LLMError> {
    let mut headers = HashMap::new();
    while !bytes.is_empty() {
        let name_len = take(&mut bytes, 1)?[0] as usize;
        let name = String::from_utf8(take(&mut bytes, name_len)?.to_vec())
            .map_err(|err| LLMError::protocol(format!("invalid header name: {err}")))?;
        let value_type = take(&mut bytes, 1)?[0];
        match value_type {
            // bool true / bool false
            0 | 1 => {}
            2 => {
                take(&mut bytes, 1)?;
            }
            3 => {
                take(&mut bytes, 2)?;
            }
            4 => {
                take(&mut bytes, 4)?;
            }
            // int64 / timestamp
            5 | 8 => {
                take(&mut bytes, 8)?;
            }
            6 | 7 => {
                let len_bytes = take(&mut bytes, 2)?;
                let len = u16::from_be_bytes([len_bytes[0], len_bytes[1]]) as usize;
                let value = take(&mut bytes, len)?;
                if value_type == 7 {
                    let value = String::from_utf8(value.to_vec()).map_err(|err| {
                        LLMError::protocol(format!("invalid header value for {name}: {err}"))
                    })?;
                    headers.insert(name, value);
                }
            }
            9 => {
                take(&mut bytes, 16)?;
            }
            other => {
                return Err(LLMError::protocol(format!(
                    "unknown event-stream header type {other} for {name}"
                )));
            }
        }
    }
    Ok(headers)
}

fn take<'a>(bytes: &mut &'a [u8], len: usize) -> Result<&'a [u8], LLMError> {
    if bytes.len() < len {
        return Err(LLMError::protocol("truncated event-stream header"));
    }
    let (head, tail) = bytes.split_at(len);
    *bytes = tail;
    Ok(head)
}

fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn convert_message(message: RawMessage) -> Result<Frame, LLMError> {
    let message_type = message
        .headers
        .get(":message-type")
        .map(String::as_str)
        .unwrap_or("event");

    match message_type {
        "event" => {
            let event_type = message
                .headers
                .get(":event-type")
                .map(String::as_str)
                .unwrap_or_default();
            if event_type != "chunk" {
                return Err(LLMError::protocol(format!(
                    "unknown bedrock event type: {event_type}"
                )));
            }
            convert_chunk(&message.payload)
        }
        "exception" | "error" => Ok(convert_exception(&message)),
        other => Err(LLMError::protocol(format!(
            "unknown event-stream message type: {other}"
        ))),
    }
}

fn convert_chunk(payload: &[u8]) -> Result<Frame, LLMError> {
    let chunk: ChunkPayload = serde_json::from_slice(payload)
        .map_err(|err| LLMError::decode(format!("decode event json error: {err}")))?;
    let bytes = general_purpose::STANDARD
        .decode(chunk.bytes.as_bytes())
        .map_err(|err| LLMError::decode(format!("invalid base64 chunk: {err}")))?;
    let data = String::from_utf8(bytes)
        .map_err(|err| LLMError::decode(format!("invalid UTF-8 in chunk: {err}")))?;
    let event: Value = serde_json::from_str(&data)
        .map_err(|err| LLMError::decode(format!("decode event json error: {err}")))?;
    let name = event
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| LLMError::decode("chunk event is missing its type"))?
        .to_string();

    Ok(Frame {
        name: Some(name),
        id: None,
        data,
    })
}

fn convert_exception(message: &RawMessage) -> Frame {
    let error_type = message
        .headers
        .get(":exception-type")
        .or_else(|| message.headers.get(":error-code"))
        .cloned()
        .unwrap_or_else(|| "unknown_error".to_string());

    let text = String::from_utf8_lossy(&message.payload).into_owned();
    let detail = serde_json::from_str::<Value>(&text)
        .ok()
        .and_then(|value| {
            value
                .get("message")
                .or_else(|| value.get("Message"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .or_else(|| message.headers.get(":error-message").cloned())
        .unwrap_or(text);

    let data = json!({
        "type": "error",
        "error": { "type": error_type, "message": detail },
    });

    Frame {
        name: Some("error".to_string()),
        id: None,
        data: data.to_string(),
    }
}
