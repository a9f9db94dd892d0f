use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::Stream;

use crate::error::LLMError;
use crate::http::HttpBodyStream;

use super::Frame;

/// Decodes `text/event-stream` bodies into [`Frame`] values.
///
/// Lines are processed in arrival order. A frame is emitted on a blank line once it has
/// accumulated data; comments and keep-alive blank lines are skipped. The first malformed
/// line or body read error is yielded as an `Err` and ends the stream.
pub struct SseDecoder {
    body: HttpBodyStream,
    buffer: Vec<u8>,
    current: Frame,
    pending: VecDeque<Result<Frame, LLMError>>,
    body_closed: bool,
    failed: bool,
    finished: bool,
}

impl SseDecoder {
    /// Wraps a raw HTTP body stream and prepares it for SSE decoding.
    pub fn new(body: HttpBodyStream) -> Self {
        Self {
            body,
            buffer: Vec::new(),
            current: Frame::default(),
            pending: VecDeque::new(),
            body_closed: false,
            failed: false,
            finished: false,
        }
    }

    fn handle_line(&mut self, line: Vec<u8>) -> Result<(), LLMError> {
        if line.is_empty() {
            if !self.current.data.is_empty() {
                let frame = std::mem::take(&mut self.current);
                self.pending.push_back(Ok(frame));
            }
            return Ok(());
        }

        if line.first() == Some(&b':') {
            return Ok(());
        }

        // Invalid sequences become U+FFFD.
        let line = String::from_utf8_lossy(&line);

        let Some((field, value)) = line.split_once(':') else {
            return Err(LLMError::protocol(format!(
                "parse error malformed line: {line}"
            )));
        };
        let value = value.strip_prefix(' ').unwrap_or(value);

        match field {
            "event" => self.current.name = Some(value.to_string()),
            "id" => self.current.id = Some(value.to_string()),
            "data" => {
                self.current.data.push_str(value);
                self.current.data.push('\n');
            }
            "retry" => {}
            _ => {
                return Err(LLMError::protocol(format!(
                    "parse error unexpected field: {field} (value: {value})"
                )));
            }
        }
        Ok(())
    }

    fn process_line(&mut self, line: Vec<u8>) {
        if let Err(err) = self.handle_line(line) {
            self.failed = true;
            self.pending.push_back(Err(err));
        }
    }

    fn drain_line(buffer: &mut Vec<u8>) -> Option<Vec<u8>> {
        buffer.iter().position(|b| *b == b'\n').map(|pos| {
            let mut line: Vec<u8> = buffer.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            line
        })
    }

    fn next_pending(&mut self) -> Option<Result<Frame, LLMError>> {
        let item = self.pending.pop_front()?;
        if item.is_err() {
            self.finished = true;
            self.pending.clear();
        }
        Some(item)
    }
}

impl Stream for SseDecoder {
    type Item = Result<Frame, LLMError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        if let Some(item) = this.next_pending() {
            return Poll::Ready(Some(item));
        }

        if this.finished || this.failed {
            this.finished = true;
            return Poll::Ready(None);
        }

        loop {
            if this.body_closed {
                if !this.buffer.is_empty() {
                    let mut line = std::mem::take(&mut this.buffer);
                    if line.last() == Some(&b'\r') {
                        line.pop();
                    }
                    this.process_line(line);
                }
                if !this.failed && !this.current.data.is_empty() {
                    tracing::warn!(
                        event = this.current.name(),
                        "event stream ended mid-frame, dropping unterminated event"
                    );
                }
                this.current = Frame::default();
                let item = this.next_pending();
                this.finished = true;
                return Poll::Ready(item);
            }

            match this.body.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    this.buffer.extend_from_slice(&bytes);
                    while !this.failed {
                        let Some(line) = Self::drain_line(&mut this.buffer) else {
                            break;
                        };
                        this.process_line(line);
                    }
                    if let Some(item) = this.next_pending() {
                        return Poll::Ready(Some(item));
                    }
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
