//! Streaming response decoding with backpressure.
//!
//! Backends stream either server-sent events (`data: {...}` lines) or
//! newline-delimited JSON. Both are line oriented, so a single decoder
//! splits the byte stream into lines and hands each one to a
//! backend-specific interpreter.
//!
//! Decoded events go through a bounded `tokio::sync::mpsc::channel` so the
//! reader task blocks when the consumer falls behind. If the consumer drops
//! the stream, the reader stops.

use futures_util::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;

use super::parse::parse_response;
use super::traits::EventStream;
use crate::types::{AssistRequest, Generation, StreamEvent, Usage};
use crate::NudgeError;

/// Default number of events buffered between reader and consumer.
pub const DEFAULT_STREAM_BUFFER: usize = 64;

/// What a single line of a streamed reply means.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum LineEvent {
    Text(String),
    Usage(Usage),
    /// Text and usage in one line (e.g. an Ollama final frame).
    TextWithUsage(String, Usage),
    Done,
}

/// Splits arbitrary byte chunks into trimmed, non-empty UTF-8 lines.
#[derive(Debug, Default)]
pub(crate) struct LineDecoder {
    buf: Vec<u8>,
}

impl LineDecoder {
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buf.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw).trim().to_string();
            if !line.is_empty() {
                lines.push(line);
            }
        }
        lines
    }

    /// Whatever is left after the last newline.
    pub fn finish(&mut self) -> Option<String> {
        let rest = String::from_utf8_lossy(&self.buf).trim().to_string();
        self.buf.clear();
        (!rest.is_empty()).then_some(rest)
    }
}

/// Turn a streaming HTTP response into [`StreamEvent`]s.
///
/// Emits one `Chunk` per text fragment, then a single `Done` carrying the
/// reply parsed for `request`. Usage falls back to a text-length estimate
/// when the backend reports none. A transport error mid-stream is sent as
/// the final item instead of `Done`.
///
/// Requires a tokio runtime context.
pub(crate) fn decode_response<F>(
    response: reqwest::Response,
    request: AssistRequest,
    prompt_text: String,
    buffer_size: usize,
    mut interpret: F,
) -> EventStream
where
    F: FnMut(&str) -> Option<LineEvent> + Send + 'static,
{
    let (tx, rx) = tokio::sync::mpsc::channel(buffer_size);

    tokio::spawn(async move {
        let mut bytes = response.bytes_stream();
        let mut decoder = LineDecoder::default();
        let mut text = String::new();
        let mut usage = None;
        let mut finished = false;

        while !finished {
            let lines = match bytes.next().await {
                Some(Ok(chunk)) => decoder.push(&chunk),
                Some(Err(e)) => {
                    let _ = tx.send(Err(NudgeError::from(e))).await;
                    return;
                }
                None => {
                    finished = true;
                    decoder.finish().into_iter().collect()
                }
            };

            for line in lines {
                let (fragment, reported) = match interpret(&line) {
                    Some(LineEvent::Text(t)) => (Some(t), None),
                    Some(LineEvent::Usage(u)) => (None, Some(u)),
                    Some(LineEvent::TextWithUsage(t, u)) => (Some(t), Some(u)),
                    Some(LineEvent::Done) => {
                        finished = true;
                        break;
                    }
                    None => (None, None),
                };
                if reported.is_some() {
                    usage = reported;
                }
                if let Some(fragment) = fragment.filter(|f| !f.is_empty()) {
                    text.push_str(&fragment);
                    if tx.send(Ok(StreamEvent::Chunk(fragment))).await.is_err() {
                        debug!("stream consumer dropped");
                        return; // receiver dropped
                    }
                }
            }
        }

        let usage = usage.unwrap_or_else(|| Usage::from_text(&prompt_text, &text));
        let response = parse_response(&request, &text);
        let _ = tx
            .send(Ok(StreamEvent::Done(Generation { response, usage })))
            .await;
    });

    Box::pin(ReceiverStream::new(rx))
}
