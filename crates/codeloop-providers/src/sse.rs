//! Generic SSE (Server-Sent Events) line parser.
//!
//! Converts a byte stream (usually a `reqwest::Response` body) into a
//! `Stream<Item = SseEvent>`.

use std::pin::Pin;

use bytes::{Buf, BytesMut};
use futures::Stream;
use tokio_stream::StreamExt;

/// A parsed SSE event.
#[derive(Debug, Clone)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
}

type ByteStream = Pin<Box<dyn Stream<Item = anyhow::Result<bytes::Bytes>> + Send>>;

/// Parse a reqwest response body as an SSE stream.
pub fn parse_sse_stream(
    response: reqwest::Response,
) -> impl Stream<Item = anyhow::Result<SseEvent>> + Send {
    let bytes = response
        .bytes_stream()
        .map(|r| r.map_err(|e| anyhow::anyhow!("SSE stream error: {e}")));
    parse_sse_bytes(bytes)
}

/// Parse any byte stream as SSE. Lines, and the UTF-8 sequences inside
/// them, may be split across chunks; only complete lines are decoded.
pub fn parse_sse_bytes<S>(byte_stream: S) -> impl Stream<Item = anyhow::Result<SseEvent>> + Send
where
    S: Stream<Item = anyhow::Result<bytes::Bytes>> + Send + 'static,
{
    futures::stream::unfold(
        SseState {
            byte_stream: Box::pin(byte_stream),
            buffer: BytesMut::new(),
            current_event: None,
            current_data: Vec::new(),
        },
        |mut state| async move {
            loop {
                if let Some(newline_pos) = state.buffer.iter().position(|&b| b == b'\n') {
                    let raw = state.buffer.split_to(newline_pos);
                    state.buffer.advance(1);
                    let decoded = String::from_utf8_lossy(&raw);
                    let line = decoded.trim_end_matches('\r');

                    if line.is_empty() {
                        // Empty line = dispatch event
                        if let Some(event) = state.take_event() {
                            return Some((Ok(event), state));
                        }
                        continue;
                    }

                    if line.starts_with(':') {
                        continue;
                    }

                    if let Some(value) = line.strip_prefix("event:") {
                        state.current_event = Some(value.trim_start().to_string());
                    } else if let Some(value) = line.strip_prefix("data:") {
                        state.current_data.push(value.trim_start().to_string());
                    }
                    continue;
                }

                match state.byte_stream.next().await {
                    Some(Ok(chunk)) => {
                        state.buffer.extend_from_slice(&chunk);
                    }
                    Some(Err(e)) => {
                        return Some((Err(e), state));
                    }
                    None => {
                        // Stream ended: a trailing line without newline still counts.
                        if !state.buffer.is_empty() {
                            let raw = state.buffer.split();
                            let rest = String::from_utf8_lossy(&raw);
                            if let Some(value) = rest.trim_end_matches('\r').strip_prefix("data:") {
                                state.current_data.push(value.trim_start().to_string());
                            }
                        }
                        return state.take_event().map(|event| (Ok(event), state));
                    }
                }
            }
        },
    )
}

struct SseState {
    byte_stream: ByteStream,
    buffer: BytesMut,
    current_event: Option<String>,
    current_data: Vec<String>,
}

impl SseState {
    fn take_event(&mut self) -> Option<SseEvent> {
        if self.current_data.is_empty() {
            return None;
        }
        let event = SseEvent {
            event: self.current_event.take(),
            data: self.current_data.join("\n"),
        };
        self.current_data.clear();
        Some(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn collect(chunks: Vec<&'static str>) -> Vec<SseEvent> {
        let bytes = futures::stream::iter(
            chunks
                .into_iter()
                .map(|c| Ok(bytes::Bytes::from_static(c.as_bytes()))),
        );
        let stream = parse_sse_bytes(bytes);
        tokio::pin!(stream);
        let mut out = Vec::new();
        while let Some(event) = stream.next().await {
            out.push(event.unwrap());
        }
        out
    }

    #[tokio::test]
    async fn test_events_split_across_chunks() {
        let events = collect(vec!["data: {\"a\"", ":1}\n\ndata: [DO", "NE]\n\n"]).await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].data, r#"{"a":1}"#);
        assert_eq!(events[1].data, "[DONE]");
    }

    #[tokio::test]
    async fn test_comments_and_event_names() {
        let events = collect(vec![": keep-alive\r\nevent: delta\r\ndata: x\r\n\r\n"]).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event.as_deref(), Some("delta"));
        assert_eq!(events[0].data, "x");
    }

    #[tokio::test]
    async fn test_multiline_data_joined() {
        let events = collect(vec!["data: one\ndata: two\n\n"]).await;
        assert_eq!(events[0].data, "one\ntwo");
    }

    #[tokio::test]
    async fn test_trailing_event_without_blank_line() {
        let events = collect(vec!["data: first\n\ndata: last"]).await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].data, "last");
    }

    #[tokio::test]
    async fn test_multibyte_char_split_across_chunks() {
        let bytes = futures::stream::iter(vec![
            Ok(bytes::Bytes::from_static(b"data: {\"c\":\"h\xC3")),
            Ok(bytes::Bytes::from_static(b"\xA9llo\"}\n\n")),
        ]);
        let stream = parse_sse_bytes(bytes);
        tokio::pin!(stream);
        let event = stream.next().await.unwrap().unwrap();
        assert_eq!(event.data, "{\"c\":\"h\u{e9}llo\"}");
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_byte_error_is_surfaced() {
        let bytes = futures::stream::iter(vec![
            Ok(bytes::Bytes::from_static(b"data: a\n\n")),
            Err(anyhow::anyhow!("connection reset")),
        ]);
        let stream = parse_sse_bytes(bytes);
        tokio::pin!(stream);
        assert!(stream.next().await.unwrap().is_ok());
        let err = stream.next().await.unwrap().unwrap_err();
        assert!(err.to_string().contains("connection reset"));
    }
}
