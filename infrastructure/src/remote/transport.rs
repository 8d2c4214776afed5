//! HTTP streaming client for the remote chat endpoint.
//!
//! `POST {base}/chat` streams newline-delimited JSON chunks; each line is
//! one [`Chunk`] in the same wire form the local transport produces, so
//! the consumer cannot tell the transports apart. `GET
//! {base}/chat/{id}/stream` re-attaches to a detached stream when the
//! server still has one (204/404 mean it does not).

use async_trait::async_trait;
use futures::StreamExt;
use tandem_application::ports::chat_transport::{ChatTransport, ChunkStream, TransportError};
use tandem_domain::{ChatId, Chunk, Message, TransportMode};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const CHUNK_BUFFER: usize = 32;

/// Chat transport over a remote streaming endpoint.
pub struct RemoteChatTransport {
    chat_id: ChatId,
    client: reqwest::Client,
    base_url: String,
}

impl RemoteChatTransport {
    pub fn new(chat_id: ChatId, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            chat_id,
            client: reqwest::Client::new(),
            base_url,
        }
    }
}

#[async_trait]
impl ChatTransport for RemoteChatTransport {
    fn chat_id(&self) -> &ChatId {
        &self.chat_id
    }

    fn mode(&self) -> TransportMode {
        TransportMode::Remote
    }

    async fn send_messages(
        &self,
        conversation: &[Message],
        cancel: CancellationToken,
    ) -> Result<ChunkStream, TransportError> {
        let body = serde_json::json!({
            "chatId": self.chat_id.as_str(),
            "messages": conversation,
        });
        let response = self
            .client
            .post(format!("{}/chat", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| TransportError::Generation(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(TransportError::Generation(format!(
                "HTTP error: {}",
                response.status()
            )));
        }

        let (tx, rx) = mpsc::channel(CHUNK_BUFFER);
        tokio::spawn(pump_body(response, tx, cancel));
        Ok(ChunkStream::new(rx))
    }

    async fn reconnect_to_stream(
        &self,
        chat_id: &ChatId,
    ) -> Result<Option<ChunkStream>, TransportError> {
        let url = format!("{}/chat/{}/stream", self.base_url, chat_id);
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                debug!("reconnect attempt failed: {}", e);
                return Ok(None);
            }
        };

        let status = response.status();
        if status == reqwest::StatusCode::NO_CONTENT || status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            debug!("reconnect rejected with {}", status);
            return Ok(None);
        }

        let (tx, rx) = mpsc::channel(CHUNK_BUFFER);
        tokio::spawn(pump_body(response, tx, CancellationToken::new()));
        Ok(Some(ChunkStream::new(rx)))
    }

    async fn destroy(&self) {
        // Nothing held open between turns.
        debug!(chat = %self.chat_id, "remote transport released");
    }
}

/// Forward the response body into the chunk sink, one JSON line per chunk.
/// Stops promptly on cancellation, on a terminal chunk, and when the
/// consumer goes away.
async fn pump_body(response: reqwest::Response, tx: mpsc::Sender<Chunk>, cancel: CancellationToken) {
    let mut body = response.bytes_stream();
    let mut decoder = LineDecoder::default();

    loop {
        let piece = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("remote turn cancelled; dropping response stream");
                return;
            }
            piece = body.next() => piece,
        };
        let Some(piece) = piece else {
            // Server closed the stream.
            return;
        };
        let bytes = match piece {
            Ok(bytes) => bytes,
            Err(e) => {
                let _ = tx
                    .send(Chunk::Error {
                        message: format!("stream error: {e}"),
                    })
                    .await;
                return;
            }
        };

        for line in decoder.push(&bytes) {
            match parse_chunk_line(&line) {
                None => {}
                Some(Ok(chunk)) => {
                    let terminal = chunk.is_terminal();
                    if tx.send(chunk).await.is_err() {
                        // Consumer detached; stop reading the body.
                        return;
                    }
                    if terminal {
                        return;
                    }
                }
                Some(Err(e)) => {
                    warn!("malformed chunk line from server: {}", e);
                    let _ = tx
                        .send(Chunk::Error {
                            message: format!("malformed chunk from server: {e}"),
                        })
                        .await;
                    return;
                }
            }
        }
    }
}

/// Reassembles newline-delimited frames from arbitrary byte slices.
#[derive(Default)]
struct LineDecoder {
    buffer: Vec<u8>,
}

impl LineDecoder {
    /// Feed bytes; returns every complete, non-blank line.
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let frame: Vec<u8> = self.buffer.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&frame[..frame.len() - 1])
                .trim()
                .to_string();
            if !text.is_empty() {
                lines.push(text);
            }
        }
        lines
    }
}

/// Parse one body line into a chunk. Blank lines are keep-alives.
fn parse_chunk_line(line: &str) -> Option<Result<Chunk, serde_json::Error>> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(serde_json::from_str(trimmed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decoder_reassembles_lines_split_across_reads() {
        let mut decoder = LineDecoder::default();
        assert!(decoder.push(b"{\"type\":\"fin").is_empty());
        let lines = decoder.push(b"ish\",\"id\":\"t1\"}\n");
        assert_eq!(lines, vec![r#"{"type":"finish","id":"t1"}"#.to_string()]);
    }

    #[test]
    fn decoder_yields_multiple_lines_from_one_read() {
        let mut decoder = LineDecoder::default();
        let lines = decoder.push(b"one\ntwo\n\nthree\n");
        assert_eq!(lines, vec!["one", "two", "three"]);
    }

    #[test]
    fn decoder_skips_blank_keepalive_lines() {
        let mut decoder = LineDecoder::default();
        assert!(decoder.push(b"\n\r\n  \n").is_empty());
    }

    #[test]
    fn chunk_lines_parse_into_protocol_chunks() {
        let parsed = parse_chunk_line(r#"{"type":"text-delta","id":"t1","delta":"Hi"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(
            parsed,
            Chunk::TextDelta {
                id: "t1".to_string(),
                delta: "Hi".to_string(),
            }
        );
    }

    #[test]
    fn blank_lines_are_not_chunks() {
        assert!(parse_chunk_line("   ").is_none());
    }

    #[test]
    fn malformed_lines_surface_a_parse_error() {
        let result = parse_chunk_line(r#"{"type":"mystery"}"#).unwrap();
        assert!(result.is_err());
    }

    #[test]
    fn base_url_trailing_slash_is_normalized() {
        let transport =
            RemoteChatTransport::new(ChatId::new("c-remote"), "http://localhost:8787/");
        assert_eq!(transport.base_url, "http://localhost:8787");
    }
}
