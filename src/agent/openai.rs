// ABOUTME: OpenAI-compatible chat completions transport over reqwest.
// ABOUTME: Streams SSE deltas as fragments, or wraps a single non-streaming reply.

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::agent::transport::{CompletionRequest, EVENT_BUFFER, Transport, TransportEvent};
use crate::config::Config;
use crate::error::TransportError;
use crate::session::Turn;

/// Client for a `/v1/chat/completions` endpoint.
pub struct OpenAiTransport {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    organization_id: Option<String>,
    project_id: Option<String>,
}

impl OpenAiTransport {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.into(),
            api_key: None,
            organization_id: None,
            project_id: None,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, TransportError> {
        if config.api_url.trim().is_empty() {
            return Err(TransportError::NotConfigured("api_url is empty".into()));
        }
        let mut transport = Self::new(config.api_url.trim());
        transport.api_key = non_empty(&config.api_key);
        transport.organization_id = non_empty(&config.organization_id);
        transport.project_id = non_empty(&config.project_id);
        Ok(transport)
    }

    fn post(&self, body: &ApiRequest<'_>) -> reqwest::RequestBuilder {
        let mut builder = self.client.post(&self.api_url).json(body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        if let Some(org) = &self.organization_id {
            builder = builder.header("OpenAI-Organization", org);
        }
        if let Some(project) = &self.project_id {
            builder = builder.header("OpenAI-Project", project);
        }
        if body.stream {
            builder = builder.header("Accept", "text/event-stream");
        }
        builder
    }
}

#[async_trait]
impl Transport for OpenAiTransport {
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<mpsc::Receiver<TransportEvent>, TransportError> {
        let body = ApiRequest {
            model: request.model.as_deref(),
            messages: &request.messages,
            max_completion_tokens: request.max_tokens,
            stream: request.stream,
        };

        debug!(
            url = %self.api_url,
            messages = request.messages.len(),
            stream = request.stream,
            "sending completion request"
        );

        let response = self
            .post(&body)
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %body, "completion request failed");
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);

        if !request.stream {
            let reply: ApiResponse = response
                .json()
                .await
                .map_err(|e| TransportError::Decode(e.to_string()))?;
            let content = reply
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.message.content)
                .ok_or_else(|| TransportError::Decode("response has no message content".into()))?;
            let _ = tx.send(TransportEvent::Fragment(content)).await;
            let _ = tx.send(TransportEvent::Done).await;
            return Ok(rx);
        }

        tokio::spawn(async move {
            let mut bytes = response.bytes_stream();
            let mut buffer = LineBuffer::default();

            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        let _ = tx.send(TransportEvent::Failed(e.to_string())).await;
                        return;
                    }
                };
                buffer.push(&chunk);

                while let Some(line) = buffer.next_line() {
                    let line = match line {
                        Ok(line) => line,
                        Err(e) => {
                            let message = format!("stream is not valid UTF-8: {e}");
                            let _ = tx.send(TransportEvent::Failed(message)).await;
                            return;
                        }
                    };
                    match parse_sse_line(&line) {
                        SseLine::Fragment(text) => {
                            if tx.send(TransportEvent::Fragment(text)).await.is_err() {
                                return;
                            }
                        }
                        SseLine::Done => {
                            let _ = tx.send(TransportEvent::Done).await;
                            return;
                        }
                        SseLine::Skip => {}
                    }
                }
            }

            // Stream ended without [DONE].
            let _ = tx.send(TransportEvent::Done).await;
        });

        Ok(rx)
    }
}

/// Raw response bytes split into lines.
///
/// Chunk boundaries can fall inside a multi-byte character, so bytes are
/// decoded only once a whole line has arrived.
#[derive(Debug, Default)]
pub struct LineBuffer {
    bytes: Vec<u8>,
}

impl LineBuffer {
    pub fn push(&mut self, chunk: &[u8]) {
        self.bytes.extend_from_slice(chunk);
    }

    /// Take the next complete line, terminator included.
    pub fn next_line(&mut self) -> Option<Result<String, std::string::FromUtf8Error>> {
        let end = self.bytes.iter().position(|&b| b == b'\n')?;
        let line: Vec<u8> = self.bytes.drain(..=end).collect();
        Some(String::from_utf8(line))
    }
}

/// Interpretation of one line of a server-sent event stream.
#[derive(Debug, PartialEq, Eq)]
pub enum SseLine {
    Fragment(String),
    Done,
    Skip,
}

/// Parse one SSE line of a streaming chat completion.
pub fn parse_sse_line(line: &str) -> SseLine {
    let line = line.trim_end_matches(['\n', '\r']);
    let Some(data) = line.strip_prefix("data:") else {
        return SseLine::Skip;
    };
    let data = data.trim();
    if data == "[DONE]" {
        return SseLine::Done;
    }
    match serde_json::from_str::<StreamChunk>(data) {
        Ok(chunk) => chunk
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.delta.content)
            .filter(|c| !c.is_empty())
            .map_or(SseLine::Skip, SseLine::Fragment),
        Err(e) => {
            trace!(data = %data, error = %e, "ignoring unparseable SSE chunk");
            SseLine::Skip
        }
    }
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    messages: &'a [Turn],
    max_completion_tokens: u32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_content_delta() {
        let line = r#"data: {"choices":[{"index":0,"delta":{"content":"Hel"}}]}"#;
        assert_eq!(parse_sse_line(line), SseLine::Fragment("Hel".into()));
    }

    #[test]
    fn parses_done_marker() {
        assert_eq!(parse_sse_line("data: [DONE]\r\n"), SseLine::Done);
    }

    #[test]
    fn skips_role_only_and_empty_deltas() {
        let role = r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#;
        let empty = r#"data: {"choices":[{"delta":{"content":""}}]}"#;
        assert_eq!(parse_sse_line(role), SseLine::Skip);
        assert_eq!(parse_sse_line(empty), SseLine::Skip);
    }

    #[test]
    fn skips_comments_blank_lines_and_garbage() {
        assert_eq!(parse_sse_line(": keep-alive"), SseLine::Skip);
        assert_eq!(parse_sse_line(""), SseLine::Skip);
        assert_eq!(parse_sse_line("data: {not json"), SseLine::Skip);
        assert_eq!(parse_sse_line("event: ping"), SseLine::Skip);
    }

    #[test]
    fn line_buffer_joins_character_split_across_chunks() {
        let line = "data: {\"choices\":[{\"delta\":{\"content\":\"café\"}}]}\n".as_bytes();
        let split = line.iter().position(|&b| b == 0xC3).unwrap() + 1;

        let mut buffer = LineBuffer::default();
        buffer.push(&line[..split]);
        assert!(buffer.next_line().is_none());
        buffer.push(&line[split..]);

        let text = buffer.next_line().unwrap().unwrap();
        assert_eq!(parse_sse_line(&text), SseLine::Fragment("café".into()));
        assert!(buffer.next_line().is_none());
    }

    #[test]
    fn line_buffer_rejects_invalid_utf8_line() {
        let mut buffer = LineBuffer::default();
        buffer.push(b"data: \xFF\n");
        assert!(buffer.next_line().unwrap().is_err());
    }

    /// Serve one chunked SSE response, writing each part as its own chunk.
    async fn serve_chunked(parts: Vec<Vec<u8>>) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            while !request.ends_with(b"\"stream\":true}") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            socket
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\ntransfer-encoding: chunked\r\n\r\n")
                .await
                .unwrap();
            for part in parts {
                let mut chunk = format!("{:x}\r\n", part.len()).into_bytes();
                chunk.extend_from_slice(&part);
                chunk.extend_from_slice(b"\r\n");
                socket.write_all(&chunk).await.unwrap();
                socket.flush().await.unwrap();
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            }
            socket.write_all(b"0\r\n\r\n").await.unwrap();
            socket.flush().await.unwrap();
        });
        format!("http://{addr}/v1/chat/completions")
    }

    #[tokio::test]
    async fn streamed_reply_keeps_multibyte_character_split_by_network() {
        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"café\"}}]}\n\ndata: [DONE]\n\n";
        let bytes = body.as_bytes();
        let split = bytes.iter().position(|&b| b == 0xC3).unwrap() + 1;
        let url = serve_chunked(vec![bytes[..split].to_vec(), bytes[split..].to_vec()]).await;

        let transport = OpenAiTransport {
            client: reqwest::Client::builder().no_proxy().build().unwrap(),
            ..OpenAiTransport::new(url)
        };
        let mut events = transport
            .complete(CompletionRequest {
                messages: vec![Turn::user("Hi")],
                max_tokens: 16,
                model: None,
                stream: true,
            })
            .await
            .unwrap();

        let mut text = String::new();
        loop {
            match events.recv().await {
                Some(TransportEvent::Fragment(f)) => text.push_str(&f),
                Some(TransportEvent::Done) => break,
                other => panic!("unexpected event: {other:?}"),
            }
        }
        assert_eq!(text, "café");
    }

    #[test]
    fn request_body_matches_chat_completions_shape() {
        let messages = vec![Turn::system("SYS"), Turn::user("Hi")];
        let body = ApiRequest {
            model: None,
            messages: &messages,
            max_completion_tokens: 1024,
            stream: true,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "messages": [
                    {"role": "system", "content": "SYS"},
                    {"role": "user", "content": "Hi"}
                ],
                "max_completion_tokens": 1024,
                "stream": true
            })
        );
    }

    #[test]
    fn from_config_requires_url() {
        let config = Config {
            api_url: "  ".into(),
            ..Config::default()
        };
        assert!(matches!(
            OpenAiTransport::from_config(&config),
            Err(TransportError::NotConfigured(_))
        ));
    }

    #[test]
    fn from_config_drops_blank_credentials() {
        let config = Config {
            api_key: " ".into(),
            organization_id: "org-1".into(),
            ..Config::default()
        };
        let transport = OpenAiTransport::from_config(&config).unwrap();
        assert_eq!(transport.api_key, None);
        assert_eq!(transport.organization_id.as_deref(), Some("org-1"));
        assert_eq!(transport.project_id, None);
    }
}
