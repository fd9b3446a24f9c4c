use std::pin::Pin;

use anyhow::{Context, Result};
use futures::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::LlmConfig;

pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

#[derive(Deserialize)]
struct CompletionChunk {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    delta: CompletionDelta,
}

#[derive(Deserialize)]
struct CompletionDelta {
    content: Option<String>,
}

/// OpenAI-compatible chat completions client, streaming only.
#[derive(Clone)]
pub struct GenerationClient {
    http: reqwest::Client,
    config: LlmConfig,
}

impl GenerationClient {
    pub fn new(http: reqwest::Client, config: LlmConfig) -> Self {
        Self { http, config }
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Start a completion and return its content deltas as they arrive.
    pub async fn stream(&self, messages: &[ChatMessage]) -> Result<DeltaStream> {
        let url = format!("{}/v1/chat/completions", self.config.base_url);
        info!("Requesting completion from {} ({})", url, self.config.model);

        let resp = self
            .http
            .post(&url)
            .timeout(self.config.timeout)
            .bearer_auth(&self.config.api_key)
            .json(&CompletionRequest {
                model: &self.config.model,
                messages,
                stream: true,
            })
            .send()
            .await
            .context("Failed to connect to the generation API")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Generation API returned {status}: {body}");
        }

        let stream = stream_lines(resp.bytes_stream()).filter_map(|line| async move {
            match line {
                Ok(line) => parse_sse_line(&line),
                Err(e) => Some(Err(e)),
            }
        });

        Ok(Box::pin(stream))
    }
}

/// One server-sent line. `None` for blank lines, non-data lines,
/// `[DONE]` and chunks without content.
fn parse_sse_line(line: &str) -> Option<Result<String>> {
    let data = line.trim().strip_prefix("data:")?.trim();
    if data.is_empty() || data == "[DONE]" {
        return None;
    }

    match serde_json::from_str::<CompletionChunk>(data) {
        Ok(chunk) => chunk
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.delta.content)
            .filter(|content| !content.is_empty())
            .map(Ok),
        Err(e) => Some(Err(anyhow::anyhow!("Failed to parse completion chunk: {e}"))),
    }
}

/// Re-frame a byte stream as complete lines.
///
/// Lines are decoded only once complete, so a multibyte character split
/// across network chunks survives intact.
fn stream_lines(
    bytes: impl Stream<Item = reqwest::Result<bytes::Bytes>> + Send + 'static,
) -> impl Stream<Item = Result<String>> + Send {
    futures::stream::unfold(
        (Box::pin(bytes), Vec::<u8>::new()),
        |(mut bytes, mut buffer)| async move {
            loop {
                if let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
                    let line = String::from_utf8_lossy(&buffer[..pos]).into_owned();
                    buffer.drain(..=pos);
                    if !line.trim().is_empty() {
                        return Some((Ok(line), (bytes, buffer)));
                    }
                    continue;
                }

                match bytes.next().await {
                    Some(Ok(chunk)) => buffer.extend_from_slice(&chunk),
                    Some(Err(e)) => {
                        return Some((
                            Err(anyhow::anyhow!("Stream read error: {e}")),
                            (bytes, buffer),
                        ));
                    }
                    None => {
                        let rest = String::from_utf8_lossy(&std::mem::take(&mut buffer)).into_owned();
                        if rest.trim().is_empty() {
                            return None;
                        }
                        return Some((Ok(rest), (bytes, buffer)));
                    }
                }
            }
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn parses_content_delta() {
        let line = r#"data: {"choices":[{"delta":{"content":"Metformin"}}]}"#;
        assert_eq!(parse_sse_line(line).unwrap().unwrap(), "Metformin");
    }

    #[test]
    fn accepts_data_prefix_without_space() {
        let line = r#"data:{"choices":[{"delta":{"content":"ok"}}]}"#;
        assert_eq!(parse_sse_line(line).unwrap().unwrap(), "ok");
    }

    #[test]
    fn skips_done_and_role_only_chunks() {
        assert!(parse_sse_line("data: [DONE]").is_none());
        assert!(parse_sse_line(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#).is_none());
        assert!(parse_sse_line(r#"data: {"choices":[]}"#).is_none());
    }

    #[test]
    fn skips_non_data_lines() {
        assert!(parse_sse_line("").is_none());
        assert!(parse_sse_line(": keep-alive").is_none());
        assert!(parse_sse_line("event: message").is_none());
    }

    #[test]
    fn malformed_chunk_is_an_error() {
        assert!(parse_sse_line("data: {broken").unwrap().is_err());
    }

    #[tokio::test]
    async fn lines_are_reassembled_across_chunks() {
        let parts: Vec<reqwest::Result<bytes::Bytes>> = vec![
            Ok(bytes::Bytes::from_static(b"data: one\nda")),
            Ok(bytes::Bytes::from_static(b"ta: two\n\n")),
            Ok(bytes::Bytes::from_static(b"data: three")),
        ];
        let lines: Vec<String> = stream_lines(futures::stream::iter(parts))
            .map(|l| l.unwrap())
            .collect()
            .await;
        assert_eq!(lines, vec!["data: one", "data: two", "data: three"]);
    }

    #[tokio::test]
    async fn multibyte_character_split_across_chunks_is_preserved() {
        let parts: Vec<reqwest::Result<bytes::Bytes>> = vec![
            Ok(bytes::Bytes::from_static(
                b"data: {\"choices\":[{\"delta\":{\"content\":\"5 \xC2",
            )),
            Ok(bytes::Bytes::from_static(b"\xB5g at 37 \xC2\xB0C\"}}]}\n")),
        ];
        let deltas: Vec<String> = stream_lines(futures::stream::iter(parts))
            .filter_map(|line| async move { parse_sse_line(&line.unwrap()) })
            .map(|delta| delta.unwrap())
            .collect()
            .await;
        assert_eq!(deltas, vec!["5 µg at 37 °C"]);
    }

    #[tokio::test]
    async fn streams_deltas_from_completions_endpoint() {
        let server = MockServer::start().await;
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Take 500 µg\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\" with food.\"}}]}\n\n",
            "data: [DONE]\n\n",
        );
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(body)
                    .insert_header("content-type", "text/event-stream"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = GenerationClient::new(
            reqwest::Client::new(),
            LlmConfig {
                api_key: "test-key".into(),
                base_url: server.uri(),
                model: "gpt-4o-mini".into(),
                timeout: Duration::from_secs(5),
            },
        );
        let deltas: Vec<String> = client
            .stream(&[ChatMessage::user("dose?")])
            .await
            .unwrap()
            .map(|d| d.unwrap())
            .collect()
            .await;
        assert_eq!(deltas, vec!["Take 500 µg", " with food."]);

        let requests = server.received_requests().await.unwrap();
        let sent: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(sent["stream"], true);
        assert_eq!(sent["model"], "gpt-4o-mini");
        assert_eq!(sent["messages"][0]["content"], "dose?");
    }

    #[tokio::test]
    async fn error_status_fails_to_start() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let client = GenerationClient::new(
            reqwest::Client::new(),
            LlmConfig {
                api_key: "wrong".into(),
                base_url: server.uri(),
                model: "gpt-4o-mini".into(),
                timeout: Duration::from_secs(5),
            },
        );
        let err = client.stream(&[ChatMessage::user("hi")]).await.err().unwrap();
        assert!(err.to_string().contains("401"));
    }

    #[tokio::test]
    async fn unreachable_api_fails_to_start() {
        let client = GenerationClient::new(
            reqwest::Client::new(),
            LlmConfig {
                api_key: "test".into(),
                base_url: "http://127.0.0.1:9".into(),
                model: "gpt-4o-mini".into(),
                timeout: Duration::from_secs(2),
            },
        );
        let result = client.stream(&[ChatMessage::user("hello")]).await;
        assert!(result.is_err());
    }
}
