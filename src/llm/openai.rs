// ABOUTME: OpenAI-compatible chat completion client over reqwest.
// ABOUTME: Supports single-shot and SSE-streamed completions with status → error mapping.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use reqwest::{Client, Response};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::config::LlmConfig;
use crate::llm::{ApiKey, CompletionClient, CompletionError, CompletionRequest};

/// Client for `{base_url}/chat/completions`.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    http: Client,
    base_url: String,
    api_key: ApiKey,
}

impl OpenAiClient {
    pub fn new(config: &LlmConfig, api_key: ApiKey) -> Result<Self, CompletionError> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| CompletionError::Transport(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    async fn post(&self, request: &CompletionRequest, stream: bool) -> Result<Response, CompletionError> {
        let body = json!({
            "model": request.model,
            "messages": request.messages,
            "stream": stream,
        });

        tracing::info!(
            model = %request.model,
            messages = request.messages.len(),
            stream,
            "sending completion request"
        );

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(self.api_key.expose())
            .json(&body)
            .send()
            .await
            .map_err(|e| CompletionError::Transport(format!("HTTP request failed: {}", e)))?;

        check_status(response).await
    }
}

/// Turn a non-2xx response into the matching error variant.
async fn check_status(response: Response) -> Result<Response, CompletionError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let status = status.as_u16();
    let retry_after_secs = response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(parse_retry_after);
    let body = response.text().await.unwrap_or_default();
    let message = truncate_chars(&api_error_message(&body), 200);
    tracing::warn!(status, %message, "completion API returned an error");

    Err(match status {
        401 | 403 => CompletionError::Auth(message),
        429 => CompletionError::RateLimited {
            message,
            retry_after_secs,
        },
        _ => CompletionError::Api { status, message },
    })
}

/// Prefer the API's `error.message` over the raw body.
fn api_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}

pub fn parse_retry_after(value: &str) -> Option<u64> {
    value.trim().parse().ok()
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(max).collect();
        out.push('…');
        out
    }
}

/// One parsed SSE `data:` payload.
#[derive(Debug, PartialEq)]
pub enum SseData {
    Delta(String),
    Done,
    Skip,
}

/// Parse a single line of an OpenAI-compatible event stream.
pub fn parse_sse_line(line: &str) -> Result<SseData, CompletionError> {
    let Some(data) = line.trim().strip_prefix("data:") else {
        return Ok(SseData::Skip);
    };
    let data = data.trim();
    if data == "[DONE]" {
        return Ok(SseData::Done);
    }
    let v: Value = serde_json::from_str(data)
        .map_err(|e| CompletionError::Decode(format!("bad stream chunk: {}", e)))?;
    if let Some(message) = v["error"]["message"].as_str() {
        return Err(CompletionError::Api {
            status: 200,
            message: message.to_string(),
        });
    }
    match v["choices"][0]["delta"]["content"].as_str() {
        Some(text) if !text.is_empty() => Ok(SseData::Delta(text.to_string())),
        _ => Ok(SseData::Skip),
    }
}

/// Pull the assistant text out of a non-streamed response body.
pub fn parse_completion_body(v: &Value) -> Result<String, CompletionError> {
    v["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| CompletionError::Decode("response has no choices[0].message.content".into()))
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        let response = self.post(request, false).await?;
        let v: Value = response
            .json()
            .await
            .map_err(|e| CompletionError::Decode(e.to_string()))?;
        parse_completion_body(&v)
    }

    fn complete_stream(
        &self,
        request: &CompletionRequest,
    ) -> BoxStream<'static, Result<String, CompletionError>> {
        let (tx, rx) = mpsc::channel(64);
        let client = self.clone();
        let request = request.clone();

        tokio::spawn(async move {
            let response = match client.post(&request, true).await {
                Ok(r) => r,
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                    return;
                }
            };

            let mut bytes = response.bytes_stream();
            let mut buffer: Vec<u8> = Vec::new();
            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        let _ = tx
                            .send(Err(CompletionError::Transport(format!("stream read error: {}", e))))
                            .await;
                        return;
                    }
                };
                buffer.extend_from_slice(&chunk);

                // Split on raw bytes so multi-byte characters spanning chunks stay intact.
                while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=pos).collect();
                    let line = String::from_utf8_lossy(&line);
                    match parse_sse_line(&line) {
                        Ok(SseData::Delta(text)) => {
                            if tx.send(Ok(text)).await.is_err() {
                                return;
                            }
                        }
                        Ok(SseData::Done) => return,
                        Ok(SseData::Skip) => {}
                        Err(e) => {
                            let _ = tx.send(Err(e)).await;
                            return;
                        }
                    }
                }
            }
        });

        ReceiverStream::new(rx).boxed()
    }
}
