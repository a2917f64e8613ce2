//! Ollama 本地后端
//!
//! POST {base_url}/api/chat，请求体 `{model, messages, stream: true}`；响应为换行分隔的 JSON，
//! 每行可能带 `{message: {content}}` 与 `done`。`done == true` 或连续解析失败过多时结束。
//! 健康探测：GET {base_url}/api/tags，200 即可用。

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::core::ProviderError;
use crate::llm::{ChatOptions, ChunkStream, LlmProvider};
use crate::memory::Message;

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";
/// 健康探测与模型列表的超时
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);
/// 连续多少行无法解析后放弃该流
const MAX_PARSE_FAILURES: usize = 3;

/// Ollama 后端：只持有 HTTP 客户端与只读配置
pub struct OllamaProvider {
    client: Client,
    base_url: String,
    timeout: Duration,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    stream: bool,
    #[serde(skip_serializing_if = "options_empty")]
    options: &'a ChatOptions,
}

fn options_empty(options: &&ChatOptions) -> bool {
    options.is_empty()
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

/// 流中的一行
#[derive(Debug, Default, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    message: Option<ChunkMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Deserialize)]
struct TagEntry {
    name: String,
}

impl OllamaProvider {
    pub fn new(base_url: Option<&str>, timeout: Duration) -> Result<Self, ProviderError> {
        let base_url = base_url
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
            .to_string();
        let client = Client::builder()
            .connect_timeout(timeout)
            .build()
            .map_err(|e| ProviderError::InvalidRequest(format!("failed to build HTTP client: {e}")))?;
        tracing::info!(base_url = %base_url, timeout_secs = timeout.as_secs(), "Initialized OllamaProvider");
        Ok(Self {
            client,
            base_url,
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn map_send_error(&self, err: reqwest::Error) -> ProviderError {
        if err.is_timeout() {
            ProviderError::Timeout(format!("Request timed out after {}s", self.timeout.as_secs()))
        } else if err.is_connect() || err.is_request() {
            ProviderError::Unreachable(format!("Cannot reach Ollama at {}", self.base_url))
        } else {
            ProviderError::Stream(err.to_string())
        }
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn name(&self) -> &str {
        "Ollama"
    }

    async fn is_available(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);
        match self.client.get(&url).timeout(HEALTH_TIMEOUT).send().await {
            Ok(resp) if resp.status() == StatusCode::OK => {
                tracing::debug!("Ollama server is available");
                true
            }
            Ok(resp) => {
                tracing::warn!(status = %resp.status(), "Ollama server returned non-OK status");
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, "Ollama not available");
                false
            }
        }
    }

    async fn list_models(&self) -> Vec<String> {
        let url = format!("{}/api/tags", self.base_url);
        let resp = match self.client.get(&url).timeout(HEALTH_TIMEOUT).send().await {
            Ok(resp) if resp.status().is_success() => resp,
            Ok(resp) => {
                tracing::error!(status = %resp.status(), "Failed to list models");
                return Vec::new();
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to list models");
                return Vec::new();
            }
        };
        match resp.json::<TagsResponse>().await {
            Ok(tags) => {
                let models: Vec<String> = tags.models.into_iter().map(|m| m.name).collect();
                tracing::debug!(?models, "Available models");
                models
            }
            Err(e) => {
                tracing::error!(error = %e, "Malformed /api/tags response");
                Vec::new()
            }
        }
    }

    async fn send_message(
        &self,
        messages: &[Message],
        model: &str,
        options: &ChatOptions,
    ) -> Result<ChunkStream, ProviderError> {
        let url = format!("{}/api/chat", self.base_url);
        let body = ChatRequest {
            model,
            messages: messages
                .iter()
                .map(|m| WireMessage {
                    role: m.role.as_str(),
                    content: &m.content,
                })
                .collect(),
            stream: true,
            options,
        };

        tracing::debug!(url = %url, model, messages = messages.len(), "Sending chat request");

        let response = tokio::time::timeout(self.timeout, self.client.post(&url).json(&body).send())
            .await
            .map_err(|_| {
                ProviderError::Timeout(format!("Request timed out after {}s", self.timeout.as_secs()))
            })?
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %text, "Ollama chat request failed");
            return Err(match status {
                StatusCode::NOT_FOUND => ProviderError::ModelNotFound(format!(
                    "Model '{model}' not found. Run: ollama pull {model}"
                )),
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    ProviderError::InvalidCredentials(format!("Ollama rejected credentials: {text}"))
                }
                StatusCode::BAD_REQUEST => ProviderError::InvalidRequest(text),
                _ => ProviderError::Http {
                    status: status.as_u16(),
                    body: text,
                },
            });
        }

        Ok(chat_stream(response, self.timeout))
    }
}

/// 把响应体转成文本片段流；每次读取都受 timeout 约束
fn chat_stream(response: reqwest::Response, timeout: Duration) -> ChunkStream {
    Box::pin(async_stream::try_stream! {
        let mut body = response.bytes_stream();
        let mut decoder = NdjsonDecoder::default();
        let mut parse_failures = 0usize;
        let mut finished = false;

        while !finished {
            let next = tokio::time::timeout(timeout, body.next())
                .await
                .map_err(|_| ProviderError::Timeout(format!("Request timed out after {}s", timeout.as_secs())))?;
            let lines = match next {
                Some(bytes) => {
                    let bytes = bytes.map_err(|e| ProviderError::Stream(e.to_string()))?;
                    decoder.push(&bytes)
                }
                None => {
                    finished = true;
                    decoder.finish().into_iter().collect()
                }
            };

            for line in lines {
                match parse_line(&line) {
                    Ok(LineEvent::Content(text)) => {
                        parse_failures = 0;
                        yield text;
                    }
                    Ok(LineEvent::Skip) => parse_failures = 0,
                    Ok(LineEvent::Done(tail)) => {
                        if let Some(text) = tail {
                            yield text;
                        }
                        tracing::debug!("Stream completed");
                        finished = true;
                        break;
                    }
                    Ok(LineEvent::Failed(msg)) => {
                        Err(ProviderError::Stream(msg))?;
                    }
                    Err(e) => {
                        parse_failures += 1;
                        tracing::warn!(error = %e, failures = parse_failures, "Failed to parse chunk");
                        if parse_failures >= MAX_PARSE_FAILURES {
                            tracing::warn!("Too many unparseable chunks, ending stream");
                            finished = true;
                            break;
                        }
                    }
                }
            }
        }
    })
}

#[derive(Debug, PartialEq)]
enum LineEvent {
    Content(String),
    Skip,
    /// done 行，可能顺带最后一段内容
    Done(Option<String>),
    /// 后端在流中报告的错误
    Failed(String),
}

fn parse_line(line: &str) -> Result<LineEvent, serde_json::Error> {
    let chunk: ChatChunk = serde_json::from_str(line)?;
    if let Some(err) = chunk.error {
        return Ok(LineEvent::Failed(err));
    }
    let content = chunk
        .message
        .and_then(|m| m.content)
        .filter(|c| !c.is_empty());
    Ok(match (content, chunk.done) {
        (tail, true) => LineEvent::Done(tail),
        (Some(text), false) => LineEvent::Content(text),
        (None, false) => LineEvent::Skip,
    })
}

/// 换行分隔 JSON 的增量切分器：按字节缓冲，只吐出完整的非空行
#[derive(Debug, Default)]
pub struct NdjsonDecoder {
    buffer: Vec<u8>,
}

impl NdjsonDecoder {
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim();
            if !line.is_empty() {
                lines.push(line.to_string());
            }
        }
        lines
    }

    /// 流结束时取出未以换行结尾的最后一行
    pub fn finish(&mut self) -> Option<String> {
        let raw = std::mem::take(&mut self.buffer);
        let line = String::from_utf8_lossy(&raw).trim().to_string();
        (!line.is_empty()).then_some(line)
    }
}
