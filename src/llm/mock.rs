//! Mock 后端（用于测试与离线演示，无需网络）
//!
//! - `EchoProvider`：取最后一条 User 消息，按词切片回显
//! - `ScriptedProvider`：按脚本返回固定片段 / 中途失败 / 发送失败，并统计调用次数

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{stream, StreamExt};

use crate::core::ProviderError;
use crate::llm::{ChatOptions, ChunkStream, LlmProvider};
use crate::memory::{Message, Role};

/// 回显后端：把用户最后一条消息拆成若干片段流式返回
#[derive(Debug, Default)]
pub struct EchoProvider;

#[async_trait]
impl LlmProvider for EchoProvider {
    fn name(&self) -> &str {
        "Mock"
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn list_models(&self) -> Vec<String> {
        vec!["echo".to_string()]
    }

    async fn send_message(
        &self,
        messages: &[Message],
        _model: &str,
        _options: &ChatOptions,
    ) -> Result<ChunkStream, ProviderError> {
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");

        let reply = format!("Echo from Mock: {last_user}");
        let chunks: Vec<Result<String, ProviderError>> = reply
            .split_inclusive(' ')
            .map(|w| Ok(w.to_string()))
            .collect();
        Ok(Box::pin(stream::iter(chunks)))
    }
}

/// 脚本化后端：测试中精确控制可用性、片段、失败点与延迟
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    available: bool,
    chunks: Vec<String>,
    fail_after_chunks: Option<ProviderError>,
    send_error: Option<ProviderError>,
    chunk_delay: Option<Duration>,
    sends: AtomicUsize,
}

impl ScriptedProvider {
    /// 可用、依次返回给定片段
    pub fn new<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            available: true,
            chunks: chunks.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// 健康探测失败的后端
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Default::default()
        }
    }

    /// 片段产出完之后以该错误结束流
    pub fn with_failure_after_chunks(mut self, err: ProviderError) -> Self {
        self.fail_after_chunks = Some(err);
        self
    }

    /// send_message 直接返回该错误
    pub fn with_send_error(mut self, err: ProviderError) -> Self {
        self.send_error = Some(err);
        self
    }

    /// 每个片段前等待
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = Some(delay);
        self
    }

    /// send_message 被调用的次数
    pub fn send_count(&self) -> usize {
        self.sends.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "Scripted"
    }

    async fn is_available(&self) -> bool {
        self.available
    }

    async fn list_models(&self) -> Vec<String> {
        if self.available {
            vec!["scripted".to_string()]
        } else {
            Vec::new()
        }
    }

    async fn send_message(
        &self,
        _messages: &[Message],
        _model: &str,
        _options: &ChatOptions,
    ) -> Result<ChunkStream, ProviderError> {
        self.sends.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = &self.send_error {
            return Err(err.clone());
        }

        let mut items: Vec<Result<String, ProviderError>> =
            self.chunks.iter().cloned().map(Ok).collect();
        if let Some(err) = &self.fail_after_chunks {
            items.push(Err(err.clone()));
        }

        match self.chunk_delay {
            Some(delay) => Ok(Box::pin(stream::iter(items).then(move |item| async move {
                tokio::time::sleep(delay).await;
                item
            }))),
            None => Ok(Box::pin(stream::iter(items))),
        }
    }
}
