//! LLM 后端抽象
//!
//! 所有后端（Ollama / 云端 / Mock）实现 LlmProvider：健康探测、模型列表、流式发送。
//! 实例在启动时按配置构造一次，之后只读，可在 worker 与诊断调用方之间共享。

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;
use serde::Serialize;

use crate::core::ProviderError;
use crate::memory::Message;

/// 文本片段流：只能向前读取，每次调用 send_message 都是新的流；丢弃即关闭底层连接
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<String, ProviderError>> + Send>>;

/// 可选生成参数，原样转发给后端的 options
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChatOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_predict: Option<u32>,
}

impl ChatOptions {
    pub fn is_empty(&self) -> bool {
        self.temperature.is_none() && self.num_predict.is_none()
    }
}

/// LLM 后端 trait
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// 显示名称（如 "Ollama"）
    fn name(&self) -> &str;

    /// 轻量健康探测；任何失败都返回 false，不报错
    async fn is_available(&self) -> bool;

    /// 可用模型列表；失败时返回空列表
    async fn list_models(&self) -> Vec<String>;

    /// 流式发送对话（messages 按时间顺序，原样传给后端）
    async fn send_message(
        &self,
        messages: &[Message],
        model: &str,
        options: &ChatOptions,
    ) -> Result<ChunkStream, ProviderError>;
}
