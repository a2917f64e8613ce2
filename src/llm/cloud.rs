//! 云端后端占位（Gemini / Claude）
//!
//! 只做 API Key 解析：缺失或为空时报凭证错误，存在时报未实现。不发起任何网络请求。

use std::sync::Arc;

use crate::config::ProviderSection;
use crate::core::ProviderError;
use crate::llm::LlmProvider;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloudBackend {
    Gemini,
    Claude,
}

impl CloudBackend {
    pub fn display_name(&self) -> &'static str {
        match self {
            CloudBackend::Gemini => "Gemini",
            CloudBackend::Claude => "Claude",
        }
    }

    pub fn default_key_env(&self) -> &'static str {
        match self {
            CloudBackend::Gemini => "GEMINI_API_KEY",
            CloudBackend::Claude => "ANTHROPIC_API_KEY",
        }
    }

    /// 解析 API Key；成功后仍返回 NotImplemented
    pub fn connect(&self, section: &ProviderSection) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        let env_name = section
            .api_key_env
            .as_deref()
            .unwrap_or_else(|| self.default_key_env());
        let key = std::env::var(env_name).unwrap_or_default();
        if key.trim().is_empty() {
            return Err(ProviderError::InvalidCredentials(format!(
                "{} requires an API key. Set {} environment variable.",
                self.display_name(),
                env_name
            )));
        }
        tracing::debug!(provider = self.display_name(), "API key found");
        Err(ProviderError::NotImplemented(format!(
            "{} provider not implemented yet",
            self.display_name()
        )))
    }
}
