//! 按名称与配置构造后端，并维护启动时建立的只读注册表

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::config::{AppConfig, ProviderSection};
use crate::core::ProviderError;
use crate::llm::cloud::CloudBackend;
use crate::llm::{EchoProvider, LlmProvider, OllamaProvider};

/// 按名称（不区分大小写）构造后端
///
/// - `ollama`：本地后端
/// - `gemini` / `claude`：先检查 API Key，再报未实现
/// - `mock`：离线回显
/// - 其它名称：UnknownProvider
pub fn create_provider(
    name: &str,
    section: &ProviderSection,
) -> Result<Arc<dyn LlmProvider>, ProviderError> {
    match name.trim().to_lowercase().as_str() {
        "ollama" => {
            let provider = OllamaProvider::new(section.base_url.as_deref(), section.timeout())?;
            Ok(Arc::new(provider))
        }
        "gemini" => CloudBackend::Gemini.connect(section),
        "claude" => CloudBackend::Claude.connect(section),
        "mock" => Ok(Arc::new(EchoProvider)),
        _ => Err(ProviderError::UnknownProvider(name.to_string())),
    }
}

/// 后端注册表：启动时构建，之后只读；按配置名（小写）索引
///
/// 配置里出现但没有构造出来的后端（未启用、缺少 API Key 等）单独记录，
/// 以便把它们与配置中根本不存在的名称区分开。
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, Arc<dyn LlmProvider>>,
    uninitialized: BTreeSet<String>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 按配置中所有启用的后端构建；未启用或构造失败的记为未初始化
    pub fn from_config(config: &AppConfig) -> Self {
        let mut registry = Self::new();
        for (name, section) in &config.llm_providers {
            if !section.enabled {
                registry.mark_uninitialized(name);
                continue;
            }
            match create_provider(name, section) {
                Ok(provider) => {
                    tracing::info!(provider = %name, "Registered LLM provider");
                    registry.insert(name.as_str(), provider);
                }
                Err(e) => {
                    tracing::warn!(provider = %name, error = %e, "Skipping LLM provider");
                    registry.mark_uninitialized(name);
                }
            }
        }
        registry
    }

    pub fn insert(&mut self, name: impl Into<String>, provider: Arc<dyn LlmProvider>) {
        let name = name.into().to_lowercase();
        self.uninitialized.remove(&name);
        self.providers.insert(name, provider);
    }

    /// 记录一个已配置但未构造的后端
    pub fn mark_uninitialized(&mut self, name: &str) {
        let name = name.to_lowercase();
        if !self.providers.contains_key(&name) {
            self.uninitialized.insert(name);
        }
    }

    pub fn is_uninitialized(&self, name: &str) -> bool {
        self.uninitialized.contains(&name.to_lowercase())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn LlmProvider>> {
        self.providers.get(&name.to_lowercase()).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.names())
            .field("uninitialized", &self.uninitialized)
            .finish()
    }
}

/// `--check` 模式下单个后端的探测结果
#[derive(Debug, Clone, PartialEq)]
pub enum CheckStatus {
    /// 可用，附带模型列表（可能为空）
    Ready { models: Vec<String> },
    /// 构造成功但健康探测失败
    Unavailable,
    /// 构造失败（缺少 API Key、未实现等）
    Failed(ProviderError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProviderReport {
    pub name: String,
    pub status: CheckStatus,
}

impl ProviderReport {
    pub fn is_ready(&self) -> bool {
        matches!(self.status, CheckStatus::Ready { .. })
    }
}

/// 逐个探测所有启用的后端
pub async fn check_providers(config: &AppConfig) -> Vec<ProviderReport> {
    let mut reports = Vec::new();
    for (name, section) in config.enabled_providers() {
        let status = match create_provider(name, section) {
            Ok(provider) => {
                if provider.is_available().await {
                    CheckStatus::Ready {
                        models: provider.list_models().await,
                    }
                } else {
                    CheckStatus::Unavailable
                }
            }
            Err(e) => CheckStatus::Failed(e),
        };
        tracing::info!(provider = name, ?status, "Checked provider");
        reports.push(ProviderReport {
            name: name.to_string(),
            status,
        });
    }
    reports
}
