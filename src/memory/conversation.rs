//! 短期记忆：智能体对话历史
//!
//! 保留最近 N 轮对话（user/assistant 对），超出时自动剪枝；开头的 system 提示永不剪除。
//! 主线程独占写入；提交推理请求时以 `snapshot` 复制一份交给后台 worker。

use serde::{Deserialize, Serialize};

/// 消息角色（与 LLM API 一致）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    /// 线上协议使用的小写名称
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// 单条消息
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// 对话历史：最多保留 max_pairs 轮（每轮 user + assistant），开头的 system 消息单独保留
#[derive(Clone, Debug)]
pub struct ConversationHistory {
    messages: Vec<Message>,
    max_pairs: usize,
}

impl ConversationHistory {
    pub fn new(max_pairs: usize) -> Self {
        Self {
            messages: Vec::new(),
            max_pairs,
        }
    }

    /// 以 system 提示开头的历史；空提示等同于 `new`
    pub fn with_system_prompt(prompt: impl Into<String>, max_pairs: usize) -> Self {
        let prompt = prompt.into();
        let mut history = Self::new(max_pairs);
        if !prompt.trim().is_empty() {
            history.messages.push(Message::system(prompt));
        }
        history
    }

    pub fn push(&mut self, msg: Message) {
        self.messages.push(msg);
        self.prune();
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// 复制一份当前历史（交给 worker 线程，避免与主线程共享可变状态）
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.clone()
    }

    pub fn max_pairs(&self) -> usize {
        self.max_pairs
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    fn system_offset(&self) -> usize {
        match self.messages.first() {
            Some(m) if m.role == Role::System => 1,
            _ => 0,
        }
    }

    /// 超出 max_pairs*2 条时丢弃最旧的对话消息
    fn prune(&mut self) {
        let offset = self.system_offset();
        let keep = self.max_pairs.saturating_mul(2);
        let body = self.messages.len() - offset;
        if body > keep {
            self.messages.drain(offset..offset + (body - keep));
        }
    }
}
