//! 记忆层：每个 Agent 的对话历史（按轮数剪枝，保留开头的 system 提示）

pub mod conversation;

pub use conversation::{ConversationHistory, Message, Role};
