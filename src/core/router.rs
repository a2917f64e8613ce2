//! 响应路由：用户消息 → 请求入队；每帧排空响应 → 写回 Agent 历史并切换状态
//!
//! 只在主线程调用；Agent 只在这里与 Agent::update 中被修改。

use uuid::Uuid;

use crate::agent::{Agent, StateKind};
use crate::core::{ErrorKind, InferenceOrchestrator, InferenceRequest, ResponseOutcome};
use crate::llm::ChatOptions;
use crate::memory::Message;

/// 原始错误消息展示给用户时的最大字符数
const MAX_RAW_ERROR_CHARS: usize = 100;

/// 交给界面层的结果（气泡内容）
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    Reply { agent_id: String, text: String },
    /// message 已是给用户看的短句
    Failure { agent_id: String, kind: ErrorKind, message: String },
}

impl Delivery {
    pub fn agent_id(&self) -> &str {
        match self {
            Delivery::Reply { agent_id, .. } | Delivery::Failure { agent_id, .. } => agent_id,
        }
    }
}

/// on_user_message 的结果
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    /// 已入队
    Sent(Uuid),
    /// 空消息或找不到 Agent
    Ignored,
    /// 入队失败，Agent 已进入 Error
    Failed(Delivery),
}

pub struct ResponseRouter {
    orchestrator: InferenceOrchestrator,
    options: ChatOptions,
}

impl ResponseRouter {
    pub fn new(orchestrator: InferenceOrchestrator) -> Self {
        Self {
            orchestrator,
            options: ChatOptions::default(),
        }
    }

    pub fn with_chat_options(mut self, options: ChatOptions) -> Self {
        self.options = options;
        self
    }

    pub fn orchestrator(&self) -> &InferenceOrchestrator {
        &self.orchestrator
    }

    pub fn orchestrator_mut(&mut self) -> &mut InferenceOrchestrator {
        &mut self.orchestrator
    }

    /// 用户向 agent_id 发送一条消息
    ///
    /// 先取历史快照（不含本轮），再追加用户轮次、切到 Thinking、入队。
    pub fn on_user_message(&mut self, agents: &mut [Agent], agent_id: &str, text: &str) -> Dispatch {
        let text = text.trim();
        if text.is_empty() {
            return Dispatch::Ignored;
        }
        let Some(agent) = agents.iter_mut().find(|a| a.id() == agent_id) else {
            tracing::warn!(agent_id, "User message for unknown agent");
            return Dispatch::Ignored;
        };

        let history = agent.history().snapshot();
        let request = InferenceRequest::new(agent.id(), agent.provider(), agent.model(), text, history)
            .with_options(self.options.clone());
        let request_id = request.id;

        agent.remember(Message::user(text));
        agent.set_state(StateKind::Thinking);

        match self.orchestrator.submit(request) {
            Ok(()) => {
                tracing::info!(agent_id, %request_id, "User message dispatched");
                Dispatch::Sent(request_id)
            }
            Err(e) => {
                tracing::error!(agent_id, error = %e, "Failed to queue request");
                agent.set_state(StateKind::Error);
                let kind = ErrorKind::Unreachable;
                Dispatch::Failed(Delivery::Failure {
                    agent_id: agent_id.to_string(),
                    kind,
                    message: user_facing_message(kind, &e.to_string()),
                })
            }
        }
    }

    /// 排空当前所有已完成的响应（不阻塞）
    pub fn drain(&mut self, agents: &mut [Agent]) -> Vec<Delivery> {
        let mut deliveries = Vec::new();
        while let Some(response) = self.orchestrator.poll() {
            let Some(agent) = agents.iter_mut().find(|a| a.id() == response.agent_id) else {
                tracing::warn!(
                    agent_id = %response.agent_id,
                    request_id = %response.request_id,
                    "Response for unknown agent, discarding"
                );
                continue;
            };

            match response.outcome {
                ResponseOutcome::Success { text, truncated } => {
                    tracing::info!(
                        agent_id = %response.agent_id,
                        request_id = %response.request_id,
                        chars = text.chars().count(),
                        truncated,
                        "Response delivered"
                    );
                    agent.remember(Message::assistant(text.clone()));
                    agent.set_state(StateKind::Talking);
                    deliveries.push(Delivery::Reply {
                        agent_id: response.agent_id,
                        text,
                    });
                }
                ResponseOutcome::Error { kind, message } => {
                    tracing::warn!(
                        agent_id = %response.agent_id,
                        request_id = %response.request_id,
                        %kind,
                        error = %message,
                        "Inference error delivered"
                    );
                    agent.set_state(StateKind::Error);
                    deliveries.push(Delivery::Failure {
                        agent_id: response.agent_id,
                        kind,
                        message: user_facing_message(kind, &message),
                    });
                }
            }
        }
        deliveries
    }
}

/// 错误分类 → 给用户看的短句；未分类的错误先按关键字细分，仍无法分类时截断原文
pub fn user_facing_message(kind: ErrorKind, raw: &str) -> String {
    let kind = match kind {
        ErrorKind::Other => ErrorKind::from_message(raw),
        other => other,
    };
    match kind {
        ErrorKind::Unreachable => "Can't reach LLM service".to_string(),
        ErrorKind::Timeout => "Request timed out".to_string(),
        ErrorKind::ModelNotFound => "Model not found".to_string(),
        ErrorKind::InvalidCredentials => "Invalid API key".to_string(),
        ErrorKind::EmptyResponse => "Empty response".to_string(),
        ErrorKind::UnknownProvider => {
            let name = raw.strip_prefix("Unknown provider: ").unwrap_or(raw);
            format!("Unknown provider: {name}")
        }
        ErrorKind::NotImplemented => "Provider not implemented".to_string(),
        ErrorKind::Other => truncate_chars(raw, MAX_RAW_ERROR_CHARS),
    }
}

fn truncate_chars(raw: &str, max: usize) -> String {
    if raw.chars().count() <= max {
        return raw.to_string();
    }
    let mut out: String = raw.chars().take(max).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::agent::{AnimationConfig, Vec2, WorldBounds};
    use crate::core::OrchestratorOptions;
    use crate::llm::ProviderRegistry;
    use crate::memory::{ConversationHistory, Role};

    fn agent(id: &str) -> Agent {
        Agent::new(id, id, Vec2::new(500.0, 500.0), WorldBounds::default(), AnimationConfig::default())
            .with_provider("mock", "m")
            .with_history(ConversationHistory::with_system_prompt("sys", 2))
            .with_seed(7)
    }

    fn router() -> ResponseRouter {
        ResponseRouter::new(InferenceOrchestrator::new(
            Arc::new(ProviderRegistry::new()),
            OrchestratorOptions::default(),
        ))
    }

    #[test]
    fn test_user_facing_messages() {
        assert_eq!(user_facing_message(ErrorKind::Unreachable, "x"), "Can't reach LLM service");
        assert_eq!(user_facing_message(ErrorKind::Timeout, "x"), "Request timed out");
        assert_eq!(user_facing_message(ErrorKind::ModelNotFound, "x"), "Model not found");
        assert_eq!(user_facing_message(ErrorKind::InvalidCredentials, "x"), "Invalid API key");
        assert_eq!(
            user_facing_message(ErrorKind::UnknownProvider, "Unknown provider: zz"),
            "Unknown provider: zz"
        );
    }

    #[test]
    fn test_other_errors_are_refined_or_truncated() {
        assert_eq!(
            user_facing_message(ErrorKind::Other, "connection refused"),
            "Can't reach LLM service"
        );
        let long = "x".repeat(150);
        let msg = user_facing_message(ErrorKind::Other, &long);
        assert_eq!(msg.chars().count(), 103);
        assert!(msg.ends_with("..."));
        assert_eq!(user_facing_message(ErrorKind::Other, "weird"), "weird");
    }

    #[test]
    fn test_on_user_message_records_turn_and_thinks() {
        let mut agents = vec![agent("a1")];
        let mut router = router();
        let dispatch = router.on_user_message(&mut agents, "a1", "  hello ");
        assert!(matches!(dispatch, Dispatch::Sent(_)));
        assert_eq!(agents[0].state_kind(), StateKind::Thinking);
        assert_eq!(agents[0].state_timer(), 0.0);
        let last = agents[0].history().messages().last().cloned().unwrap();
        assert_eq!(last.role, Role::User);
        assert_eq!(last.content, "hello");
        router.orchestrator_mut().stop(Duration::from_millis(10));
    }

    #[test]
    fn test_blank_or_unknown_target_ignored() {
        let mut agents = vec![agent("a1")];
        let mut router = router();
        assert_eq!(router.on_user_message(&mut agents, "a1", "   "), Dispatch::Ignored);
        assert_eq!(router.on_user_message(&mut agents, "ghost", "hi"), Dispatch::Ignored);
        assert_eq!(agents[0].state_kind(), StateKind::Idle);
    }

    #[test]
    fn test_drain_empty_is_noop() {
        let mut agents = vec![agent("a1")];
        let mut router = router();
        assert!(router.drain(&mut agents).is_empty());
    }
}
