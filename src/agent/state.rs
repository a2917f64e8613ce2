//! 智能体行为状态
//!
//! 每个状态携带进入时捕获的快照（基准位置、相位等），动画偏移始终相对快照重新计算，不做累加。

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::agent::geometry::Vec2;

/// 状态种类（不带快照），用于外部触发转换与 UI 展示
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateKind {
    Idle,
    Thinking,
    Talking,
    Error,
}

impl fmt::Display for StateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StateKind::Idle => "idle",
            StateKind::Thinking => "thinking",
            StateKind::Talking => "talking",
            StateKind::Error => "error",
        };
        f.write_str(s)
    }
}

/// 当前状态及其进入时的快照
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AgentState {
    /// 随机漫步；到达目标且计时超过 `wait` 秒后换新目标
    Idle { wait: f64 },
    /// 左右快速踱步；`pace_direction` 为 +1 / -1
    Thinking { pace_direction: f64 },
    /// 上下浮动：y = base_y + amplitude * sin(phase)
    Talking { base_y: f64, phase: f64 },
    /// 围绕 base 横向抖动，持续固定时长后回到 Idle
    Error { base: Vec2 },
}

impl AgentState {
    pub fn kind(&self) -> StateKind {
        match self {
            AgentState::Idle { .. } => StateKind::Idle,
            AgentState::Thinking { .. } => StateKind::Thinking,
            AgentState::Talking { .. } => StateKind::Talking,
            AgentState::Error { .. } => StateKind::Error,
        }
    }
}
