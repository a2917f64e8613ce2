//! Agent：几何、状态机与实体
//!
//! 状态为带进入快照的枚举（Idle / Thinking / Talking / Error），
//! 动画偏移总是相对进入状态时捕获的基准值计算，不做累加。

pub mod entity;
pub mod geometry;
pub mod state;

pub use entity::{Agent, AnimationConfig, ARRIVAL_DISTANCE, THINKING_SPEED_FACTOR};
pub use geometry::{Vec2, WorldBounds};
pub use state::{AgentState, StateKind};
