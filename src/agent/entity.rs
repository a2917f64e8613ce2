//! 智能体实体：行为状态机与动画
//!
//! - Idle：随机漫步，到达后等待 3-5 秒再选下一个目标（目标限制在世界边界内）
//! - Thinking：以 3 倍速度左右踱步
//! - Talking：以进入时的 y 为基准做正弦浮动，说完（外部信号）或超时回到 Idle
//! - Error：以进入时的位置为基准横向抖动，固定时长后回到 Idle
//!
//! `update` 只读写本智能体的字段，不做任何 I/O；向推理层发起请求由 ResponseRouter 负责。

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::agent::geometry::{Vec2, WorldBounds};
use crate::agent::state::{AgentState, StateKind};
use crate::config::AgentSection;
use crate::memory::{ConversationHistory, Message};

/// 距目标小于该值即视为到达（同时保证归一化时向量非零）
pub const ARRIVAL_DISTANCE: f64 = 1.0;
/// Thinking 相对 Idle 的速度倍数
pub const THINKING_SPEED_FACTOR: f64 = 3.0;
/// 浮点计时比较的容差
const TIMER_EPSILON: f64 = 1e-9;

/// 动画参数（对应配置 [animation]）
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimationConfig {
    /// Idle 移动速度（像素/秒）
    pub move_speed: f64,
    /// Thinking 单程踱步距离
    pub pace_distance: f64,
    /// Idle 随机目标的最大偏移
    pub wander_radius: f64,
    /// 随机目标距世界边缘的最小距离
    pub wander_margin: f64,
    pub idle_wait_min: f64,
    pub idle_wait_max: f64,
    pub bob_amplitude: f64,
    /// 浮动角速度（弧度/秒）
    pub bob_speed: f64,
    pub shake_amplitude: f64,
    pub shake_rate: f64,
    /// Error 状态持续时间（秒）
    pub error_duration: f64,
    /// Talking 最长持续时间，防止说完信号丢失时卡住
    pub talking_max_duration: f64,
    pub agent_width: f64,
    pub agent_height: f64,
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            move_speed: 50.0,
            pace_distance: 64.0,
            wander_radius: 64.0,
            wander_margin: 20.0,
            idle_wait_min: 3.0,
            idle_wait_max: 5.0,
            bob_amplitude: 2.0,
            bob_speed: 4.0,
            shake_amplitude: 3.0,
            shake_rate: 20.0,
            error_duration: 2.0,
            talking_max_duration: 15.0,
            agent_width: 20.0,
            agent_height: 40.0,
        }
    }
}

/// 一个可视化智能体：身份、状态、位置与对话历史
#[derive(Debug)]
pub struct Agent {
    id: String,
    name: String,
    provider: String,
    model: String,
    color_hex: String,
    state: AgentState,
    state_timer: f64,
    position: Vec2,
    target_position: Vec2,
    history: ConversationHistory,
    bounds: WorldBounds,
    anim: AnimationConfig,
    rng: StdRng,
}

impl Agent {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        spawn: Vec2,
        bounds: WorldBounds,
        anim: AnimationConfig,
    ) -> Self {
        let position = bounds.clamp(spawn, 0.0);
        let mut rng = StdRng::from_os_rng();
        let wait = roll_wait(&mut rng, &anim);
        Self {
            id: id.into(),
            name: name.into(),
            provider: String::new(),
            model: String::new(),
            color_hex: "#7DCFB6".to_string(),
            state: AgentState::Idle { wait },
            state_timer: 0.0,
            position,
            target_position: position,
            history: ConversationHistory::new(10),
            bounds,
            anim,
            rng,
        }
    }

    /// 按 [[agents]] 配置项创建
    pub fn from_config(section: &AgentSection, bounds: WorldBounds, anim: AnimationConfig) -> Self {
        let spawn = Vec2::new(section.spawn_position[0], section.spawn_position[1]);
        let history = match &section.system_prompt {
            Some(prompt) => ConversationHistory::with_system_prompt(prompt.clone(), section.max_history),
            None => ConversationHistory::new(section.max_history),
        };
        let mut agent = Self::new(&section.id, &section.name, spawn, bounds, anim)
            .with_provider(&section.provider, &section.model)
            .with_history(history);
        agent.color_hex = section.color_hex.clone();
        tracing::info!(agent_id = %agent.id, name = %agent.name, x = agent.position.x, y = agent.position.y, "Agent created");
        agent
    }

    pub fn with_provider(mut self, provider: impl Into<String>, model: impl Into<String>) -> Self {
        self.provider = provider.into();
        self.model = model.into();
        self
    }

    pub fn with_history(mut self, history: ConversationHistory) -> Self {
        self.history = history;
        self
    }

    /// 固定随机种子（测试用，使随机目标可复现）
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        if let AgentState::Idle { .. } = self.state {
            self.state = AgentState::Idle {
                wait: roll_wait(&mut self.rng, &self.anim),
            };
        }
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn color_hex(&self) -> &str {
        &self.color_hex
    }

    pub fn state(&self) -> &AgentState {
        &self.state
    }

    pub fn state_kind(&self) -> StateKind {
        self.state.kind()
    }

    pub fn state_timer(&self) -> f64 {
        self.state_timer
    }

    pub fn position(&self) -> Vec2 {
        self.position
    }

    pub fn target_position(&self) -> Vec2 {
        self.target_position
    }

    pub fn bounds(&self) -> WorldBounds {
        self.bounds
    }

    pub fn animation(&self) -> &AnimationConfig {
        &self.anim
    }

    /// 手动设置移动目标（限制在世界边界内）
    pub fn set_target(&mut self, target: Vec2) {
        self.target_position = self.bounds.clamp(target, 0.0);
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    /// 追加一条消息（按 max_history 剪枝）
    pub fn remember(&mut self, msg: Message) {
        self.history.push(msg);
    }

    /// 推进一帧；dt 为距上一帧的秒数
    pub fn update(&mut self, dt: f64) {
        if !dt.is_finite() || dt < 0.0 {
            tracing::warn!(agent_id = %self.id, dt, "Ignoring invalid frame delta");
            return;
        }
        self.state_timer += dt;

        match self.state {
            AgentState::Idle { wait } => self.update_idle(dt, wait),
            AgentState::Thinking { pace_direction } => self.update_thinking(dt, pace_direction),
            AgentState::Talking { base_y, phase } => self.update_talking(dt, base_y, phase),
            AgentState::Error { base } => self.update_error(base),
        }
    }

    /// 切换状态：总是重置计时，并执行新状态的一次性初始化（捕获基准值）。
    /// 切换到相同状态等同于重新进入该状态。
    pub fn set_state(&mut self, next: StateKind) {
        let prev = self.state.kind();
        if prev != next {
            tracing::debug!(agent_id = %self.id, from = %prev, to = %next, "State transition");
        }

        // 离开动画状态时回到基准位置，避免把偏移带进下一个状态
        match self.state {
            AgentState::Talking { base_y, .. } => self.position.y = base_y,
            AgentState::Error { base } => self.position = base,
            _ => {}
        }

        self.state_timer = 0.0;
        self.state = match next {
            StateKind::Idle => {
                self.pick_random_target();
                AgentState::Idle {
                    wait: roll_wait(&mut self.rng, &self.anim),
                }
            }
            StateKind::Thinking => {
                let pace_direction = 1.0;
                self.target_position = self.pace_target(pace_direction);
                AgentState::Thinking { pace_direction }
            }
            StateKind::Talking => AgentState::Talking {
                base_y: self.position.y,
                phase: 0.0,
            },
            StateKind::Error => AgentState::Error {
                base: self.position,
            },
        };
    }

    /// 气泡显示完毕（外部信号）：Talking 回到 Idle，其余状态忽略
    pub fn notify_speech_finished(&mut self) {
        if self.state.kind() == StateKind::Talking {
            self.set_state(StateKind::Idle);
        }
    }

    /// 点击命中测试：point 为屏幕坐标，camera_offset 为相机偏移。不改变任何状态。
    pub fn handle_selection_click(&self, point: Vec2, camera_offset: Vec2) -> bool {
        let screen = self.position - camera_offset;
        let half_w = self.anim.agent_width / 2.0;
        let half_h = self.anim.agent_height / 2.0;
        point.x >= screen.x - half_w
            && point.x < screen.x + half_w
            && point.y >= screen.y - half_h
            && point.y < screen.y + half_h
    }

    fn update_idle(&mut self, dt: f64, wait: f64) {
        if self.step_toward_target(self.anim.move_speed * dt) {
            return;
        }
        if self.state_timer > wait {
            self.pick_random_target();
            self.state_timer = 0.0;
            self.state = AgentState::Idle {
                wait: roll_wait(&mut self.rng, &self.anim),
            };
        }
    }

    fn update_thinking(&mut self, dt: f64, pace_direction: f64) {
        let speed = self.anim.move_speed * THINKING_SPEED_FACTOR;
        if self.step_toward_target(speed * dt) {
            return;
        }
        let flipped = -pace_direction;
        self.target_position = self.pace_target(flipped);
        self.state = AgentState::Thinking {
            pace_direction: flipped,
        };
    }

    fn update_talking(&mut self, dt: f64, base_y: f64, phase: f64) {
        if self.state_timer + TIMER_EPSILON >= self.anim.talking_max_duration {
            tracing::debug!(agent_id = %self.id, "Talking timed out without speech-finished signal");
            self.set_state(StateKind::Idle);
            return;
        }
        let phase = phase + self.anim.bob_speed * dt;
        self.position.y = base_y + self.anim.bob_amplitude * phase.sin();
        self.state = AgentState::Talking { base_y, phase };
    }

    fn update_error(&mut self, base: Vec2) {
        if self.state_timer + TIMER_EPSILON < self.anim.error_duration {
            let shake = self.anim.shake_amplitude * (self.state_timer * self.anim.shake_rate).sin();
            self.position = Vec2::new(base.x + shake, base.y);
        } else {
            self.position = base;
            self.set_state(StateKind::Idle);
        }
    }

    /// 朝目标移动 step；仍在移动中返回 true，已到达返回 false
    fn step_toward_target(&mut self, step: f64) -> bool {
        let offset = self.target_position - self.position;
        let distance = offset.length();
        if distance <= ARRIVAL_DISTANCE {
            return false;
        }
        let Some(direction) = offset.normalized() else {
            return false;
        };
        if step >= distance {
            self.position = self.target_position;
        } else {
            self.position += direction * step;
        }
        true
    }

    fn pace_target(&self, pace_direction: f64) -> Vec2 {
        let raw = self.position + Vec2::new(self.anim.pace_distance * pace_direction, 0.0);
        let margin = self.anim.wander_margin;
        let clamped = self.bounds.clamp(raw, margin);
        // 只限制 x，y 保持当前值，避免踱步时纵向跳动
        Vec2::new(clamped.x, self.position.y)
    }

    fn pick_random_target(&mut self) {
        // 偏移不超过世界尺寸；NaN / inf 也落到这个上限
        let world = self.bounds.width().abs().max(self.bounds.height().abs());
        let r = self.anim.wander_radius.abs().min(world);
        if !r.is_finite() {
            self.target_position = self.bounds.clamp(self.position, self.anim.wander_margin);
            return;
        }
        let offset = Vec2::new(
            self.rng.random_range(-r..=r),
            self.rng.random_range(-r..=r),
        );
        self.target_position = self
            .bounds
            .clamp(self.position + offset, self.anim.wander_margin);
    }
}

fn roll_wait(rng: &mut StdRng, anim: &AnimationConfig) -> f64 {
    let (min, max) = (anim.idle_wait_min, anim.idle_wait_max);
    if min.is_finite() && max.is_finite() && max > min {
        rng.random_range(min..max)
    } else if min.is_finite() {
        min
    } else {
        0.0
    }
}
