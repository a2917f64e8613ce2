//! 帧驱动的世界状态：Agent、气泡、选中项、相机与响应路由
//!
//! 每帧 tick(dt)：推进所有 Agent → 推进气泡（结束的气泡通知 Agent 说完了）→ 排空推理响应并生成新气泡。
//! 全部在主线程执行，不做任何阻塞调用。

use std::collections::HashMap;
use std::time::Duration;

use crate::agent::Agent;
use crate::config::{AppConfig, UiSection};
use crate::core::{Delivery, Dispatch, ResponseRouter};
use crate::ui::{Camera, SpeechBubble};

pub struct Engine {
    agents: Vec<Agent>,
    router: ResponseRouter,
    camera: Camera,
    bubbles: HashMap<String, SpeechBubble>,
    selected: Option<usize>,
    ui: UiSection,
}

impl Engine {
    /// 按配置创建全部 Agent
    pub fn new(config: &AppConfig, router: ResponseRouter) -> Self {
        let bounds = config.world_bounds();
        let agents = config
            .agents
            .iter()
            .map(|section| Agent::from_config(section, bounds, config.animation))
            .collect();
        Self::from_parts(agents, router, Camera::new(&config.camera), config.ui.clone())
    }

    pub fn from_parts(agents: Vec<Agent>, router: ResponseRouter, camera: Camera, ui: UiSection) -> Self {
        let selected = if agents.is_empty() { None } else { Some(0) };
        tracing::info!(agents = agents.len(), "Engine initialized");
        Self {
            agents,
            router,
            camera,
            bubbles: HashMap::new(),
            selected,
            ui,
        }
    }

    /// 推进一帧，返回本帧送达的结果
    pub fn tick(&mut self, dt: f64) -> Vec<Delivery> {
        for agent in &mut self.agents {
            agent.update(dt);
        }

        let mut finished = Vec::new();
        for (agent_id, bubble) in &mut self.bubbles {
            bubble.update(dt);
            if bubble.is_finished() {
                finished.push(agent_id.clone());
            }
        }
        for agent_id in finished {
            self.bubbles.remove(&agent_id);
            if let Some(agent) = self.agents.iter_mut().find(|a| a.id() == agent_id) {
                agent.notify_speech_finished();
            }
        }

        let deliveries = self.router.drain(&mut self.agents);
        for delivery in &deliveries {
            self.show(delivery);
        }
        deliveries
    }

    /// 把输入框内容发给当前选中的 Agent
    pub fn submit_to_selected(&mut self, text: &str) -> Dispatch {
        let Some(agent_id) = self.selected_agent().map(|a| a.id().to_string()) else {
            tracing::debug!("No agent selected, dropping input");
            return Dispatch::Ignored;
        };
        let dispatch = self.router.on_user_message(&mut self.agents, &agent_id, text);
        match &dispatch {
            Dispatch::Sent(_) => {
                self.bubbles.remove(&agent_id);
            }
            Dispatch::Failed(delivery) => self.show(delivery),
            Dispatch::Ignored => {}
        }
        dispatch
    }

    /// Tab：循环选中下一个 Agent
    pub fn select_next(&mut self) {
        if self.agents.is_empty() {
            return;
        }
        let next = self.selected.map_or(0, |i| (i + 1) % self.agents.len());
        self.selected = Some(next);
        self.camera.center_on(self.agents[next].position());
        tracing::info!(agent = %self.agents[next].name(), "Selected agent");
    }

    /// 鼠标点击单元格（相对视口）；后绘制的 Agent 优先命中
    pub fn select_at(&mut self, col: u16, row: u16) -> bool {
        let point = Camera::cell_to_screen(col, row);
        let offset = self.camera.offset();
        let hit = self
            .agents
            .iter()
            .rposition(|agent| agent.handle_selection_click(point, offset));
        if let Some(index) = hit {
            self.selected = Some(index);
            tracing::info!(agent = %self.agents[index].name(), "Selected agent");
        }
        hit.is_some()
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn selected_agent(&self) -> Option<&Agent> {
        self.selected.and_then(|i| self.agents.get(i))
    }

    pub fn bubble(&self, agent_id: &str) -> Option<&SpeechBubble> {
        self.bubbles.get(agent_id)
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    pub fn ui(&self) -> &UiSection {
        &self.ui
    }

    /// 停止推理 worker，最多等待 timeout
    pub fn shutdown(&mut self, timeout: Duration) -> bool {
        tracing::info!("Engine shutting down");
        self.router.orchestrator_mut().stop(timeout)
    }

    fn show(&mut self, delivery: &Delivery) {
        let (text, is_error) = match delivery {
            Delivery::Reply { text, .. } => (text.as_str(), false),
            Delivery::Failure { message, .. } => (message.as_str(), true),
        };
        self.bubbles.insert(
            delivery.agent_id().to_string(),
            SpeechBubble::from_config(text, is_error, &self.ui),
        );
    }
}
