//! PixelPrompt - 终端里的像素智能体小屋
//!
//! 模块划分：
//! - **agent**: Agent 状态机（Idle / Thinking / Talking / Error）、位置与动画
//! - **config**: 应用配置加载（TOML + 环境变量）与校验
//! - **core**: 推理编排器（单 worker + 队列）、响应路由、帧驱动引擎、错误分类
//! - **llm**: LLM 后端抽象与实现（Ollama / 云端占位 / Mock）及工厂
//! - **memory**: 对话历史
//! - **observability**: tracing 订阅器初始化
//! - **ui**: Ratatui TUI 界面

pub mod agent;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod ui;
