//! 应用配置：内置默认值 + TOML 文件 + 环境变量
//!
//! 加载顺序：先以 `AppConfig::default()` 为底，再叠加 config/default.toml（若存在）与 `--config` 指定的文件，
//! 最后用环境变量 `PIXELPROMPT__*` 覆盖（双下划线表示嵌套，如 `PIXELPROMPT__WINDOW__FPS_TARGET=30`）。
//! 表按键深度合并，数组（如 [[agents]]）整体替换。

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::agent::{AnimationConfig, WorldBounds};
use crate::core::{OrchestratorOptions, StreamLimits};
use crate::llm::ChatOptions;

/// 配置加载或校验失败（仅在启动阶段出现，允许终止进程）
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("config source error: {0}")]
    Source(#[from] config::ConfigError),

    #[error("failed to write default config to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize default config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// 应用配置根
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub window: WindowSection,
    pub camera: CameraSection,
    pub animation: AnimationConfig,
    pub orchestrator: OrchestratorSection,
    pub ui: UiSection,
    pub chat: ChatSection,
    pub llm_providers: BTreeMap<String, ProviderSection>,
    pub agents: Vec<AgentSection>,
}

/// [window] 段：终端帧率
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowSection {
    pub width: u32,
    pub height: u32,
    pub fps_target: u32,
}

impl Default for WindowSection {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            fps_target: 60,
        }
    }
}

/// [camera] 段：平移速度与世界边界
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSection {
    pub pan_speed: f64,
    pub bounds: WorldBounds,
}

impl Default for CameraSection {
    fn default() -> Self {
        Self {
            pan_speed: 5.0,
            bounds: WorldBounds::default(),
        }
    }
}

/// [orchestrator] 段：worker 轮询间隔、关闭等待、流式读取上限
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorSection {
    pub poll_interval_ms: u64,
    pub stop_timeout_secs: f64,
    pub max_chunks: usize,
    pub max_chars: usize,
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        let limits = StreamLimits::default();
        Self {
            poll_interval_ms: 1000,
            stop_timeout_secs: DEFAULT_STOP_TIMEOUT_SECS,
            max_chunks: limits.max_chunks,
            max_chars: limits.max_chars,
        }
    }
}

impl OrchestratorSection {
    pub fn to_options(&self) -> OrchestratorOptions {
        OrchestratorOptions {
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            limits: StreamLimits {
                max_chunks: self.max_chunks,
                max_chars: self.max_chars,
            },
        }
    }

    pub fn stop_timeout(&self) -> Duration {
        seconds_or(self.stop_timeout_secs, DEFAULT_STOP_TIMEOUT_SECS)
    }
}

/// [ui] 段：气泡打字机速度与显示时长
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UiSection {
    pub typewriter_delay_ms: u64,
    pub bubble_lifetime_secs: f64,
    pub bubble_max_width: u16,
}

impl Default for UiSection {
    fn default() -> Self {
        Self {
            typewriter_delay_ms: 30,
            bubble_lifetime_secs: DEFAULT_BUBBLE_LIFETIME_SECS,
            bubble_max_width: 300,
        }
    }
}

impl UiSection {
    pub fn bubble_lifetime(&self) -> Duration {
        seconds_or(self.bubble_lifetime_secs, DEFAULT_BUBBLE_LIFETIME_SECS)
    }
}

const DEFAULT_STOP_TIMEOUT_SECS: f64 = 5.0;
const DEFAULT_BUBBLE_LIFETIME_SECS: f64 = 10.0;
/// 秒数类配置的上限（一小时）
const MAX_SECONDS: f64 = 3600.0;
/// 距离/速度类配置的上限（世界单位）
const MAX_WORLD_VALUE: f64 = 1.0e6;

/// 秒数 → Duration；负数、NaN、溢出时退回默认值
fn seconds_or(secs: f64, default_secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs).unwrap_or_else(|_| {
        tracing::warn!(secs, default_secs, "Invalid duration in config, using default");
        Duration::from_secs_f64(default_secs)
    })
}

/// [chat] 段：可选生成参数，设置后随每个请求转发给后端
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_predict: Option<u32>,
}

impl ChatSection {
    pub fn to_options(&self) -> ChatOptions {
        ChatOptions {
            temperature: self.temperature,
            num_predict: self.num_predict,
        }
    }
}

/// [llm_providers.<name>] 段
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSection {
    pub enabled: bool,
    pub base_url: Option<String>,
    pub default_model: Option<String>,
    /// 单次调用超时（秒）
    pub timeout_seconds: u64,
    /// 云端后端：保存 API Key 的环境变量名
    pub api_key_env: Option<String>,
}

impl Default for ProviderSection {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: None,
            default_model: None,
            timeout_seconds: 30,
            api_key_env: None,
        }
    }
}

impl ProviderSection {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds.max(1))
    }
}

/// [[agents]] 项
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSection {
    pub id: String,
    pub name: String,
    pub provider: String,
    pub model: String,
    #[serde(default = "default_spawn_position")]
    pub spawn_position: [f64; 2],
    #[serde(default = "default_color_hex")]
    pub color_hex: String,
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// 保留的对话轮数
    #[serde(default = "default_max_history")]
    pub max_history: usize,
}

fn default_spawn_position() -> [f64; 2] {
    [640.0, 360.0]
}

fn default_color_hex() -> String {
    "#7DCFB6".to_string()
}

fn default_max_history() -> usize {
    10
}

fn default_providers() -> BTreeMap<String, ProviderSection> {
    let mut providers = BTreeMap::new();
    providers.insert(
        "ollama".to_string(),
        ProviderSection {
            enabled: true,
            base_url: Some("http://localhost:11434".to_string()),
            default_model: Some("llama3.2:3b".to_string()),
            timeout_seconds: 30,
            api_key_env: None,
        },
    );
    providers.insert(
        "gemini".to_string(),
        ProviderSection {
            default_model: Some("gemini-2.0-flash-exp".to_string()),
            api_key_env: Some("GEMINI_API_KEY".to_string()),
            ..ProviderSection::default()
        },
    );
    providers.insert(
        "claude".to_string(),
        ProviderSection {
            default_model: Some("claude-sonnet-4-5-20250929".to_string()),
            api_key_env: Some("ANTHROPIC_API_KEY".to_string()),
            ..ProviderSection::default()
        },
    );
    providers.insert(
        "mock".to_string(),
        ProviderSection {
            default_model: Some("echo".to_string()),
            ..ProviderSection::default()
        },
    );
    providers
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            window: WindowSection::default(),
            camera: CameraSection::default(),
            animation: AnimationConfig::default(),
            orchestrator: OrchestratorSection::default(),
            ui: UiSection::default(),
            chat: ChatSection::default(),
            llm_providers: default_providers(),
            agents: vec![AgentSection {
                id: "agent_001".to_string(),
                name: "Pixel".to_string(),
                provider: "ollama".to_string(),
                model: "llama3.2:3b".to_string(),
                spawn_position: default_spawn_position(),
                color_hex: default_color_hex(),
                system_prompt: Some(
                    "You are Pixel, a helpful assistant who lives in a virtual room. \
                     Keep responses concise and friendly (1-2 sentences)."
                        .to_string(),
                ),
                max_history: default_max_history(),
            }],
        }
    }
}

impl AppConfig {
    pub fn world_bounds(&self) -> WorldBounds {
        self.camera.bounds
    }

    /// 已启用的后端（按名称排序）
    pub fn enabled_providers(&self) -> impl Iterator<Item = (&str, &ProviderSection)> {
        self.llm_providers
            .iter()
            .filter(|(_, section)| section.enabled)
            .map(|(name, section)| (name.as_str(), section))
    }

    /// 启动期校验；任一项不合法即返回 Invalid
    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        let w = &self.window;
        if !(100..=7680).contains(&w.width) {
            return Err(invalid(format!("window width {} out of range 100..=7680", w.width)));
        }
        if !(100..=4320).contains(&w.height) {
            return Err(invalid(format!("window height {} out of range 100..=4320", w.height)));
        }
        if !(10..=240).contains(&w.fps_target) {
            return Err(invalid(format!("fps_target {} out of range 10..=240", w.fps_target)));
        }

        check_range("camera.pan_speed", self.camera.pan_speed, 0.0, MAX_WORLD_VALUE)?;
        let b = &self.camera.bounds;
        for (name, value) in [
            ("camera.bounds.min_x", b.min_x),
            ("camera.bounds.min_y", b.min_y),
            ("camera.bounds.max_x", b.max_x),
            ("camera.bounds.max_y", b.max_y),
        ] {
            check_range(name, value, -MAX_WORLD_VALUE, MAX_WORLD_VALUE)?;
        }

        let a = &self.animation;
        for (name, value) in [
            ("animation.move_speed", a.move_speed),
            ("animation.pace_distance", a.pace_distance),
            ("animation.wander_radius", a.wander_radius),
            ("animation.wander_margin", a.wander_margin),
            ("animation.bob_amplitude", a.bob_amplitude),
            ("animation.bob_speed", a.bob_speed),
            ("animation.shake_amplitude", a.shake_amplitude),
            ("animation.shake_rate", a.shake_rate),
            ("animation.agent_width", a.agent_width),
            ("animation.agent_height", a.agent_height),
        ] {
            check_range(name, value, 0.0, MAX_WORLD_VALUE)?;
        }
        for (name, value) in [
            ("animation.idle_wait_min", a.idle_wait_min),
            ("animation.idle_wait_max", a.idle_wait_max),
            ("animation.error_duration", a.error_duration),
            ("animation.talking_max_duration", a.talking_max_duration),
            ("ui.bubble_lifetime_secs", self.ui.bubble_lifetime_secs),
            ("orchestrator.stop_timeout_secs", self.orchestrator.stop_timeout_secs),
        ] {
            check_range(name, value, 0.0, MAX_SECONDS)?;
        }

        if let Some(t) = self.chat.temperature {
            check_range("chat.temperature", f64::from(t), 0.0, 2.0)?;
        }

        let margin = self.animation.wander_margin;
        if b.max_x - b.min_x <= 2.0 * margin || b.max_y - b.min_y <= 2.0 * margin {
            return Err(invalid(format!(
                "world bounds {b:?} too small for wander margin {margin}"
            )));
        }

        if a.idle_wait_min >= a.idle_wait_max {
            return Err(invalid(format!(
                "idle wait range [{}, {}) is empty",
                a.idle_wait_min, a.idle_wait_max
            )));
        }
        if a.move_speed <= 0.0 || a.error_duration <= 0.0 {
            return Err(invalid("move_speed and error_duration must be positive".to_string()));
        }

        if self.enabled_providers().next().is_none() {
            tracing::warn!("No LLM providers enabled - agents will not be able to chat");
        }

        if self.agents.is_empty() {
            return Err(invalid("must have at least one agent configured".to_string()));
        }
        let mut seen = HashSet::new();
        for agent in &self.agents {
            if !seen.insert(agent.id.as_str()) {
                return Err(invalid(format!("duplicate agent id: {}", agent.id)));
            }
            if !self.llm_providers.contains_key(&agent.provider) {
                return Err(invalid(format!(
                    "agent {} uses unknown provider: {}",
                    agent.id, agent.provider
                )));
            }
            if parse_hex_color(&agent.color_hex).is_none() {
                return Err(invalid(format!("invalid color hex: {}", agent.color_hex)));
            }
        }

        tracing::debug!("Config validation passed");
        Ok(())
    }
}

fn invalid(msg: String) -> ConfigLoadError {
    ConfigLoadError::Invalid(msg)
}

/// 数值必须有限且落在 [min, max] 内
fn check_range(name: &str, value: f64, min: f64, max: f64) -> Result<(), ConfigLoadError> {
    if value.is_finite() && (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(invalid(format!("{name} = {value} out of range {min}..={max}")))
    }
}

/// 解析 `#RRGGBB`
pub fn parse_hex_color(hex: &str) -> Option<(u8, u8, u8)> {
    let digits = hex.strip_prefix('#')?;
    if digits.len() != 6 || !digits.is_ascii() {
        return None;
    }
    let r = u8::from_str_radix(&digits[0..2], 16).ok()?;
    let g = u8::from_str_radix(&digits[2..4], 16).ok()?;
    let b = u8::from_str_radix(&digits[4..6], 16).ok()?;
    Some((r, g, b))
}

/// 把默认配置写到 path（父目录不存在时一并创建）
pub fn write_default_config(path: &Path) -> Result<(), ConfigLoadError> {
    let text = toml::to_string_pretty(&AppConfig::default())?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| ConfigLoadError::Write {
            path: path.to_path_buf(),
            source,
        })?;
    }
    std::fs::write(path, text).map_err(|source| ConfigLoadError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::info!(path = %path.display(), "Wrote default config");
    Ok(())
}

/// 加载并校验配置
///
/// 1. 以内置默认值为第一源
/// 2. 按顺序查找 config/default.toml、default.toml，找到则叠加
/// 3. 若传入 config_path：文件不存在时先写入默认配置，再叠加该文件
/// 4. 最后叠加环境变量 PIXELPROMPT__*
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, ConfigLoadError> {
    let mut builder =
        config::Config::builder().add_source(config::Config::try_from(&AppConfig::default())?);

    for name in ["config/default", "default"] {
        let path = format!("{}.toml", name);
        if Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(path) = config_path {
        if !path.exists() {
            tracing::info!(path = %path.display(), "Config file not found, creating default");
            write_default_config(&path)?;
        }
        builder = builder.add_source(config::File::from(path).required(true));
    }

    builder = builder.add_source(
        config::Environment::with_prefix("PIXELPROMPT")
            .separator("__")
            .try_parsing(true),
    );

    let cfg: AppConfig = builder.build()?.try_deserialize()?;
    cfg.validate()?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn test_parse_hex_color() {
        assert_eq!(parse_hex_color("#7DCFB6"), Some((0x7d, 0xcf, 0xb6)));
        assert_eq!(parse_hex_color("7DCFB6"), None);
        assert_eq!(parse_hex_color("#7DCFB"), None);
        assert_eq!(parse_hex_color("#GGGGGG"), None);
    }

    #[test]
    fn test_rejects_unknown_agent_provider() {
        let mut cfg = AppConfig::default();
        cfg.agents[0].provider = "nope".to_string();
        assert!(matches!(cfg.validate(), Err(ConfigLoadError::Invalid(msg)) if msg.contains("nope")));
    }

    #[test]
    fn test_rejects_duplicate_agent_ids() {
        let mut cfg = AppConfig::default();
        let dup = cfg.agents[0].clone();
        cfg.agents.push(dup);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_rejects_empty_agents() {
        let mut cfg = AppConfig::default();
        cfg.agents.clear();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_fps() {
        let mut cfg = AppConfig::default();
        cfg.window.fps_target = 500;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_enabled_providers_default_only_ollama() {
        let cfg = AppConfig::default();
        let names: Vec<&str> = cfg.enabled_providers().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["ollama"]);
    }

    #[test]
    fn test_rejects_non_finite_and_negative_numbers() {
        let mut cfg = AppConfig::default();
        cfg.animation.wander_radius = f64::INFINITY;
        assert!(matches!(cfg.validate(), Err(ConfigLoadError::Invalid(msg)) if msg.contains("wander_radius")));

        let mut cfg = AppConfig::default();
        cfg.animation.bob_speed = f64::NAN;
        assert!(cfg.validate().is_err());

        let mut cfg = AppConfig::default();
        cfg.animation.shake_amplitude = -1.0;
        assert!(cfg.validate().is_err());

        let mut cfg = AppConfig::default();
        cfg.ui.bubble_lifetime_secs = 1e20;
        assert!(matches!(cfg.validate(), Err(ConfigLoadError::Invalid(msg)) if msg.contains("bubble_lifetime_secs")));

        let mut cfg = AppConfig::default();
        cfg.camera.bounds.max_x = f64::INFINITY;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_durations_fall_back_on_bad_values() {
        let mut section = OrchestratorSection::default();
        section.stop_timeout_secs = f64::INFINITY;
        assert_eq!(section.stop_timeout(), Duration::from_secs(5));
        section.stop_timeout_secs = -3.0;
        assert_eq!(section.stop_timeout(), Duration::from_secs(5));

        let ui = UiSection {
            bubble_lifetime_secs: 1e20,
            ..UiSection::default()
        };
        assert_eq!(ui.bubble_lifetime(), Duration::from_secs(10));
    }

    #[test]
    fn test_orchestrator_options_conversion() {
        let section = OrchestratorSection {
            poll_interval_ms: 250,
            stop_timeout_secs: 1.5,
            max_chunks: 10,
            max_chars: 20,
        };
        let opts = section.to_options();
        assert_eq!(opts.poll_interval, Duration::from_millis(250));
        assert_eq!(opts.limits.max_chunks, 10);
        assert_eq!(section.stop_timeout(), Duration::from_millis(1500));
    }
}
