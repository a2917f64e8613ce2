//! TUI 层：Ratatui + crossterm，主循环（app）、事件（event）、渲染（render）、气泡与相机

pub mod app;
pub mod bubble;
pub mod camera;
pub mod event;
pub mod render;

pub use app::run_app;
pub use bubble::SpeechBubble;
pub use camera::Camera;
pub use event::{AppEvent, EventHandler};
pub use render::draw;
