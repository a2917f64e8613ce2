//! TUI 应用主循环
//!
//! 进入全屏/原始模式，固定帧率循环：处理本帧内的输入事件 → engine.tick(dt) → 渲染。
//! 主循环从不等待推理结果；退出时恢复终端。

use std::io::{self, Stdout};
use std::time::{Duration, Instant};

use crossterm::{
    event::{DisableMouseCapture, EnableMouseCapture},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, layout::Rect, Terminal};

use crate::config::AppConfig;
use crate::core::Engine;
use crate::ui::event::{AppEvent, EventHandler};
use crate::ui::render::draw;

/// 单帧 dt 上限（秒），避免挂起后一次性推进过多
const MAX_FRAME_DT: f64 = 0.25;

/// 运行 TUI：启用原始模式与全屏，循环处理事件 + 推进 + 渲染，退出时恢复终端
pub fn run_app(engine: &mut Engine, config: &AppConfig) -> anyhow::Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = event_loop(&mut terminal, engine, config);
    restore_terminal(&mut terminal)?;
    result
}

fn event_loop(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    engine: &mut Engine,
    config: &AppConfig,
) -> anyhow::Result<()> {
    let frame = Duration::from_secs_f64(1.0 / f64::from(config.window.fps_target.max(1)));
    let events = EventHandler::new();
    let mut input_buffer = String::new();
    let mut world = Rect::default();
    let mut last_tick = Instant::now();

    tracing::info!(fps = config.window.fps_target, "Entering main loop");

    loop {
        let deadline = last_tick + frame;
        // 本帧剩余时间内尽量多地处理事件
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let Some(ev) = events.poll(remaining)? else {
                break;
            };
            match ev {
                AppEvent::Quit => {
                    tracing::info!("Quit requested");
                    return Ok(());
                }
                AppEvent::SelectNext => engine.select_next(),
                AppEvent::Submit => {
                    let text = std::mem::take(&mut input_buffer);
                    engine.submit_to_selected(&text);
                }
                AppEvent::Backspace => {
                    input_buffer.pop();
                }
                AppEvent::Input(c) => input_buffer.push(c),
                AppEvent::Pan { dx, dy } => engine.camera_mut().pan(dx, dy),
                AppEvent::Click { col, row } => {
                    if col >= world.x && row >= world.y {
                        engine.select_at(col - world.x, row - world.y);
                    }
                }
                AppEvent::Resize { .. } => {}
            }
            if remaining.is_zero() {
                break;
            }
        }

        let now = Instant::now();
        let dt = now.duration_since(last_tick).as_secs_f64().min(MAX_FRAME_DT);
        last_tick = now;
        engine.tick(dt);

        terminal.draw(|f| {
            world = draw(f, engine, &input_buffer);
        })?;
        engine.camera_mut().set_viewport_cells(world.width, world.height);
    }
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> anyhow::Result<()> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    Ok(())
}
