//! 界面渲染
//!
//! 上方为世界视图（地砖网格、Agent、名字与气泡），下方为输入框与快捷键提示。
//! 世界坐标经 Camera 映射到单元格；返回世界视图内区，供主循环更新视口与换算鼠标坐标。

use ratatui::{
    buffer::Buffer,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
    Frame,
};

use crate::agent::{Agent, StateKind, Vec2};
use crate::config::parse_hex_color;
use crate::core::Engine;
use crate::ui::bubble::SpeechBubble;
use crate::ui::camera::{CELL_HEIGHT, CELL_WIDTH};

/// 地砖边长（世界单位）
const TILE_SIZE: f64 = 64.0;

/// 绘制一帧，返回世界视图内区
pub fn draw(f: &mut Frame, engine: &Engine, input_buffer: &str) -> Rect {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(5), Constraint::Length(3)])
        .split(f.area());

    let title = match engine.selected_agent() {
        Some(agent) => format!(" PixelPrompt │ {} · {} ", agent.name(), state_label(agent.state_kind())),
        None => " PixelPrompt ".to_string(),
    };
    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow));
    let world = block.inner(chunks[0]);
    f.render_widget(block, chunks[0]);

    draw_tiles(f.buffer_mut(), world, engine);
    for agent in engine.agents() {
        let selected = engine.selected_agent().map(|a| a.id()) == Some(agent.id());
        draw_agent(f.buffer_mut(), world, engine, agent, selected);
    }
    for agent in engine.agents() {
        if let Some(bubble) = engine.bubble(agent.id()) {
            draw_bubble(f, world, engine, agent, bubble);
        }
    }

    draw_input(f, chunks[1], engine, input_buffer);
    world
}

fn state_label(kind: StateKind) -> &'static str {
    match kind {
        StateKind::Idle => "空闲",
        StateKind::Thinking => "思考中…",
        StateKind::Talking => "说话中",
        StateKind::Error => "错误",
    }
}

fn agent_color(agent: &Agent) -> Color {
    parse_hex_color(agent.color_hex())
        .map(|(r, g, b)| Color::Rgb(r, g, b))
        .unwrap_or(Color::Cyan)
}

/// 地砖角点画成暗点，世界边界外留空
fn draw_tiles(buf: &mut Buffer, area: Rect, engine: &Engine) {
    let offset = engine.camera().offset();
    let bounds = engine.camera().bounds();
    let style = Style::default().fg(Color::DarkGray);
    for row in 0..area.height {
        for col in 0..area.width {
            let wx = offset.x + f64::from(col) * CELL_WIDTH;
            let wy = offset.y + f64::from(row) * CELL_HEIGHT;
            if !bounds.contains(Vec2::new(wx, wy), 0.0) {
                continue;
            }
            if wx.rem_euclid(TILE_SIZE) < CELL_WIDTH && wy.rem_euclid(TILE_SIZE) < CELL_HEIGHT {
                buf.set_string(area.x + col, area.y + row, "·", style);
            }
        }
    }
}

fn draw_agent(buf: &mut Buffer, area: Rect, engine: &Engine, agent: &Agent, selected: bool) {
    let Some((col, row)) = engine.camera().world_to_cell(agent.position()) else {
        return;
    };
    let (col, row) = (col.min(area.width.saturating_sub(1)), row.min(area.height.saturating_sub(1)));
    let color = agent_color(agent);
    let glyph = match agent.state_kind() {
        StateKind::Idle => "☺",
        StateKind::Thinking => "?",
        StateKind::Talking => "♪",
        StateKind::Error => "✗",
    };
    let body_style = match agent.state_kind() {
        StateKind::Error => Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        _ => Style::default().fg(color).add_modifier(Modifier::BOLD),
    };
    buf.set_string(area.x + col, area.y + row, glyph, body_style);

    if row > 0 {
        let mut name_style = Style::default().fg(color);
        if selected {
            name_style = name_style.add_modifier(Modifier::REVERSED);
        }
        let name = agent.name();
        let half = (name.chars().count() / 2) as u16;
        let x = col.saturating_sub(half);
        let max_len = area.width.saturating_sub(x) as usize;
        let label: String = name.chars().take(max_len).collect();
        buf.set_string(area.x + x, area.y + row - 1, label, name_style);
    }
}

fn draw_bubble(f: &mut Frame, area: Rect, engine: &Engine, agent: &Agent, bubble: &SpeechBubble) {
    let Some((col, row)) = engine.camera().world_to_cell(agent.position()) else {
        return;
    };
    let max_cells = (f64::from(engine.ui().bubble_max_width) / CELL_WIDTH) as u16;
    let inner_width = max_cells.saturating_sub(2).clamp(8, area.width.saturating_sub(2).max(8));
    let lines = bubble.wrapped_lines(inner_width as usize);
    if lines.is_empty() {
        return;
    }

    let text_width = lines.iter().map(|l| l.chars().count()).max().unwrap_or(0) as u16;
    let width = (text_width + 2).min(area.width);
    let height = (lines.len() as u16 + 2).min(area.height);
    // 气泡底边位于名字上方一行
    let top = row.saturating_sub(height + 1);
    let left = col
        .saturating_sub(width / 2)
        .min(area.width.saturating_sub(width));
    let rect = Rect::new(area.x + left, area.y + top, width, height);

    let (fg, border) = if bubble.is_error() {
        (Color::White, Color::Red)
    } else {
        (Color::Black, Color::White)
    };
    let bg = if bubble.is_error() { Color::Red } else { Color::White };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border).bg(bg));
    let text: Vec<Line> = lines.into_iter().map(|l| Line::from(Span::raw(l))).collect();
    let paragraph = Paragraph::new(text)
        .block(block)
        .style(Style::default().fg(fg).bg(bg));
    f.render_widget(Clear, rect);
    f.render_widget(paragraph, rect);
}

fn draw_input(f: &mut Frame, area: Rect, engine: &Engine, input_buffer: &str) {
    let target = engine
        .selected_agent()
        .map(|a| format!(" 发给 {} ", a.name()))
        .unwrap_or_else(|| " 未选中 Agent ".to_string());
    let hint = " Enter 发送 │ Tab 切换 │ 方向键 平移 │ 点击 选中 │ Esc 退出 ";
    let block = Block::default()
        .title(target)
        .title_bottom(Line::from(Span::styled(hint, Style::default().fg(Color::DarkGray))))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Blue));
    let input = Paragraph::new(format!("{input_buffer}▏")).block(block);
    f.render_widget(input, area);
}
