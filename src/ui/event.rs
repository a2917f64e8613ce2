//! 事件处理
//!
//! 轮询 crossterm 键盘/鼠标事件并映射为 AppEvent：Esc / Ctrl+C 退出，Tab 切换 Agent，
//! Enter 发送，方向键平移相机，鼠标左键选中 Agent，其余字符进入输入框。

use std::time::Duration;

use crossterm::event::{
    self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseButton, MouseEventKind,
};

/// 应用事件
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    Quit,
    SelectNext,
    Submit,
    Backspace,
    Input(char),
    /// 相机平移方向
    Pan { dx: f64, dy: f64 },
    /// 鼠标左键点击的终端单元格
    Click { col: u16, row: u16 },
    Resize { cols: u16, rows: u16 },
}

/// 事件处理器：poll 时最多等待 timeout，把原始事件映射为 AppEvent
#[derive(Debug, Default)]
pub struct EventHandler;

impl EventHandler {
    pub fn new() -> Self {
        Self
    }

    pub fn poll(&self, timeout: Duration) -> anyhow::Result<Option<AppEvent>> {
        if event::poll(timeout)? {
            return Ok(map_event(event::read()?));
        }
        Ok(None)
    }
}

pub fn map_event(ev: Event) -> Option<AppEvent> {
    match ev {
        Event::Key(key) if key.kind == KeyEventKind::Press => map_key(key),
        Event::Mouse(mouse) => match mouse.kind {
            MouseEventKind::Down(MouseButton::Left) => Some(AppEvent::Click {
                col: mouse.column,
                row: mouse.row,
            }),
            _ => None,
        },
        Event::Resize(cols, rows) => Some(AppEvent::Resize { cols, rows }),
        _ => None,
    }
}

fn map_key(key: KeyEvent) -> Option<AppEvent> {
    let ev = match key.code {
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => AppEvent::Quit,
        KeyCode::Esc => AppEvent::Quit,
        KeyCode::Tab => AppEvent::SelectNext,
        KeyCode::Enter => AppEvent::Submit,
        KeyCode::Backspace => AppEvent::Backspace,
        KeyCode::Left => AppEvent::Pan { dx: -1.0, dy: 0.0 },
        KeyCode::Right => AppEvent::Pan { dx: 1.0, dy: 0.0 },
        KeyCode::Up => AppEvent::Pan { dx: 0.0, dy: -1.0 },
        KeyCode::Down => AppEvent::Pan { dx: 0.0, dy: 1.0 },
        KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => AppEvent::Input(c),
        _ => return None,
    };
    Some(ev)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::{MouseEvent, KeyEventState};

    fn key(code: KeyCode, modifiers: KeyModifiers) -> Event {
        Event::Key(KeyEvent {
            code,
            modifiers,
            kind: KeyEventKind::Press,
            state: KeyEventState::NONE,
        })
    }

    #[test]
    fn test_quit_keys() {
        assert_eq!(map_event(key(KeyCode::Esc, KeyModifiers::NONE)), Some(AppEvent::Quit));
        assert_eq!(
            map_event(key(KeyCode::Char('c'), KeyModifiers::CONTROL)),
            Some(AppEvent::Quit)
        );
    }

    #[test]
    fn test_text_and_navigation_keys() {
        assert_eq!(map_event(key(KeyCode::Char('c'), KeyModifiers::NONE)), Some(AppEvent::Input('c')));
        assert_eq!(map_event(key(KeyCode::Tab, KeyModifiers::NONE)), Some(AppEvent::SelectNext));
        assert_eq!(
            map_event(key(KeyCode::Left, KeyModifiers::NONE)),
            Some(AppEvent::Pan { dx: -1.0, dy: 0.0 })
        );
        assert_eq!(map_event(key(KeyCode::F(5), KeyModifiers::NONE)), None);
    }

    #[test]
    fn test_left_click() {
        let ev = Event::Mouse(MouseEvent {
            kind: MouseEventKind::Down(MouseButton::Left),
            column: 12,
            row: 3,
            modifiers: KeyModifiers::NONE,
        });
        assert_eq!(map_event(ev), Some(AppEvent::Click { col: 12, row: 3 }));
    }
}
