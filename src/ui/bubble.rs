//! 对话气泡：打字机逐字显示 + 定时消失
//!
//! `is_finished` 即 Agent 退出 Talking 的"说完了"信号。

use std::time::Duration;

use crate::config::UiSection;

/// 最多显示的行数，超出的部分以 "..." 结尾
pub const MAX_BUBBLE_LINES: usize = 5;

#[derive(Debug, Clone)]
pub struct SpeechBubble {
    text: String,
    is_error: bool,
    /// 已显示的字符数
    revealed: usize,
    total_chars: usize,
    reveal_timer: f64,
    char_delay: f64,
    age: f64,
    lifetime: f64,
}

impl SpeechBubble {
    pub fn new(text: impl Into<String>, is_error: bool, char_delay: Duration, lifetime: Duration) -> Self {
        let text = text.into();
        let total_chars = text.chars().count();
        Self {
            text,
            is_error,
            revealed: 0,
            total_chars,
            reveal_timer: 0.0,
            char_delay: char_delay.as_secs_f64(),
            age: 0.0,
            lifetime: lifetime.as_secs_f64(),
        }
    }

    pub fn from_config(text: impl Into<String>, is_error: bool, ui: &UiSection) -> Self {
        Self::new(
            text,
            is_error,
            Duration::from_millis(ui.typewriter_delay_ms),
            ui.bubble_lifetime(),
        )
    }

    pub fn update(&mut self, dt: f64) {
        if !dt.is_finite() || dt < 0.0 {
            return;
        }
        self.age += dt;
        if self.revealed >= self.total_chars {
            return;
        }
        if self.char_delay <= 0.0 {
            self.revealed = self.total_chars;
            return;
        }
        self.reveal_timer += dt;
        let step = (self.reveal_timer / self.char_delay) as usize;
        if step > 0 {
            self.revealed = (self.revealed + step).min(self.total_chars);
            self.reveal_timer -= step as f64 * self.char_delay;
        }
    }

    /// 当前应显示的前缀
    pub fn visible_text(&self) -> &str {
        match self.text.char_indices().nth(self.revealed) {
            Some((idx, _)) => &self.text[..idx],
            None => &self.text,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_error(&self) -> bool {
        self.is_error
    }

    pub fn is_fully_revealed(&self) -> bool {
        self.revealed >= self.total_chars
    }

    pub fn is_finished(&self) -> bool {
        self.age >= self.lifetime
    }

    /// 按字符宽度折行（按空格断词，过长的词硬切），最多 MAX_BUBBLE_LINES 行
    pub fn wrapped_lines(&self, width: usize) -> Vec<String> {
        wrap(self.visible_text(), width.max(1))
    }
}

fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        while word.len() > width {
            if current_len > 0 {
                lines.push(std::mem::take(&mut current));
                current_len = 0;
            }
            let rest = word.split_off(width);
            lines.push(word.into_iter().collect());
            word = rest;
        }
        let len = word.len();
        if len == 0 {
            continue;
        }
        let needed = if current_len == 0 { len } else { current_len + 1 + len };
        if needed > width {
            lines.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if current_len > 0 {
            current.push(' ');
            current_len += 1;
        }
        current.extend(word);
        current_len += len;
    }
    if current_len > 0 {
        lines.push(current);
    }

    if lines.len() > MAX_BUBBLE_LINES {
        lines.truncate(MAX_BUBBLE_LINES);
        if let Some(last) = lines.last_mut() {
            last.push_str("...");
        }
    }
    lines
}
