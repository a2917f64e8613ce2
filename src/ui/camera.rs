//! 相机：世界坐标 ↔ 终端单元格，方向键平移并限制在世界边界内

use crate::agent::{Vec2, WorldBounds};
use crate::config::CameraSection;

/// 一个终端单元格对应的世界宽度
pub const CELL_WIDTH: f64 = 8.0;
/// 一个终端单元格对应的世界高度（字符约为 1:2）
pub const CELL_HEIGHT: f64 = 16.0;
/// 每次按键相当于按住方向键的帧数
const PAN_FRAMES_PER_PRESS: f64 = 8.0;

#[derive(Debug, Clone)]
pub struct Camera {
    offset: Vec2,
    pan_speed: f64,
    bounds: WorldBounds,
    /// 视口大小（世界单位）
    viewport: Vec2,
}

impl Camera {
    pub fn new(section: &CameraSection) -> Self {
        Self {
            offset: Vec2::new(section.bounds.min_x, section.bounds.min_y),
            pan_speed: section.pan_speed,
            bounds: section.bounds,
            viewport: Vec2::ZERO,
        }
    }

    pub fn offset(&self) -> Vec2 {
        self.offset
    }

    pub fn bounds(&self) -> WorldBounds {
        self.bounds
    }

    /// 终端尺寸变化时更新视口并重新限制偏移
    pub fn set_viewport_cells(&mut self, cols: u16, rows: u16) {
        self.viewport = Vec2::new(f64::from(cols) * CELL_WIDTH, f64::from(rows) * CELL_HEIGHT);
        self.clamp();
    }

    /// 按方向平移一次按键的距离
    pub fn pan(&mut self, dx: f64, dy: f64) {
        let step = self.pan_speed * PAN_FRAMES_PER_PRESS;
        self.offset.x += dx * step;
        self.offset.y += dy * step;
        self.clamp();
    }

    /// 居中到某个世界坐标
    pub fn center_on(&mut self, point: Vec2) {
        self.offset = point - self.viewport * 0.5;
        self.clamp();
    }

    /// 世界坐标 → 视口内单元格；不在视口内返回 None
    pub fn world_to_cell(&self, point: Vec2) -> Option<(u16, u16)> {
        let rel = point - self.offset;
        if rel.x < 0.0 || rel.y < 0.0 || rel.x >= self.viewport.x || rel.y >= self.viewport.y {
            return None;
        }
        Some(((rel.x / CELL_WIDTH) as u16, (rel.y / CELL_HEIGHT) as u16))
    }

    /// 单元格（相对视口）→ 屏幕坐标（世界单位，取单元格中心）
    pub fn cell_to_screen(col: u16, row: u16) -> Vec2 {
        Vec2::new(
            (f64::from(col) + 0.5) * CELL_WIDTH,
            (f64::from(row) + 0.5) * CELL_HEIGHT,
        )
    }

    fn clamp(&mut self) {
        let max_x = (self.bounds.max_x - self.viewport.x).max(self.bounds.min_x);
        let max_y = (self.bounds.max_y - self.viewport.y).max(self.bounds.min_y);
        self.offset.x = self.offset.x.clamp(self.bounds.min_x, max_x);
        self.offset.y = self.offset.y.clamp(self.bounds.min_y, max_y);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera() -> Camera {
        let mut c = Camera::new(&CameraSection::default());
        c.set_viewport_cells(100, 40);
        c
    }

    #[test]
    fn test_pan_clamped_to_bounds() {
        let mut c = camera();
        c.pan(-1.0, -1.0);
        assert_eq!(c.offset(), Vec2::new(0.0, 0.0));
        for _ in 0..1000 {
            c.pan(1.0, 1.0);
        }
        assert_eq!(c.offset(), Vec2::new(2000.0 - 800.0, 2000.0 - 640.0));
    }

    #[test]
    fn test_viewport_larger_than_world() {
        let mut c = Camera::new(&CameraSection::default());
        c.set_viewport_cells(1000, 1000);
        c.pan(1.0, 1.0);
        assert_eq!(c.offset(), Vec2::new(0.0, 0.0));
    }

    #[test]
    fn test_world_to_cell() {
        let mut c = camera();
        c.pan(1.0, 0.0);
        let step = 5.0 * PAN_FRAMES_PER_PRESS;
        assert_eq!(c.world_to_cell(Vec2::new(step + 17.0, 33.0)), Some((2, 2)));
        assert_eq!(c.world_to_cell(Vec2::new(0.0, 0.0)), None);
    }
}
