//! 世界坐标几何：连续二维向量与世界边界

use std::ops::{Add, AddAssign, Mul, Sub};

use serde::{Deserialize, Serialize};

/// 小于该长度的向量视为零向量，不做归一化
pub const NORMALIZE_EPSILON: f64 = 1e-9;

/// 连续二维坐标（世界像素单位）
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn length(&self) -> f64 {
        self.x.hypot(self.y)
    }

    pub fn distance_to(&self, other: Vec2) -> f64 {
        (other - *self).length()
    }

    /// 单位向量；长度为零（或非有限）时返回 None
    pub fn normalized(&self) -> Option<Vec2> {
        let len = self.length();
        if !len.is_finite() || len <= NORMALIZE_EPSILON {
            return None;
        }
        Some(Vec2::new(self.x / len, self.y / len))
    }
}

impl Add for Vec2 {
    type Output = Vec2;

    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl AddAssign for Vec2 {
    fn add_assign(&mut self, rhs: Vec2) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl Sub for Vec2 {
    type Output = Vec2;

    fn sub(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f64> for Vec2 {
    type Output = Vec2;

    fn mul(self, rhs: f64) -> Vec2 {
        Vec2::new(self.x * rhs, self.y * rhs)
    }
}

/// 世界边界（对应配置 [camera.bounds]）
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorldBounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Default for WorldBounds {
    fn default() -> Self {
        Self {
            min_x: 0.0,
            min_y: 0.0,
            max_x: 2000.0,
            max_y: 2000.0,
        }
    }
}

impl WorldBounds {
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// 把点限制在边界内，四周留出 margin；边界比 2*margin 还窄时落在中线上
    pub fn clamp(&self, point: Vec2, margin: f64) -> Vec2 {
        Vec2::new(
            clamp_axis(point.x, self.min_x + margin, self.max_x - margin),
            clamp_axis(point.y, self.min_y + margin, self.max_y - margin),
        )
    }

    pub fn contains(&self, point: Vec2, margin: f64) -> bool {
        point.x >= self.min_x + margin
            && point.x <= self.max_x - margin
            && point.y >= self.min_y + margin
            && point.y <= self.max_y - margin
    }
}

fn clamp_axis(value: f64, lo: f64, hi: f64) -> f64 {
    if lo > hi {
        return (lo + hi) / 2.0;
    }
    if value.is_nan() {
        return lo;
    }
    value.max(lo).min(hi)
}
