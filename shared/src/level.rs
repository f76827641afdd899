//! Static level geometry shared by both peers

use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle. `x`/`y` is the top-left corner; y grows downward.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Builds a rectangle from its center and half extents.
    pub fn centered(cx: f32, cy: f32, half_width: f32, half_height: f32) -> Self {
        Self::new(
            cx - half_width,
            cy - half_height,
            half_width * 2.0,
            half_height * 2.0,
        )
    }

    pub fn left(&self) -> f32 {
        self.x
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn top(&self) -> f32 {
        self.y
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Strict overlap test; rectangles that only touch do not intersect.
    pub fn intersects(&self, other: &Rect) -> bool {
        !(self.right() <= other.left()
            || other.right() <= self.left()
            || self.bottom() <= other.top()
            || other.bottom() <= self.top())
    }

    /// Segment/box intersection using the slab method.
    pub fn intersects_segment(&self, from: (f32, f32), to: (f32, f32)) -> bool {
        let mut t_min: f32 = 0.0;
        let mut t_max: f32 = 1.0;

        let axes = [
            (from.0, to.0 - from.0, self.left(), self.right()),
            (from.1, to.1 - from.1, self.top(), self.bottom()),
        ];

        for (origin, delta, low, high) in axes {
            if delta.abs() < f32::EPSILON {
                if origin < low || origin > high {
                    return false;
                }
                continue;
            }

            let mut t0 = (low - origin) / delta;
            let mut t1 = (high - origin) / delta;
            if t0 > t1 {
                std::mem::swap(&mut t0, &mut t1);
            }
            t_min = t_min.max(t0);
            t_max = t_max.min(t1);
            if t_min > t_max {
                return false;
            }
        }

        true
    }
}

/// The static world: extent, ground and platforms.
///
/// Must be identical on every peer; it is configuration, not replicated state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Level {
    pub width: f32,
    pub height: f32,
    pub ground: Rect,
    pub platforms: Vec<Rect>,
}

impl Level {
    /// Iterates ground first, then platforms.
    pub fn solids(&self) -> impl Iterator<Item = &Rect> {
        std::iter::once(&self.ground).chain(self.platforms.iter())
    }
}

impl Default for Level {
    fn default() -> Self {
        Self {
            width: 800.0,
            height: 600.0,
            ground: Rect::new(0.0, 516.0, 800.0, 84.0),
            platforms: vec![
                Rect::new(180.0, 450.0, 120.0, 16.0),
                Rect::new(380.0, 390.0, 120.0, 16.0),
                Rect::new(580.0, 330.0, 120.0, 16.0),
            ],
        }
    }
}
