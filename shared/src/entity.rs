//! Replicated per-player state

use serde::{Deserialize, Serialize};

/// Connection identifier assigned by the server, doubling as the entity key.
pub type EntityId = u32;

/// The state of one connected player as produced by a simulation step.
///
/// `tick` is the step at which the entity was last integrated.
/// `last_processed_tick` is the reconciliation watermark: the highest input
/// tick the authority has consumed for this entity. It never decreases.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub grounded: bool,
    pub tick: u32,
    pub last_processed_tick: u32,
}

impl EntityState {
    /// Creates an entity at rest at the given position.
    pub fn spawned(x: f32, y: f32, tick: u32) -> Self {
        Self {
            x,
            y,
            vx: 0.0,
            vy: 0.0,
            grounded: false,
            tick,
            last_processed_tick: 0,
        }
    }

    /// Euclidean distance between the positions of two states.
    pub fn distance_to(&self, other: &EntityState) -> f32 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Moves position and velocity toward `target` by `factor` (0 keeps
    /// `self`, 1 snaps to `target`).
    pub fn blend_toward(&self, target: &EntityState, factor: f32) -> EntityState {
        EntityState {
            x: lerp(self.x, target.x, factor),
            y: lerp(self.y, target.y, factor),
            vx: lerp(self.vx, target.vx, factor),
            vy: lerp(self.vy, target.vy, factor),
            grounded: target.grounded,
            tick: self.tick,
            last_processed_tick: target.last_processed_tick,
        }
    }
}

/// Linear interpolation: `a + t * (b - a)`.
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + t * (b - a)
}
