//! Physics adapter contract and a deterministic arcade implementation
//!
//! The step function never touches body internals directly. It talks to a
//! `PhysicsWorld` through a fixed set of calls so that the authoritative and
//! predictive loops drive identical integrations from identical inputs.

use crate::entity::EntityId;
use crate::level::{Level, Rect};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Tunable constants for bodies and movement.
///
/// Units: world units, milliseconds. Velocities are units per millisecond.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    /// Downward acceleration in units/ms²
    pub gravity: f32,
    /// Horizontal speed set by left/right input
    pub move_speed: f32,
    /// Upward impulse applied on jump; the velocity change is impulse / mass
    pub jump_impulse: f32,
    pub body_mass: f32,
    pub body_width: f32,
    pub body_height: f32,
    /// Length of the downward ray used for grounded checks
    pub ground_ray: f32,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: 0.00098,
            move_speed: 0.3,
            jump_impulse: 0.15,
            body_mass: 0.375,
            body_width: 32.0,
            body_height: 32.0,
            ground_ray: 1.0,
        }
    }
}

/// Kinematic state of one body. Position is the body's center.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BodyState {
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
}

/// Operations the simulation requires from a physics engine.
pub trait PhysicsWorld {
    fn add_body(&mut self, id: EntityId, x: f32, y: f32);

    fn remove_body(&mut self, id: EntityId) -> bool;

    fn body(&self, id: EntityId) -> Option<BodyState>;

    /// Overwrites position and velocity (used when correcting prediction).
    fn set_body(&mut self, id: EntityId, state: BodyState);

    fn set_velocity_x(&mut self, id: EntityId, vx: f32);

    fn apply_impulse(&mut self, id: EntityId, ix: f32, iy: f32);

    /// Advances every body by `dt_ms`.
    fn integrate(&mut self, dt_ms: f32);

    /// Returns true if the segment hits static geometry.
    fn ray_test(&self, from: (f32, f32), to: (f32, f32)) -> bool;

    /// Half extents of the bodies this world creates.
    fn body_half_extents(&self) -> (f32, f32);
}

/// Gravity plus AABB resolution against the level's static rectangles.
///
/// Bodies only collide with static geometry, never with each other. Bodies
/// are stored in a `BTreeMap` so integration order is stable across peers.
#[derive(Debug, Clone)]
pub struct ArcadeWorld {
    config: PhysicsConfig,
    level: Level,
    bodies: BTreeMap<EntityId, BodyState>,
}

impl ArcadeWorld {
    pub fn new(config: PhysicsConfig, level: Level) -> Self {
        Self {
            config,
            level,
            bodies: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> &PhysicsConfig {
        &self.config
    }

    pub fn level(&self) -> &Level {
        &self.level
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    fn half_extents(config: &PhysicsConfig) -> (f32, f32) {
        (config.body_width / 2.0, config.body_height / 2.0)
    }

    /// Pushes the body out of every overlapping solid along the axis of
    /// shallowest penetration and kills velocity on that axis.
    fn resolve_static_collisions(body: &mut BodyState, half: (f32, f32), solids: &[Rect]) {
        for solid in solids {
            let bounds = Rect::centered(body.x, body.y, half.0, half.1);
            if !bounds.intersects(solid) {
                continue;
            }

            let overlap_x = bounds.right().min(solid.right()) - bounds.left().max(solid.left());
            let overlap_y = bounds.bottom().min(solid.bottom()) - bounds.top().max(solid.top());
            let (solid_cx, solid_cy) = solid.center();

            if overlap_x < overlap_y {
                if body.x < solid_cx {
                    body.x = solid.left() - half.0;
                } else {
                    body.x = solid.right() + half.0;
                }
                body.vx = 0.0;
            } else {
                if body.y < solid_cy {
                    body.y = solid.top() - half.1;
                } else {
                    body.y = solid.bottom() + half.1;
                }
                body.vy = 0.0;
            }
        }
    }
}

impl PhysicsWorld for ArcadeWorld {
    fn add_body(&mut self, id: EntityId, x: f32, y: f32) {
        self.bodies.insert(
            id,
            BodyState {
                x,
                y,
                vx: 0.0,
                vy: 0.0,
            },
        );
    }

    fn remove_body(&mut self, id: EntityId) -> bool {
        self.bodies.remove(&id).is_some()
    }

    fn body(&self, id: EntityId) -> Option<BodyState> {
        self.bodies.get(&id).copied()
    }

    fn set_body(&mut self, id: EntityId, state: BodyState) {
        if let Some(body) = self.bodies.get_mut(&id) {
            *body = state;
        }
    }

    fn set_velocity_x(&mut self, id: EntityId, vx: f32) {
        if let Some(body) = self.bodies.get_mut(&id) {
            body.vx = vx;
        }
    }

    fn apply_impulse(&mut self, id: EntityId, ix: f32, iy: f32) {
        let mass = self.config.body_mass;
        if let Some(body) = self.bodies.get_mut(&id) {
            body.vx += ix / mass;
            body.vy += iy / mass;
        }
    }

    fn integrate(&mut self, dt_ms: f32) {
        let half = Self::half_extents(&self.config);
        let solids: Vec<Rect> = self.level.solids().copied().collect();
        let min_x = half.0;
        let max_x = self.level.width - half.0;

        for body in self.bodies.values_mut() {
            body.vy += self.config.gravity * dt_ms;
            body.x += body.vx * dt_ms;
            body.y += body.vy * dt_ms;

            Self::resolve_static_collisions(body, half, &solids);

            if body.x < min_x {
                body.x = min_x;
                body.vx = 0.0;
            } else if body.x > max_x {
                body.x = max_x;
                body.vx = 0.0;
            }
        }
    }

    fn ray_test(&self, from: (f32, f32), to: (f32, f32)) -> bool {
        self.level
            .solids()
            .any(|solid| solid.intersects_segment(from, to))
    }

    fn body_half_extents(&self) -> (f32, f32) {
        Self::half_extents(&self.config)
    }
}
