//! Keyboard sampling: movement flags plus netcode toggle keys

use crate::game::InputSample;
use macroquad::prelude::*;

/// Rising-edge detector for a key polled once per frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyEdge {
    was_down: bool,
}

impl KeyEdge {
    /// Returns true only on the frame the key goes down.
    pub fn pressed(&mut self, down: bool) -> bool {
        let pressed = down && !self.was_down;
        self.was_down = down;
        pressed
    }
}

/// Toggle requests raised this frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ControlEvents {
    pub toggle_prediction: bool,
    pub toggle_reconciliation: bool,
    pub toggle_interpolation: bool,
    pub reconnect: bool,
    pub quit: bool,
}

#[derive(Debug, Default)]
pub struct InputManager {
    key_1: KeyEdge,
    key_2: KeyEdge,
    key_3: KeyEdge,
    key_r: KeyEdge,
}

impl InputManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Samples the keyboard (WASD or arrows, Space to jump).
    pub fn update(&mut self) -> (InputSample, ControlEvents) {
        let sample = InputSample {
            left: is_key_down(KeyCode::A) || is_key_down(KeyCode::Left),
            right: is_key_down(KeyCode::D) || is_key_down(KeyCode::Right),
            jump: is_key_down(KeyCode::Space)
                || is_key_down(KeyCode::W)
                || is_key_down(KeyCode::Up),
        };

        let events = ControlEvents {
            toggle_prediction: self.key_1.pressed(is_key_down(KeyCode::Key1)),
            toggle_reconciliation: self.key_2.pressed(is_key_down(KeyCode::Key2)),
            toggle_interpolation: self.key_3.pressed(is_key_down(KeyCode::Key3)),
            reconnect: self.key_r.pressed(is_key_down(KeyCode::R)),
            quit: is_key_down(KeyCode::Escape),
        };

        (sample, events)
    }
}
