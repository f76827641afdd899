use crate::game::{HudInfo, RenderView};
use macroquad::prelude::*;
use shared::{EntityId, Level, PhysicsConfig, Rect};

/// Draws world coordinates 1:1; the window is sized to the level.
pub struct Renderer {
    body_width: f32,
    body_height: f32,
}

impl Renderer {
    pub fn new(physics: &PhysicsConfig) -> Self {
        Renderer {
            body_width: physics.body_width,
            body_height: physics.body_height,
        }
    }

    pub fn render(&self, view: &RenderView, level: &Level) {
        clear_background(Color::from_rgba(26, 26, 26, 255));

        self.draw_level(level);

        for (id, x, y) in &view.remotes {
            self.draw_entity(*x, *y, Color::from_rgba(255, 68, 68, 255));
            self.draw_entity_id(*id, *x, *y);
        }

        if let (Some(local), Some(id)) = (view.local, view.hud.client_id) {
            self.draw_entity(local.x, local.y, GREEN);
            self.draw_velocity_vector(local.x, local.y, local.vx, local.vy);
            self.draw_entity_id(id, local.x, local.y);
        }

        self.draw_hud(&view.hud);
    }

    fn draw_level(&self, level: &Level) {
        let draw = |rect: &Rect, color: Color| {
            draw_rectangle(rect.x, rect.y, rect.width, rect.height, color);
        };

        draw(&level.ground, Color::from_rgba(68, 68, 68, 255));
        for platform in &level.platforms {
            draw(platform, Color::from_rgba(96, 96, 110, 255));
        }
    }

    /// Positions are body centers.
    fn draw_entity(&self, x: f32, y: f32, color: Color) {
        let left = x - self.body_width / 2.0;
        let top = y - self.body_height / 2.0;
        draw_rectangle(left, top, self.body_width, self.body_height, color);
        draw_rectangle_lines(left, top, self.body_width, self.body_height, 2.0, WHITE);
    }

    fn draw_velocity_vector(&self, x: f32, y: f32, vx: f32, vy: f32) {
        // Velocities are per millisecond; show roughly 100 ms of travel
        let end_x = x + vx * 100.0;
        let end_y = y + vy * 100.0;
        if vx.abs() > 0.01 || vy.abs() > 0.01 {
            draw_line(x, y, end_x, end_y, 2.0, YELLOW);
        }
    }

    fn draw_entity_id(&self, id: EntityId, x: f32, y: f32) {
        let label = id.to_string();
        draw_text(
            &label,
            x - 4.0,
            y - self.body_height / 2.0 - 6.0,
            16.0,
            WHITE,
        );
    }

    fn draw_hud(&self, hud: &HudInfo) {
        let y_start = 10.0;
        let indicator_size = 12.0;
        let spacing = 25.0;

        let features = [
            ("P", hud.toggles.prediction),
            ("R", hud.toggles.reconciliation),
            ("I", hud.toggles.interpolation),
        ];

        for (i, (label, enabled)) in features.iter().enumerate() {
            let x = 10.0 + (i as f32) * spacing;
            let color = if *enabled { GREEN } else { RED };

            draw_rectangle(x, y_start, indicator_size, indicator_size, color);
            draw_rectangle_lines(x, y_start, indicator_size, indicator_size, 1.0, WHITE);
            draw_text(label, x + 3.0, y_start + indicator_size + 12.0, 12.0, WHITE);
        }

        let connection_color = if hud.connected { GREEN } else { RED };
        draw_rectangle(10.0, y_start + 35.0, 8.0, 8.0, connection_color);

        let status = match hud.client_id {
            Some(id) => format!("client {} in '{}'", id, hud.room),
            None => format!("connecting to '{}'", hud.room),
        };
        draw_text(&status, 24.0, y_start + 43.0, 14.0, WHITE);

        let lines = [
            format!("tick {}", hud.tick),
            format!(
                "rtt {:.0}ms  offset {}",
                hud.clock.rtt_estimate_ms, hud.clock.tick_offset
            ),
            format!(
                "pending {}  dropped {}",
                hud.pending_commands, hud.dropped_commands
            ),
            format!("{} remote players", hud.remote_count),
        ];
        for (i, line) in lines.iter().enumerate() {
            draw_text(line, 10.0, y_start + 62.0 + i as f32 * 16.0, 14.0, WHITE);
        }
    }
}
