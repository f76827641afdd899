//! Game configuration shared out-of-band by every peer
//!
//! All tuning constants live here so they can be changed without touching the
//! netcode itself. Peers must load identical configurations; nothing in the
//! protocol checks this.

use crate::error::{NetcodeError, Result};
use crate::input::QueueBounds;
use crate::level::Level;
use crate::physics::PhysicsConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Where new entities appear.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpawnPoint {
    pub x: f32,
    pub y: f32,
}

impl Default for SpawnPoint {
    fn default() -> Self {
        Self { x: 50.0, y: 500.0 }
    }
}

/// Reconciliation blend parameters.
///
/// Divergence above `distance_threshold` is corrected with `high_blend`,
/// anything smaller with `low_blend`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileTuning {
    pub distance_threshold: f32,
    pub high_blend: f32,
    pub low_blend: f32,
}

impl Default for ReconcileTuning {
    fn default() -> Self {
        Self {
            distance_threshold: 30.0,
            high_blend: 0.5,
            low_blend: 0.2,
        }
    }
}

impl ReconcileTuning {
    pub fn blend_for(&self, distance: f32) -> f32 {
        if distance > self.distance_threshold {
            self.high_blend
        } else {
            self.low_blend
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// Simulation steps per second
    pub tick_rate: u32,
    pub physics: PhysicsConfig,
    pub level: Level,
    pub spawn: SpawnPoint,
    pub authoritative_queue: QueueBounds,
    pub predictive_queue: QueueBounds,
    pub reconcile: ReconcileTuning,
    /// Per-frame blend factor for remote entities
    pub interpolation_factor: f32,
    pub ping_interval_ms: u64,
    /// Wall-clock deltas above this are capped before feeding the accumulator
    pub max_frame_delta_ms: u64,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            tick_rate: 60,
            physics: PhysicsConfig::default(),
            level: Level::default(),
            spawn: SpawnPoint::default(),
            authoritative_queue: QueueBounds::AUTHORITATIVE,
            predictive_queue: QueueBounds::PREDICTIVE,
            reconcile: ReconcileTuning::default(),
            interpolation_factor: 0.2,
            ping_interval_ms: 5000,
            max_frame_delta_ms: 250,
        }
    }
}

impl GameConfig {
    /// Reads a JSON config; missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| NetcodeError::ConfigIo {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&text).map_err(|err| match err {
            NetcodeError::ConfigParse { source, .. } => NetcodeError::ConfigParse {
                path: path.display().to_string(),
                source,
            },
            other => other,
        })
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|source| NetcodeError::ConfigParse {
            path: "<inline>".to_string(),
            source,
        })
    }

    /// Loads from `path` when given, otherwise returns the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_json_file(path),
            None => Ok(Self::default()),
        }
    }

    /// Whole nanoseconds, so `n` intervals never overshoot `n / tick_rate`
    /// seconds of wall-clock time.
    pub fn fixed_interval(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / self.tick_rate.max(1) as u64)
    }

    /// The same interval the accumulator uses, in milliseconds.
    pub fn fixed_interval_ms(&self) -> f64 {
        self.fixed_interval().as_secs_f64() * 1000.0
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    pub fn max_frame_delta(&self) -> Duration {
        Duration::from_millis(self.max_frame_delta_ms)
    }
}
