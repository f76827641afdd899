//! Input commands and the per-entity tick-ordered command queue
//!
//! Each peer produces one `InputCommand` per fixed step. Commands are buffered
//! in an `InputQueue` sorted by tick and consumed by the step function. The
//! same queue type backs the authority's intake, the client's predictive
//! intake and the client's replay mirror; only the bounds differ.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// One step worth of player intent, immutable once created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputCommand {
    pub left: bool,
    pub right: bool,
    pub jump: bool,
    pub tick: u32,
}

impl InputCommand {
    pub fn new(left: bool, right: bool, jump: bool, tick: u32) -> Self {
        Self {
            left,
            right,
            jump,
            tick,
        }
    }

    /// An empty command, used for idle steps.
    pub fn idle(tick: u32) -> Self {
        Self::new(false, false, false, tick)
    }

    /// Horizontal velocity requested by this command. Left and right cancel.
    pub fn horizontal_velocity(&self, speed: f32) -> f32 {
        let mut vx = 0.0;
        if self.left {
            vx -= speed;
        }
        if self.right {
            vx += speed;
        }
        vx
    }
}

/// High-water mark and retention window for an input queue.
///
/// When a queue grows past `high_water` entries, everything with
/// `tick <= current_tick - retention` is discarded without being applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueBounds {
    pub high_water: usize,
    pub retention: u32,
}

impl QueueBounds {
    /// Bounds used by the authority for each connection.
    pub const AUTHORITATIVE: QueueBounds = QueueBounds {
        high_water: 20,
        retention: 10,
    };

    /// Bounds used by the client for its predictive intake and replay mirror.
    pub const PREDICTIVE: QueueBounds = QueueBounds {
        high_water: 100,
        retention: 50,
    };
}

/// Result of offering a command to a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    Accepted,
    /// A command with the same tick is already waiting; the first one wins.
    Duplicate,
    /// The tick is at or below the highest tick already drained.
    AlreadyConsumed,
}

impl Enqueued {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Enqueued::Accepted)
    }
}

/// Tick-ordered buffer of commands for a single entity.
#[derive(Debug, Clone)]
pub struct InputQueue {
    entries: VecDeque<InputCommand>,
    consumed_through: Option<u32>,
    bounds: QueueBounds,
}

impl InputQueue {
    pub fn new(bounds: QueueBounds) -> Self {
        Self {
            entries: VecDeque::new(),
            consumed_through: None,
            bounds,
        }
    }

    /// Inserts a command keeping ascending tick order.
    pub fn enqueue(&mut self, command: InputCommand) -> Enqueued {
        if let Some(consumed) = self.consumed_through {
            if command.tick <= consumed {
                return Enqueued::AlreadyConsumed;
            }
        }

        match self.entries.binary_search_by_key(&command.tick, |c| c.tick) {
            Ok(_) => Enqueued::Duplicate,
            Err(index) => {
                self.entries.insert(index, command);
                Enqueued::Accepted
            }
        }
    }

    /// Removes and returns, in ascending order, every command with
    /// `tick <= through`.
    pub fn drain_up_to(&mut self, through: u32) -> Vec<InputCommand> {
        let mut drained = Vec::new();
        while let Some(front) = self.entries.front() {
            if front.tick > through {
                break;
            }
            if let Some(command) = self.entries.pop_front() {
                drained.push(command);
            }
        }

        if let Some(last) = drained.last() {
            self.mark_consumed(last.tick);
        }
        drained
    }

    /// Drops every command with `tick <= through` and treats those ticks as
    /// consumed. Returns how many were removed.
    pub fn discard_through(&mut self, through: u32) -> usize {
        let before = self.entries.len();
        self.entries.retain(|c| c.tick > through);
        self.mark_consumed(through);
        before - self.entries.len()
    }

    /// Applies the bounding policy relative to `current_tick`.
    ///
    /// Keeps `current - retention < tick <= current + high_water`; the upper
    /// bound stops a peer whose clock runs ahead from growing the queue.
    /// Returns the number of commands discarded. Nothing happens while the
    /// queue is at or below its high-water mark.
    pub fn enforce_bounds(&mut self, current_tick: u32) -> usize {
        if self.entries.len() <= self.bounds.high_water {
            return 0;
        }

        let cutoff = current_tick.saturating_sub(self.bounds.retention);
        let horizon = current_tick
            .saturating_add(u32::try_from(self.bounds.high_water).unwrap_or(u32::MAX));
        let before = self.entries.len();
        self.entries.retain(|c| c.tick > cutoff && c.tick <= horizon);
        before - self.entries.len()
    }

    fn mark_consumed(&mut self, tick: u32) {
        self.consumed_through = Some(match self.consumed_through {
            Some(previous) => previous.max(tick),
            None => tick,
        });
    }

    pub fn iter(&self) -> impl Iterator<Item = &InputCommand> {
        self.entries.iter()
    }

    pub fn oldest_tick(&self) -> Option<u32> {
        self.entries.front().map(|c| c.tick)
    }

    pub fn newest_tick(&self) -> Option<u32> {
        self.entries.back().map(|c| c.tick)
    }

    pub fn consumed_through(&self) -> Option<u32> {
        self.consumed_through
    }

    pub fn bounds(&self) -> QueueBounds {
        self.bounds
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
