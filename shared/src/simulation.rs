//! Fixed-timestep simulation shared by the authority and the predicting client
//!
//! `FixedStep` turns jittery wall-clock deltas into a whole number of steps.
//! `Simulation` owns the physics world, every managed entity with its input
//! queue, and the loop's tick counter. One call to `step` is one tick:
//!
//! 1. recompute `grounded` for every entity from body state and geometry
//! 2. drain each entity's due commands in ascending tick order and apply them
//! 3. integrate physics by one fixed interval
//! 4. write body state back into `EntityState`
//!
//! Both roles run exactly this code with the same interval, so identical
//! starting state and commands give bit-identical results.

use crate::config::GameConfig;
use crate::entity::{EntityId, EntityState};
use crate::input::{Enqueued, InputCommand, InputQueue, QueueBounds};
use crate::physics::{ArcadeWorld, BodyState, PhysicsConfig, PhysicsWorld};
use log::warn;
use std::collections::BTreeMap;
use std::time::Duration;

/// Accumulator that converts elapsed wall-clock time into fixed steps.
#[derive(Debug, Clone)]
pub struct FixedStep {
    interval: Duration,
    accumulator: Duration,
    max_frame_delta: Duration,
}

impl FixedStep {
    pub fn new(interval: Duration, max_frame_delta: Duration) -> Self {
        Self {
            interval,
            accumulator: Duration::ZERO,
            max_frame_delta,
        }
    }

    pub fn from_config(config: &GameConfig) -> Self {
        Self::new(config.fixed_interval(), config.max_frame_delta())
    }

    /// Adds `elapsed` and returns how many whole steps are now due, removing
    /// that much time from the accumulator. May return zero.
    pub fn accumulate(&mut self, elapsed: Duration) -> u32 {
        let elapsed = if elapsed > self.max_frame_delta {
            warn!(
                "Large frame delta detected ({:.3}s), capping to {:.3}s",
                elapsed.as_secs_f32(),
                self.max_frame_delta.as_secs_f32()
            );
            self.max_frame_delta
        } else {
            elapsed
        };

        self.accumulator += elapsed;

        let mut steps = 0;
        while self.accumulator >= self.interval && !self.interval.is_zero() {
            self.accumulator -= self.interval;
            steps += 1;
        }
        steps
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Fraction of the next step already accumulated, in `[0, 1)`.
    pub fn alpha(&self) -> f32 {
        if self.interval.is_zero() {
            return 0.0;
        }
        self.accumulator.as_secs_f32() / self.interval.as_secs_f32()
    }
}

/// Which side of the connection a simulation runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulationRole {
    /// Ground truth; maintains `last_processed_tick` watermarks.
    Authoritative,
    /// Client-side prediction of owned entities.
    Predictive,
}

/// What happened to a command offered to the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// No entity exists for the target; the command was dropped.
    UnknownEntity,
    Queued {
        status: Enqueued,
        /// Commands lost to the bounding policy while queueing this one
        discarded: usize,
    },
}

impl EnqueueOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(
            self,
            EnqueueOutcome::Queued {
                status: Enqueued::Accepted,
                ..
            }
        )
    }

    pub fn discarded(&self) -> usize {
        match self {
            EnqueueOutcome::Queued { discarded, .. } => *discarded,
            EnqueueOutcome::UnknownEntity => 0,
        }
    }
}

#[derive(Debug, Clone)]
struct Managed {
    state: EntityState,
    queue: InputQueue,
}

pub struct Simulation<W: PhysicsWorld = ArcadeWorld> {
    role: SimulationRole,
    world: W,
    physics: PhysicsConfig,
    dt_ms: f32,
    tick: u32,
    input_lead: u32,
    queue_bounds: QueueBounds,
    entities: BTreeMap<EntityId, Managed>,
}

impl Simulation<ArcadeWorld> {
    /// Builds a simulation over the arcade world described by `config`.
    pub fn from_config(role: SimulationRole, config: &GameConfig, start_tick: u32) -> Self {
        let world = ArcadeWorld::new(config.physics, config.level.clone());
        let bounds = match role {
            SimulationRole::Authoritative => config.authoritative_queue,
            SimulationRole::Predictive => config.predictive_queue,
        };
        Self::new(
            role,
            world,
            config.physics,
            config.fixed_interval_ms() as f32,
            bounds,
            start_tick,
        )
    }
}

impl<W: PhysicsWorld> Simulation<W> {
    pub fn new(
        role: SimulationRole,
        world: W,
        physics: PhysicsConfig,
        dt_ms: f32,
        queue_bounds: QueueBounds,
        start_tick: u32,
    ) -> Self {
        Self {
            role,
            world,
            physics,
            dt_ms,
            tick: start_tick,
            input_lead: 0,
            queue_bounds,
            entities: BTreeMap::new(),
        }
    }

    /// Creates an entity at rest at `(x, y)`, replacing any previous one
    /// with the same id.
    pub fn spawn(&mut self, id: EntityId, x: f32, y: f32) -> EntityState {
        self.world.remove_body(id);
        self.world.add_body(id, x, y);

        let mut state = EntityState::spawned(x, y, self.tick);
        state.grounded = self.is_grounded(id);

        self.entities.insert(
            id,
            Managed {
                state,
                queue: InputQueue::new(self.queue_bounds),
            },
        );
        state
    }

    /// Removes the entity, its body and its queued commands.
    pub fn despawn(&mut self, id: EntityId) -> Option<EntityState> {
        self.world.remove_body(id);
        self.entities.remove(&id).map(|managed| managed.state)
    }

    /// Buffers a command for the next due step, then applies the bounding
    /// policy relative to the current tick.
    pub fn enqueue(&mut self, id: EntityId, command: InputCommand) -> EnqueueOutcome {
        let current = self.tick.saturating_add(self.input_lead);
        match self.entities.get_mut(&id) {
            Some(managed) => {
                let status = managed.queue.enqueue(command);
                let discarded = managed.queue.enforce_bounds(current);
                EnqueueOutcome::Queued { status, discarded }
            }
            None => EnqueueOutcome::UnknownEntity,
        }
    }

    /// Runs one tick.
    pub fn step(&mut self) {
        self.tick = self.tick.wrapping_add(1);
        let due = self.tick.saturating_add(self.input_lead);

        let mut batches: BTreeMap<EntityId, Vec<InputCommand>> = BTreeMap::new();
        for (id, managed) in self.entities.iter_mut() {
            batches.insert(*id, managed.queue.drain_up_to(due));
        }

        let ids: Vec<EntityId> = self.entities.keys().copied().collect();
        self.advance(&ids, &batches);
    }

    /// Re-runs the step logic for one entity, one step per tick from
    /// `after_tick + 1` through the current due tick (`tick + input_lead`).
    ///
    /// Each replayed step drains the `commands` (ascending) with a tick at or
    /// below the step's tick, the way the authority will. Ticks without a
    /// command still integrate. Used by reconciliation after the entity has
    /// been corrected toward the authority. The tick counter does not move
    /// and queues are untouched. Returns the number of steps run.
    pub fn replay(&mut self, id: EntityId, after_tick: u32, commands: &[InputCommand]) -> u32 {
        if !self.entities.contains_key(&id) {
            return 0;
        }

        let through = self.tick.saturating_add(self.input_lead);
        let ids = [id];
        let mut next = 0;
        let mut steps = 0;

        for tick in after_tick.saturating_add(1)..=through {
            let start = next;
            while next < commands.len() && commands[next].tick <= tick {
                next += 1;
            }

            let mut batch = BTreeMap::new();
            batch.insert(id, commands[start..next].to_vec());
            self.advance(&ids, &batch);
            steps += 1;
        }
        steps
    }

    fn advance(&mut self, ids: &[EntityId], batches: &BTreeMap<EntityId, Vec<InputCommand>>) {
        // (a) grounded from current body state and static geometry
        for id in ids {
            let grounded = self.is_grounded(*id);
            if let Some(managed) = self.entities.get_mut(id) {
                managed.state.grounded = grounded;
            }
        }

        // (b) apply due commands in ascending tick order
        for id in ids {
            let Some(commands) = batches.get(id) else {
                continue;
            };
            let Some(managed) = self.entities.get(id) else {
                continue;
            };
            let grounded_at_start = managed.state.grounded;

            let mut jumped = false;
            for command in commands {
                self.world
                    .set_velocity_x(*id, command.horizontal_velocity(self.physics.move_speed));
                if command.jump && grounded_at_start && !jumped {
                    self.world.apply_impulse(*id, 0.0, -self.physics.jump_impulse);
                    jumped = true;
                }
            }
        }

        // (c) integrate one fixed interval
        self.world.integrate(self.dt_ms);

        // (d) write back
        let tick = self.tick;
        let authoritative = self.role == SimulationRole::Authoritative;
        for id in ids {
            let Some(body) = self.world.body(*id) else {
                continue;
            };
            let Some(managed) = self.entities.get_mut(id) else {
                continue;
            };

            managed.state.x = body.x;
            managed.state.y = body.y;
            managed.state.vx = body.vx;
            managed.state.vy = body.vy;
            managed.state.tick = tick;

            if authoritative {
                if let Some(highest) = batches.get(id).and_then(|c| c.last()) {
                    managed.state.last_processed_tick =
                        managed.state.last_processed_tick.max(highest.tick);
                }
            }
        }
    }

    /// Casts short rays down from both bottom corners of the body.
    fn is_grounded(&self, id: EntityId) -> bool {
        let Some(body) = self.world.body(id) else {
            return false;
        };
        let (half_w, half_h) = self.world.body_half_extents();
        let bottom = body.y + half_h;
        let inset = 1.0_f32.min(half_w);
        let reach = self.physics.ground_ray;

        [body.x - half_w + inset, body.x + half_w - inset]
            .into_iter()
            .any(|x| self.world.ray_test((x, bottom - reach * 0.5), (x, bottom + reach)))
    }

    /// Overwrites an entity's state and its body, e.g. after a correction.
    pub fn set_entity_state(&mut self, id: EntityId, state: EntityState) {
        if let Some(managed) = self.entities.get_mut(&id) {
            managed.state = state;
            self.world.set_body(
                id,
                BodyState {
                    x: state.x,
                    y: state.y,
                    vx: state.vx,
                    vy: state.vy,
                },
            );
        }
    }

    pub fn entity(&self, id: EntityId) -> Option<&EntityState> {
        self.entities.get(&id).map(|managed| &managed.state)
    }

    pub fn entities(&self) -> impl Iterator<Item = (EntityId, &EntityState)> {
        self.entities.iter().map(|(id, managed)| (*id, &managed.state))
    }

    /// `(id, state)` pairs in ascending id order, as sent in snapshots.
    pub fn snapshot(&self) -> Vec<(EntityId, EntityState)> {
        self.entities().map(|(id, state)| (id, *state)).collect()
    }

    pub fn queued_commands(&self, id: EntityId) -> usize {
        self.entities.get(&id).map_or(0, |managed| managed.queue.len())
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn tick(&self) -> u32 {
        self.tick
    }

    /// Ticks ahead of the loop counter that count as due. Zero on the
    /// authority; the client's tick offset on the predictive side.
    pub fn set_input_lead(&mut self, lead: u32) {
        self.input_lead = lead;
    }

    pub fn input_lead(&self) -> u32 {
        self.input_lead
    }

    /// Tick number a command generated for the next step should carry.
    pub fn next_command_tick(&self) -> u32 {
        self.tick.wrapping_add(1).saturating_add(self.input_lead)
    }

    pub fn role(&self) -> SimulationRole {
        self.role
    }

    pub fn world(&self) -> &W {
        &self.world
    }
}
