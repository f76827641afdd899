//! # Shared Netcode Core
//!
//! Everything the authoritative server and the predicting client must run
//! identically lives here. If a piece of logic influences simulation results
//! it belongs in this crate, so that both peers compile the exact same code.
//!
//! ## Modules
//!
//! - `input`: per-step `InputCommand`s and the tick-ordered `InputQueue`
//!   with its high-water/retention bounding policy
//! - `entity`: the replicated `EntityState`
//! - `level`: static level geometry (ground and platforms)
//! - `physics`: the `PhysicsWorld` adapter contract and `ArcadeWorld`
//! - `simulation`: the `FixedStep` accumulator and the `Simulation` step
//! - `replication`: snapshot diffing into `ReplicationEvent`s
//! - `protocol`: the wire `Packet` enum and its bincode codec
//! - `config`: `GameConfig`, the tuning shared out-of-band by both peers
//!
//! ## Determinism
//!
//! A step is a pure function of the previous entity state, the drained
//! commands and the fixed interval. Entities and bodies are kept in ordered
//! maps and no wall-clock time enters a step, so two simulations fed the same
//! commands stay bit-identical.

pub mod config;
pub mod entity;
pub mod error;
pub mod input;
pub mod level;
pub mod physics;
pub mod protocol;
pub mod replication;
pub mod simulation;

pub use config::{GameConfig, ReconcileTuning, SpawnPoint};
pub use entity::{EntityId, EntityState};
pub use error::{NetcodeError, Result};
pub use input::{Enqueued, InputCommand, InputQueue, QueueBounds};
pub use level::{Level, Rect};
pub use physics::{ArcadeWorld, BodyState, PhysicsConfig, PhysicsWorld};
pub use protocol::{
    Packet, DEFAULT_ROOM, MAX_PACKET_SIZE, MAX_SNAPSHOT_ENTITIES, PROTOCOL_VERSION,
};
pub use replication::{ReplicaSet, ReplicationEvent, ReplicationObserver};
pub use simulation::{EnqueueOutcome, FixedStep, Simulation, SimulationRole};
