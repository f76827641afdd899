//! # Predictive Game Client
//!
//! The client runs the same step logic as the server ahead of the network so
//! that local input takes effect immediately, then corrects itself as
//! authoritative snapshots arrive.
//!
//! ## Data Flow
//!
//! Keyboard sample → one `InputCommand` per fixed step, stamped with the
//! loop tick plus the current tick offset → applied locally, mirrored into
//! the pending queue and sent → server snapshot → reconciliation for the
//! local entity, interpolation for everyone else.
//!
//! ## Module Organization
//!
//! - `tick_sync`: ping/pong round trips and the tick offset
//! - `reconciliation`: blend, prune and replay against authoritative state
//! - `interpolation`: per-frame smoothing of remote entities
//! - `game`: `ClientGameState`, the socket-free session and predictive loop
//! - `network`: UDP transport on a background thread with simulated lag
//! - `input`: keyboard sampling and toggle keys
//! - `rendering`: the macroquad view
//!
//! ## Netcode Toggles
//!
//! Keys 1/2/3 switch prediction, reconciliation and interpolation on and off
//! at runtime, which makes the effect of each technique visible under
//! `--fake-ping` and `--jitter`.

pub mod game;
pub mod input;
pub mod interpolation;
pub mod network;
pub mod reconciliation;
pub mod rendering;
pub mod tick_sync;
