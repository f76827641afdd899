//! # Authoritative Game Server
//!
//! Runs the ground-truth simulation for every room and keeps connected
//! clients supplied with snapshots they can reconcile against.
//!
//! ## Architecture
//!
//! ### Router loop
//! A single event loop owns the client roster and the room table. It receives
//! decoded packets from the network receiver task, answers pings directly and
//! routes everything else to the owning room.
//!
//! ### Rooms
//! Every room is its own task with its own `Simulation`, driven by a tokio
//! interval feeding a fixed-step accumulator. Commands arrive through the
//! room's event channel and are only consumed inside the step, so no lock
//! guards the queues. A room is opened by its first join and closed when its
//! last member leaves.
//!
//! ### Outgoing traffic
//! Rooms and the router push `GameMessage`s to one sender task that owns
//! encoding and the write half of the socket.
//!
//! ## Module Organization
//!
//! - `client_manager`: connection roster, ids, capacity and timeouts
//! - `room`: membership, command intake, snapshot cadence, `run_room`
//! - `network`: socket tasks and packet routing
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::{Server, ServerOptions};
//! use shared::GameConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server =
//!         Server::bind("127.0.0.1:8080", GameConfig::default(), ServerOptions::default()).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod client_manager;
pub mod network;
pub mod room;
