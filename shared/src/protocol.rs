//! Wire protocol between client and server

use crate::entity::{EntityId, EntityState};
use crate::error::{NetcodeError, Result};
use crate::input::InputCommand;
use bincode::{deserialize, serialize};
use serde::{Deserialize, Serialize};

pub const PROTOCOL_VERSION: u32 = 1;

/// Largest datagram either side will read.
pub const MAX_PACKET_SIZE: usize = 2048;

/// Encoded size of an empty snapshot: variant tag, tick and entity count.
pub const SNAPSHOT_HEADER_SIZE: usize = 16;

/// Encoded size of one `(EntityId, EntityState)` snapshot entry.
pub const SNAPSHOT_ENTRY_SIZE: usize = 29;

/// Most entities a full snapshot can carry within `MAX_PACKET_SIZE`.
pub const MAX_SNAPSHOT_ENTITIES: usize =
    (MAX_PACKET_SIZE - SNAPSHOT_HEADER_SIZE) / SNAPSHOT_ENTRY_SIZE;

pub const DEFAULT_ROOM: &str = "lobby";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Packet {
    Connect {
        client_version: u32,
        room: String,
    },
    Input(InputCommand),
    Ping,
    Disconnect,

    Connected {
        client_id: EntityId,
        /// Room tick at the moment of joining
        tick: u32,
    },
    Pong,
    Snapshot {
        tick: u32,
        entities: Vec<(EntityId, EntityState)>,
    },
    Disconnected {
        reason: String,
    },
}

impl Packet {
    pub fn encode(&self) -> Result<Vec<u8>> {
        serialize(self).map_err(NetcodeError::Encode)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        deserialize(bytes).map_err(NetcodeError::Decode)
    }

    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Packet::Connect { .. } => "connect",
            Packet::Input(_) => "input",
            Packet::Ping => "ping",
            Packet::Disconnect => "disconnect",
            Packet::Connected { .. } => "connected",
            Packet::Pong => "pong",
            Packet::Snapshot { .. } => "snapshot",
            Packet::Disconnected { .. } => "disconnected",
        }
    }
}
