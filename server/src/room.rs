//! Authoritative rooms
//!
//! A room owns one authoritative `Simulation` and the membership of the
//! clients playing in it. Rooms share nothing with each other; each runs as
//! its own task and only ever talks to the network layer through channels.

use crate::network::GameMessage;
use log::{debug, error, info};
use shared::{
    EnqueueOutcome, EntityId, FixedStep, GameConfig, InputCommand, Packet, Simulation,
    SimulationRole, SpawnPoint,
};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};

/// Events routed into a room task by the network layer
#[derive(Debug, Clone)]
pub enum RoomEvent {
    Join {
        client_id: EntityId,
        addr: SocketAddr,
    },
    Leave {
        client_id: EntityId,
    },
    Input {
        client_id: EntityId,
        command: InputCommand,
    },
}

#[derive(Debug, Clone)]
pub struct Member {
    pub addr: SocketAddr,
    /// Commands lost to queue bounding; kept local, never reported to the peer
    pub dropped_commands: u64,
}

pub struct Room {
    name: String,
    simulation: Simulation,
    spawn: SpawnPoint,
    fixed_step: FixedStep,
    snapshot_every: u32,
    summary_every: u32,
    members: BTreeMap<EntityId, Member>,
}

impl Room {
    pub fn new(name: impl Into<String>, config: &GameConfig, snapshot_every: u32) -> Self {
        Self {
            name: name.into(),
            simulation: Simulation::from_config(SimulationRole::Authoritative, config, 0),
            spawn: config.spawn,
            fixed_step: FixedStep::from_config(config),
            snapshot_every: snapshot_every.max(1),
            summary_every: config.tick_rate.max(1) * 10,
            members: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Spawns an entity for the client and returns the room's current tick.
    pub fn join(&mut self, client_id: EntityId, addr: SocketAddr) -> u32 {
        self.simulation.spawn(client_id, self.spawn.x, self.spawn.y);
        self.members.insert(
            client_id,
            Member {
                addr,
                dropped_commands: 0,
            },
        );
        info!(
            "Client {} joined room '{}' at tick {}",
            client_id,
            self.name,
            self.simulation.tick()
        );
        self.simulation.tick()
    }

    /// Tears down the client's entity, body and queue. Returns false if the
    /// client was not a member.
    pub fn leave(&mut self, client_id: EntityId) -> bool {
        let Some(member) = self.members.remove(&client_id) else {
            return false;
        };
        self.simulation.despawn(client_id);
        info!(
            "Client {} left room '{}' ({} commands dropped by bounding)",
            client_id, self.name, member.dropped_commands
        );
        true
    }

    /// Queues a command for the client's entity.
    pub fn submit(&mut self, client_id: EntityId, command: InputCommand) -> EnqueueOutcome {
        let outcome = self.simulation.enqueue(client_id, command);
        match outcome {
            EnqueueOutcome::UnknownEntity => {
                debug!(
                    "Room '{}': no entity for client {}, command {} dropped",
                    self.name, client_id, command.tick
                );
            }
            EnqueueOutcome::Queued { discarded, .. } if discarded > 0 => {
                if let Some(member) = self.members.get_mut(&client_id) {
                    member.dropped_commands += discarded as u64;
                }
                debug!(
                    "Room '{}': bounded queue of client {} dropped {} commands",
                    self.name, client_id, discarded
                );
            }
            EnqueueOutcome::Queued { .. } => {}
        }
        outcome
    }

    /// Runs one step, returning a snapshot if this tick is on the cadence.
    pub fn step(&mut self) -> Option<Packet> {
        self.simulation.step();
        let tick = self.simulation.tick();

        if tick % self.summary_every == 0 && !self.members.is_empty() {
            debug!(
                "Room '{}' tick {}: {} members",
                self.name,
                tick,
                self.members.len()
            );
        }

        (tick % self.snapshot_every == 0).then(|| self.snapshot())
    }

    /// Feeds wall-clock time to the accumulator and runs every due step.
    /// At most one snapshot is returned, the latest one produced.
    pub fn advance(&mut self, elapsed: std::time::Duration) -> Option<Packet> {
        let steps = self.fixed_step.accumulate(elapsed);
        let mut latest = None;
        for _ in 0..steps {
            if let Some(snapshot) = self.step() {
                latest = Some(snapshot);
            }
        }
        latest
    }

    pub fn snapshot(&self) -> Packet {
        Packet::Snapshot {
            tick: self.simulation.tick(),
            entities: self.simulation.snapshot(),
        }
    }

    pub fn member_addrs(&self) -> Vec<SocketAddr> {
        self.members.values().map(|member| member.addr).collect()
    }

    pub fn member(&self, client_id: EntityId) -> Option<&Member> {
        self.members.get(&client_id)
    }

    pub fn simulation(&self) -> &Simulation {
        &self.simulation
    }

    pub fn tick(&self) -> u32 {
        self.simulation.tick()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Drives a room until its event channel closes.
///
/// Join answers the client with `Connected`; every snapshot produced by the
/// fixed-step loop is multicast to all members.
pub async fn run_room(
    mut room: Room,
    mut events: mpsc::UnboundedReceiver<RoomEvent>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
) {
    let mut ticker = interval(room.fixed_step.interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last_tick = Instant::now();

    info!("Room '{}' started", room.name());

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Some(RoomEvent::Join { client_id, addr }) => {
                        let tick = room.join(client_id, addr);
                        let packet = Packet::Connected { client_id, tick };
                        if game_tx.send(GameMessage::SendPacket { packet, addr }).is_err() {
                            error!("Room '{}': sender task gone", room.name());
                            break;
                        }
                    }
                    Some(RoomEvent::Leave { client_id }) => {
                        room.leave(client_id);
                    }
                    Some(RoomEvent::Input { client_id, command }) => {
                        room.submit(client_id, command);
                    }
                    None => break,
                }
            }

            _ = ticker.tick() => {
                let now = Instant::now();
                let elapsed = now.duration_since(last_tick);
                last_tick = now;

                if let Some(packet) = room.advance(elapsed) {
                    if room.is_empty() {
                        continue;
                    }
                    let addrs = room.member_addrs();
                    if game_tx.send(GameMessage::Multicast { packet, addrs }).is_err() {
                        error!("Room '{}': sender task gone", room.name());
                        break;
                    }
                }
            }
        }
    }

    info!("Room '{}' closed at tick {}", room.name(), room.tick());
}
