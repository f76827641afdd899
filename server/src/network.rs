//! Server network layer: UDP transport and packet routing to rooms

use crate::client_manager::ClientManager;
use crate::room::{run_room, Room, RoomEvent};
use log::{debug, error, info, warn};
use shared::{
    EntityId, GameConfig, Packet, MAX_PACKET_SIZE, MAX_SNAPSHOT_ENTITIES, PROTOCOL_VERSION,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::interval;

/// Messages sent from network tasks to the main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived { packet: Packet, addr: SocketAddr },
    Shutdown,
}

/// Messages sent from the server loop and room tasks to the sender task
#[derive(Debug)]
pub enum GameMessage {
    SendPacket {
        packet: Packet,
        addr: SocketAddr,
    },
    Multicast {
        packet: Packet,
        addrs: Vec<SocketAddr>,
    },
}

#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub max_clients: usize,
    /// Members per room; never above `MAX_SNAPSHOT_ENTITIES` so a full
    /// snapshot still fits in one datagram
    pub max_room_members: usize,
    /// Snapshot cadence in ticks
    pub snapshot_every: u32,
    pub client_timeout: Duration,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            max_clients: 32,
            max_room_members: MAX_SNAPSHOT_ENTITIES,
            snapshot_every: 3,
            client_timeout: Duration::from_secs(10),
        }
    }
}

struct RoomHandle {
    events: mpsc::UnboundedSender<RoomEvent>,
    task: JoinHandle<()>,
    members: usize,
}

/// Routes packets between the socket and the room tasks.
///
/// The server loop owns the client roster and the room table. Rooms run as
/// independent tasks; dropping a room's event sender ends its task.
pub struct Server {
    socket: Arc<UdpSocket>,
    config: GameConfig,
    options: ServerOptions,
    clients: ClientManager,
    rooms: HashMap<String, RoomHandle>,

    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
    game_rx: Option<mpsc::UnboundedReceiver<GameMessage>>,
}

impl Server {
    pub async fn bind(
        addr: &str,
        config: GameConfig,
        mut options: ServerOptions,
    ) -> std::io::Result<Self> {
        if options.max_room_members > MAX_SNAPSHOT_ENTITIES {
            warn!(
                "Room size {} would overflow snapshots, capping to {}",
                options.max_room_members, MAX_SNAPSHOT_ENTITIES
            );
            options.max_room_members = MAX_SNAPSHOT_ENTITIES;
        }

        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            config,
            clients: ClientManager::new(options.max_clients, options.client_timeout),
            options,
            rooms: HashMap::new(),
            server_tx,
            server_rx,
            game_tx,
            game_rx: Some(game_rx),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Handle for stopping a running server with `ServerMessage::Shutdown`.
    pub fn control(&self) -> mpsc::UnboundedSender<ServerMessage> {
        self.server_tx.clone()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Spawns task that continuously listens for incoming packets
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; MAX_PACKET_SIZE];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => match Packet::decode(&buffer[..len]) {
                        Ok(packet) => {
                            if server_tx
                                .send(ServerMessage::PacketReceived { packet, addr })
                                .is_err()
                            {
                                break;
                            }
                        }
                        Err(e) => warn!("Dropping undecodable packet from {}: {}", addr, e),
                    },
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that drains the outgoing packet queue
    fn spawn_network_sender(&mut self) {
        let Some(mut game_rx) = self.game_rx.take() else {
            return;
        };
        let socket = Arc::clone(&self.socket);

        tokio::spawn(async move {
            while let Some(message) = game_rx.recv().await {
                match message {
                    GameMessage::SendPacket { packet, addr } => {
                        if let Err(e) = Self::send_packet_impl(&socket, &packet, &[addr]).await {
                            error!("Failed to send {} to {}: {}", packet.kind(), addr, e);
                        }
                    }
                    GameMessage::Multicast { packet, addrs } => {
                        if let Err(e) = Self::send_packet_impl(&socket, &packet, &addrs).await {
                            error!("Failed to multicast {}: {}", packet.kind(), e);
                        }
                    }
                }
            }
        });
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addrs: &[SocketAddr],
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let data = packet.encode()?;
        for addr in addrs {
            if let Err(e) = socket.send_to(&data, addr).await {
                error!("Failed to send to {}: {}", addr, e);
            }
        }
        Ok(())
    }

    fn send_packet(&self, packet: Packet, addr: SocketAddr) {
        if let Err(e) = self.game_tx.send(GameMessage::SendPacket { packet, addr }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    fn route_to_room(&mut self, room: &str, event: RoomEvent) {
        let Some(handle) = self.rooms.get(room) else {
            debug!("No room '{}' for {:?}", room, event);
            return;
        };
        if handle.events.send(event).is_err() {
            error!("Room '{}' task is gone, closing it", room);
            self.rooms.remove(room);
        }
    }

    fn open_room(&mut self, name: &str) {
        if self.rooms.contains_key(name) {
            return;
        }

        let room = Room::new(name, &self.config, self.options.snapshot_every);
        let (events, events_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_room(room, events_rx, self.game_tx.clone()));
        info!("Opened room '{}'", name);
        self.rooms.insert(
            name.to_string(),
            RoomHandle {
                events,
                task,
                members: 0,
            },
        );
    }

    /// Removes the client from the roster and its room, closing the room if
    /// it became empty.
    fn drop_client(&mut self, client_id: EntityId) {
        let Some(client) = self.clients.remove_client(&client_id) else {
            return;
        };

        self.leave_room(client_id, &client.room);
    }

    /// Processes one incoming packet
    fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        match packet {
            Packet::Connect {
                client_version,
                room,
            } => {
                info!(
                    "Client connecting from {} (version: {}, room: '{}')",
                    addr, client_version, room
                );

                if client_version != PROTOCOL_VERSION {
                    warn!(
                        "Rejecting {}: protocol version {} != {}",
                        addr, client_version, PROTOCOL_VERSION
                    );
                    self.send_packet(
                        Packet::Disconnected {
                            reason: "Protocol version mismatch".to_string(),
                        },
                        addr,
                    );
                    return;
                }

                if let Some(existing_id) = self.clients.find_client_by_addr(addr) {
                    info!("Removing existing client {} from {}", existing_id, addr);
                    self.drop_client(existing_id);
                }

                let room_members = self.rooms.get(&room).map_or(0, |handle| handle.members);
                if room_members >= self.options.max_room_members {
                    warn!("Rejecting {}: room '{}' is full", addr, room);
                    self.send_packet(
                        Packet::Disconnected {
                            reason: "Room full".to_string(),
                        },
                        addr,
                    );
                    return;
                }

                let Some(client_id) = self.clients.add_client(addr, &room) else {
                    self.send_packet(
                        Packet::Disconnected {
                            reason: "Server full".to_string(),
                        },
                        addr,
                    );
                    return;
                };

                self.open_room(&room);
                if let Some(handle) = self.rooms.get_mut(&room) {
                    handle.members += 1;
                }
                self.route_to_room(&room, RoomEvent::Join { client_id, addr });
            }

            Packet::Input(command) => {
                let Some(client) = self.clients.touch_addr(addr) else {
                    debug!("Input from unknown address {} dropped", addr);
                    return;
                };
                let (client_id, room) = (client.id, client.room.clone());
                self.route_to_room(&room, RoomEvent::Input { client_id, command });
            }

            Packet::Ping => {
                self.clients.touch_addr(addr);
                self.send_packet(Packet::Pong, addr);
            }

            Packet::Disconnect => {
                if let Some(client_id) = self.clients.find_client_by_addr(addr) {
                    self.drop_client(client_id);
                }
            }

            other => {
                warn!("Unexpected {} packet from {}", other.kind(), addr);
            }
        }
    }

    fn sweep_timeouts(&mut self) {
        let timed_out = self.clients.check_timeouts();
        for client in timed_out {
            info!("Client {} timed out", client.id);
            self.leave_room(client.id, &client.room);
        }
    }

    /// Tells the room the client left, closing the room if it became empty.
    /// Dropping the sender lets the room task drain the Leave and exit.
    fn leave_room(&mut self, client_id: EntityId, room: &str) {
        self.route_to_room(room, RoomEvent::Leave { client_id });
        let now_empty = match self.rooms.get_mut(room) {
            Some(handle) => {
                handle.members = handle.members.saturating_sub(1);
                handle.members == 0
            }
            None => false,
        };
        if now_empty {
            self.rooms.remove(room);
            info!("Closing empty room '{}'", room);
        }
    }

    /// Main server loop
    pub async fn run(&mut self) -> std::io::Result<()> {
        self.spawn_network_receiver();
        self.spawn_network_sender();

        let mut timeout_interval = interval(Duration::from_secs(1));

        info!("Server started successfully");

        loop {
            tokio::select! {
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr);
                        }
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                }

                _ = timeout_interval.tick() => {
                    self.sweep_timeouts();
                    self.rooms.retain(|name, handle| {
                        if handle.task.is_finished() {
                            warn!("Room '{}' task ended unexpectedly", name);
                            false
                        } else {
                            true
                        }
                    });
                }
            }
        }

        for (_, handle) in self.rooms.drain() {
            handle.task.abort();
        }
        Ok(())
    }
}
