//! Connection roster for the server
//!
//! This module tracks who is connected and where their packets come from:
//! - Client connection lifecycle (connect, disconnect, timeout)
//! - Client ID assignment and capacity enforcement
//! - Room membership, so the router knows which room receives a packet
//! - Connection health monitoring via last-activity timestamps
//!
//! Input commands are not buffered here. They are routed straight to the
//! owning room, whose simulation keeps one queue per entity.

use log::info;
use shared::EntityId;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// A connected client and the room it plays in
#[derive(Debug)]
pub struct Client {
    /// Unique client identifier assigned by the server, also the entity id
    pub id: EntityId,
    /// Network address for sending responses
    pub addr: SocketAddr,
    /// Name of the room this client joined
    pub room: String,
    /// Last time we received any packet from this client
    pub last_seen: Instant,
}

impl Client {
    pub fn new(id: EntityId, addr: SocketAddr, room: String) -> Self {
        Self {
            id,
            addr,
            room,
            last_seen: Instant::now(),
        }
    }

    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    /// Returns true if nothing was heard from this client within `timeout`
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Manages all connected clients across every room
///
/// Client IDs start from 1 and are never reused during the server's lifetime,
/// so a late packet for a departed client can never be attributed to a new one.
pub struct ClientManager {
    clients: HashMap<EntityId, Client>,
    next_client_id: EntityId,
    max_clients: usize,
    timeout: Duration,
}

impl ClientManager {
    pub fn new(max_clients: usize, timeout: Duration) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients,
            timeout,
        }
    }

    /// Attempts to register a new connection
    ///
    /// Returns Some(client_id) if successful, None if the server is at capacity.
    pub fn add_client(&mut self, addr: SocketAddr, room: &str) -> Option<EntityId> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        info!(
            "Client {} connected from {} into room '{}'",
            client_id, addr, room
        );
        self.clients
            .insert(client_id, Client::new(client_id, addr, room.to_string()));

        Some(client_id)
    }

    /// Removes a client, returning its record if it was present
    pub fn remove_client(&mut self, client_id: &EntityId) -> Option<Client> {
        let removed = self.clients.remove(client_id);
        if let Some(client) = &removed {
            info!("Client {} disconnected", client.id);
        }
        removed
    }

    pub fn find_client_by_addr(&self, addr: SocketAddr) -> Option<EntityId> {
        self.clients
            .iter()
            .find(|(_, client)| client.addr == addr)
            .map(|(id, _)| *id)
    }

    pub fn get(&self, client_id: EntityId) -> Option<&Client> {
        self.clients.get(&client_id)
    }

    /// Refreshes the activity timestamp of the client at `addr`
    pub fn touch_addr(&mut self, addr: SocketAddr) -> Option<&Client> {
        let client_id = self.find_client_by_addr(addr)?;
        let client = self.clients.get_mut(&client_id)?;
        client.touch();
        Some(client)
    }

    /// Removes and returns every client that has gone quiet
    pub fn check_timeouts(&mut self) -> Vec<Client> {
        let timeout = self.timeout;
        let timed_out: Vec<EntityId> = self
            .clients
            .iter()
            .filter(|(_, client)| client.is_timed_out(timeout))
            .map(|(id, _)| *id)
            .collect();

        timed_out
            .into_iter()
            .filter_map(|id| self.remove_client(&id))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
