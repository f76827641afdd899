//! Integration tests for the netcode loop
//!
//! These tests wire a predicting client to an authoritative room and check
//! how the two agree, with and without simulated latency, then exercise the
//! real UDP server end to end.

use assert_approx_eq::assert_approx_eq;
use client::game::{ClientGameState, InputSample};
use server::room::Room;
use shared::{EntityId, GameConfig, InputCommand, Packet, PROTOCOL_VERSION};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

const RIGHT: InputSample = InputSample {
    left: false,
    right: true,
    jump: false,
};

const IDLE: InputSample = InputSample {
    left: false,
    right: false,
    jump: false,
};

/// One client and one room exchanging packets in lockstep.
///
/// Each iteration runs one client frame of exactly one fixed interval and
/// one authoritative step. Packets in either direction are held back for
/// `delay` iterations.
struct Session {
    client: ClientGameState,
    room: Room,
    client_id: EntityId,
    delay: u64,
    iteration: u64,
    start: Instant,
    interval: Duration,
    to_server: VecDeque<(u64, Packet)>,
    to_client: VecDeque<(u64, Packet)>,
}

impl Session {
    fn new(delay: u64) -> Self {
        let config = GameConfig::default();
        let interval = config.fixed_interval();
        let mut room = Room::new("lobby", &config, 3);
        let mut client = ClientGameState::new(config, "lobby");

        let client_id = 1;
        let addr = SocketAddr::from(([127, 0, 0, 1], 40000));
        let tick = room.join(client_id, addr);

        let start = Instant::now();
        client.on_packet(Packet::Connected { client_id, tick }, start);

        Session {
            client,
            room,
            client_id,
            delay,
            iteration: 0,
            start,
            interval,
            to_server: VecDeque::new(),
            to_client: VecDeque::new(),
        }
    }

    fn now(&self) -> Instant {
        self.start + self.interval * self.iteration as u32
    }

    fn run(&mut self, iterations: u64, sample: InputSample) {
        for _ in 0..iterations {
            self.iterate(sample);
        }
    }

    fn iterate(&mut self, sample: InputSample) {
        let now = self.now();
        let due = self.iteration + self.delay;

        for packet in self.client.update(self.interval, sample, now) {
            self.to_server.push_back((due, packet));
        }

        while let Some((at, _)) = self.to_server.front() {
            if *at > self.iteration {
                break;
            }
            let Some((_, packet)) = self.to_server.pop_front() else {
                break;
            };
            match packet {
                Packet::Input(command) => {
                    self.room.submit(self.client_id, command);
                }
                Packet::Ping => self.to_client.push_back((due, Packet::Pong)),
                _ => {}
            }
        }

        if let Some(snapshot) = self.room.step() {
            self.to_client.push_back((due, snapshot));
        }

        while let Some((at, _)) = self.to_client.front() {
            if *at > self.iteration {
                break;
            }
            let Some((_, packet)) = self.to_client.pop_front() else {
                break;
            };
            self.client.on_packet(packet, now);
        }

        self.iteration += 1;
    }

    fn predicted_x(&self) -> f32 {
        self.client
            .simulation()
            .and_then(|simulation| simulation.entity(self.client_id))
            .map(|state| state.x)
            .unwrap()
    }

    fn authoritative_x(&self) -> f32 {
        self.room
            .simulation()
            .entity(self.client_id)
            .map(|state| state.x)
            .unwrap()
    }
}

/// CLIENT/AUTHORITY AGREEMENT TESTS
mod agreement_tests {
    use super::*;

    /// Without latency the prediction is the authority, step for step
    #[test]
    fn prediction_matches_authority_without_latency() {
        let mut session = Session::new(0);

        for _ in 0..60 {
            session.iterate(RIGHT);
            assert_eq!(session.predicted_x(), session.authoritative_x());
        }

        let moved = session.authoritative_x() - 50.0;
        assert!(moved > 250.0, "entity only moved {}", moved);
        assert_eq!(session.client.tick(), session.room.tick());
    }

    /// Snapshots acknowledge everything the authority consumed
    #[test]
    fn pending_mirror_drains_without_latency() {
        let mut session = Session::new(0);
        session.run(30, RIGHT);

        // Tick 30 is on the snapshot cadence, so nothing remains unacknowledged
        assert!(session.client.pending().is_empty());
        assert_eq!(session.client.reconciler().watermark(), 30);
    }

    /// The tick offset learned from the round trip matches the one-way delay
    #[test]
    fn tick_offset_tracks_round_trip() {
        let mut session = Session::new(3);
        session.run(10, IDLE);

        let clock = session.client.clock();
        assert_eq!(clock.tick_offset, 3);
        assert_approx_eq!(clock.rtt_estimate_ms, 100.0, 0.5);
    }

    /// With the offset in place, commands reach the authority before their tick
    #[test]
    fn commands_arrive_in_time_under_latency() {
        let mut session = Session::new(3);
        session.run(10, IDLE);
        session.run(60, RIGHT);

        let member = session.room.member(session.client_id).unwrap();
        assert_eq!(member.dropped_commands, 0);

        let last_processed = session
            .room
            .simulation()
            .entity(session.client_id)
            .unwrap()
            .last_processed_tick;
        assert_eq!(last_processed, session.room.tick());
    }

    /// Divergence stays bounded while moving and vanishes once input stops
    #[test]
    fn prediction_converges_after_input_stops() {
        let mut session = Session::new(3);
        session.run(10, IDLE);

        for _ in 0..90 {
            session.iterate(RIGHT);
            let divergence = (session.predicted_x() - session.authoritative_x()).abs();
            assert!(divergence < 150.0, "divergence {}", divergence);
        }

        session.run(300, IDLE);
        let divergence = (session.predicted_x() - session.authoritative_x()).abs();
        assert!(divergence < 0.5, "still {} apart", divergence);
    }

    /// A jump leaves the ground on both sides and lands again
    #[test]
    fn jump_is_replicated() {
        let mut session = Session::new(2);
        session.run(10, IDLE);

        let jump = InputSample {
            left: false,
            right: false,
            jump: true,
        };
        session.run(1, jump);
        session.run(10, IDLE);

        let airborne = session.room.simulation().entity(session.client_id).unwrap();
        assert!(airborne.y < 500.0, "authority never left the ground");

        session.run(400, IDLE);
        let landed = session.room.simulation().entity(session.client_id).unwrap();
        assert!((landed.y - 500.0).abs() < 1.0);
        assert!(landed.grounded);

        let predicted = session
            .client
            .simulation()
            .and_then(|simulation| simulation.entity(session.client_id))
            .unwrap();
        assert_approx_eq!(predicted.y, landed.y, 0.5);
    }

    /// A second member shows up in the first client's interpolator
    #[test]
    fn remote_member_is_interpolated() {
        let mut session = Session::new(0);
        let other = 2;
        session
            .room
            .join(other, SocketAddr::from(([127, 0, 0, 1], 40001)));

        for tick in session.room.tick() + 1..session.room.tick() + 61 {
            session.room.submit(other, InputCommand::new(false, true, false, tick));
            session.iterate(IDLE);
        }

        let authoritative = session.room.simulation().entity(other).unwrap().x;
        let remote = session.client.interpolator().get(other).unwrap();
        assert!(remote.display_x > 50.0);
        assert!(remote.display_x <= authoritative);
        assert!(session.client.interpolator().get(session.client_id).is_none());
    }
}

/// NETWORK PROTOCOL TESTS
mod protocol_tests {
    use super::*;
    use shared::EntityState;

    /// Every packet kind survives the wire codec
    #[test]
    fn packet_codec_roundtrip() {
        let packets = vec![
            Packet::Connect {
                client_version: PROTOCOL_VERSION,
                room: "lobby".to_string(),
            },
            Packet::Input(InputCommand::new(true, false, true, 42)),
            Packet::Ping,
            Packet::Disconnect,
            Packet::Connected {
                client_id: 7,
                tick: 1200,
            },
            Packet::Pong,
            Packet::Snapshot {
                tick: 9,
                entities: vec![(1, EntityState::spawned(50.0, 500.0, 9))],
            },
            Packet::Disconnected {
                reason: "Server full".to_string(),
            },
        ];

        for packet in packets {
            let bytes = packet.encode().unwrap();
            assert_eq!(Packet::decode(&bytes).unwrap(), packet);
        }
    }

    /// Garbage is rejected instead of decoded
    #[test]
    fn garbage_does_not_decode() {
        assert!(Packet::decode(&[0xff, 0xff, 0xff, 0xff, 0x01]).is_err());
        assert!(Packet::decode(&[]).is_err());
    }
}

/// REAL UDP SERVER TESTS
mod server_tests {
    use super::*;
    use server::network::{Server, ServerMessage, ServerOptions};
    use shared::MAX_PACKET_SIZE;
    use tokio::net::UdpSocket;
    use tokio::time::timeout;

    async fn start_server() -> (SocketAddr, tokio::sync::mpsc::UnboundedSender<ServerMessage>) {
        let mut server = Server::bind("127.0.0.1:0", GameConfig::default(), ServerOptions::default())
            .await
            .expect("Failed to bind server");
        let addr = server.local_addr().unwrap();
        let control = server.control();
        tokio::spawn(async move {
            let _ = server.run().await;
        });
        (addr, control)
    }

    async fn send(socket: &UdpSocket, server: SocketAddr, packet: &Packet) {
        socket
            .send_to(&packet.encode().unwrap(), server)
            .await
            .unwrap();
    }

    /// Receives until `accept` matches or two seconds pass
    async fn expect<F>(socket: &UdpSocket, mut accept: F) -> Packet
    where
        F: FnMut(&Packet) -> bool,
    {
        let mut buf = [0u8; MAX_PACKET_SIZE];
        timeout(Duration::from_secs(2), async {
            loop {
                let (len, _) = socket.recv_from(&mut buf).await.unwrap();
                let packet = Packet::decode(&buf[..len]).unwrap();
                if accept(&packet) {
                    return packet;
                }
            }
        })
        .await
        .expect("Timed out waiting for packet")
    }

    /// Connecting yields an id, the room tick and then regular snapshots
    #[tokio::test]
    async fn connect_then_receive_snapshots() {
        let (server, control) = start_server().await;
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        send(
            &socket,
            server,
            &Packet::Connect {
                client_version: PROTOCOL_VERSION,
                room: "lobby".to_string(),
            },
        )
        .await;

        let connected = expect(&socket, |p| matches!(p, Packet::Connected { .. })).await;
        let Packet::Connected { client_id, .. } = connected else {
            unreachable!()
        };

        let snapshot = expect(&socket, |p| matches!(p, Packet::Snapshot { .. })).await;
        let Packet::Snapshot { tick, entities } = snapshot else {
            unreachable!()
        };
        assert_eq!(tick % 3, 0);
        assert!(entities.iter().any(|(id, _)| *id == client_id));

        let _ = control.send(ServerMessage::Shutdown);
    }

    /// Ping is answered directly by the router
    #[tokio::test]
    async fn ping_gets_pong() {
        let (server, control) = start_server().await;
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        send(&socket, server, &Packet::Ping).await;
        expect(&socket, |p| matches!(p, Packet::Pong)).await;

        let _ = control.send(ServerMessage::Shutdown);
    }

    /// Input sent over the wire moves the entity seen in later snapshots
    #[tokio::test]
    async fn input_moves_entity() {
        let (server, control) = start_server().await;
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        send(
            &socket,
            server,
            &Packet::Connect {
                client_version: PROTOCOL_VERSION,
                room: "input".to_string(),
            },
        )
        .await;
        let Packet::Connected { client_id, tick } =
            expect(&socket, |p| matches!(p, Packet::Connected { .. })).await
        else {
            unreachable!()
        };

        // Stamp far enough ahead that the room has not passed them yet
        for offset in 5..20 {
            let command = InputCommand::new(false, true, false, tick + offset);
            send(&socket, server, &Packet::Input(command)).await;
        }

        let moved = expect(&socket, |p| match p {
            Packet::Snapshot { entities, .. } => entities
                .iter()
                .any(|(id, state)| *id == client_id && state.last_processed_tick >= tick + 19),
            _ => false,
        })
        .await;

        let Packet::Snapshot { entities, .. } = moved else {
            unreachable!()
        };
        let (_, state) = entities.iter().find(|(id, _)| *id == client_id).unwrap();
        assert!(state.x > 50.0);

        let _ = control.send(ServerMessage::Shutdown);
    }

    /// A stale protocol version is refused with a reason
    #[tokio::test]
    async fn version_mismatch_is_refused() {
        let (server, control) = start_server().await;
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        send(
            &socket,
            server,
            &Packet::Connect {
                client_version: PROTOCOL_VERSION + 1,
                room: "lobby".to_string(),
            },
        )
        .await;

        let refused = expect(&socket, |p| matches!(p, Packet::Disconnected { .. })).await;
        assert_eq!(
            refused,
            Packet::Disconnected {
                reason: "Protocol version mismatch".to_string()
            }
        );

        let _ = control.send(ServerMessage::Shutdown);
    }
}
