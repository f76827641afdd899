//! Client session state and the predictive loop
//!
//! `ClientGameState` is transport-agnostic: packets go in through
//! `on_packet`, and `update` returns the packets to send. This keeps the
//! whole netcode path testable without a socket or a window.

use crate::interpolation::Interpolator;
use crate::reconciliation::{ReconcileOutcome, Reconciler};
use crate::tick_sync::{ClockState, TickSync};
use log::{debug, info, warn};
use shared::{
    EntityId, EntityState, FixedStep, GameConfig, InputCommand, InputQueue, Packet, ReplicaSet,
    ReplicationEvent, ReplicationObserver, Simulation, SimulationRole, PROTOCOL_VERSION,
};
use std::time::{Duration, Instant};

/// How often `Connect` is re-sent while waiting for the server.
pub const CONNECT_RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// Movement keys held during a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InputSample {
    pub left: bool,
    pub right: bool,
    pub jump: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    Connecting,
    Connected { client_id: EntityId },
    Disconnected { reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetcodeToggles {
    pub prediction: bool,
    pub reconciliation: bool,
    pub interpolation: bool,
}

impl Default for NetcodeToggles {
    fn default() -> Self {
        Self {
            prediction: true,
            reconciliation: true,
            interpolation: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HudInfo {
    pub client_id: Option<EntityId>,
    pub room: String,
    pub connected: bool,
    pub tick: u32,
    pub clock: ClockState,
    pub pending_commands: usize,
    pub dropped_commands: u64,
    pub remote_count: usize,
    pub toggles: NetcodeToggles,
}

/// Everything the renderer needs for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderView {
    /// Predicted state, or the authoritative one with prediction off
    pub local: Option<EntityState>,
    /// Displayed positions of remote entities
    pub remotes: Vec<(EntityId, f32, f32)>,
    pub hud: HudInfo,
}

pub struct ClientGameState {
    config: GameConfig,
    room: String,
    connection: ConnectionState,
    last_connect_attempt: Option<Instant>,

    simulation: Option<Simulation>,
    fixed_step: FixedStep,
    /// Every command sent and not yet acknowledged, for replay
    pending: InputQueue,
    dropped_commands: u64,

    replicas: ReplicaSet,
    authoritative: Option<EntityState>,
    reconciler: Reconciler,
    interpolator: Interpolator,
    tick_sync: TickSync,
    toggles: NetcodeToggles,
}

impl ClientGameState {
    pub fn new(config: GameConfig, room: impl Into<String>) -> Self {
        Self {
            fixed_step: FixedStep::from_config(&config),
            pending: InputQueue::new(config.predictive_queue),
            reconciler: Reconciler::new(config.reconcile),
            interpolator: Interpolator::new(config.interpolation_factor),
            tick_sync: TickSync::from_config(&config),
            room: room.into(),
            connection: ConnectionState::Connecting,
            last_connect_attempt: None,
            simulation: None,
            dropped_commands: 0,
            replicas: ReplicaSet::new(),
            authoritative: None,
            toggles: NetcodeToggles::default(),
            config,
        }
    }

    /// Advances the session by one frame and returns the packets to send.
    pub fn update(&mut self, elapsed: Duration, sample: InputSample, now: Instant) -> Vec<Packet> {
        let mut outgoing = Vec::new();

        match self.connection {
            ConnectionState::Connecting => self.poll_connect(now, &mut outgoing),
            ConnectionState::Connected { client_id } => {
                if self.tick_sync.poll(now) {
                    outgoing.push(Packet::Ping);
                }
                self.run_steps(client_id, elapsed, sample, &mut outgoing);
            }
            ConnectionState::Disconnected { .. } => {}
        }

        self.interpolator.update_frame();
        outgoing
    }

    fn poll_connect(&mut self, now: Instant, outgoing: &mut Vec<Packet>) {
        let due = match self.last_connect_attempt {
            Some(last) => now.saturating_duration_since(last) >= CONNECT_RETRY_INTERVAL,
            None => true,
        };
        if !due {
            return;
        }

        if self.last_connect_attempt.is_some() {
            debug!("No answer from server yet, retrying connect");
        } else {
            info!("Connecting to room '{}'", self.room);
        }
        self.last_connect_attempt = Some(now);
        outgoing.push(Packet::Connect {
            client_version: PROTOCOL_VERSION,
            room: self.room.clone(),
        });
    }

    /// Runs every due predictive step, generating one command per step.
    ///
    /// Commands are stamped `loop tick + 1 + offset` and the loop's input
    /// lead is kept equal to the offset, so each command is applied locally
    /// in the step that generated it.
    fn run_steps(
        &mut self,
        client_id: EntityId,
        elapsed: Duration,
        sample: InputSample,
        outgoing: &mut Vec<Packet>,
    ) {
        let steps = self.fixed_step.accumulate(elapsed);
        let Some(simulation) = self.simulation.as_mut() else {
            return;
        };

        for _ in 0..steps {
            let lead = self.tick_sync.tick_offset();
            simulation.set_input_lead(lead);

            let command = InputCommand::new(
                sample.left,
                sample.right,
                sample.jump,
                simulation.next_command_tick(),
            );

            let status = self.pending.enqueue(command);
            let dropped = self
                .pending
                .enforce_bounds(simulation.tick().saturating_add(lead));
            if dropped > 0 {
                self.dropped_commands += dropped as u64;
                debug!("Pending mirror dropped {} unacknowledged commands", dropped);
            }

            // A shrinking offset can re-issue a tick that was already used
            if status.is_accepted() {
                outgoing.push(Packet::Input(command));
                if self.toggles.prediction {
                    simulation.enqueue(client_id, command);
                }
            }

            simulation.step();
        }
    }

    pub fn on_packet(&mut self, packet: Packet, received_at: Instant) {
        match packet {
            Packet::Connected { client_id, tick } => self.on_connected(client_id, tick),
            Packet::Pong => {
                self.tick_sync.on_pong(received_at);
            }
            Packet::Snapshot { tick, entities } => self.on_snapshot(tick, &entities),
            Packet::Disconnected { reason } => {
                warn!("Disconnected by server: {}", reason);
                self.reset_session();
                self.connection = ConnectionState::Disconnected { reason };
            }
            other => warn!("Unexpected {} packet from server", other.kind()),
        }
    }

    fn on_connected(&mut self, client_id: EntityId, tick: u32) {
        if let ConnectionState::Disconnected { .. } = self.connection {
            debug!("Ignoring late Connected for client {}", client_id);
            return;
        }

        info!("Connected! Client ID: {} (server tick {})", client_id, tick);
        self.reset_session();

        let mut simulation = Simulation::from_config(SimulationRole::Predictive, &self.config, tick);
        simulation.spawn(client_id, self.config.spawn.x, self.config.spawn.y);
        self.simulation = Some(simulation);
        self.interpolator.set_local(Some(client_id));
        self.connection = ConnectionState::Connected { client_id };
    }

    fn on_snapshot(&mut self, tick: u32, entities: &[(EntityId, EntityState)]) {
        let Some(client_id) = self.client_id() else {
            return;
        };

        for event in self.replicas.apply_snapshot(tick, entities) {
            if event.id() == client_id {
                self.on_local_replication(client_id, &event);
            } else {
                self.interpolator.on_replication(&event);
            }
        }
    }

    fn on_local_replication(&mut self, client_id: EntityId, event: &ReplicationEvent) {
        let Some(state) = event.current().copied() else {
            warn!("Server no longer lists client {}", client_id);
            self.authoritative = None;
            return;
        };
        self.authoritative = Some(state);

        let Some(simulation) = self.simulation.as_mut() else {
            return;
        };

        if !self.toggles.prediction {
            self.reconciler.acknowledge(&mut self.pending, &state);
            simulation.set_entity_state(client_id, state);
            return;
        }

        if self.toggles.reconciliation {
            let outcome =
                self.reconciler
                    .reconcile(simulation, &mut self.pending, client_id, &state);
            if let ReconcileOutcome::Missing = outcome {
                warn!("Local entity {} missing from prediction", client_id);
            }
        } else {
            self.reconciler.acknowledge(&mut self.pending, &state);
        }
    }

    /// Drops every piece of per-connection state.
    fn reset_session(&mut self) {
        self.simulation = None;
        self.fixed_step = FixedStep::from_config(&self.config);
        self.pending = InputQueue::new(self.config.predictive_queue);
        self.dropped_commands = 0;
        self.replicas.clear();
        self.authoritative = None;
        self.reconciler.reset();
        self.interpolator.clear();
        self.interpolator.set_local(None);
        self.tick_sync.reset();
    }

    /// Starts a fresh connection attempt.
    pub fn reconnect(&mut self) {
        info!("Reconnecting");
        self.reset_session();
        self.connection = ConnectionState::Connecting;
        self.last_connect_attempt = None;
    }

    /// The packet announcing a clean leave, if connected.
    pub fn disconnect_packet(&self) -> Option<Packet> {
        self.is_connected().then_some(Packet::Disconnect)
    }

    pub fn toggle_prediction(&mut self) -> bool {
        self.toggles.prediction = !self.toggles.prediction;
        info!("Client-side prediction: {}", self.toggles.prediction);
        self.toggles.prediction
    }

    pub fn toggle_reconciliation(&mut self) -> bool {
        self.toggles.reconciliation = !self.toggles.reconciliation;
        info!("Server reconciliation: {}", self.toggles.reconciliation);
        self.toggles.reconciliation
    }

    pub fn toggle_interpolation(&mut self) -> bool {
        self.toggles.interpolation = !self.toggles.interpolation;
        self.interpolator.set_enabled(self.toggles.interpolation);
        info!("Interpolation: {}", self.toggles.interpolation);
        self.toggles.interpolation
    }

    pub fn view(&self) -> RenderView {
        let local = self.client_id().and_then(|id| {
            if self.toggles.prediction {
                self.simulation
                    .as_ref()
                    .and_then(|simulation| simulation.entity(id).copied())
            } else {
                self.authoritative
            }
        });

        let remotes = self
            .interpolator
            .remotes()
            .map(|(id, remote)| (id, remote.display_x, remote.display_y))
            .collect();

        RenderView {
            local,
            remotes,
            hud: HudInfo {
                client_id: self.client_id(),
                room: self.room.clone(),
                connected: self.is_connected(),
                tick: self.tick(),
                clock: self.tick_sync.clock(),
                pending_commands: self.pending.len(),
                dropped_commands: self.dropped_commands,
                remote_count: self.interpolator.len(),
                toggles: self.toggles,
            },
        }
    }

    pub fn client_id(&self) -> Option<EntityId> {
        match self.connection {
            ConnectionState::Connected { client_id } => Some(client_id),
            _ => None,
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.connection, ConnectionState::Connected { .. })
    }

    pub fn connection(&self) -> &ConnectionState {
        &self.connection
    }

    pub fn tick(&self) -> u32 {
        self.simulation.as_ref().map_or(0, |simulation| simulation.tick())
    }

    pub fn clock(&self) -> ClockState {
        self.tick_sync.clock()
    }

    pub fn pending(&self) -> &InputQueue {
        &self.pending
    }

    pub fn simulation(&self) -> Option<&Simulation> {
        self.simulation.as_ref()
    }

    pub fn authoritative(&self) -> Option<&EntityState> {
        self.authoritative.as_ref()
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub fn interpolator(&self) -> &Interpolator {
        &self.interpolator
    }

    pub fn toggles(&self) -> NetcodeToggles {
        self.toggles
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    const RIGHT: InputSample = InputSample {
        left: false,
        right: true,
        jump: false,
    };

    fn session() -> ClientGameState {
        ClientGameState::new(GameConfig::default(), "lobby")
    }

    fn step_duration() -> Duration {
        GameConfig::default().fixed_interval()
    }

    fn connected(client_id: EntityId, tick: u32) -> ClientGameState {
        let mut game = session();
        game.on_packet(Packet::Connected { client_id, tick }, Instant::now());
        game
    }

    fn inputs(packets: &[Packet]) -> Vec<InputCommand> {
        packets
            .iter()
            .filter_map(|packet| match packet {
                Packet::Input(command) => Some(*command),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_connect_is_retried_every_second() {
        let mut game = session();
        let start = Instant::now();

        let first = game.update(Duration::ZERO, InputSample::default(), start);
        assert!(matches!(first.as_slice(), [Packet::Connect { room, .. }] if room == "lobby"));

        let early = game.update(
            Duration::ZERO,
            InputSample::default(),
            start + Duration::from_millis(500),
        );
        assert!(early.is_empty());

        let retry = game.update(
            Duration::ZERO,
            InputSample::default(),
            start + Duration::from_millis(1000),
        );
        assert_eq!(retry.len(), 1);
    }

    #[test]
    fn test_connected_starts_at_server_tick() {
        let game = connected(4, 120);
        assert_eq!(game.client_id(), Some(4));
        assert_eq!(game.tick(), 120);

        let state = game.view().local.unwrap();
        assert_eq!((state.x, state.y), (50.0, 500.0));
    }

    #[test]
    fn test_first_connected_update_pings_and_stamps_commands() {
        let mut game = connected(1, 10);
        let packets = game.update(step_duration(), RIGHT, Instant::now());

        assert!(packets.contains(&Packet::Ping));
        let commands = inputs(&packets);
        assert_eq!(commands, vec![InputCommand::new(false, true, false, 11)]);
        assert_eq!(game.pending().len(), 1);
        assert_eq!(game.tick(), 11);
    }

    #[test]
    fn test_prediction_moves_local_entity_immediately() {
        let mut game = connected(1, 0);
        game.update(step_duration(), RIGHT, Instant::now());
        let local = game.view().local.unwrap();
        assert_approx_eq!(local.vx, 0.3, 1e-6);
        assert!(local.x > 50.0);
    }

    #[test]
    fn test_tick_offset_is_added_to_command_ticks() {
        let mut game = connected(1, 0);
        let sent = Instant::now();
        game.update(step_duration(), InputSample::default(), sent);
        game.on_packet(Packet::Pong, sent + Duration::from_millis(100));
        assert_eq!(game.clock().tick_offset, 3);

        let packets = game.update(step_duration(), RIGHT, sent + Duration::from_millis(101));
        let commands = inputs(&packets);
        // Loop is at tick 1, so the next step is 2 and the stamp is 2 + 3
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].tick, 5);

        // Stamped ahead, yet applied locally in the generating step
        assert_approx_eq!(game.view().local.unwrap().vx, 0.3, 1e-6);
    }

    #[test]
    fn test_snapshot_acknowledges_pending_commands() {
        let mut game = connected(1, 0);
        let now = Instant::now();
        for _ in 0..6 {
            game.update(step_duration(), RIGHT, now);
        }
        assert_eq!(game.pending().len(), 6);

        let mut authoritative = *game.simulation().unwrap().entity(1).unwrap();
        authoritative.last_processed_tick = 4;
        game.on_packet(
            Packet::Snapshot {
                tick: 4,
                entities: vec![(1, authoritative)],
            },
            now,
        );

        assert_eq!(game.pending().len(), 2);
        assert_eq!(game.reconciler().watermark(), 4);
        assert_eq!(game.authoritative().map(|s| s.last_processed_tick), Some(4));
    }

    #[test]
    fn test_remote_entities_are_interpolated() {
        let mut game = connected(1, 0);
        let now = Instant::now();
        let me = EntityState::spawned(50.0, 500.0, 3);

        game.on_packet(
            Packet::Snapshot {
                tick: 3,
                entities: vec![(1, me), (2, EntityState::spawned(100.0, 500.0, 3))],
            },
            now,
        );
        game.on_packet(
            Packet::Snapshot {
                tick: 6,
                entities: vec![(1, me), (2, EntityState::spawned(200.0, 500.0, 6))],
            },
            now,
        );
        game.update(Duration::ZERO, InputSample::default(), now);

        let view = game.view();
        assert_eq!(view.remotes.len(), 1);
        let (id, x, _) = view.remotes[0];
        assert_eq!(id, 2);
        assert_approx_eq!(x, 120.0, 1e-4);
    }

    #[test]
    fn test_departed_remote_disappears() {
        let mut game = connected(1, 0);
        let now = Instant::now();
        let me = EntityState::spawned(50.0, 500.0, 3);
        game.on_packet(
            Packet::Snapshot {
                tick: 3,
                entities: vec![(1, me), (2, EntityState::spawned(100.0, 500.0, 3))],
            },
            now,
        );
        game.on_packet(
            Packet::Snapshot {
                tick: 6,
                entities: vec![(1, me)],
            },
            now,
        );
        assert!(game.view().remotes.is_empty());
    }

    #[test]
    fn test_prediction_off_shows_authoritative_state() {
        let mut game = connected(1, 0);
        assert!(!game.toggle_prediction());

        let mut authoritative = EntityState::spawned(300.0, 500.0, 3);
        authoritative.last_processed_tick = 0;
        game.on_packet(
            Packet::Snapshot {
                tick: 3,
                entities: vec![(1, authoritative)],
            },
            Instant::now(),
        );

        assert_eq!(game.view().local.map(|s| s.x), Some(300.0));
    }

    #[test]
    fn test_disconnected_stops_traffic() {
        let mut game = connected(1, 0);
        game.on_packet(
            Packet::Disconnected {
                reason: "Server full".to_string(),
            },
            Instant::now(),
        );

        assert_eq!(
            game.connection(),
            &ConnectionState::Disconnected {
                reason: "Server full".to_string()
            }
        );
        assert!(game.update(step_duration(), RIGHT, Instant::now()).is_empty());
        assert!(game.disconnect_packet().is_none());

        game.reconnect();
        let packets = game.update(Duration::ZERO, InputSample::default(), Instant::now());
        assert!(matches!(packets.as_slice(), [Packet::Connect { .. }]));
    }

    #[test]
    fn test_interpolation_toggle_reaches_interpolator() {
        let mut game = session();
        assert!(!game.toggle_interpolation());
        assert!(!game.interpolator().is_enabled());
        assert!(!game.toggle_reconciliation());
        assert!(!game.toggles().reconciliation);
    }
}
