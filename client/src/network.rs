//! Client transport running on a background thread
//!
//! The render loop is synchronous, so the UDP socket lives on its own thread
//! with a current-thread tokio runtime. Packets cross between the two over
//! unbounded channels. Both directions pass through a `DelayLine` that can
//! simulate latency and jitter without ever reordering packets.

use log::{error, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{Packet, MAX_PACKET_SIZE};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Artificial network conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LagConfig {
    /// Simulated round trip, split evenly across both directions
    pub fake_ping_ms: u64,
    /// Upper bound of the uniform random extra delay per packet
    pub jitter_ms: u64,
}

impl LagConfig {
    pub fn one_way(&self) -> Duration {
        Duration::from_millis(self.fake_ping_ms / 2)
    }

    pub fn is_active(&self) -> bool {
        self.fake_ping_ms > 0 || self.jitter_ms > 0
    }
}

/// FIFO of items held back until their release time.
///
/// Release times never decrease, so a packet with a small random delay
/// waits behind one that drew a larger delay.
pub struct DelayLine<T> {
    delay: Duration,
    jitter_ms: u64,
    rng: StdRng,
    last_release: Option<Instant>,
    queue: VecDeque<(Instant, T)>,
}

impl<T> DelayLine<T> {
    pub fn new(delay: Duration, jitter_ms: u64) -> Self {
        Self::with_rng(delay, jitter_ms, StdRng::from_entropy())
    }

    pub fn with_rng(delay: Duration, jitter_ms: u64, rng: StdRng) -> Self {
        Self {
            delay,
            jitter_ms,
            rng,
            last_release: None,
            queue: VecDeque::new(),
        }
    }

    pub fn push(&mut self, now: Instant, item: T) {
        let jitter = if self.jitter_ms > 0 {
            Duration::from_millis(self.rng.gen_range(0..=self.jitter_ms))
        } else {
            Duration::ZERO
        };

        let mut release = now + self.delay + jitter;
        if let Some(last) = self.last_release {
            release = release.max(last);
        }
        self.last_release = Some(release);
        self.queue.push_back((release, item));
    }

    /// Removes every item whose release time has passed, oldest first.
    pub fn pop_due(&mut self, now: Instant) -> Vec<(Instant, T)> {
        let mut due = Vec::new();
        while let Some((release, _)) = self.queue.front() {
            if *release > now {
                break;
            }
            if let Some(entry) = self.queue.pop_front() {
                due.push(entry);
            }
        }
        due
    }

    pub fn next_release(&self) -> Option<Instant> {
        self.queue.front().map(|(release, _)| *release)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

/// The render loop's side of the transport.
pub struct NetworkHandle {
    outgoing: mpsc::UnboundedSender<Packet>,
    incoming: mpsc::UnboundedReceiver<(Packet, std::time::Instant)>,
    thread: Option<JoinHandle<()>>,
}

impl NetworkHandle {
    /// Starts the network thread talking to `server`.
    pub fn spawn(server: SocketAddr, lag: LagConfig) -> std::io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        let (incoming_tx, incoming) = mpsc::unbounded_channel();

        let thread = std::thread::Builder::new()
            .name("network".to_string())
            .spawn(move || {
                runtime.block_on(async move {
                    if let Err(e) = run_transport(server, lag, outgoing_rx, incoming_tx).await {
                        error!("Network thread stopped: {}", e);
                    }
                });
            })?;

        Ok(Self {
            outgoing,
            incoming,
            thread: Some(thread),
        })
    }

    /// Queues a packet; fire-and-forget.
    pub fn send(&self, packet: Packet) {
        if self.outgoing.send(packet).is_err() {
            warn!("Network thread is gone, packet dropped");
        }
    }

    /// Next received packet with the time it was released to the game.
    pub fn try_recv(&mut self) -> Option<(Packet, std::time::Instant)> {
        self.incoming.try_recv().ok()
    }

    /// Flushes queued packets and stops the thread.
    pub fn shutdown(mut self) {
        let (closed, _) = mpsc::unbounded_channel();
        drop(std::mem::replace(&mut self.outgoing, closed));
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Network thread panicked");
            }
        }
    }
}

async fn run_transport(
    server: SocketAddr,
    lag: LagConfig,
    mut outgoing_rx: mpsc::UnboundedReceiver<Packet>,
    incoming_tx: mpsc::UnboundedSender<(Packet, std::time::Instant)>,
) -> std::io::Result<()> {
    let bind_addr: SocketAddr = if server.is_ipv4() {
        SocketAddr::from(([0, 0, 0, 0], 0))
    } else {
        SocketAddr::from(([0u16; 8], 0))
    };
    let socket = UdpSocket::bind(bind_addr).await?;
    info!("Client socket bound to {}", socket.local_addr()?);
    if lag.is_active() {
        info!(
            "Simulating {}ms ping with up to {}ms jitter",
            lag.fake_ping_ms, lag.jitter_ms
        );
    }

    let mut outbound: DelayLine<Packet> = DelayLine::new(lag.one_way(), lag.jitter_ms);
    let mut inbound: DelayLine<Packet> = DelayLine::new(lag.one_way(), lag.jitter_ms);
    let mut buffer = [0u8; MAX_PACKET_SIZE];
    let mut closing = false;

    loop {
        let now = Instant::now();

        for (_, packet) in outbound.pop_due(now) {
            match packet.encode() {
                Ok(data) => {
                    if let Err(e) = socket.send_to(&data, server).await {
                        error!("Failed to send {}: {}", packet.kind(), e);
                    }
                }
                Err(e) => error!("Failed to encode {}: {}", packet.kind(), e),
            }
        }
        for (released, packet) in inbound.pop_due(now) {
            if incoming_tx.send((packet, released.into_std())).is_err() {
                return Ok(());
            }
        }

        if closing && outbound.is_empty() {
            return Ok(());
        }

        let wake = [outbound.next_release(), inbound.next_release()]
            .into_iter()
            .flatten()
            .min()
            .unwrap_or(now + Duration::from_secs(3600));

        tokio::select! {
            result = socket.recv_from(&mut buffer) => match result {
                Ok((len, from)) if from == server => match Packet::decode(&buffer[..len]) {
                    Ok(packet) => inbound.push(Instant::now(), packet),
                    Err(e) => warn!("Dropping undecodable packet: {}", e),
                },
                Ok((_, from)) => warn!("Ignoring datagram from unexpected peer {}", from),
                Err(e) => {
                    error!("Error receiving packet: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            },

            packet = outgoing_rx.recv(), if !closing => match packet {
                Some(packet) => outbound.push(Instant::now(), packet),
                None => closing = true,
            },

            _ = tokio::time::sleep_until(wake) => {}
        }
    }
}
